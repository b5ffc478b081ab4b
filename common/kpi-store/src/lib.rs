pub mod alerts;
pub mod error;
pub mod kpi;

pub use alerts::{AlertStore, Direction, Kpi};
pub use error::{classify, StoreError, StoreResult};
pub use kpi::KpiStore;
