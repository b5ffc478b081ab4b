pub mod aggregates;
pub mod dedupe;
pub mod event;
pub mod parser;

pub use aggregates::{hour_bucket, minute_bucket, Aggregates, BucketMap, BucketMetrics};
pub use dedupe::DedupeCache;
pub use event::{Event, OrderEvent, SessionEvent, SessionEventType, Topic};
pub use parser::{decode, ParseError};
