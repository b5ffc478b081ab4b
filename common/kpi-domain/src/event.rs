use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which broker topic a message arrived on; selects the `Event` variant
/// the payload is decoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Orders,
    Sessions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_id: String,
    pub order_id: String,
    pub customer_id: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub channel: Option<String>,
    pub event_time: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEventType {
    View,
    Checkout,
    Purchase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub event_id: String,
    pub session_id: String,
    pub event_type: SessionEventType,
    pub user_id: Option<String>,
    pub channel: Option<String>,
    pub event_time: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// Decoded, topic-tagged broker message. `processed_at` is stamped by the
/// processor once the event has cleared the dedupe check, not at decode
/// time (see `kpi_domain::parser`).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Order(OrderEvent),
    Session(SessionEvent),
}

impl Event {
    pub fn event_id(&self) -> &str {
        match self {
            Event::Order(o) => &o.event_id,
            Event::Session(s) => &s.event_id,
        }
    }

    pub fn event_time(&self) -> DateTime<Utc> {
        match self {
            Event::Order(o) => o.event_time,
            Event::Session(s) => s.event_time,
        }
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        match self {
            Event::Order(o) => o.received_at,
            Event::Session(s) => s.received_at,
        }
    }
}
