use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Bounded-lifetime membership cache over recently processed event ids.
///
/// Not a correctness barrier — the relational unique constraints on
/// `orders.order_id` / `sessions.event_id` are the ultimate dedup
/// authority (see `kpi_store::kpi::KpiStore`). This cache only saves a
/// database round-trip on broker retries within the TTL window.
///
/// Single-threaded by contract: the stream processor's main loop is the
/// only caller of `seen`/`cleanup`. If an implementer runs parallel
/// consumers, calls must be externally serialized.
pub struct DedupeCache {
    ttl: Duration,
    items: HashMap<String, DateTime<Utc>>,
}

impl DedupeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            items: HashMap::new(),
        }
    }

    /// Returns `true` if `key` has an unexpired entry (caller should drop
    /// the message). Returns `false` and records a fresh expiry otherwise
    /// (caller should proceed to process).
    pub fn seen(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        if let Some(expiry) = self.items.get(key) {
            if *expiry > now {
                return true;
            }
        }
        self.items.insert(key.to_string(), now + self.ttl);
        false
    }

    /// Drop all entries whose expiry has passed.
    pub fn cleanup(&mut self, now: DateTime<Utc>) {
        self.items.retain(|_, expiry| *expiry > now);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }
}
