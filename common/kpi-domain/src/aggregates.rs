use chrono::{DateTime, Timelike, Utc};
use std::collections::HashMap;
use std::ops::{Add, AddAssign};
use std::sync::Mutex;

/// Additive 5-tuple of counters for one time bucket. Addition is
/// componentwise; the all-zero value is the identity element.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BucketMetrics {
    pub revenue: f64,
    pub order_count: i64,
    pub session_count: i64,
    pub checkout_count: i64,
    pub purchase_count: i64,
}

impl BucketMetrics {
    pub fn order(amount: f64) -> Self {
        Self {
            revenue: amount,
            order_count: 1,
            ..Default::default()
        }
    }

    pub fn view() -> Self {
        Self {
            session_count: 1,
            ..Default::default()
        }
    }

    pub fn checkout() -> Self {
        Self {
            checkout_count: 1,
            ..Default::default()
        }
    }

    pub fn purchase() -> Self {
        Self {
            purchase_count: 1,
            ..Default::default()
        }
    }
}

impl Add for BucketMetrics {
    type Output = BucketMetrics;

    fn add(self, rhs: Self) -> Self::Output {
        BucketMetrics {
            revenue: self.revenue + rhs.revenue,
            order_count: self.order_count + rhs.order_count,
            session_count: self.session_count + rhs.session_count,
            checkout_count: self.checkout_count + rhs.checkout_count,
            purchase_count: self.purchase_count + rhs.purchase_count,
        }
    }
}

impl AddAssign for BucketMetrics {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Zero seconds and sub-seconds.
pub fn minute_bucket(value: DateTime<Utc>) -> DateTime<Utc> {
    value
        .with_second(0)
        .and_then(|v| v.with_nanosecond(0))
        .expect("truncating to a whole minute never moves across a day boundary")
}

/// Zero minutes, seconds, sub-seconds.
pub fn hour_bucket(value: DateTime<Utc>) -> DateTime<Utc> {
    minute_bucket(value)
        .with_minute(0)
        .expect("truncating to a whole hour never moves across a day boundary")
}

pub type BucketMap = HashMap<DateTime<Utc>, BucketMetrics>;

#[derive(Default)]
struct Buffers {
    minute: BucketMap,
    hour: BucketMap,
}

/// In-memory minute+hour KPI accumulator shared between the stream
/// processor's main loop (`add`) and its periodic flush task (`drain`).
/// The mutex is the only synchronization point between the two; a
/// `drain` never observes a partial `add` and never splits one `add`'s
/// contribution across two drained batches.
pub struct Aggregates {
    inner: Mutex<Buffers>,
}

impl Aggregates {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Buffers::default()),
        }
    }

    pub fn add(&self, event_time: DateTime<Utc>, delta: BucketMetrics) {
        let mut buffers = self.inner.lock().expect("aggregates mutex poisoned");
        *buffers.minute.entry(minute_bucket(event_time)).or_default() += delta;
        *buffers.hour.entry(hour_bucket(event_time)).or_default() += delta;
    }

    /// Atomically swap out both maps for fresh empty ones, returning the
    /// previous contents for the flush task to upsert.
    pub fn drain(&self) -> (BucketMap, BucketMap) {
        let mut buffers = self.inner.lock().expect("aggregates mutex poisoned");
        (
            std::mem::take(&mut buffers.minute),
            std::mem::take(&mut buffers.hour),
        )
    }
}

impl Default for Aggregates {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 3, h, m, s).unwrap()
    }

    #[test]
    fn minute_bucket_zeroes_seconds() {
        assert_eq!(minute_bucket(ts(10, 15, 30)), ts(10, 15, 0));
    }

    #[test]
    fn hour_bucket_zeroes_minutes_and_seconds() {
        assert_eq!(hour_bucket(ts(10, 15, 30)), ts(10, 0, 0));
    }

    #[test]
    fn add_accumulates_into_both_maps() {
        let agg = Aggregates::new();
        agg.add(ts(10, 15, 30), BucketMetrics::order(100.0));
        agg.add(ts(10, 15, 45), BucketMetrics::order(50.0));
        let (minute, hour) = agg.drain();
        let bucket = minute.get(&ts(10, 15, 0)).unwrap();
        assert_eq!(bucket.revenue, 150.0);
        assert_eq!(bucket.order_count, 2);
        let hbucket = hour.get(&ts(10, 0, 0)).unwrap();
        assert_eq!(hbucket.revenue, 150.0);
    }

    #[test]
    fn drain_resets_buffers() {
        let agg = Aggregates::new();
        agg.add(ts(10, 15, 30), BucketMetrics::order(100.0));
        let _ = agg.drain();
        let (minute, hour) = agg.drain();
        assert!(minute.is_empty());
        assert!(hour.is_empty());
    }

    #[test]
    fn addition_order_is_commutative() {
        let mut a = BucketMetrics::default();
        a += BucketMetrics::order(10.0);
        a += BucketMetrics::purchase();
        let mut b = BucketMetrics::default();
        b += BucketMetrics::purchase();
        b += BucketMetrics::order(10.0);
        assert_eq!(a, b);
    }
}
