use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kpi_store::{AlertStore, Direction, Kpi, StoreResult};

/// The subset of `AlertStore` the detector's tick logic depends on,
/// factored out so the state machine (duration gating, smoothing,
/// threshold comparison) can be unit-tested against an in-memory fake
/// without a Postgres connection.
#[async_trait]
pub trait AlertSource {
    async fn latest_buckets(&self, lookback_minutes: i64, count: i64) -> StoreResult<Vec<DateTime<Utc>>>;
    async fn smoothed_current(&self, bucket: DateTime<Utc>, kpi: Kpi, window_minutes: i64) -> StoreResult<Option<f64>>;
    async fn baseline(&self, bucket: DateTime<Utc>, kpi: Kpi, baseline_days: i64) -> StoreResult<Option<f64>>;
    #[allow(clippy::too_many_arguments)]
    async fn insert_alert(
        &self,
        bucket: DateTime<Utc>,
        kpi: Kpi,
        current: f64,
        baseline: f64,
        delta_pct: f64,
        direction: Direction,
    ) -> StoreResult<bool>;
}

#[async_trait]
impl AlertSource for AlertStore {
    async fn latest_buckets(&self, lookback_minutes: i64, count: i64) -> StoreResult<Vec<DateTime<Utc>>> {
        AlertStore::latest_buckets(self, lookback_minutes, count).await
    }

    async fn smoothed_current(&self, bucket: DateTime<Utc>, kpi: Kpi, window_minutes: i64) -> StoreResult<Option<f64>> {
        AlertStore::smoothed_current(self, bucket, kpi, window_minutes).await
    }

    async fn baseline(&self, bucket: DateTime<Utc>, kpi: Kpi, baseline_days: i64) -> StoreResult<Option<f64>> {
        AlertStore::baseline(self, bucket, kpi, baseline_days).await
    }

    async fn insert_alert(
        &self,
        bucket: DateTime<Utc>,
        kpi: Kpi,
        current: f64,
        baseline: f64,
        delta_pct: f64,
        direction: Direction,
    ) -> StoreResult<bool> {
        AlertStore::insert_alert(self, bucket, kpi, current, baseline, delta_pct, direction).await
    }
}

/// Tick parameters for one monitored KPI, per spec.md §4.G.
pub struct Detector {
    pub kpi: Kpi,
    pub baseline_days: i64,
    pub threshold_pct: f64,
    pub min_baseline: f64,
    pub lookback_minutes: i64,
    pub current_window_minutes: i64,
    pub duration_minutes: i64,
}

impl Detector {
    /// One state-machine pass: fetch the trailing `duration_minutes`
    /// buckets, require every one of them to independently cross the
    /// threshold (duration gating), and if so insert an alert for the
    /// latest bucket. Returns whether a new alert row was inserted.
    pub async fn tick<S: AlertSource + ?Sized>(&self, source: &S) -> StoreResult<bool> {
        let buckets = source
            .latest_buckets(self.lookback_minutes, self.duration_minutes)
            .await?;
        if (buckets.len() as i64) < self.duration_minutes {
            return Ok(false);
        }

        let latest_bucket = *buckets.last().expect("non-empty, checked above");
        let mut latest: Option<(f64, f64, f64)> = None;

        for bucket in &buckets {
            let Some(current) = source
                .smoothed_current(*bucket, self.kpi, self.current_window_minutes)
                .await?
            else {
                return Ok(false);
            };

            let Some(baseline) = source.baseline(*bucket, self.kpi, self.baseline_days).await? else {
                return Ok(false);
            };
            if baseline < self.min_baseline {
                return Ok(false);
            }

            let delta_pct = (current - baseline) / baseline;
            if delta_pct.abs() <= self.threshold_pct {
                return Ok(false);
            }

            if *bucket == latest_bucket {
                latest = Some((current, baseline, delta_pct));
            }
        }

        let Some((current, baseline, delta_pct)) = latest else {
            return Ok(false);
        };
        let direction = if delta_pct > 0.0 { Direction::Up } else { Direction::Down };
        source
            .insert_alert(latest_bucket, self.kpi, current, baseline, delta_pct, direction)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeSource {
        buckets: Vec<DateTime<Utc>>,
        current: HashMap<DateTime<Utc>, f64>,
        baseline: HashMap<DateTime<Utc>, f64>,
        inserted: Mutex<Vec<(DateTime<Utc>, Kpi)>>,
    }

    impl FakeSource {
        fn new(buckets: Vec<DateTime<Utc>>) -> Self {
            Self {
                buckets,
                current: HashMap::new(),
                baseline: HashMap::new(),
                inserted: Mutex::new(Vec::new()),
            }
        }

        fn with_current(mut self, bucket: DateTime<Utc>, value: f64) -> Self {
            self.current.insert(bucket, value);
            self
        }

        fn with_baseline(mut self, bucket: DateTime<Utc>, value: f64) -> Self {
            self.baseline.insert(bucket, value);
            self
        }
    }

    #[async_trait]
    impl AlertSource for FakeSource {
        async fn latest_buckets(&self, _lookback_minutes: i64, count: i64) -> StoreResult<Vec<DateTime<Utc>>> {
            let len = self.buckets.len();
            let take = (count as usize).min(len);
            Ok(self.buckets[len - take..].to_vec())
        }

        async fn smoothed_current(&self, bucket: DateTime<Utc>, _kpi: Kpi, _window_minutes: i64) -> StoreResult<Option<f64>> {
            Ok(self.current.get(&bucket).copied())
        }

        async fn baseline(&self, bucket: DateTime<Utc>, _kpi: Kpi, _baseline_days: i64) -> StoreResult<Option<f64>> {
            Ok(self.baseline.get(&bucket).copied())
        }

        async fn insert_alert(
            &self,
            bucket: DateTime<Utc>,
            kpi: Kpi,
            _current: f64,
            _baseline: f64,
            _delta_pct: f64,
            _direction: Direction,
        ) -> StoreResult<bool> {
            let mut inserted = self.inserted.lock().unwrap();
            if inserted.iter().any(|(b, k)| *b == bucket && *k == kpi) {
                return Ok(false);
            }
            inserted.push((bucket, kpi));
            Ok(true)
        }
    }

    fn minute(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 3, 10, 0, 0).unwrap() + chrono::Duration::minutes(i)
    }

    fn detector() -> Detector {
        Detector {
            kpi: Kpi::Revenue,
            baseline_days: 7,
            threshold_pct: 0.3,
            min_baseline: 10.0,
            lookback_minutes: 60,
            current_window_minutes: 1,
            duration_minutes: 3,
        }
    }

    #[tokio::test]
    async fn s4_alert_emitted_on_upward_anomaly() {
        let buckets = vec![minute(0), minute(1), minute(2)];
        let mut source = FakeSource::new(buckets.clone());
        for b in &buckets {
            source = source.with_current(*b, 160.0).with_baseline(*b, 100.0);
        }
        let inserted = detector().tick(&source).await.unwrap();
        assert!(inserted);
        let logged = source.inserted.lock().unwrap();
        assert_eq!(logged.len(), 1);
    }

    #[tokio::test]
    async fn s5_suppressed_when_only_latest_bucket_exceeds_threshold() {
        let buckets = vec![minute(0), minute(1), minute(2)];
        let mut source = FakeSource::new(buckets.clone());
        source = source.with_current(minute(0), 105.0).with_baseline(minute(0), 100.0);
        source = source.with_current(minute(1), 102.0).with_baseline(minute(1), 100.0);
        source = source.with_current(minute(2), 160.0).with_baseline(minute(2), 100.0);
        let inserted = detector().tick(&source).await.unwrap();
        assert!(!inserted);
    }

    #[tokio::test]
    async fn s6_suppressed_by_min_baseline() {
        let buckets = vec![minute(0), minute(1), minute(2)];
        let mut source = FakeSource::new(buckets.clone());
        for b in &buckets {
            source = source.with_current(*b, 50.0).with_baseline(*b, 5.0);
        }
        let inserted = detector().tick(&source).await.unwrap();
        assert!(!inserted);
    }

    #[tokio::test]
    async fn p6_duplicate_tick_never_double_inserts() {
        let buckets = vec![minute(0), minute(1), minute(2)];
        let mut source = FakeSource::new(buckets.clone());
        for b in &buckets {
            source = source.with_current(*b, 160.0).with_baseline(*b, 100.0);
        }
        let d = detector();
        assert!(d.tick(&source).await.unwrap());
        assert!(!d.tick(&source).await.unwrap());
    }

    #[tokio::test]
    async fn p7_fewer_than_duration_buckets_emits_nothing() {
        let buckets = vec![minute(0), minute(1)];
        let mut source = FakeSource::new(buckets.clone());
        for b in &buckets {
            source = source.with_current(*b, 200.0).with_baseline(*b, 100.0);
        }
        let inserted = detector().tick(&source).await.unwrap();
        assert!(!inserted);
    }

    #[tokio::test]
    async fn delta_exactly_at_threshold_does_not_trigger() {
        let buckets = vec![minute(0), minute(1), minute(2)];
        let mut source = FakeSource::new(buckets.clone());
        for b in &buckets {
            source = source.with_current(*b, 130.0).with_baseline(*b, 100.0);
        }
        let inserted = detector().tick(&source).await.unwrap();
        assert!(!inserted, "delta_pct exactly at threshold_pct must not trigger");
    }

    #[tokio::test]
    async fn duration_one_behaves_as_instantaneous_check() {
        let buckets = vec![minute(0)];
        let mut source = FakeSource::new(buckets.clone());
        source = source.with_current(minute(0), 200.0).with_baseline(minute(0), 100.0);
        let mut d = detector();
        d.duration_minutes = 1;
        assert!(d.tick(&source).await.unwrap());
    }
}
