use chrono::{DateTime, Duration, Utc};
use kpi_domain::DedupeCache;
use proptest::prelude::*;

fn arb_ts() -> impl Strategy<Value = DateTime<Utc>> {
    (1_700_000_000i64..1_800_000_000i64).prop_map(|secs| DateTime::<Utc>::from_timestamp(secs, 0).unwrap())
}

proptest! {
    // P4: for any event_id, two consecutive seen() calls inside the TTL
    // window return (false, true).
    #[test]
    fn seen_round_trip_within_ttl(
        key in "[a-z0-9]{1,12}",
        now in arb_ts(),
        ttl_secs in 1i64..10_000,
        elapsed_secs in 0i64..9_999,
    ) {
        prop_assume!(elapsed_secs < ttl_secs);
        let mut cache = DedupeCache::new(Duration::seconds(ttl_secs));
        let first = cache.seen(&key, now);
        let second = cache.seen(&key, now + Duration::seconds(elapsed_secs));
        prop_assert_eq!((first, second), (false, true));
    }

    #[test]
    fn seen_expires_strictly_after_ttl(
        key in "[a-z0-9]{1,12}",
        now in arb_ts(),
        ttl_secs in 1i64..10_000,
    ) {
        let mut cache = DedupeCache::new(Duration::seconds(ttl_secs));
        cache.seen(&key, now);
        let after_expiry = now + Duration::seconds(ttl_secs) + Duration::seconds(1);
        prop_assert!(!cache.seen(&key, after_expiry));
    }
}
