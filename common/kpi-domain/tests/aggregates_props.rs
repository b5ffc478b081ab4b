use chrono::{DateTime, Utc};
use kpi_domain::{Aggregates, BucketMetrics};
use proptest::prelude::*;

fn arb_delta() -> impl Strategy<Value = BucketMetrics> {
    (0.0f64..10_000.0, 0i64..50, 0i64..50, 0i64..50, 0i64..50).prop_map(
        |(revenue, order_count, session_count, checkout_count, purchase_count)| BucketMetrics {
            revenue,
            order_count,
            session_count,
            checkout_count,
            purchase_count,
        },
    )
}

fn arb_event_time() -> impl Strategy<Value = DateTime<Utc>> {
    (1_700_000_000i64..1_800_000_000i64).prop_map(|secs| DateTime::<Utc>::from_timestamp(secs, 0).unwrap())
}

proptest! {
    // P5: add(t1, d1); add(t2, d2) and add(t2, d2); add(t1, d1) yield the
    // same buffer state — addition is commutative regardless of arrival order.
    #[test]
    fn add_order_does_not_affect_drained_state(
        t1 in arb_event_time(), d1 in arb_delta(),
        t2 in arb_event_time(), d2 in arb_delta(),
    ) {
        let forward = Aggregates::new();
        forward.add(t1, d1);
        forward.add(t2, d2);
        let (forward_minute, forward_hour) = forward.drain();

        let backward = Aggregates::new();
        backward.add(t2, d2);
        backward.add(t1, d1);
        let (backward_minute, backward_hour) = backward.drain();

        prop_assert_eq!(forward_minute.len(), backward_minute.len());
        for (bucket, metrics) in &forward_minute {
            let other = backward_minute.get(bucket).expect("same buckets on both sides");
            prop_assert_eq!(metrics.revenue, other.revenue);
            prop_assert_eq!(metrics.order_count, other.order_count);
            prop_assert_eq!(metrics.session_count, other.session_count);
            prop_assert_eq!(metrics.checkout_count, other.checkout_count);
            prop_assert_eq!(metrics.purchase_count, other.purchase_count);
        }
        prop_assert_eq!(forward_hour.len(), backward_hour.len());
    }

    // P3 (the minute/hour half): every hour bucket equals the sum of its
    // constituent minute buckets' order_count.
    #[test]
    fn hour_bucket_order_count_sums_its_minutes(
        deltas in prop::collection::vec((arb_event_time(), arb_delta()), 1..20)
    ) {
        let agg = Aggregates::new();
        for (t, d) in &deltas {
            agg.add(*t, *d);
        }
        let (minute, hour) = agg.drain();
        for (hour_bucket, hour_metrics) in &hour {
            let summed: i64 = minute
                .iter()
                .filter(|(b, _)| kpi_domain::hour_bucket(**b) == *hour_bucket)
                .map(|(_, m)| m.order_count)
                .sum();
            prop_assert_eq!(summed, hour_metrics.order_count);
        }
    }
}
