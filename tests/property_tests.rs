//! Property-based checks for the delay rule and completion statistics.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use service_desk_api::entities::service_order::{check_invariants, compute_days_delay, Priority};
use service_desk_api::services::statistics::{CompletionSummary, PriorityTotals};

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High)
    ]
}

proptest! {
    #[test]
    fn delay_is_never_negative(predicted in 0i64..2_000, reference in 0i64..2_000, finished in any::<bool>()) {
        let predicted = base_date() + Duration::days(predicted);
        let reference = base_date() + Duration::days(reference);
        let completion = finished.then_some(reference);

        let delay = compute_days_delay(Some(predicted), completion, reference);
        prop_assert!(delay >= 0);
        prop_assert_eq!(i64::from(delay), (reference - predicted).num_days().max(0));
    }

    #[test]
    fn completed_orders_ignore_today(predicted in 0i64..500, completed in 0i64..500, today in 0i64..5_000) {
        let predicted = base_date() + Duration::days(predicted);
        let completion = base_date() + Duration::days(completed);
        let today = base_date() + Duration::days(today);

        prop_assert_eq!(
            compute_days_delay(Some(predicted), Some(completion), today),
            compute_days_delay(Some(predicted), Some(completion), completion)
        );
    }

    #[test]
    fn rate_bounds_are_enforced(rate in -10i32..20) {
        let start = base_date();
        let result = check_invariants(start, start, None, Some(rate));
        prop_assert_eq!(result.is_ok(), (1..=5).contains(&rate));
    }

    #[test]
    fn mean_times_count_recovers_total(
        rows in prop::collection::vec((priority_strategy(), 0u64..50, 0u32..400), 0..6)
    ) {
        // Fold duplicates the way a GROUP BY would
        let mut totals: Vec<PriorityTotals> = Vec::new();
        for (priority, completed, days) in rows {
            let total_days = f64::from(days) * completed as f64;
            match totals.iter_mut().find(|t| t.priority == priority) {
                Some(existing) => {
                    existing.completed += completed;
                    existing.total_days += total_days;
                }
                None => totals.push(PriorityTotals { priority, total_days, completed }),
            }
        }

        let summary = CompletionSummary::from_totals(&totals);
        let expected_count: u64 = totals.iter().map(|t| t.completed).sum();
        let expected_days: f64 = totals.iter().map(|t| t.total_days).sum();

        prop_assert_eq!(summary.completed_orders, expected_count);
        if expected_count == 0 {
            prop_assert_eq!(summary.avg_completion_days, 0.0);
            prop_assert!(summary.priority_stats.is_empty());
        } else {
            let recovered = summary.avg_completion_days * expected_count as f64;
            prop_assert!((recovered - expected_days).abs() < 1e-6 * expected_days.max(1.0));
        }

        for total in totals.iter().filter(|t| t.completed > 0) {
            let mean = summary.priority_stats.get(total.priority).expect("completed priority has a mean");
            prop_assert!((mean * total.completed as f64 - total.total_days).abs() < 1e-6 * total.total_days.max(1.0));
        }
    }
}
