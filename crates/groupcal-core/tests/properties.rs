use chrono::{Duration, NaiveDate, NaiveDateTime};
use groupcal_core::temporal::{
    Classification, DisplayBounds, Interval, all_day_interval, classify, display_bounds, overlaps,
};
use proptest::prelude::*;

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .expect("valid base")
}

fn interval_strategy() -> impl Strategy<Value = Interval> {
    (0i64..60 * 24 * 30, 1i64..60 * 24 * 3).prop_map(|(offset, length)| {
        let start = base() + Duration::minutes(offset);
        Interval::new(start, start + Duration::minutes(length))
    })
}

proptest! {
    #[test]
    fn overlap_is_symmetric(a in interval_strategy(), b in interval_strategy()) {
        prop_assert_eq!(overlaps(&a, &b), overlaps(&b, &a));
    }

    #[test]
    fn touching_intervals_never_overlap(a in interval_strategy(), length in 1i64..600) {
        let b = Interval::new(a.end, a.end + Duration::minutes(length));
        prop_assert!(!overlaps(&a, &b));
        prop_assert!(!overlaps(&b, &a));
    }

    #[test]
    fn interval_overlaps_itself(a in interval_strategy()) {
        prop_assert!(overlaps(&a, &a));
    }

    #[test]
    fn full_day_display_spans_exactly_one_day(day_offset in 0i64..3650) {
        let day = base().date() + Duration::days(day_offset);
        let interval = all_day_interval(day, day);
        prop_assert_eq!(classify(&interval), Classification::FullDay);

        let DisplayBounds::Days { start, end_exclusive } =
            display_bounds(&interval, Classification::FullDay)
        else {
            return Err(TestCaseError::fail("all-day bounds must be whole days"));
        };
        prop_assert_eq!(start, day);
        prop_assert_eq!(end_exclusive, day + Duration::days(1));
    }
}
