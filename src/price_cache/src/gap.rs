//! Day-granular gap detection.
//!
//! Backfill works one UTC calendar day at a time, so a range that an earlier
//! request already half-filled only re-fetches the uncovered days. A day counts
//! as present as soon as any bar for it is stored.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

const LAST_MILLI_OF_DAY: i64 = 86_400_000 - 1;

/// Every date in `[start, end]` not in `present`. Empty when `end < start`.
pub fn missing_dates(
    start: NaiveDate,
    end: NaiveDate,
    present: &BTreeSet<NaiveDate>,
) -> BTreeSet<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !present.contains(d))
        .collect()
}

/// Midnight UTC of `date`.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Last millisecond (23:59:59.999 UTC) of `date`.
pub fn day_end(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + chrono::Duration::milliseconds(LAST_MILLI_OF_DAY)
}

/// Inclusive `[00:00:00.000, 23:59:59.999]` UTC bounds of `date` in Unix ms.
pub fn day_bounds_ms(date: NaiveDate) -> (i64, i64) {
    let start = day_start(date).timestamp_millis();
    (start, start + LAST_MILLI_OF_DAY)
}

/// Collapse sorted dates into inclusive runs of consecutive days.
pub fn coalesce(dates: &BTreeSet<NaiveDate>) -> Vec<(NaiveDate, NaiveDate)> {
    let mut out = Vec::new();
    let mut it = dates.iter().copied();
    if let Some(mut run_start) = it.next() {
        let mut prev = run_start;
        for d in it {
            if prev.succ_opt() == Some(d) {
                prev = d;
                continue;
            }
            out.push((run_start, prev));
            run_start = d;
            prev = d;
        }
        out.push((run_start, prev));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn middle_day_present_leaves_both_ends_missing() {
        let present = BTreeSet::from([d(2024, 1, 2)]);
        let missing = missing_dates(d(2024, 1, 1), d(2024, 1, 3), &present);
        assert_eq!(missing, BTreeSet::from([d(2024, 1, 1), d(2024, 1, 3)]));
    }

    #[test]
    fn inverted_range_is_empty() {
        assert!(missing_dates(d(2024, 1, 3), d(2024, 1, 1), &BTreeSet::new()).is_empty());
    }

    #[test]
    fn single_day_range() {
        let day = d(2024, 2, 29);
        assert_eq!(
            missing_dates(day, day, &BTreeSet::new()),
            BTreeSet::from([day])
        );
        assert!(missing_dates(day, day, &BTreeSet::from([day])).is_empty());
    }

    #[test]
    fn day_bounds_cover_the_whole_utc_day() {
        let (s, e) = day_bounds_ms(d(2024, 1, 1));
        assert_eq!(s, 1_704_067_200_000);
        assert_eq!(e, 1_704_153_599_999);
        assert_eq!(day_end(d(2024, 1, 1)).timestamp_millis(), e);
    }

    #[test]
    fn coalesce_groups_consecutive_days() {
        let dates = BTreeSet::from([
            d(2024, 1, 1),
            d(2024, 1, 2),
            d(2024, 1, 3),
            d(2024, 1, 5),
            d(2024, 1, 31),
            d(2024, 2, 1),
        ]);
        assert_eq!(
            coalesce(&dates),
            vec![
                (d(2024, 1, 1), d(2024, 1, 3)),
                (d(2024, 1, 5), d(2024, 1, 5)),
                (d(2024, 1, 31), d(2024, 2, 1)),
            ]
        );
        assert!(coalesce(&BTreeSet::new()).is_empty());
    }

    proptest! {
        #[test]
        fn missing_and_present_partition_the_range(
            start_off in 0i64..400,
            len in 0i64..60,
            present_offs in proptest::collection::btree_set(0i64..460, 0..40),
        ) {
            let base = d(2023, 1, 1);
            let start = base + chrono::Duration::days(start_off);
            let end = start + chrono::Duration::days(len);
            let present: BTreeSet<NaiveDate> = present_offs
                .iter()
                .map(|o| base + chrono::Duration::days(*o))
                .collect();

            let missing = missing_dates(start, end, &present);

            prop_assert!(missing.iter().all(|m| *m >= start && *m <= end));
            prop_assert!(missing.is_disjoint(&present));
            let in_range_present = present.iter().filter(|p| **p >= start && **p <= end).count();
            prop_assert_eq!(missing.len() + in_range_present, (len + 1) as usize);
        }
    }
}
