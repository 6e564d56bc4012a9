//! Next qualifying start of a day → slots mapping.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use kairos_core::schedule::{DayKey, RecurrenceDays, TimeSlot};
use kairos_core::timezone::local_to_utc;

/// A matched start: the day key and slot it came from and its absolute timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotMatch {
    pub key: DayKey,
    /// `None` when the key selects the whole day.
    pub slot: Option<TimeSlot>,
    pub start: DateTime<Utc>,
    /// Local calendar date of `start`.
    pub local_date: NaiveDate,
}

impl SlotMatch {
    /// ## Summary
    /// End of the matched slot on the matched date.
    ///
    /// A whole-day match ends at the following local midnight. If the end falls into a DST gap
    /// the duration of the slot is added to the start instead.
    #[must_use]
    pub fn end(&self, tz: Tz) -> DateTime<Utc> {
        match self.slot {
            Some(slot) => local_to_utc(tz, self.local_date.and_time(slot.end))
                .unwrap_or(self.start + slot.duration()),
            None => self
                .local_date
                .checked_add_days(Days::new(1))
                .and_then(|next| local_to_utc(tz, next.and_time(NaiveTime::MIN)))
                .unwrap_or(self.start + chrono::TimeDelta::days(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextSlot {
    Found(SlotMatch),
    /// No qualifying day within the horizon. Callers treat this as "nothing to do".
    NotFound,
}

impl NextSlot {
    #[must_use]
    pub const fn found(self) -> Option<SlotMatch> {
        match self {
            Self::Found(slot) => Some(slot),
            Self::NotFound => None,
        }
    }
}

/// ## Summary
/// Finds the earliest start strictly after `reference` selected by `days`, scanning
/// `horizon_days` local calendar days starting with the reference's own local date.
///
/// Slot times are wall-clock times in `tz`. A key with an empty slot list qualifies at local
/// midnight. Slot times that do not exist on a date (DST gap) are skipped; ambiguous ones
/// resolve to the earlier instant.
#[must_use]
pub fn next_slot(
    days: &RecurrenceDays,
    tz: Tz,
    reference: DateTime<Utc>,
    horizon_days: u32,
) -> NextSlot {
    let Some(kind) = days.kind() else {
        tracing::trace!("Empty recurrence days, nothing to scan");
        return NextSlot::NotFound;
    };
    let first_date = reference.with_timezone(&tz).date_naive();

    for offset in 0..horizon_days {
        let Some(date) = first_date.checked_add_days(Days::new(u64::from(offset))) else {
            break;
        };
        let key = DayKey::for_date(date, kind);
        let Some(slots) = days.get(key) else {
            continue;
        };

        if slots.is_empty() {
            if let Some(start) = local_to_utc(tz, date.and_time(NaiveTime::MIN))
                && start > reference
            {
                return NextSlot::Found(SlotMatch {
                    key,
                    slot: None,
                    start,
                    local_date: date,
                });
            }
            continue;
        }

        for slot in slots {
            match local_to_utc(tz, date.and_time(slot.start)) {
                Some(start) if start > reference => {
                    tracing::trace!(%date, %slot, "Slot qualifies");
                    return NextSlot::Found(SlotMatch {
                        key,
                        slot: Some(*slot),
                        start,
                        local_date: date,
                    });
                }
                Some(_) => {}
                None => tracing::trace!(%date, %slot, "Slot start does not exist locally"),
            }
        }
    }

    NextSlot::NotFound
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, TimeZone, Timelike, Weekday};
    use proptest::prelude::*;

    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .expect("valid time")
    }

    fn slot(start: &str, end: &str) -> TimeSlot {
        TimeSlot::parse(start, end).expect("valid slot")
    }

    fn berlin() -> Tz {
        chrono_tz::Europe::Berlin
    }

    #[test]
    fn test_next_monday_evening() {
        let days = RecurrenceDays::single(DayKey::Weekday(Weekday::Mon), slot("18:00", "19:00"));
        // Monday 2026-10-12 18:00 Berlin is 16:00 UTC.
        let found = next_slot(&days, berlin(), utc(2026, 10, 12, 16, 0), 365)
            .found()
            .expect("found");
        assert_eq!(found.start, utc(2026, 10, 19, 16, 0));
        assert_eq!(found.end(berlin()), utc(2026, 10, 19, 17, 0));
        assert_eq!(found.key, DayKey::Weekday(Weekday::Mon));
    }

    #[test]
    fn test_later_slot_on_the_same_day() {
        let days: RecurrenceDays = [(
            DayKey::Weekday(Weekday::Mon),
            vec![slot("18:00", "19:00"), slot("20:00", "21:00")],
        )]
        .into_iter()
        .collect();
        let found = next_slot(&days, berlin(), utc(2026, 10, 12, 16, 0), 365)
            .found()
            .expect("found");
        assert_eq!(found.start, utc(2026, 10, 12, 18, 0));
    }

    #[test]
    fn test_whole_day_starts_at_local_midnight() {
        let days = RecurrenceDays::whole_day(DayKey::Weekday(Weekday::Wed));
        let found = next_slot(&days, berlin(), utc(2026, 10, 12, 16, 0), 8)
            .found()
            .expect("found");
        // Wednesday 2026-10-14 00:00 CEST.
        assert_eq!(found.start, utc(2026, 10, 13, 22, 0));
        assert_eq!(found.end(berlin()), utc(2026, 10, 14, 22, 0));
        assert!(found.slot.is_none());
    }

    #[test]
    fn test_horizon_exhausted() {
        let days = RecurrenceDays::single(DayKey::MonthDay(31), slot("10:00", "11:00"));
        // 2026-11-01: November has no 31st and the scan stops before December.
        assert_eq!(
            next_slot(&days, chrono_tz::UTC, utc(2026, 11, 1, 0, 0), 8),
            NextSlot::NotFound
        );
        let found = next_slot(&days, chrono_tz::UTC, utc(2026, 11, 1, 0, 0), 365)
            .found()
            .expect("found");
        assert_eq!(found.start, utc(2026, 12, 31, 10, 0));
    }

    #[test]
    fn test_empty_mapping_and_zero_horizon() {
        assert_eq!(
            next_slot(&RecurrenceDays::new(), berlin(), utc(2026, 10, 12, 0, 0), 365),
            NextSlot::NotFound
        );
        let days = RecurrenceDays::whole_day(DayKey::Weekday(Weekday::Tue));
        assert_eq!(
            next_slot(&days, berlin(), utc(2026, 10, 12, 0, 0), 0),
            NextSlot::NotFound
        );
    }

    #[test]
    fn test_skips_slot_in_dst_gap() {
        // 2026-03-29 is a Sunday; 02:30 does not exist in Berlin that night.
        let days = RecurrenceDays::single(DayKey::Weekday(Weekday::Sun), slot("02:30", "03:30"));
        let found = next_slot(&days, berlin(), utc(2026, 3, 28, 12, 0), 365)
            .found()
            .expect("found");
        assert_eq!(found.local_date, NaiveDate::from_ymd_opt(2026, 4, 5).expect("valid date"));
    }

    #[test]
    fn test_local_time_is_kept_across_dst_change() {
        let days = RecurrenceDays::single(DayKey::Weekday(Weekday::Mon), slot("18:00", "19:00"));
        // Monday 2026-10-19 18:00 CEST; the following Monday is in CET.
        let found = next_slot(&days, berlin(), utc(2026, 10, 19, 16, 0), 365)
            .found()
            .expect("found");
        assert_eq!(found.start, utc(2026, 10, 26, 17, 0));
    }

    fn weekday_strategy() -> impl Strategy<Value = Weekday> {
        (0u8..7).prop_map(|n| match n {
            0 => Weekday::Mon,
            1 => Weekday::Tue,
            2 => Weekday::Wed,
            3 => Weekday::Thu,
            4 => Weekday::Fri,
            5 => Weekday::Sat,
            _ => Weekday::Sun,
        })
    }

    fn slots_strategy() -> impl Strategy<Value = Vec<TimeSlot>> {
        prop::collection::vec((0u32..23, 0u32..60), 0..3).prop_map(|starts| {
            starts
                .into_iter()
                .filter_map(|(hour, minute)| {
                    let start = NaiveTime::from_hms_opt(hour, minute, 0)?;
                    let end = NaiveTime::from_hms_opt(hour + 1, minute, 0)?;
                    TimeSlot::new(start, end).ok()
                })
                .collect()
        })
    }

    fn days_strategy() -> impl Strategy<Value = RecurrenceDays> {
        prop::collection::vec((weekday_strategy(), slots_strategy()), 0..5).prop_map(|entries| {
            entries
                .into_iter()
                .map(|(day, slots)| (DayKey::Weekday(day), slots))
                .collect()
        })
    }

    fn tz_strategy() -> impl Strategy<Value = Tz> {
        prop::sample::select(vec![
            chrono_tz::UTC,
            chrono_tz::Europe::Berlin,
            chrono_tz::America::New_York,
            chrono_tz::Asia::Kolkata,
            chrono_tz::Australia::Sydney,
        ])
    }

    proptest! {
        #[test]
        fn prop_found_start_is_later_and_selected(
            days in days_strategy(),
            tz in tz_strategy(),
            seconds in 1_767_225_600i64..1_830_297_600i64,
            horizon in 0u32..400,
        ) {
            let reference = DateTime::from_timestamp(seconds, 0).expect("in range");

            if let NextSlot::Found(found) = next_slot(&days, tz, reference, horizon) {
                prop_assert!(found.start > reference);

                let local = found.start.with_timezone(&tz);
                prop_assert!(days.contains_key(found.key));
                prop_assert_eq!(found.key, DayKey::Weekday(found.local_date.weekday()));

                let slots = days.get(found.key).unwrap_or_default();
                if slots.is_empty() {
                    prop_assert_eq!(local.date_naive(), found.local_date);
                    prop_assert_eq!(local.time().num_seconds_from_midnight(), 0);
                } else {
                    prop_assert!(slots.iter().any(|slot| slot.start == local.time()));
                    prop_assert_eq!(local.date_naive(), found.local_date);
                }
            }
        }

        #[test]
        fn prop_weekly_mapping_found_within_eight_days(
            day in weekday_strategy(),
            seconds in 1_767_225_600i64..1_830_297_600i64,
        ) {
            let reference = DateTime::from_timestamp(seconds, 0).expect("in range");
            let days = RecurrenceDays::single(
                DayKey::Weekday(day),
                TimeSlot::parse("12:00", "13:00").expect("valid slot"),
            );
            prop_assert!(next_slot(&days, chrono_tz::UTC, reference, 8).found().is_some());
        }
    }
}
