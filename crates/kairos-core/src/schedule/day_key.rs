//! Keys of a recurrence mapping: weekday labels for weekly series, day-of-month numbers for
//! monthly ones.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::error::CoreError;

/// The fixed weekday alphabet, Monday first.
pub const WEEKDAY_LABELS: [(&str, Weekday); 7] = [
    ("mon", Weekday::Mon),
    ("tue", Weekday::Tue),
    ("wed", Weekday::Wed),
    ("thu", Weekday::Thu),
    ("fri", Weekday::Fri),
    ("sat", Weekday::Sat),
    ("sun", Weekday::Sun),
];

/// Which family of keys a mapping uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayKeyKind {
    Weekday,
    MonthDay,
}

impl fmt::Display for DayKeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weekday => f.write_str("weekday"),
            Self::MonthDay => f.write_str("day-of-month"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DayKey {
    Weekday(Weekday),
    /// 1..=31
    MonthDay(u8),
}

impl DayKey {
    /// ## Summary
    /// Builds a day-of-month key.
    ///
    /// ## Errors
    /// Returns a validation error if `day` is outside `1..=31`.
    pub fn month_day(day: u8) -> Result<Self, CoreError> {
        if (1..=31).contains(&day) {
            Ok(Self::MonthDay(day))
        } else {
            Err(CoreError::ValidationError(format!(
                "day of month must be within 1..=31, got {day}"
            )))
        }
    }

    #[must_use]
    pub const fn kind(self) -> DayKeyKind {
        match self {
            Self::Weekday(_) => DayKeyKind::Weekday,
            Self::MonthDay(_) => DayKeyKind::MonthDay,
        }
    }

    /// ## Summary
    /// Returns the key of the given kind that a calendar date falls on.
    #[must_use]
    pub fn for_date(date: NaiveDate, kind: DayKeyKind) -> Self {
        match kind {
            DayKeyKind::Weekday => Self::Weekday(date.weekday()),
            DayKeyKind::MonthDay => Self::MonthDay(u8::try_from(date.day()).unwrap_or(u8::MAX)),
        }
    }

    #[must_use]
    pub fn matches(self, date: NaiveDate) -> bool {
        Self::for_date(date, self.kind()) == self
    }

    fn sort_index(self) -> u32 {
        match self {
            Self::Weekday(day) => day.num_days_from_monday(),
            Self::MonthDay(day) => 100 + u32::from(day),
        }
    }
}

impl Ord for DayKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_index().cmp(&other.sort_index())
    }
}

impl PartialOrd for DayKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for DayKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase();

        if let Some((_, day)) = WEEKDAY_LABELS
            .iter()
            .find(|(short, day)| label == *short || label == full_weekday_name(*day))
        {
            return Ok(Self::Weekday(*day));
        }

        label
            .parse::<u8>()
            .map_err(|_err| CoreError::ValidationError(format!("unknown day key '{s}'")))
            .and_then(Self::month_day)
    }
}

impl TryFrom<String> for DayKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DayKey> for String {
    fn from(value: DayKey) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weekday(day) => {
                let label = WEEKDAY_LABELS
                    .iter()
                    .find(|(_, candidate)| candidate == day)
                    .map_or("mon", |(short, _)| short);
                f.write_str(label)
            }
            Self::MonthDay(day) => write!(f, "{day}"),
        }
    }
}

const fn full_weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}
