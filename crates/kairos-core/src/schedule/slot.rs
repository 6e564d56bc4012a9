//! Time-of-day slots such as `["18:00", "19:00"]`.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};

use crate::error::{CoreError, CoreResult};

/// ## Summary
/// Parses a wall-clock time written as `H:MM`, `HH:MM` or `HH:MM:SS`.
///
/// Leading zeros are optional, so `"9:00"` and `"09:00"` denote the same time.
///
/// ## Errors
/// Returns a validation error if the text is not a valid time of day.
pub fn parse_time_of_day(text: &str) -> CoreResult<NaiveTime> {
    let invalid = || CoreError::ValidationError(format!("invalid time of day '{text}'"));

    let mut parts = text.trim().split(':');
    let mut next_component = |required: bool| -> CoreResult<u32> {
        match parts.next() {
            Some(part) if !part.is_empty() && part.len() <= 2 => {
                part.parse::<u32>().map_err(|_err| invalid())
            }
            None if !required => Ok(0),
            _ => Err(invalid()),
        }
    };

    let hour = next_component(true)?;
    let minute = next_component(true)?;
    let second = next_component(false)?;
    if parts.next().is_some() {
        return Err(invalid());
    }

    NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(invalid)
}

/// Formats a time of day the way slots are stored: `HH:MM`, or `HH:MM:SS` when seconds are set.
#[must_use]
pub fn format_time_of_day(time: NaiveTime) -> String {
    if time.second() == 0 {
        time.format("%H:%M").to_string()
    } else {
        time.format("%H:%M:%S").to_string()
    }
}

/// A `(start, end)` pair of local wall-clock times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "(String, String)", into = "(String, String)")]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSlot {
    /// ## Summary
    /// Builds a slot, requiring the start to be strictly before the end.
    ///
    /// ## Errors
    /// Returns a validation error if `start >= end`.
    pub fn new(start: NaiveTime, end: NaiveTime) -> CoreResult<Self> {
        if start >= end {
            return Err(CoreError::ValidationError(format!(
                "slot start {} must be before end {}",
                format_time_of_day(start),
                format_time_of_day(end)
            )));
        }
        Ok(Self { start, end })
    }

    /// ## Summary
    /// Parses a slot from its textual start and end.
    ///
    /// ## Errors
    /// Returns a validation error if either time is malformed or the slot is empty.
    pub fn parse(start: &str, end: &str) -> CoreResult<Self> {
        Self::new(parse_time_of_day(start)?, parse_time_of_day(end)?)
    }

    #[must_use]
    pub fn duration(&self) -> chrono::TimeDelta {
        self.end - self.start
    }
}

impl TryFrom<(String, String)> for TimeSlot {
    type Error = CoreError;

    fn try_from((start, end): (String, String)) -> Result<Self, Self::Error> {
        Self::parse(&start, &end)
    }
}

impl From<TimeSlot> for (String, String) {
    fn from(slot: TimeSlot) -> Self {
        (format_time_of_day(slot.start), format_time_of_day(slot.end))
    }
}

impl FromStr for TimeSlot {
    type Err = CoreError;

    /// Parses `"18:00-19:00"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| CoreError::ValidationError(format!("invalid slot '{s}'")))?;
        Self::parse(start, end)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            format_time_of_day(self.start),
            format_time_of_day(self.end)
        )
    }
}
