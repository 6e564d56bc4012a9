//! Calendar schedule values: day keys, time slots and the mapping between them.

pub mod day_key;
pub mod days;
pub mod slot;

pub use day_key::{DayKey, DayKeyKind, WEEKDAY_LABELS};
pub use days::RecurrenceDays;
pub use slot::{TimeSlot, format_time_of_day, parse_time_of_day};
