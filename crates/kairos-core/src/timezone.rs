//! Timezone resolution for occurrence-local wall-clock arithmetic.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{CoreError, CoreResult};

/// ## Summary
/// Resolves an IANA timezone name such as `Europe/Berlin`.
///
/// ## Errors
/// Returns a validation error if the name is unknown.
pub fn parse_timezone(name: &str) -> CoreResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_err| CoreError::ValidationError(format!("unknown timezone '{name}'")))
}

/// ## Summary
/// Converts a local wall-clock time to UTC.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant. Times that do not exist
/// (DST spring-forward gap) yield `None`.
#[must_use]
pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
