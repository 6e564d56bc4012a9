//! Occurrence capacity limits.

use crate::error::{CoreError, CoreResult};

/// Minimum and maximum attendance of an occurrence. `max = None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Capacity {
    pub min: i32,
    pub max: Option<i32>,
}

impl Capacity {
    pub const UNLIMITED: Self = Self { min: 0, max: None };

    /// ## Summary
    /// Builds validated capacity limits.
    ///
    /// ## Errors
    /// Returns a validation error if either bound is negative or `min >= max`.
    pub fn new(min: i32, max: Option<i32>) -> CoreResult<Self> {
        if min < 0 {
            return Err(CoreError::ValidationError(format!(
                "capacity minimum must not be negative, got {min}"
            )));
        }
        if let Some(max) = max {
            if max <= 0 {
                return Err(CoreError::ValidationError(format!(
                    "capacity maximum must be positive, got {max}"
                )));
            }
            if min >= max {
                return Err(CoreError::ValidationError(format!(
                    "capacity minimum {min} must be below maximum {max}"
                )));
            }
        }
        Ok(Self { min, max })
    }

    /// ## Summary
    /// Parses capacity limits from form or import text. An empty maximum means unlimited,
    /// an empty minimum means zero.
    ///
    /// ## Errors
    /// Returns invalid input if a bound is non-numeric, a validation error if the limits are
    /// inconsistent.
    pub fn parse(min: &str, max: &str) -> CoreResult<Self> {
        let parse_bound = |label: &str, text: &str| -> CoreResult<Option<i32>> {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<i32>().map(Some).map_err(|_err| {
                CoreError::InvalidInput(format!("capacity {label} '{text}' is not a number"))
            })
        };

        let min = parse_bound("minimum", min)?.unwrap_or(0);
        let max = parse_bound("maximum", max)?;
        Self::new(min, max)
    }

    /// Whether one more attendee fits when `going` attendees are already confirmed.
    #[must_use]
    pub fn has_room(&self, going: i64) -> bool {
        self.max.is_none_or(|max| going < i64::from(max))
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Self::UNLIMITED
    }
}
