use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use diesel::{pg::Pg, prelude::*};
use kairos_core::error::CoreResult;
use kairos_core::schedule::RecurrenceDays;
use kairos_core::timezone::parse_timezone;

use crate::db::{enums::Period, schema};

/// One recurring series.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = schema::recurrence_group)]
#[diesel(check_for_backend(Pg))]
pub struct RecurrenceGroup {
    pub id: uuid::Uuid,
    pub publisher_id: uuid::Uuid,
    pub community_id: uuid::Uuid,
    pub period: Period,
    pub days: serde_json::Value,
    pub timezone: String,
    pub active_from: Option<NaiveDate>,
    pub active_until: Option<NaiveDate>,
    /// Set when the group tracks subscriptions to an availability template.
    pub template_id: Option<uuid::Uuid>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurrenceGroup {
    /// ## Summary
    /// Decodes the stored day mapping.
    ///
    /// ## Errors
    /// Returns a validation error if the stored JSON is malformed.
    pub fn recurrence_days(&self) -> CoreResult<RecurrenceDays> {
        RecurrenceDays::from_json(&self.days)
    }

    /// ## Errors
    /// Returns a validation error if the stored timezone name is unknown.
    pub fn tz(&self) -> CoreResult<Tz> {
        parse_timezone(&self.timezone)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    /// Whether `date` falls after the end of the validity window.
    #[must_use]
    pub fn ends_before(&self, date: NaiveDate) -> bool {
        self.active_until.is_some_and(|until| date > until)
    }
}

/// Insert struct for creating recurrence groups.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::recurrence_group)]
pub struct NewRecurrenceGroup {
    pub id: uuid::Uuid,
    pub publisher_id: uuid::Uuid,
    pub community_id: uuid::Uuid,
    pub period: Period,
    pub days: serde_json::Value,
    pub timezone: String,
    pub active_from: Option<NaiveDate>,
    pub active_until: Option<NaiveDate>,
    pub template_id: Option<uuid::Uuid>,
}
