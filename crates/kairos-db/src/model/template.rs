use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use diesel::{pg::Pg, prelude::*};
use kairos_core::capacity::Capacity;
use kairos_core::error::CoreResult;
use kairos_core::schedule::RecurrenceDays;
use kairos_core::timezone::parse_timezone;

use crate::db::{enums::PaymentType, schema};
use crate::error::DbResult;
use crate::model::terms::{Location, PaymentTerms};

/// A reservable offering whose weekly slot catalog is expanded into occurrences on demand.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = schema::availability_template)]
#[diesel(check_for_backend(Pg))]
pub struct AvailabilityTemplate {
    pub id: uuid::Uuid,
    pub publisher_id: uuid::Uuid,
    pub community_id: uuid::Uuid,
    pub title: String,
    pub slots: serde_json::Value,
    pub timezone: String,
    pub capacity_min: i32,
    pub capacity_max: Option<i32>,
    pub payment_type: PaymentType,
    pub payment_amount: i64,
    pub payment_currency: String,
    pub location: Option<serde_json::Value>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilityTemplate {
    /// ## Errors
    /// Returns a validation error if the stored catalog is malformed.
    pub fn catalog(&self) -> CoreResult<RecurrenceDays> {
        RecurrenceDays::from_json(&self.slots)
    }

    /// ## Errors
    /// Returns a validation error if the stored timezone name is unknown.
    pub fn tz(&self) -> CoreResult<Tz> {
        parse_timezone(&self.timezone)
    }

    #[must_use]
    pub fn capacity(&self) -> Capacity {
        Capacity {
            min: self.capacity_min,
            max: self.capacity_max,
        }
    }

    #[must_use]
    pub fn payment_terms(&self) -> PaymentTerms {
        PaymentTerms {
            kind: self.payment_type,
            amount: self.payment_amount,
            currency: self.payment_currency.clone(),
        }
    }

    /// ## Errors
    /// Returns a decode error if the stored location is malformed.
    pub fn location(&self) -> DbResult<Option<Location>> {
        Location::from_column(self.location.as_ref())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

/// Insert struct for creating availability templates.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::availability_template)]
pub struct NewAvailabilityTemplate {
    pub id: uuid::Uuid,
    pub publisher_id: uuid::Uuid,
    pub community_id: uuid::Uuid,
    pub title: String,
    pub slots: serde_json::Value,
    pub timezone: String,
    pub capacity_min: i32,
    pub capacity_max: Option<i32>,
    pub payment_type: PaymentType,
    pub payment_amount: i64,
    pub payment_currency: String,
    pub location: Option<serde_json::Value>,
}
