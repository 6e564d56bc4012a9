use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use diesel::{pg::Pg, prelude::*};
use kairos_core::capacity::Capacity;
use kairos_core::constants::OCCURRENCE_REFERENCE_PREFIX;
use kairos_core::error::CoreResult;
use kairos_core::timezone::parse_timezone;

use crate::db::{enums::PaymentType, schema};
use crate::error::DbResult;
use crate::model::terms::{Location, PaymentTerms};

/// One concrete, time-bound instance of a calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = schema::occurrence)]
#[diesel(check_for_backend(Pg))]
pub struct Occurrence {
    pub id: uuid::Uuid,
    pub group_id: Option<uuid::Uuid>,
    pub template_id: Option<uuid::Uuid>,
    pub publisher_id: uuid::Uuid,
    pub community_id: uuid::Uuid,
    pub title: String,
    pub labels: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timezone: String,
    pub capacity_min: i32,
    pub capacity_max: Option<i32>,
    pub payment_type: PaymentType,
    pub payment_amount: i64,
    pub payment_currency: String,
    pub location: Option<serde_json::Value>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Set on occurrences materialized for a group until its subscribers have been joined.
    pub propagation_pending: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Occurrence {
    /// ## Errors
    /// Returns a validation error if the stored timezone name is unknown.
    pub fn tz(&self) -> CoreResult<Tz> {
        parse_timezone(&self.timezone)
    }

    /// ## Summary
    /// The start time as a wall-clock time in the occurrence's own timezone.
    ///
    /// ## Errors
    /// Returns a validation error if the stored timezone name is unknown.
    pub fn local_start(&self) -> CoreResult<NaiveDateTime> {
        Ok(self.start_time.with_timezone(&self.tz()?).naive_local())
    }

    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end_time - self.start_time
    }

    /// Whether the occurrence has started at `now`.
    #[must_use]
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    #[must_use]
    pub const fn is_propagated(&self) -> bool {
        !self.propagation_pending
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

    /// The ledger reference payments for this occurrence are booked under.
    #[must_use]
    pub fn payment_reference(&self) -> String {
        format!("{OCCURRENCE_REFERENCE_PREFIX}:{}", self.id)
    }

    /// The uniqueness key this occurrence was created under, if any.
    #[must_use]
    pub fn key(&self) -> Option<OccurrenceKey> {
        OccurrenceKey::for_parts(self.group_id, self.template_id, self.start_time)
    }
}

/// Insert struct for creating occurrences.
#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = schema::occurrence)]
pub struct NewOccurrence {
    pub id: uuid::Uuid,
    pub group_id: Option<uuid::Uuid>,
    pub template_id: Option<uuid::Uuid>,
    pub publisher_id: uuid::Uuid,
    pub community_id: uuid::Uuid,
    pub title: String,
    pub labels: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timezone: String,
    pub capacity_min: i32,
    pub capacity_max: Option<i32>,
    pub payment_type: PaymentType,
    pub payment_amount: i64,
    pub payment_currency: String,
    pub location: Option<serde_json::Value>,
    pub propagation_pending: bool,
}

impl NewOccurrence {
    #[must_use]
    pub fn key(&self) -> Option<OccurrenceKey> {
        OccurrenceKey::for_parts(self.group_id, self.template_id, self.start_time)
    }
}

/// The natural key an occurrence is deduplicated on.
///
/// Availability-backed occurrences are keyed by template and slot start; occurrences of a pure
/// recurrence by group and start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OccurrenceKey {
    Group {
        group_id: uuid::Uuid,
        start_time: DateTime<Utc>,
    },
    Template {
        template_id: uuid::Uuid,
        start_time: DateTime<Utc>,
    },
}

impl OccurrenceKey {
    fn for_parts(
        group_id: Option<uuid::Uuid>,
        template_id: Option<uuid::Uuid>,
        start_time: DateTime<Utc>,
    ) -> Option<Self> {
        match (template_id, group_id) {
            (Some(template_id), _) => Some(Self::Template {
                template_id,
                start_time,
            }),
            (None, Some(group_id)) => Some(Self::Group {
                group_id,
                start_time,
            }),
            (None, None) => None,
        }
    }
}

/// Attribute changes allowed on an occurrence before it starts.
///
/// `None` leaves a column untouched; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq, Eq, AsChangeset)]
#[diesel(table_name = schema::occurrence)]
pub struct OccurrenceChanges {
    pub title: Option<String>,
    pub labels: Option<Vec<String>>,
    pub capacity_min: Option<i32>,
    pub capacity_max: Option<Option<i32>>,
    pub payment_type: Option<PaymentType>,
    pub payment_amount: Option<i64>,
    pub payment_currency: Option<String>,
    pub location: Option<Option<serde_json::Value>>,
}

impl OccurrenceChanges {
    /// Applies the changes to an in-memory copy.
    pub fn apply_to(&self, occurrence: &mut Occurrence) {
        if let Some(title) = &self.title {
            occurrence.title.clone_from(title);
        }
        if let Some(labels) = &self.labels {
            occurrence.labels.clone_from(labels);
        }
        if let Some(min) = self.capacity_min {
            occurrence.capacity_min = min;
        }
        if let Some(max) = self.capacity_max {
            occurrence.capacity_max = max;
        }
        if let Some(kind) = self.payment_type {
            occurrence.payment_type = kind;
        }
        if let Some(amount) = self.payment_amount {
            occurrence.payment_amount = amount;
        }
        if let Some(currency) = &self.payment_currency {
            occurrence.payment_currency.clone_from(currency);
        }
        if let Some(location) = &self.location {
            occurrence.location.clone_from(location);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample_new() -> NewOccurrence {
        NewOccurrence {
            id: uuid::Uuid::now_v7(),
            group_id: None,
            template_id: None,
            publisher_id: uuid::Uuid::now_v7(),
            community_id: uuid::Uuid::now_v7(),
            title: "Climbing".to_string(),
            labels: vec![],
            start_time: Utc.with_ymd_and_hms(2026, 3, 2, 17, 0, 0).single().expect("valid time"),
            end_time: Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).single().expect("valid time"),
            timezone: "Europe/Berlin".to_string(),
            capacity_min: 0,
            capacity_max: Some(10),
            payment_type: PaymentType::Free,
            payment_amount: 0,
            payment_currency: "EUR".to_string(),
            location: None,
            propagation_pending: false,
        }
    }

    #[test]
    fn test_key_prefers_template() {
        let mut new = sample_new();
        assert_eq!(new.key(), None);

        let group_id = uuid::Uuid::now_v7();
        new.group_id = Some(group_id);
        assert_eq!(
            new.key(),
            Some(OccurrenceKey::Group {
                group_id,
                start_time: new.start_time
            })
        );

        let template_id = uuid::Uuid::now_v7();
        new.template_id = Some(template_id);
        assert_eq!(
            new.key(),
            Some(OccurrenceKey::Template {
                template_id,
                start_time: new.start_time
            })
        );
    }

    #[test]
    fn test_changes_apply_only_set_fields() {
        let new = sample_new();
        let now = Utc::now();
        let mut occurrence = Occurrence {
            id: new.id,
            group_id: None,
            template_id: None,
            publisher_id: new.publisher_id,
            community_id: new.community_id,
            title: new.title.clone(),
            labels: vec![],
            start_time: new.start_time,
            end_time: new.end_time,
            timezone: new.timezone.clone(),
            capacity_min: 0,
            capacity_max: Some(10),
            payment_type: PaymentType::Free,
            payment_amount: 0,
            payment_currency: "EUR".to_string(),
            location: None,
            closed_at: None,
            propagation_pending: false,
            created_at: now,
            updated_at: now,
        };

        let changes = OccurrenceChanges {
            capacity_max: Some(None),
            title: Some("Bouldering".to_string()),
            ..OccurrenceChanges::default()
        };
        changes.apply_to(&mut occurrence);

        assert_eq!(occurrence.title, "Bouldering");
        assert_eq!(occurrence.capacity_max, None);
        assert_eq!(occurrence.payment_currency, "EUR");
        assert_eq!(
            occurrence.local_start().ok(),
            chrono::NaiveDate::from_ymd_opt(2026, 3, 2).and_then(|d| d.and_hms_opt(18, 0, 0))
        );
        assert!(occurrence.payment_reference().starts_with("occurrence:"));
    }
}
