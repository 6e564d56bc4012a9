use chrono::{DateTime, NaiveDate, Utc};
use diesel::{pg::Pg, prelude::*};
use kairos_core::error::CoreResult;
use kairos_core::schedule::RecurrenceDays;

use crate::db::schema;
use crate::error::DbResult;

/// Another entity a user wants joined alongside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CoRegistrant {
    pub entity_id: uuid::Uuid,
    /// Whether this co-registrant is charged the occurrence price on paid occurrences.
    #[serde(default)]
    pub fee_required: bool,
}

/// A user's standing intent on a recurrence group.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = schema::subscription)]
#[diesel(check_for_backend(Pg))]
#[diesel(primary_key(user_id, group_id))]
pub struct Subscription {
    pub user_id: uuid::Uuid,
    pub group_id: uuid::Uuid,
    pub days: serde_json::Value,
    pub active_from: Option<NaiveDate>,
    pub active_until: Option<NaiveDate>,
    pub co_registrants: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// ## Errors
    /// Returns a validation error if the stored day mapping is malformed.
    pub fn recurrence_days(&self) -> CoreResult<RecurrenceDays> {
        RecurrenceDays::from_json(&self.days)
    }

    /// ## Errors
    /// Returns a decode error if the stored co-registrant list is malformed.
    pub fn co_registrants(&self) -> DbResult<Vec<CoRegistrant>> {
        super::decode_json("co_registrants", &self.co_registrants)
    }

    /// Whether the validity window includes `date`. Open bounds are unbounded.
    #[must_use]
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.active_from.is_none_or(|from| from <= date)
            && self.active_until.is_none_or(|until| date <= until)
    }
}

/// Insert struct for creating or replacing a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = schema::subscription)]
pub struct NewSubscription {
    pub user_id: uuid::Uuid,
    pub group_id: uuid::Uuid,
    pub days: serde_json::Value,
    pub active_from: Option<NaiveDate>,
    pub active_until: Option<NaiveDate>,
    pub co_registrants: serde_json::Value,
}

impl NewSubscription {
    /// ## Summary
    /// Builds a subscription row from typed parts.
    ///
    /// ## Errors
    /// Returns a decode error if the co-registrant list cannot be encoded.
    pub fn new(
        user_id: uuid::Uuid,
        group_id: uuid::Uuid,
        days: &RecurrenceDays,
        window: (Option<NaiveDate>, Option<NaiveDate>),
        co_registrants: &[CoRegistrant],
    ) -> DbResult<Self> {
        Ok(Self {
            user_id,
            group_id,
            days: days.to_json(),
            active_from: window.0,
            active_until: window.1,
            co_registrants: super::encode_json("co_registrants", &co_registrants)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;
    use kairos_core::schedule::DayKey;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn subscription(new: NewSubscription) -> Subscription {
        let now = Utc::now();
        Subscription {
            user_id: new.user_id,
            group_id: new.group_id,
            days: new.days,
            active_from: new.active_from,
            active_until: new.active_until,
            co_registrants: new.co_registrants,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_typed_parts_survive_storage_shape() {
        let friend = CoRegistrant {
            entity_id: uuid::Uuid::now_v7(),
            fee_required: true,
        };
        let days = RecurrenceDays::whole_day(DayKey::Weekday(Weekday::Wed));
        let new = NewSubscription::new(
            uuid::Uuid::now_v7(),
            uuid::Uuid::now_v7(),
            &days,
            (None, None),
            &[friend],
        )
        .expect("encodes");
        let stored = subscription(new);

        assert_eq!(stored.recurrence_days().expect("decodes"), days);
        assert_eq!(stored.co_registrants().expect("decodes"), vec![friend]);
    }

    #[test]
    fn test_fee_required_defaults_to_false() {
        let entity_id = uuid::Uuid::now_v7();
        let parsed: CoRegistrant =
            serde_json::from_value(serde_json::json!({ "entity_id": entity_id }))
                .expect("deserializable");
        assert!(!parsed.fee_required);
    }

    #[test]
    fn test_validity_window() {
        let new = NewSubscription::new(
            uuid::Uuid::now_v7(),
            uuid::Uuid::now_v7(),
            &RecurrenceDays::whole_day(DayKey::Weekday(Weekday::Mon)),
            (Some(date(2026, 1, 1)), Some(date(2026, 1, 31))),
            &[],
        )
        .expect("encodes");
        let stored = subscription(new);

        assert!(stored.covers(date(2026, 1, 1)));
        assert!(stored.covers(date(2026, 1, 31)));
        assert!(!stored.covers(date(2025, 12, 31)));
        assert!(!stored.covers(date(2026, 2, 1)));
    }
}
