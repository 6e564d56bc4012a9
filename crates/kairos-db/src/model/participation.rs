use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::db::enums::{Going, ParticipantRole, PaymentStatus};
use crate::db::schema;

/// One user's attendance and payment state on one occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = schema::participation)]
#[diesel(check_for_backend(Pg))]
#[diesel(primary_key(occurrence_id, user_id))]
pub struct Participation {
    pub occurrence_id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub going: Going,
    pub payment_status: PaymentStatus,
    pub roles: Vec<ParticipantRole>,
    /// Amount taken by the last successful charge, refunded in full on cancellation.
    pub charged_amount: i64,
    /// Whether the record was created or last updated by subscription propagation.
    pub via_subscription: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Position of a participation in the `no -> maybe -> yes-unpaid -> yes-paid` progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParticipationState {
    No,
    Maybe,
    YesUnpaid,
    YesPaid,
}

impl Participation {
    #[must_use]
    pub fn state(&self) -> ParticipationState {
        match (self.going, self.payment_status) {
            (Going::No, _) => ParticipationState::No,
            (Going::Maybe, _) => ParticipationState::Maybe,
            (Going::Yes, PaymentStatus::FullyPaid) => ParticipationState::YesPaid,
            (Going::Yes, _) => ParticipationState::YesUnpaid,
        }
    }

    /// Whether a charge is held that a cancellation should refund. A join whose charge is in
    /// flight still holds what was paid before it.
    #[must_use]
    pub fn holds_charge(&self) -> bool {
        matches!(
            self.payment_status,
            PaymentStatus::FullyPaid | PaymentStatus::Charging
        ) && self.charged_amount > 0
    }
}

/// Insert struct for creating or overwriting a participation.
#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = schema::participation)]
pub struct NewParticipation {
    pub occurrence_id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub going: Going,
    pub payment_status: PaymentStatus,
    pub roles: Vec<ParticipantRole>,
    pub charged_amount: i64,
    pub via_subscription: bool,
}

impl NewParticipation {
    /// A fresh attendee record in the `no` state.
    #[must_use]
    pub fn attendee(occurrence_id: uuid::Uuid, user_id: uuid::Uuid) -> Self {
        Self {
            occurrence_id,
            user_id,
            going: Going::No,
            payment_status: PaymentStatus::None,
            roles: vec![ParticipantRole::Attendee],
            charged_amount: 0,
            via_subscription: false,
        }
    }
}

impl From<&Participation> for NewParticipation {
    fn from(record: &Participation) -> Self {
        Self {
            occurrence_id: record.occurrence_id,
            user_id: record.user_id,
            going: record.going,
            payment_status: record.payment_status,
            roles: record.roles.clone(),
            charged_amount: record.charged_amount,
            via_subscription: record.via_subscription,
        }
    }
}
