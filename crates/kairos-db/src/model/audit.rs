use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};

use crate::db::enums::{Going, PaymentStatus};
use crate::db::schema;

/// Record of a participation transition that changed its payment status.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = schema::participation_audit)]
#[diesel(check_for_backend(Pg))]
pub struct ParticipationAudit {
    pub id: uuid::Uuid,
    pub occurrence_id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub actor_id: uuid::Uuid,
    pub from_going: Going,
    pub to_going: Going,
    pub from_payment: PaymentStatus,
    pub to_payment: PaymentStatus,
    /// Charged (positive) or refunded (negative) amount in minor units.
    pub amount: i64,
    pub currency: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = schema::participation_audit)]
pub struct NewParticipationAudit {
    pub id: uuid::Uuid,
    pub occurrence_id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub actor_id: uuid::Uuid,
    pub from_going: Going,
    pub to_going: Going,
    pub from_payment: PaymentStatus,
    pub to_payment: PaymentStatus,
    pub amount: i64,
    pub currency: String,
}
