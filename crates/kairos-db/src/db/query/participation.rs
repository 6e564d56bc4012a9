//! Query builder functions for participations, co-registrations and their audit trail.

use diesel::prelude::*;

use crate::db::enums::Going;
use crate::db::schema::{co_registration, participation, participation_audit};

/// ## Summary
/// Returns a query to select all participations.
#[must_use]
pub fn all() -> participation::BoxedQuery<'static, diesel::pg::Pg> {
    participation::table.into_boxed()
}

/// ## Summary
/// Returns a query for the participations on an occurrence, oldest first.
#[must_use]
pub fn by_occurrence(occurrence_id: uuid::Uuid) -> participation::BoxedQuery<'static, diesel::pg::Pg> {
    all()
        .filter(participation::occurrence_id.eq(occurrence_id))
        .order(participation::created_at.asc())
}

/// ## Summary
/// Returns a query for one user's participation on an occurrence.
#[must_use]
pub fn by_occurrence_and_user(
    occurrence_id: uuid::Uuid,
    user_id: uuid::Uuid,
) -> participation::BoxedQuery<'static, diesel::pg::Pg> {
    all()
        .filter(participation::occurrence_id.eq(occurrence_id))
        .filter(participation::user_id.eq(user_id))
}

/// ## Summary
/// Returns a query for the participations at `yes` on an occurrence.
#[must_use]
pub fn going_yes(occurrence_id: uuid::Uuid) -> participation::BoxedQuery<'static, diesel::pg::Pg> {
    all()
        .filter(participation::occurrence_id.eq(occurrence_id))
        .filter(participation::going.eq(Going::Yes))
}

/// ## Summary
/// Returns a query for the co-registrations a user holds on an occurrence.
#[must_use]
pub fn co_registrations(
    occurrence_id: uuid::Uuid,
    user_id: uuid::Uuid,
) -> co_registration::BoxedQuery<'static, diesel::pg::Pg> {
    co_registration::table
        .filter(co_registration::occurrence_id.eq(occurrence_id))
        .filter(co_registration::user_id.eq(user_id))
        .order(co_registration::entity_id.asc())
        .into_boxed()
}

/// ## Summary
/// Returns a query for the audit trail of an occurrence in recording order.
#[must_use]
pub fn audit_for_occurrence(
    occurrence_id: uuid::Uuid,
) -> participation_audit::BoxedQuery<'static, diesel::pg::Pg> {
    participation_audit::table
        .filter(participation_audit::occurrence_id.eq(occurrence_id))
        .order((participation_audit::recorded_at.asc(), participation_audit::id.asc()))
        .into_boxed()
}
