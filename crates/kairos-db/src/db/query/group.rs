//! Query builder functions for recurrence groups.

use diesel::prelude::*;

use crate::db::schema::recurrence_group;

/// ## Summary
/// Returns a query to select all recurrence groups.
#[must_use]
pub fn all() -> recurrence_group::BoxedQuery<'static, diesel::pg::Pg> {
    recurrence_group::table.into_boxed()
}

/// ## Summary
/// Returns a query to find a group by ID.
#[must_use]
pub fn by_id(id: uuid::Uuid) -> recurrence_group::BoxedQuery<'static, diesel::pg::Pg> {
    all().filter(recurrence_group::id.eq(id))
}

/// ## Summary
/// Returns a query to find groups that have not been closed, oldest first.
#[must_use]
pub fn open() -> recurrence_group::BoxedQuery<'static, diesel::pg::Pg> {
    all()
        .filter(recurrence_group::closed_at.is_null())
        .order((recurrence_group::created_at.asc(), recurrence_group::id.asc()))
}

/// ## Summary
/// Returns a query to find the group owned by an availability template.
#[must_use]
pub fn by_template(template_id: uuid::Uuid) -> recurrence_group::BoxedQuery<'static, diesel::pg::Pg> {
    all().filter(recurrence_group::template_id.eq(template_id))
}
