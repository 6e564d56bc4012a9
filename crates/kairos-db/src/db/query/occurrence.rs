//! Query builder functions for occurrences.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::schema::occurrence;
use crate::model::occurrence::OccurrenceKey;

/// ## Summary
/// Returns a query to select all occurrences.
#[must_use]
pub fn all() -> occurrence::BoxedQuery<'static, diesel::pg::Pg> {
    occurrence::table.into_boxed()
}

/// ## Summary
/// Returns a query to find an occurrence by ID.
#[must_use]
pub fn by_id(id: uuid::Uuid) -> occurrence::BoxedQuery<'static, diesel::pg::Pg> {
    all().filter(occurrence::id.eq(id))
}

/// ## Summary
/// Returns a query to find all occurrences of a group.
#[must_use]
pub fn by_group(group_id: uuid::Uuid) -> occurrence::BoxedQuery<'static, diesel::pg::Pg> {
    all().filter(occurrence::group_id.eq(group_id))
}

/// ## Summary
/// Returns a query to find the occurrence stored under a natural key.
#[must_use]
pub fn by_key(key: OccurrenceKey) -> occurrence::BoxedQuery<'static, diesel::pg::Pg> {
    match key {
        OccurrenceKey::Group {
            group_id,
            start_time,
        } => by_group(group_id).filter(occurrence::start_time.eq(start_time)),
        OccurrenceKey::Template {
            template_id,
            start_time,
        } => all()
            .filter(occurrence::template_id.eq(template_id))
            .filter(occurrence::start_time.eq(start_time)),
    }
}

/// ## Summary
/// Returns a query for the occurrences of a group, latest start first.
#[must_use]
pub fn latest_in_group(group_id: uuid::Uuid) -> occurrence::BoxedQuery<'static, diesel::pg::Pg> {
    by_group(group_id).order(occurrence::start_time.desc())
}

/// ## Summary
/// Returns a query for open occurrences of a group starting after `after`, in start order.
#[must_use]
pub fn upcoming_in_group(
    group_id: uuid::Uuid,
    after: DateTime<Utc>,
) -> occurrence::BoxedQuery<'static, diesel::pg::Pg> {
    by_group(group_id)
        .filter(occurrence::start_time.gt(after))
        .filter(occurrence::closed_at.is_null())
        .order(occurrence::start_time.asc())
}
