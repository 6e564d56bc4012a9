//! Query builder functions for subscriptions.

use diesel::prelude::*;

use crate::db::schema::subscription;

/// ## Summary
/// Returns a query to select all subscriptions.
#[must_use]
pub fn all() -> subscription::BoxedQuery<'static, diesel::pg::Pg> {
    subscription::table.into_boxed()
}

/// ## Summary
/// Returns a query for the subscriptions of a group, in user order.
#[must_use]
pub fn by_group(group_id: uuid::Uuid) -> subscription::BoxedQuery<'static, diesel::pg::Pg> {
    all()
        .filter(subscription::group_id.eq(group_id))
        .order(subscription::user_id.asc())
}

/// ## Summary
/// Returns a query for one user's subscription to a group.
#[must_use]
pub fn by_user_and_group(
    user_id: uuid::Uuid,
    group_id: uuid::Uuid,
) -> subscription::BoxedQuery<'static, diesel::pg::Pg> {
    all()
        .filter(subscription::user_id.eq(user_id))
        .filter(subscription::group_id.eq(group_id))
}
