//! Query builder functions for availability templates.

use diesel::prelude::*;

use crate::db::schema::availability_template;

/// ## Summary
/// Returns a query to select all templates.
#[must_use]
pub fn all() -> availability_template::BoxedQuery<'static, diesel::pg::Pg> {
    availability_template::table.into_boxed()
}

/// ## Summary
/// Returns a query to find a template by ID.
#[must_use]
pub fn by_id(id: uuid::Uuid) -> availability_template::BoxedQuery<'static, diesel::pg::Pg> {
    all().filter(availability_template::id.eq(id))
}
