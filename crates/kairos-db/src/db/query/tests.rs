//! Unit tests for the query builders.

use chrono::{TimeZone, Utc};
use diesel::query_builder::QueryFragment;

use super::*;
use crate::model::occurrence::OccurrenceKey;

fn sql<Q>(query: &Q) -> String
where
    Q: QueryFragment<diesel::pg::Pg>,
{
    diesel::debug_query::<diesel::pg::Pg, _>(query).to_string()
}

#[test]
fn test_open_groups_filter_closed() {
    let query_str = sql(&group::open());
    assert!(query_str.contains("\"closed_at\" IS NULL"));
    assert!(query_str.contains("ORDER BY"));
}

#[test]
fn test_group_by_template_filters_template() {
    let query_str = sql(&group::by_template(uuid::Uuid::now_v7()));
    assert!(query_str.contains("\"template_id\" = $1"));
}

#[test]
fn test_template_by_id_builds() {
    let query_str = sql(&template::by_id(uuid::Uuid::now_v7()));
    assert!(query_str.contains("\"availability_template\""));
}

#[test]
fn test_occurrence_key_queries() {
    let start_time = Utc
        .with_ymd_and_hms(2026, 3, 2, 17, 0, 0)
        .single()
        .expect("valid time");

    let by_group = sql(&occurrence::by_key(OccurrenceKey::Group {
        group_id: uuid::Uuid::now_v7(),
        start_time,
    }));
    assert!(by_group.contains("\"group_id\" = $1"));
    assert!(by_group.contains("\"start_time\" = $2"));

    let by_template = sql(&occurrence::by_key(OccurrenceKey::Template {
        template_id: uuid::Uuid::now_v7(),
        start_time,
    }));
    assert!(by_template.contains("\"template_id\" = $1"));
    assert!(!by_template.contains("\"group_id\" ="));
}

#[test]
fn test_latest_in_group_orders_descending() {
    let query_str = sql(&occurrence::latest_in_group(uuid::Uuid::now_v7()));
    assert!(query_str.contains("\"start_time\" DESC"));
}

#[test]
fn test_upcoming_in_group_skips_closed() {
    let query_str = sql(&occurrence::upcoming_in_group(uuid::Uuid::now_v7(), Utc::now()));
    assert!(query_str.contains("\"start_time\" > $2"));
    assert!(query_str.contains("\"closed_at\" IS NULL"));
    assert!(query_str.contains("\"start_time\" ASC"));
}

#[test]
fn test_subscription_queries_build() {
    let by_group = sql(&subscription::by_group(uuid::Uuid::now_v7()));
    assert!(by_group.contains("\"group_id\" = $1"));

    let by_user = sql(&subscription::by_user_and_group(
        uuid::Uuid::now_v7(),
        uuid::Uuid::now_v7(),
    ));
    assert!(by_user.contains("\"user_id\" = $1"));
    assert!(by_user.contains("\"group_id\" = $2"));
}

#[test]
fn test_going_yes_binds_enum_text() {
    let query_str = sql(&participation::going_yes(uuid::Uuid::now_v7()));
    assert!(query_str.contains("\"going\" = $2"));
    assert!(query_str.contains("Yes"));
}

#[test]
fn test_co_registration_and_audit_queries_build() {
    let occurrence_id = uuid::Uuid::now_v7();
    let co = sql(&participation::co_registrations(occurrence_id, uuid::Uuid::now_v7()));
    assert!(co.contains("\"co_registration\""));

    let audit = sql(&participation::audit_for_occurrence(occurrence_id));
    assert!(audit.contains("\"recorded_at\" ASC"));
}
