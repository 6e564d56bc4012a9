#![allow(clippy::expect_used)]
//! `PgStore` against a live database.
//!
//! These tests run only when `KAIROS_TEST_DATABASE_URL` points at a database the migrations may
//! be applied to; otherwise they return early.

use chrono::{TimeDelta, TimeZone, Utc};
use kairos_core::config::DatabaseConfig;
use kairos_db::db::connection::create_pool;
use kairos_db::db::enums::{Going, PaymentStatus, PaymentType, Period};
use kairos_db::db::migrate::run_migrations;
use kairos_db::model::group::NewRecurrenceGroup;
use kairos_db::model::occurrence::{NewOccurrence, OccurrenceChanges};
use kairos_db::model::participation::NewParticipation;
use kairos_db::store::{
    CoRegistrationUpdate, GroupStore, JoinOutcome, OccurrenceStore, ParticipationStore,
    ParticipationWrite, PgStore, UpdateOutcome,
};

async fn store() -> Option<PgStore> {
    let Ok(url) = std::env::var("KAIROS_TEST_DATABASE_URL") else {
        tracing::warn!("KAIROS_TEST_DATABASE_URL not set, skipping");
        return None;
    };
    run_migrations(&url).await.expect("migrations apply");
    let database = DatabaseConfig {
        url,
        max_connections: 8,
    };
    let pool = create_pool(&database, 4).await.expect("pool builds");
    Some(PgStore::new(pool))
}

fn new_group() -> NewRecurrenceGroup {
    NewRecurrenceGroup {
        id: uuid::Uuid::now_v7(),
        publisher_id: uuid::Uuid::now_v7(),
        community_id: uuid::Uuid::now_v7(),
        period: Period::Weekly,
        days: serde_json::json!({ "mon": [["18:00", "19:00"]] }),
        timezone: "Europe/Berlin".to_string(),
        active_from: None,
        active_until: None,
        template_id: None,
    }
}

fn new_occurrence(group_id: Option<uuid::Uuid>, capacity_max: Option<i32>) -> NewOccurrence {
    let start_time = Utc
        .with_ymd_and_hms(2026, 3, 2, 17, 0, 0)
        .single()
        .expect("valid time");
    NewOccurrence {
        id: uuid::Uuid::now_v7(),
        group_id,
        template_id: None,
        publisher_id: uuid::Uuid::now_v7(),
        community_id: uuid::Uuid::now_v7(),
        title: "Evening run".to_string(),
        labels: vec![],
        start_time,
        end_time: start_time + TimeDelta::hours(1),
        timezone: "Europe/Berlin".to_string(),
        capacity_min: 0,
        capacity_max,
        payment_type: PaymentType::Free,
        payment_amount: 0,
        payment_currency: "EUR".to_string(),
        location: None,
        propagation_pending: false,
    }
}

/// ## Summary
/// Concurrent create-if-absent calls on one key converge on a single row.
#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_create_if_absent_converges() {
    let Some(store) = store().await else {
        return;
    };
    let group = store.create_group(new_group()).await.expect("group");

    let attempts = (0..8).map(|_| {
        let store = store.clone();
        let new = new_occurrence(Some(group.id), None);
        tokio::spawn(async move { store.create_occurrence_if_absent(new).await })
    });
    let results = futures::future::join_all(attempts).await;

    let mut ids = Vec::new();
    let mut created = 0;
    for result in results {
        let (occurrence, was_created) = result.expect("task").expect("insert");
        ids.push(occurrence.id);
        created += usize::from(was_created);
    }
    ids.dedup();

    assert_eq!(created, 1);
    assert_eq!(ids.len(), 1);
}

/// ## Summary
/// Concurrent joins never push the `yes` count past `capacity_max`.
#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_joins_respect_capacity() {
    let Some(store) = store().await else {
        return;
    };
    let occurrence = store
        .create_occurrence(new_occurrence(None, Some(3)))
        .await
        .expect("occurrence");

    let joins = (0..10).map(|_| {
        let store = store.clone();
        let write = ParticipationWrite {
            record: NewParticipation {
                going: Going::Yes,
                ..NewParticipation::attendee(occurrence.id, uuid::Uuid::now_v7())
            },
            co_registrations: CoRegistrationUpdate::Keep,
            audit: None,
            expected: None,
        };
        tokio::spawn(async move { store.commit_participation(write).await })
    });
    let outcomes = futures::future::join_all(joins).await;

    let committed = outcomes
        .into_iter()
        .map(|outcome| outcome.expect("task").expect("commit"))
        .filter(|outcome| matches!(outcome, JoinOutcome::Committed(_)))
        .count();

    assert_eq!(committed, 3);
    assert_eq!(store.count_going(occurrence.id).await.expect("count"), 3);
}

/// ## Summary
/// Concurrent writers that read the same state for one user apply exactly one transition.
#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_same_user_writes_apply_once() {
    let Some(store) = store().await else {
        return;
    };
    let occurrence = store
        .create_occurrence(new_occurrence(None, None))
        .await
        .expect("occurrence");
    let user = uuid::Uuid::now_v7();

    let claims = (0..10).map(|_| {
        let store = store.clone();
        let write = ParticipationWrite {
            record: NewParticipation {
                going: Going::Yes,
                payment_status: PaymentStatus::Charging,
                ..NewParticipation::attendee(occurrence.id, user)
            },
            co_registrations: CoRegistrationUpdate::Keep,
            audit: None,
            expected: None,
        };
        tokio::spawn(async move { store.commit_participation(write).await })
    });
    let outcomes: Vec<JoinOutcome> = futures::future::join_all(claims)
        .await
        .into_iter()
        .map(|outcome| outcome.expect("task").expect("commit"))
        .collect();

    let committed = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, JoinOutcome::Committed(_)))
        .count();
    let conflicts = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, JoinOutcome::Conflict(Some(_))))
        .count();
    assert_eq!(committed, 1);
    assert_eq!(conflicts, 9);
}

/// ## Summary
/// A capacity below the participants at `yes` is rejected inside the update.
#[test_log::test(tokio::test)]
async fn update_checks_capacity_against_going() {
    let Some(store) = store().await else {
        return;
    };
    let occurrence = store
        .create_occurrence(new_occurrence(None, Some(4)))
        .await
        .expect("occurrence");
    for _ in 0..2 {
        let write = ParticipationWrite {
            record: NewParticipation {
                going: Going::Yes,
                ..NewParticipation::attendee(occurrence.id, uuid::Uuid::now_v7())
            },
            co_registrations: CoRegistrationUpdate::Keep,
            audit: None,
            expected: None,
        };
        store.commit_participation(write).await.expect("commit");
    }

    let outcome = store
        .update_occurrence(
            occurrence.id,
            OccurrenceChanges {
                capacity_max: Some(Some(1)),
                ..OccurrenceChanges::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(
        outcome,
        UpdateOutcome::CapacityBelowGoing {
            capacity_max: 1,
            going: 2
        }
    );
}
