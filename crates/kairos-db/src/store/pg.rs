//! `PostgreSQL` implementation of the storage traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt;

use super::{
    CoRegistrationUpdate, GroupStore, JoinOutcome, OccurrenceStore, ParticipationStore,
    ParticipationWrite, SubscriptionStore, UpdateOutcome,
};
use crate::db::DbProvider;
use crate::db::connection::DbPool;
use crate::db::enums::Going;
use crate::db::query;
use crate::db::schema::{
    availability_template, co_registration, occurrence, participation, participation_audit,
    recurrence_group, subscription,
};
use crate::db::transaction::with_transaction;
use crate::error::{DbError, DbResult};
use crate::model::audit::ParticipationAudit;
use crate::model::co_registration::CoRegistration;
use crate::model::group::{NewRecurrenceGroup, RecurrenceGroup};
use crate::model::occurrence::{NewOccurrence, Occurrence, OccurrenceChanges, OccurrenceKey};
use crate::model::participation::Participation;
use crate::model::subscription::{NewSubscription, Subscription};
use crate::model::template::{AvailabilityTemplate, NewAvailabilityTemplate};

/// Storage backed by a bb8 pool of async `PostgreSQL` connections.
///
/// Uniqueness of occurrences is enforced by the `(group_id, start_time)` and
/// `(template_id, start_time)` constraints; capacity checks lock the occurrence row and
/// conditional participation writes lock the participation row.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl GroupStore for PgStore {
    #[tracing::instrument(skip(self, new), fields(group_id = %new.id))]
    async fn create_group(&self, new: NewRecurrenceGroup) -> DbResult<RecurrenceGroup> {
        let mut conn = self.pool.get_connection().await?;
        let group = diesel::insert_into(recurrence_group::table)
            .values(&new)
            .returning(RecurrenceGroup::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(group)
    }

    #[tracing::instrument(skip(self))]
    async fn group(&self, id: uuid::Uuid) -> DbResult<Option<RecurrenceGroup>> {
        let mut conn = self.pool.get_connection().await?;
        let group = query::group::by_id(id)
            .select(RecurrenceGroup::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(group)
    }

    #[tracing::instrument(skip(self))]
    async fn open_groups(&self) -> DbResult<Vec<RecurrenceGroup>> {
        let mut conn = self.pool.get_connection().await?;
        let groups = query::group::open()
            .select(RecurrenceGroup::as_select())
            .load(&mut conn)
            .await?;
        Ok(groups)
    }

    #[tracing::instrument(skip(self))]
    async fn close_group(&self, id: uuid::Uuid, at: DateTime<Utc>) -> DbResult<RecurrenceGroup> {
        let mut conn = self.pool.get_connection().await?;
        diesel::update(
            recurrence_group::table
                .find(id)
                .filter(recurrence_group::closed_at.is_null()),
        )
        .set((
            recurrence_group::closed_at.eq(Some(at)),
            recurrence_group::updated_at.eq(diesel::dsl::now),
        ))
        .execute(&mut conn)
        .await?;

        query::group::by_id(id)
            .select(RecurrenceGroup::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or(DbError::NotFound {
                entity: "recurrence group",
                id,
            })
    }

    #[tracing::instrument(skip(self, new), fields(group_id = %new.id))]
    async fn attach_group(
        &self,
        occurrence_id: uuid::Uuid,
        new: NewRecurrenceGroup,
    ) -> DbResult<(RecurrenceGroup, bool)> {
        let mut conn = self.pool.get_connection().await?;

        with_transaction(&mut conn, move |conn| {
            async move {
                let current: Option<Option<uuid::Uuid>> = occurrence::table
                    .find(occurrence_id)
                    .select(occurrence::group_id)
                    .for_update()
                    .get_result(conn)
                    .await
                    .optional()?;

                match current {
                    None => Err(DbError::NotFound {
                        entity: "occurrence",
                        id: occurrence_id,
                    }),
                    Some(Some(group_id)) => {
                        let group = query::group::by_id(group_id)
                            .select(RecurrenceGroup::as_select())
                            .first(conn)
                            .await?;
                        Ok((group, false))
                    }
                    Some(None) => {
                        let group: RecurrenceGroup = diesel::insert_into(recurrence_group::table)
                            .values(&new)
                            .returning(RecurrenceGroup::as_returning())
                            .get_result(conn)
                            .await?;
                        diesel::update(occurrence::table.find(occurrence_id))
                            .set((
                                occurrence::group_id.eq(Some(group.id)),
                                occurrence::updated_at.eq(diesel::dsl::now),
                            ))
                            .execute(conn)
                            .await?;
                        Ok((group, true))
                    }
                }
            }
            .scope_boxed()
        })
        .await
    }

    #[tracing::instrument(skip(self, template, group), fields(template_id = %template.id))]
    async fn create_template(
        &self,
        template: NewAvailabilityTemplate,
        group: NewRecurrenceGroup,
    ) -> DbResult<(AvailabilityTemplate, RecurrenceGroup)> {
        let mut conn = self.pool.get_connection().await?;

        with_transaction(&mut conn, move |conn| {
            async move {
                let template: AvailabilityTemplate =
                    diesel::insert_into(availability_template::table)
                        .values(&template)
                        .returning(AvailabilityTemplate::as_returning())
                        .get_result(conn)
                        .await?;
                let group: RecurrenceGroup = diesel::insert_into(recurrence_group::table)
                    .values(&group)
                    .returning(RecurrenceGroup::as_returning())
                    .get_result(conn)
                    .await?;
                Ok((template, group))
            }
            .scope_boxed()
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn template(&self, id: uuid::Uuid) -> DbResult<Option<AvailabilityTemplate>> {
        let mut conn = self.pool.get_connection().await?;
        let template = query::template::by_id(id)
            .select(AvailabilityTemplate::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(template)
    }

    #[tracing::instrument(skip(self))]
    async fn group_for_template(
        &self,
        template_id: uuid::Uuid,
    ) -> DbResult<Option<RecurrenceGroup>> {
        let mut conn = self.pool.get_connection().await?;
        let group = query::group::by_template(template_id)
            .select(RecurrenceGroup::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(group)
    }
}

#[async_trait]
impl OccurrenceStore for PgStore {
    #[tracing::instrument(skip(self, new), fields(occurrence_id = %new.id))]
    async fn create_occurrence(&self, new: NewOccurrence) -> DbResult<Occurrence> {
        let mut conn = self.pool.get_connection().await?;
        let created = diesel::insert_into(occurrence::table)
            .values(&new)
            .returning(Occurrence::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(created)
    }

    #[tracing::instrument(skip(self, new), fields(occurrence_id = %new.id, start_time = %new.start_time))]
    async fn create_occurrence_if_absent(
        &self,
        new: NewOccurrence,
    ) -> DbResult<(Occurrence, bool)> {
        let mut conn = self.pool.get_connection().await?;

        let inserted = diesel::insert_into(occurrence::table)
            .values(&new)
            .on_conflict_do_nothing()
            .returning(Occurrence::as_returning())
            .get_result(&mut conn)
            .await
            .optional()?;

        if let Some(created) = inserted {
            return Ok((created, true));
        }

        let Some(key) = new.key() else {
            return Err(DbError::NotFound {
                entity: "occurrence",
                id: new.id,
            });
        };

        tracing::debug!(?key, "Occurrence already exists, returning the stored record");

        let existing = query::occurrence::by_key(key)
            .select(Occurrence::as_select())
            .first(&mut conn)
            .await?;
        Ok((existing, false))
    }

    #[tracing::instrument(skip(self))]
    async fn occurrence(&self, id: uuid::Uuid) -> DbResult<Option<Occurrence>> {
        let mut conn = self.pool.get_connection().await?;
        let found = query::occurrence::by_id(id)
            .select(Occurrence::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(found)
    }

    #[tracing::instrument(skip(self))]
    async fn find_occurrence(&self, key: OccurrenceKey) -> DbResult<Option<Occurrence>> {
        let mut conn = self.pool.get_connection().await?;
        let found = query::occurrence::by_key(key)
            .select(Occurrence::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(found)
    }

    #[tracing::instrument(skip(self))]
    async fn latest_in_group(&self, group_id: uuid::Uuid) -> DbResult<Option<Occurrence>> {
        let mut conn = self.pool.get_connection().await?;
        let latest = query::occurrence::latest_in_group(group_id)
            .select(Occurrence::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(latest)
    }

    #[tracing::instrument(skip(self))]
    async fn upcoming_in_group(
        &self,
        group_id: uuid::Uuid,
        after: DateTime<Utc>,
    ) -> DbResult<Vec<Occurrence>> {
        let mut conn = self.pool.get_connection().await?;
        let upcoming = query::occurrence::upcoming_in_group(group_id, after)
            .select(Occurrence::as_select())
            .load(&mut conn)
            .await?;
        Ok(upcoming)
    }

    #[tracing::instrument(skip(self, changes))]
    async fn update_occurrence(
        &self,
        id: uuid::Uuid,
        changes: OccurrenceChanges,
    ) -> DbResult<UpdateOutcome> {
        let mut conn = self.pool.get_connection().await?;
        with_transaction(&mut conn, move |conn| {
            async move {
                occurrence::table
                    .find(id)
                    .select(occurrence::id)
                    .for_update()
                    .get_result::<uuid::Uuid>(conn)
                    .await
                    .optional()?
                    .ok_or(DbError::NotFound {
                        entity: "occurrence",
                        id,
                    })?;

                if let Some(Some(max)) = changes.capacity_max {
                    let going: i64 = query::participation::going_yes(id)
                        .count()
                        .get_result(conn)
                        .await?;
                    if going > i64::from(max) {
                        return Ok(UpdateOutcome::CapacityBelowGoing {
                            capacity_max: max,
                            going,
                        });
                    }
                }

                let updated = diesel::update(occurrence::table.find(id))
                    .set((&changes, occurrence::updated_at.eq(diesel::dsl::now)))
                    .returning(Occurrence::as_returning())
                    .get_result(conn)
                    .await?;
                Ok(UpdateOutcome::Updated(updated))
            }
            .scope_boxed()
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn mark_propagated(&self, id: uuid::Uuid) -> DbResult<Occurrence> {
        let mut conn = self.pool.get_connection().await?;
        diesel::update(
            occurrence::table
                .find(id)
                .filter(occurrence::propagation_pending.eq(true)),
        )
        .set((
            occurrence::propagation_pending.eq(false),
            occurrence::updated_at.eq(diesel::dsl::now),
        ))
        .execute(&mut conn)
        .await?;

        query::occurrence::by_id(id)
            .select(Occurrence::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or(DbError::NotFound {
                entity: "occurrence",
                id,
            })
    }

    #[tracing::instrument(skip(self))]
    async fn close_occurrence(&self, id: uuid::Uuid, at: DateTime<Utc>) -> DbResult<Occurrence> {
        let mut conn = self.pool.get_connection().await?;
        diesel::update(
            occurrence::table
                .find(id)
                .filter(occurrence::closed_at.is_null()),
        )
        .set((
            occurrence::closed_at.eq(Some(at)),
            occurrence::updated_at.eq(diesel::dsl::now),
        ))
        .execute(&mut conn)
        .await?;

        query::occurrence::by_id(id)
            .select(Occurrence::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or(DbError::NotFound {
                entity: "occurrence",
                id,
            })
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    #[tracing::instrument(skip(self, new), fields(user_id = %new.user_id, group_id = %new.group_id))]
    async fn upsert_subscription(&self, new: NewSubscription) -> DbResult<Subscription> {
        let mut conn = self.pool.get_connection().await?;
        let stored = diesel::insert_into(subscription::table)
            .values(&new)
            .on_conflict((subscription::user_id, subscription::group_id))
            .do_update()
            .set((
                subscription::days.eq(excluded(subscription::days)),
                subscription::active_from.eq(excluded(subscription::active_from)),
                subscription::active_until.eq(excluded(subscription::active_until)),
                subscription::co_registrants.eq(excluded(subscription::co_registrants)),
                subscription::updated_at.eq(diesel::dsl::now),
            ))
            .returning(Subscription::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(stored)
    }

    #[tracing::instrument(skip(self))]
    async fn ensure_subscription(
        &self,
        user_id: uuid::Uuid,
        group_id: uuid::Uuid,
    ) -> DbResult<bool> {
        let mut conn = self.pool.get_connection().await?;
        let new = NewSubscription {
            user_id,
            group_id,
            days: serde_json::json!({}),
            active_from: None,
            active_until: None,
            co_registrants: serde_json::json!([]),
        };
        let inserted = diesel::insert_into(subscription::table)
            .values(&new)
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(inserted > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn subscription(
        &self,
        user_id: uuid::Uuid,
        group_id: uuid::Uuid,
    ) -> DbResult<Option<Subscription>> {
        let mut conn = self.pool.get_connection().await?;
        let found = query::subscription::by_user_and_group(user_id, group_id)
            .select(Subscription::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(found)
    }

    #[tracing::instrument(skip(self))]
    async fn subscriptions_for_group(&self, group_id: uuid::Uuid) -> DbResult<Vec<Subscription>> {
        let mut conn = self.pool.get_connection().await?;
        let subscriptions = query::subscription::by_group(group_id)
            .select(Subscription::as_select())
            .load(&mut conn)
            .await?;
        Ok(subscriptions)
    }
}

#[async_trait]
impl ParticipationStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn participation(
        &self,
        occurrence_id: uuid::Uuid,
        user_id: uuid::Uuid,
    ) -> DbResult<Option<Participation>> {
        let mut conn = self.pool.get_connection().await?;
        let found = query::participation::by_occurrence_and_user(occurrence_id, user_id)
            .select(Participation::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(found)
    }

    #[tracing::instrument(skip(self))]
    async fn participants(&self, occurrence_id: uuid::Uuid) -> DbResult<Vec<Participation>> {
        let mut conn = self.pool.get_connection().await?;
        let records = query::participation::by_occurrence(occurrence_id)
            .select(Participation::as_select())
            .load(&mut conn)
            .await?;
        Ok(records)
    }

    #[tracing::instrument(skip(self))]
    async fn count_going(&self, occurrence_id: uuid::Uuid) -> DbResult<i64> {
        let mut conn = self.pool.get_connection().await?;
        let going = query::participation::going_yes(occurrence_id)
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(going)
    }

    #[tracing::instrument(skip(self))]
    async fn co_registrations(
        &self,
        occurrence_id: uuid::Uuid,
        user_id: uuid::Uuid,
    ) -> DbResult<Vec<CoRegistration>> {
        let mut conn = self.pool.get_connection().await?;
        let rows = query::participation::co_registrations(occurrence_id, user_id)
            .select(CoRegistration::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows)
    }

    #[tracing::instrument(
        skip(self, write),
        fields(
            occurrence_id = %write.record.occurrence_id,
            user_id = %write.record.user_id,
            going = %write.record.going,
        )
    )]
    async fn commit_participation(&self, write: ParticipationWrite) -> DbResult<JoinOutcome> {
        let mut conn = self.pool.get_connection().await?;
        let ParticipationWrite {
            record,
            co_registrations,
            audit,
            expected,
        } = write;

        with_transaction(&mut conn, move |conn| {
            async move {
                let occurrence_id = record.occurrence_id;
                let user_id = record.user_id;

                let capacity_max: Option<i32> = occurrence::table
                    .find(occurrence_id)
                    .select(occurrence::capacity_max)
                    .for_update()
                    .get_result::<Option<i32>>(conn)
                    .await
                    .optional()?
                    .ok_or(DbError::NotFound {
                        entity: "occurrence",
                        id: occurrence_id,
                    })?;

                let current: Option<Participation> = participation::table
                    .find((occurrence_id, user_id))
                    .select(Participation::as_select())
                    .for_update()
                    .get_result(conn)
                    .await
                    .optional()?;
                let unchanged = match (expected, current.as_ref()) {
                    (None, None) => true,
                    (Some(expected), Some(current)) => expected.matches(current),
                    _ => false,
                };
                if !unchanged {
                    return Ok(JoinOutcome::Conflict(current));
                }

                if record.going == Going::Yes
                    && let Some(max) = capacity_max
                {
                    let going: i64 = query::participation::going_yes(occurrence_id)
                        .filter(participation::user_id.ne(user_id))
                        .count()
                        .get_result(conn)
                        .await?;
                    if going >= i64::from(max) {
                        return Ok(JoinOutcome::CapacityExceeded {
                            capacity_max: max,
                            going,
                        });
                    }
                }

                let stored: Participation = diesel::insert_into(participation::table)
                    .values(&record)
                    .on_conflict((participation::occurrence_id, participation::user_id))
                    .do_update()
                    .set((
                        participation::going.eq(excluded(participation::going)),
                        participation::payment_status.eq(excluded(participation::payment_status)),
                        participation::roles.eq(excluded(participation::roles)),
                        participation::charged_amount.eq(excluded(participation::charged_amount)),
                        participation::via_subscription
                            .eq(excluded(participation::via_subscription)),
                        participation::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(Participation::as_returning())
                    .get_result(conn)
                    .await?;

                let owned = co_registration::table
                    .filter(co_registration::occurrence_id.eq(occurrence_id))
                    .filter(co_registration::user_id.eq(user_id));

                match co_registrations {
                    CoRegistrationUpdate::Keep => {}
                    CoRegistrationUpdate::DropAutoJoin => {
                        diesel::delete(owned.filter(co_registration::auto_join.eq(true)))
                            .execute(conn)
                            .await?;
                    }
                    CoRegistrationUpdate::Replace(rows) => {
                        let keep: Vec<uuid::Uuid> = rows.iter().map(|row| row.entity_id).collect();
                        diesel::delete(owned.filter(co_registration::entity_id.ne_all(keep)))
                            .execute(conn)
                            .await?;
                        if !rows.is_empty() {
                            diesel::insert_into(co_registration::table)
                                .values(&rows)
                                .on_conflict((
                                    co_registration::occurrence_id,
                                    co_registration::user_id,
                                    co_registration::entity_id,
                                ))
                                .do_update()
                                .set((
                                    co_registration::fee_required
                                        .eq(excluded(co_registration::fee_required)),
                                    co_registration::paid.eq(excluded(co_registration::paid)),
                                    co_registration::auto_join
                                        .eq(excluded(co_registration::auto_join)),
                                ))
                                .execute(conn)
                                .await?;
                        }
                    }
                }

                if let Some(audit) = audit {
                    diesel::insert_into(participation_audit::table)
                        .values(&audit)
                        .execute(conn)
                        .await?;
                }

                Ok(JoinOutcome::Committed(stored))
            }
            .scope_boxed()
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn active_in_group(&self, user_id: uuid::Uuid, group_id: uuid::Uuid) -> DbResult<i64> {
        let mut conn = self.pool.get_connection().await?;
        let active = participation::table
            .inner_join(occurrence::table)
            .filter(occurrence::group_id.eq(group_id))
            .filter(occurrence::closed_at.is_null())
            .filter(participation::user_id.eq(user_id))
            .filter(participation::going.eq_any(vec![Going::Maybe, Going::Yes]))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(active)
    }

    #[tracing::instrument(skip(self))]
    async fn audit_trail(&self, occurrence_id: uuid::Uuid) -> DbResult<Vec<ParticipationAudit>> {
        let mut conn = self.pool.get_connection().await?;
        let trail = query::participation::audit_for_occurrence(occurrence_id)
            .select(ParticipationAudit::as_select())
            .load(&mut conn)
            .await?;
        Ok(trail)
    }
}
