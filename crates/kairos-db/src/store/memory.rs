//! In-process implementation of the storage traits.
//!
//! Every operation runs under one mutex, which makes create-if-absent and the checked commits
//! trivially atomic. Uniqueness constraints of the SQL schema are mirrored here.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::result::DatabaseErrorKind;

use super::{
    CoRegistrationUpdate, GroupStore, JoinOutcome, OccurrenceStore, ParticipationStore,
    ParticipationWrite, SubscriptionStore, UpdateOutcome,
};
use crate::db::enums::Going;
use crate::error::{DbError, DbResult};
use crate::model::audit::ParticipationAudit;
use crate::model::co_registration::CoRegistration;
use crate::model::group::{NewRecurrenceGroup, RecurrenceGroup};
use crate::model::occurrence::{NewOccurrence, Occurrence, OccurrenceChanges, OccurrenceKey};
use crate::model::participation::Participation;
use crate::model::subscription::{NewSubscription, Subscription};
use crate::model::template::{AvailabilityTemplate, NewAvailabilityTemplate};

#[derive(Debug, Default)]
struct MemoryState {
    groups: HashMap<uuid::Uuid, RecurrenceGroup>,
    templates: HashMap<uuid::Uuid, AvailabilityTemplate>,
    occurrences: HashMap<uuid::Uuid, Occurrence>,
    /// Keyed by `(group_id, user_id)`.
    subscriptions: BTreeMap<(uuid::Uuid, uuid::Uuid), Subscription>,
    /// Keyed by `(occurrence_id, user_id)`.
    participations: BTreeMap<(uuid::Uuid, uuid::Uuid), Participation>,
    /// Keyed by `(occurrence_id, user_id, entity_id)`.
    co_registrations: BTreeMap<(uuid::Uuid, uuid::Uuid, uuid::Uuid), CoRegistration>,
    audit: Vec<ParticipationAudit>,
}

impl MemoryState {
    /// Participations at `yes` on an occurrence, not counting `except`.
    fn count_going(&self, occurrence_id: uuid::Uuid, except: Option<uuid::Uuid>) -> i64 {
        let going = self
            .participations
            .values()
            .filter(|record| {
                record.occurrence_id == occurrence_id
                    && record.going == Going::Yes
                    && Some(record.user_id) != except
            })
            .count();
        i64::try_from(going).unwrap_or(i64::MAX)
    }

    fn find_occurrence(&self, key: OccurrenceKey) -> Option<&Occurrence> {
        self.occurrences
            .values()
            .find(|occurrence| matches_key(occurrence, key))
    }

    fn insert_group(&mut self, new: NewRecurrenceGroup) -> DbResult<RecurrenceGroup> {
        if self.groups.contains_key(&new.id) {
            return Err(unique_violation("recurrence_group_pkey"));
        }
        if new.template_id.is_some()
            && self
                .groups
                .values()
                .any(|group| group.template_id == new.template_id)
        {
            return Err(unique_violation("recurrence_group_template_id_key"));
        }

        let now = Utc::now();
        let group = RecurrenceGroup {
            id: new.id,
            publisher_id: new.publisher_id,
            community_id: new.community_id,
            period: new.period,
            days: new.days,
            timezone: new.timezone,
            active_from: new.active_from,
            active_until: new.active_until,
            template_id: new.template_id,
            closed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.groups.insert(group.id, group.clone());
        Ok(group)
    }

    fn insert_occurrence(&mut self, new: NewOccurrence) -> DbResult<Occurrence> {
        if self.occurrences.contains_key(&new.id) {
            return Err(unique_violation("occurrence_pkey"));
        }
        if let Some(group_id) = new.group_id
            && self.find_occurrence(OccurrenceKey::Group {
                group_id,
                start_time: new.start_time,
            })
            .is_some()
        {
            return Err(unique_violation("occurrence_group_start_key"));
        }
        if let Some(template_id) = new.template_id
            && self.find_occurrence(OccurrenceKey::Template {
                template_id,
                start_time: new.start_time,
            })
            .is_some()
        {
            return Err(unique_violation("occurrence_template_start_key"));
        }

        let now = Utc::now();
        let occurrence = Occurrence {
            id: new.id,
            group_id: new.group_id,
            template_id: new.template_id,
            publisher_id: new.publisher_id,
            community_id: new.community_id,
            title: new.title,
            labels: new.labels,
            start_time: new.start_time,
            end_time: new.end_time,
            timezone: new.timezone,
            capacity_min: new.capacity_min,
            capacity_max: new.capacity_max,
            payment_type: new.payment_type,
            payment_amount: new.payment_amount,
            payment_currency: new.payment_currency,
            location: new.location,
            closed_at: None,
            propagation_pending: new.propagation_pending,
            created_at: now,
            updated_at: now,
        };
        self.occurrences.insert(occurrence.id, occurrence.clone());
        Ok(occurrence)
    }
}

/// An occurrence carrying both a group and a template answers to both keys, like the two
/// unique constraints of the SQL schema.
fn matches_key(occurrence: &Occurrence, key: OccurrenceKey) -> bool {
    match key {
        OccurrenceKey::Group {
            group_id,
            start_time,
        } => occurrence.group_id == Some(group_id) && occurrence.start_time == start_time,
        OccurrenceKey::Template {
            template_id,
            start_time,
        } => occurrence.template_id == Some(template_id) && occurrence.start_time == start_time,
    }
}

fn unique_violation(constraint: &str) -> DbError {
    DbError::DatabaseError(diesel::result::Error::DatabaseError(
        DatabaseErrorKind::UniqueViolation,
        Box::new(format!("duplicate key value violates unique constraint \"{constraint}\"")),
    ))
}

/// Storage held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state and recovers from poisoning.
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                self.state.clear_poison();
                poisoned.into_inner()
            }
        }
    }

    /// Number of stored occurrences, across all groups.
    #[must_use]
    pub fn occurrence_count(&self) -> usize {
        self.lock().occurrences.len()
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn create_group(&self, new: NewRecurrenceGroup) -> DbResult<RecurrenceGroup> {
        self.lock().insert_group(new)
    }

    async fn group(&self, id: uuid::Uuid) -> DbResult<Option<RecurrenceGroup>> {
        Ok(self.lock().groups.get(&id).cloned())
    }

    async fn open_groups(&self) -> DbResult<Vec<RecurrenceGroup>> {
        let mut groups: Vec<RecurrenceGroup> = self
            .lock()
            .groups
            .values()
            .filter(|group| !group.is_closed())
            .cloned()
            .collect();
        groups.sort_by_key(|group| (group.created_at, group.id));
        Ok(groups)
    }

    async fn close_group(&self, id: uuid::Uuid, at: DateTime<Utc>) -> DbResult<RecurrenceGroup> {
        let mut state = self.lock();
        let group = state.groups.get_mut(&id).ok_or(DbError::NotFound {
            entity: "recurrence group",
            id,
        })?;
        if group.closed_at.is_none() {
            group.closed_at = Some(at);
            group.updated_at = Utc::now();
        }
        Ok(group.clone())
    }

    async fn attach_group(
        &self,
        occurrence_id: uuid::Uuid,
        new: NewRecurrenceGroup,
    ) -> DbResult<(RecurrenceGroup, bool)> {
        let mut state = self.lock();
        let current = state
            .occurrences
            .get(&occurrence_id)
            .ok_or(DbError::NotFound {
                entity: "occurrence",
                id: occurrence_id,
            })?
            .group_id;

        if let Some(group_id) = current {
            let group = state.groups.get(&group_id).cloned().ok_or(DbError::NotFound {
                entity: "recurrence group",
                id: group_id,
            })?;
            return Ok((group, false));
        }

        let group = state.insert_group(new)?;
        if let Some(occurrence) = state.occurrences.get_mut(&occurrence_id) {
            occurrence.group_id = Some(group.id);
            occurrence.updated_at = Utc::now();
        }
        Ok((group, true))
    }

    async fn create_template(
        &self,
        template: NewAvailabilityTemplate,
        group: NewRecurrenceGroup,
    ) -> DbResult<(AvailabilityTemplate, RecurrenceGroup)> {
        let mut state = self.lock();
        if state.templates.contains_key(&template.id) {
            return Err(unique_violation("availability_template_pkey"));
        }

        let group = state.insert_group(group)?;
        let now = Utc::now();
        let template = AvailabilityTemplate {
            id: template.id,
            publisher_id: template.publisher_id,
            community_id: template.community_id,
            title: template.title,
            slots: template.slots,
            timezone: template.timezone,
            capacity_min: template.capacity_min,
            capacity_max: template.capacity_max,
            payment_type: template.payment_type,
            payment_amount: template.payment_amount,
            payment_currency: template.payment_currency,
            location: template.location,
            closed_at: None,
            created_at: now,
            updated_at: now,
        };
        state.templates.insert(template.id, template.clone());
        Ok((template, group))
    }

    async fn template(&self, id: uuid::Uuid) -> DbResult<Option<AvailabilityTemplate>> {
        Ok(self.lock().templates.get(&id).cloned())
    }

    async fn group_for_template(
        &self,
        template_id: uuid::Uuid,
    ) -> DbResult<Option<RecurrenceGroup>> {
        Ok(self
            .lock()
            .groups
            .values()
            .find(|group| group.template_id == Some(template_id))
            .cloned())
    }
}

#[async_trait]
impl OccurrenceStore for MemoryStore {
    async fn create_occurrence(&self, new: NewOccurrence) -> DbResult<Occurrence> {
        self.lock().insert_occurrence(new)
    }

    async fn create_occurrence_if_absent(
        &self,
        new: NewOccurrence,
    ) -> DbResult<(Occurrence, bool)> {
        let mut state = self.lock();
        if let Some(key) = new.key()
            && let Some(existing) = state.find_occurrence(key)
        {
            return Ok((existing.clone(), false));
        }
        state.insert_occurrence(new).map(|created| (created, true))
    }

    async fn occurrence(&self, id: uuid::Uuid) -> DbResult<Option<Occurrence>> {
        Ok(self.lock().occurrences.get(&id).cloned())
    }

    async fn find_occurrence(&self, key: OccurrenceKey) -> DbResult<Option<Occurrence>> {
        Ok(self.lock().find_occurrence(key).cloned())
    }

    async fn latest_in_group(&self, group_id: uuid::Uuid) -> DbResult<Option<Occurrence>> {
        Ok(self
            .lock()
            .occurrences
            .values()
            .filter(|occurrence| occurrence.group_id == Some(group_id))
            .max_by_key(|occurrence| occurrence.start_time)
            .cloned())
    }

    async fn upcoming_in_group(
        &self,
        group_id: uuid::Uuid,
        after: DateTime<Utc>,
    ) -> DbResult<Vec<Occurrence>> {
        let mut upcoming: Vec<Occurrence> = self
            .lock()
            .occurrences
            .values()
            .filter(|occurrence| {
                occurrence.group_id == Some(group_id)
                    && occurrence.start_time > after
                    && !occurrence.is_closed()
            })
            .cloned()
            .collect();
        upcoming.sort_by_key(|occurrence| occurrence.start_time);
        Ok(upcoming)
    }

    async fn update_occurrence(
        &self,
        id: uuid::Uuid,
        changes: OccurrenceChanges,
    ) -> DbResult<UpdateOutcome> {
        let mut state = self.lock();
        if !state.occurrences.contains_key(&id) {
            return Err(DbError::NotFound {
                entity: "occurrence",
                id,
            });
        }
        if let Some(Some(max)) = changes.capacity_max {
            let going = state.count_going(id, None);
            if going > i64::from(max) {
                return Ok(UpdateOutcome::CapacityBelowGoing {
                    capacity_max: max,
                    going,
                });
            }
        }
        let occurrence = state.occurrences.get_mut(&id).ok_or(DbError::NotFound {
            entity: "occurrence",
            id,
        })?;
        changes.apply_to(occurrence);
        occurrence.updated_at = Utc::now();
        Ok(UpdateOutcome::Updated(occurrence.clone()))
    }

    async fn mark_propagated(&self, id: uuid::Uuid) -> DbResult<Occurrence> {
        let mut state = self.lock();
        let occurrence = state.occurrences.get_mut(&id).ok_or(DbError::NotFound {
            entity: "occurrence",
            id,
        })?;
        if occurrence.propagation_pending {
            occurrence.propagation_pending = false;
            occurrence.updated_at = Utc::now();
        }
        Ok(occurrence.clone())
    }

    async fn close_occurrence(&self, id: uuid::Uuid, at: DateTime<Utc>) -> DbResult<Occurrence> {
        let mut state = self.lock();
        let occurrence = state.occurrences.get_mut(&id).ok_or(DbError::NotFound {
            entity: "occurrence",
            id,
        })?;
        if occurrence.closed_at.is_none() {
            occurrence.closed_at = Some(at);
            occurrence.updated_at = Utc::now();
        }
        Ok(occurrence.clone())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn upsert_subscription(&self, new: NewSubscription) -> DbResult<Subscription> {
        let mut state = self.lock();
        let now = Utc::now();
        let created_at = state
            .subscriptions
            .get(&(new.group_id, new.user_id))
            .map_or(now, |existing| existing.created_at);
        let stored = Subscription {
            user_id: new.user_id,
            group_id: new.group_id,
            days: new.days,
            active_from: new.active_from,
            active_until: new.active_until,
            co_registrants: new.co_registrants,
            created_at,
            updated_at: now,
        };
        state
            .subscriptions
            .insert((stored.group_id, stored.user_id), stored.clone());
        Ok(stored)
    }

    async fn ensure_subscription(
        &self,
        user_id: uuid::Uuid,
        group_id: uuid::Uuid,
    ) -> DbResult<bool> {
        let mut state = self.lock();
        if state.subscriptions.contains_key(&(group_id, user_id)) {
            return Ok(false);
        }
        let now = Utc::now();
        state.subscriptions.insert(
            (group_id, user_id),
            Subscription {
                user_id,
                group_id,
                days: serde_json::json!({}),
                active_from: None,
                active_until: None,
                co_registrants: serde_json::json!([]),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(true)
    }

    async fn subscription(
        &self,
        user_id: uuid::Uuid,
        group_id: uuid::Uuid,
    ) -> DbResult<Option<Subscription>> {
        Ok(self.lock().subscriptions.get(&(group_id, user_id)).cloned())
    }

    async fn subscriptions_for_group(&self, group_id: uuid::Uuid) -> DbResult<Vec<Subscription>> {
        Ok(self
            .lock()
            .subscriptions
            .range((group_id, uuid::Uuid::nil())..=(group_id, uuid::Uuid::max()))
            .map(|(_, subscription)| subscription.clone())
            .collect())
    }
}

#[async_trait]
impl ParticipationStore for MemoryStore {
    async fn participation(
        &self,
        occurrence_id: uuid::Uuid,
        user_id: uuid::Uuid,
    ) -> DbResult<Option<Participation>> {
        Ok(self
            .lock()
            .participations
            .get(&(occurrence_id, user_id))
            .cloned())
    }

    async fn participants(&self, occurrence_id: uuid::Uuid) -> DbResult<Vec<Participation>> {
        let mut records: Vec<Participation> = self
            .lock()
            .participations
            .values()
            .filter(|record| record.occurrence_id == occurrence_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }

    async fn count_going(&self, occurrence_id: uuid::Uuid) -> DbResult<i64> {
        Ok(self.lock().count_going(occurrence_id, None))
    }

    async fn co_registrations(
        &self,
        occurrence_id: uuid::Uuid,
        user_id: uuid::Uuid,
    ) -> DbResult<Vec<CoRegistration>> {
        Ok(self
            .lock()
            .co_registrations
            .values()
            .filter(|row| row.occurrence_id == occurrence_id && row.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn commit_participation(&self, write: ParticipationWrite) -> DbResult<JoinOutcome> {
        let mut state = self.lock();
        let ParticipationWrite {
            record,
            co_registrations,
            audit,
            expected,
        } = write;
        let occurrence_id = record.occurrence_id;
        let user_id = record.user_id;

        let capacity_max = state
            .occurrences
            .get(&occurrence_id)
            .ok_or(DbError::NotFound {
                entity: "occurrence",
                id: occurrence_id,
            })?
            .capacity_max;

        let current = state.participations.get(&(occurrence_id, user_id));
        let unchanged = match (expected, current) {
            (None, None) => true,
            (Some(expected), Some(current)) => expected.matches(current),
            _ => false,
        };
        if !unchanged {
            return Ok(JoinOutcome::Conflict(current.cloned()));
        }

        if record.going == Going::Yes
            && let Some(max) = capacity_max
        {
            let going = state.count_going(occurrence_id, Some(user_id));
            if going >= i64::from(max) {
                return Ok(JoinOutcome::CapacityExceeded {
                    capacity_max: max,
                    going,
                });
            }
        }

        let now = Utc::now();
        let created_at = state
            .participations
            .get(&(occurrence_id, user_id))
            .map_or(now, |existing| existing.created_at);
        let stored = Participation {
            occurrence_id,
            user_id,
            going: record.going,
            payment_status: record.payment_status,
            roles: record.roles,
            charged_amount: record.charged_amount,
            via_subscription: record.via_subscription,
            created_at,
            updated_at: now,
        };
        state
            .participations
            .insert((occurrence_id, user_id), stored.clone());

        match co_registrations {
            CoRegistrationUpdate::Keep => {}
            CoRegistrationUpdate::DropAutoJoin => {
                state.co_registrations.retain(|_, row| {
                    !(row.occurrence_id == occurrence_id && row.user_id == user_id && row.auto_join)
                });
            }
            CoRegistrationUpdate::Replace(rows) => {
                state.co_registrations.retain(|_, existing| {
                    !(existing.occurrence_id == occurrence_id
                        && existing.user_id == user_id
                        && !rows.iter().any(|row| row.entity_id == existing.entity_id))
                });
                for row in rows {
                    let key = (row.occurrence_id, row.user_id, row.entity_id);
                    let created_at = state
                        .co_registrations
                        .get(&key)
                        .map_or(now, |existing| existing.created_at);
                    state.co_registrations.insert(
                        key,
                        CoRegistration {
                            occurrence_id: row.occurrence_id,
                            user_id: row.user_id,
                            entity_id: row.entity_id,
                            fee_required: row.fee_required,
                            paid: row.paid,
                            auto_join: row.auto_join,
                            created_at,
                        },
                    );
                }
            }
        }

        if let Some(audit) = audit {
            state.audit.push(ParticipationAudit {
                id: audit.id,
                occurrence_id: audit.occurrence_id,
                user_id: audit.user_id,
                actor_id: audit.actor_id,
                from_going: audit.from_going,
                to_going: audit.to_going,
                from_payment: audit.from_payment,
                to_payment: audit.to_payment,
                amount: audit.amount,
                currency: audit.currency,
                recorded_at: now,
            });
        }

        Ok(JoinOutcome::Committed(stored))
    }

    async fn active_in_group(&self, user_id: uuid::Uuid, group_id: uuid::Uuid) -> DbResult<i64> {
        let state = self.lock();
        let active = state
            .participations
            .values()
            .filter(|record| record.user_id == user_id && record.going.is_active())
            .filter(|record| {
                state
                    .occurrences
                    .get(&record.occurrence_id)
                    .is_some_and(|occurrence| {
                        occurrence.group_id == Some(group_id) && !occurrence.is_closed()
                    })
            })
            .count();
        Ok(i64::try_from(active).unwrap_or(i64::MAX))
    }

    async fn audit_trail(&self, occurrence_id: uuid::Uuid) -> DbResult<Vec<ParticipationAudit>> {
        Ok(self
            .lock()
            .audit
            .iter()
            .filter(|row| row.occurrence_id == occurrence_id)
            .cloned()
            .collect())
    }
}
