//! Storage contract of the engine.
//!
//! The traits cover exactly the persistence the engine needs: natural-key lookups, atomic
//! create-if-absent for occurrences and an atomic capacity-checked participation commit.
//! [`PgStore`] backs production; [`MemoryStore`] backs tests and local tooling.

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::enums::{Going, PaymentStatus};
use crate::error::DbResult;
use crate::model::audit::{NewParticipationAudit, ParticipationAudit};
use crate::model::co_registration::{CoRegistration, NewCoRegistration};
use crate::model::group::{NewRecurrenceGroup, RecurrenceGroup};
use crate::model::occurrence::{NewOccurrence, Occurrence, OccurrenceChanges, OccurrenceKey};
use crate::model::participation::{NewParticipation, Participation};
use crate::model::subscription::{NewSubscription, Subscription};
use crate::model::template::{AvailabilityTemplate, NewAvailabilityTemplate};

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn create_group(&self, new: NewRecurrenceGroup) -> DbResult<RecurrenceGroup>;

    async fn group(&self, id: uuid::Uuid) -> DbResult<Option<RecurrenceGroup>>;

    /// Groups that have not been closed, oldest first.
    async fn open_groups(&self) -> DbResult<Vec<RecurrenceGroup>>;

    /// ## Summary
    /// Soft-closes a group. Closing twice keeps the first timestamp.
    ///
    /// ## Errors
    /// Returns `DbError::NotFound` if the group does not exist.
    async fn close_group(&self, id: uuid::Uuid, at: DateTime<Utc>) -> DbResult<RecurrenceGroup>;

    /// ## Summary
    /// Attaches a new group to an occurrence that has none yet, atomically.
    ///
    /// Returns the occurrence's existing group and `false` if it already belongs to one.
    ///
    /// ## Errors
    /// Returns `DbError::NotFound` if the occurrence does not exist.
    async fn attach_group(
        &self,
        occurrence_id: uuid::Uuid,
        new: NewRecurrenceGroup,
    ) -> DbResult<(RecurrenceGroup, bool)>;

    /// Creates a template together with the group that tracks its subscriptions.
    async fn create_template(
        &self,
        template: NewAvailabilityTemplate,
        group: NewRecurrenceGroup,
    ) -> DbResult<(AvailabilityTemplate, RecurrenceGroup)>;

    async fn template(&self, id: uuid::Uuid) -> DbResult<Option<AvailabilityTemplate>>;

    async fn group_for_template(&self, template_id: uuid::Uuid)
    -> DbResult<Option<RecurrenceGroup>>;
}

#[async_trait]
pub trait OccurrenceStore: Send + Sync {
    /// Inserts an occurrence that has no natural key to deduplicate on.
    async fn create_occurrence(&self, new: NewOccurrence) -> DbResult<Occurrence>;

    /// ## Summary
    /// Inserts an occurrence unless one already exists under the same natural key.
    ///
    /// Returns the stored occurrence and whether this call created it. A writer that loses a
    /// race receives the winner's record.
    async fn create_occurrence_if_absent(&self, new: NewOccurrence)
    -> DbResult<(Occurrence, bool)>;

    async fn occurrence(&self, id: uuid::Uuid) -> DbResult<Option<Occurrence>>;

    async fn find_occurrence(&self, key: OccurrenceKey) -> DbResult<Option<Occurrence>>;

    /// The occurrence of a group with the greatest start time.
    async fn latest_in_group(&self, group_id: uuid::Uuid) -> DbResult<Option<Occurrence>>;

    /// Open occurrences of a group starting after `after`, in start order.
    async fn upcoming_in_group(
        &self,
        group_id: uuid::Uuid,
        after: DateTime<Utc>,
    ) -> DbResult<Vec<Occurrence>>;

    /// ## Summary
    /// Applies attribute changes to an occurrence.
    ///
    /// A new `capacity_max` is checked against the participations at `yes` while holding the
    /// occurrence exclusively, so a join committed in between cannot leave it overbooked.
    ///
    /// ## Errors
    /// Returns `DbError::NotFound` if the occurrence does not exist.
    async fn update_occurrence(
        &self,
        id: uuid::Uuid,
        changes: OccurrenceChanges,
    ) -> DbResult<UpdateOutcome>;

    /// ## Summary
    /// Clears `propagation_pending` once the group's subscribers have been joined.
    ///
    /// ## Errors
    /// Returns `DbError::NotFound` if the occurrence does not exist.
    async fn mark_propagated(&self, id: uuid::Uuid) -> DbResult<Occurrence>;

    /// ## Errors
    /// Returns `DbError::NotFound` if the occurrence does not exist.
    async fn close_occurrence(&self, id: uuid::Uuid, at: DateTime<Utc>) -> DbResult<Occurrence>;
}

/// Result of a checked occurrence update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated(Occurrence),
    /// Nothing was written: `going` users are already at `yes`, more than `capacity_max` allows.
    CapacityBelowGoing { capacity_max: i32, going: i64 },
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Creates or replaces the subscription of `(user_id, group_id)`.
    async fn upsert_subscription(&self, new: NewSubscription) -> DbResult<Subscription>;

    /// ## Summary
    /// Creates an empty subscription (no auto-joined days) unless one exists.
    ///
    /// Returns whether a subscription was created.
    async fn ensure_subscription(&self, user_id: uuid::Uuid, group_id: uuid::Uuid)
    -> DbResult<bool>;

    async fn subscription(
        &self,
        user_id: uuid::Uuid,
        group_id: uuid::Uuid,
    ) -> DbResult<Option<Subscription>>;

    async fn subscriptions_for_group(&self, group_id: uuid::Uuid) -> DbResult<Vec<Subscription>>;
}

/// What happens to a user's co-registrations when their participation is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoRegistrationUpdate {
    Keep,
    /// Make the given set the complete set: entities not listed are removed.
    Replace(Vec<NewCoRegistration>),
    /// Remove the co-registrations that were created together with the user's own join.
    DropAutoJoin,
}

/// The parts of a stored participation a write is conditional on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorState {
    pub going: Going,
    pub payment_status: PaymentStatus,
    pub charged_amount: i64,
}

impl PriorState {
    #[must_use]
    pub fn matches(&self, stored: &Participation) -> bool {
        *self == Self::from(stored)
    }
}

impl From<&Participation> for PriorState {
    fn from(stored: &Participation) -> Self {
        Self {
            going: stored.going,
            payment_status: stored.payment_status,
            charged_amount: stored.charged_amount,
        }
    }
}

impl From<&NewParticipation> for PriorState {
    fn from(record: &NewParticipation) -> Self {
        Self {
            going: record.going,
            payment_status: record.payment_status,
            charged_amount: record.charged_amount,
        }
    }
}

/// A participation write, applied atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipationWrite {
    pub record: NewParticipation,
    pub co_registrations: CoRegistrationUpdate,
    pub audit: Option<NewParticipationAudit>,
    /// The state the stored record must still be in; `None` requires that no record exists.
    pub expected: Option<PriorState>,
}

/// Result of an atomic participation commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Committed(Participation),
    /// Nothing was written: the occurrence already has `going` other users at `yes`.
    CapacityExceeded { capacity_max: i32, going: i64 },
    /// Nothing was written: the stored record no longer matches `expected`. Carries what is
    /// stored now.
    Conflict(Option<Participation>),
}

#[async_trait]
pub trait ParticipationStore: Send + Sync {
    async fn participation(
        &self,
        occurrence_id: uuid::Uuid,
        user_id: uuid::Uuid,
    ) -> DbResult<Option<Participation>>;

    async fn participants(&self, occurrence_id: uuid::Uuid) -> DbResult<Vec<Participation>>;

    /// Number of participations at `yes`.
    async fn count_going(&self, occurrence_id: uuid::Uuid) -> DbResult<i64>;

    async fn co_registrations(
        &self,
        occurrence_id: uuid::Uuid,
        user_id: uuid::Uuid,
    ) -> DbResult<Vec<CoRegistration>>;

    /// ## Summary
    /// Writes a participation, its co-registrations and its audit row in one unit.
    ///
    /// The stored record is compared with `expected` while holding it exclusively, so two
    /// writers that read the same state cannot both apply their transition. When the record is
    /// at `yes`, the count of other users at `yes` is checked against the occurrence's
    /// `capacity_max` while holding the occurrence exclusively, so concurrent joins cannot
    /// overbook it.
    ///
    /// ## Errors
    /// Returns `DbError::NotFound` if the occurrence does not exist.
    async fn commit_participation(&self, write: ParticipationWrite) -> DbResult<JoinOutcome>;

    /// Number of open occurrences in a group on which the user is still `maybe` or `yes`.
    async fn active_in_group(&self, user_id: uuid::Uuid, group_id: uuid::Uuid) -> DbResult<i64>;

    async fn audit_trail(&self, occurrence_id: uuid::Uuid) -> DbResult<Vec<ParticipationAudit>>;
}

/// Everything the engine persists.
pub trait Store: GroupStore + OccurrenceStore + SubscriptionStore + ParticipationStore {}

impl<T> Store for T where T: GroupStore + OccurrenceStore + SubscriptionStore + ParticipationStore {}
