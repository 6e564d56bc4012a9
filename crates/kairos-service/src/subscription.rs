//! Changes to a user's standing intent on a recurrence group.

use chrono::NaiveDate;
use kairos_core::schedule::RecurrenceDays;
use kairos_db::model::group::RecurrenceGroup;
use kairos_db::model::subscription::{CoRegistrant, NewSubscription, Subscription};

use crate::context::EngineContext;
use crate::error::{ServiceError, ServiceResult};
use crate::propagation::{SubscriberOutcome, SubscriptionPropagator};

/// A user's new recurring preference for one group.
#[derive(Debug, Clone)]
pub struct SubscriptionUpdate {
    pub user_id: uuid::Uuid,
    pub group_id: uuid::Uuid,
    /// Days (and optionally slots) to auto-join. An empty mapping keeps the subscription but
    /// joins nothing.
    pub days: RecurrenceDays,
    pub active_from: Option<NaiveDate>,
    pub active_until: Option<NaiveDate>,
    pub co_registrants: Vec<CoRegistrant>,
    /// Re-evaluate occurrences of the group that are already materialized and still ahead.
    pub propagate_to_existing: bool,
}

#[derive(Debug)]
pub struct SubscriptionReport {
    pub subscription: Subscription,
    /// Upcoming occurrences the user was joined to.
    pub joined: Vec<uuid::Uuid>,
    /// Upcoming occurrences an earlier automatic join was withdrawn from.
    pub released: Vec<uuid::Uuid>,
    pub failures: Vec<OccurrenceFailure>,
}

#[derive(Debug)]
pub struct OccurrenceFailure {
    pub occurrence_id: uuid::Uuid,
    pub error: ServiceError,
}

#[derive(Clone, Debug)]
pub struct SubscriptionService {
    ctx: EngineContext,
    propagator: SubscriptionPropagator,
}

impl SubscriptionService {
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            propagator: SubscriptionPropagator::new(ctx.clone()),
            ctx,
        }
    }

    /// ## Summary
    /// Creates or replaces the user's subscription to a group.
    ///
    /// With `propagate_to_existing`, every open occurrence of the group that has not started is
    /// re-evaluated against the new days: selected ones are joined, and ones the old
    /// subscription joined automatically but the new one no longer selects are left.
    ///
    /// ## Side Effects
    /// - Stores the subscription
    /// - Subscribes the user to the group's notification channel
    /// - Joins and leaves upcoming occurrences when `propagate_to_existing` is set
    ///
    /// ## Errors
    /// Returns `NotFound` for an unknown group, `UserNotFound` for an unknown user and a
    /// validation error for a closed group, days outside the group's pattern or an inverted
    /// validity window. Per-occurrence failures are reported, not returned.
    #[tracing::instrument(skip(self, update), fields(
        user_id = %update.user_id,
        group_id = %update.group_id,
        propagate = update.propagate_to_existing
    ))]
    pub async fn update_subscription(
        &self,
        update: SubscriptionUpdate,
    ) -> ServiceResult<SubscriptionReport> {
        let store = &self.ctx.store;
        let group = store
            .group(update.group_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("recurrence group {}", update.group_id)))?;
        validate(&group, &update)?;
        if !self.ctx.directory.user_exists(update.user_id).await? {
            return Err(ServiceError::UserNotFound(update.user_id));
        }

        let new = NewSubscription::new(
            update.user_id,
            group.id,
            &update.days,
            (update.active_from, update.active_until),
            &update.co_registrants,
        )?;
        let subscription = store.upsert_subscription(new).await?;
        self.ctx.bus.subscribe_to_group(update.user_id, group.id);
        tracing::info!(days = update.days.len(), "Subscription stored");

        let mut report = SubscriptionReport {
            subscription,
            joined: Vec::new(),
            released: Vec::new(),
            failures: Vec::new(),
        };
        if update.propagate_to_existing {
            self.reconcile(&group, &mut report).await?;
        }
        Ok(report)
    }

    async fn reconcile(
        &self,
        group: &RecurrenceGroup,
        report: &mut SubscriptionReport,
    ) -> ServiceResult<()> {
        let upcoming = self
            .ctx
            .store
            .upcoming_in_group(group.id, self.ctx.clock.now())
            .await?;
        tracing::debug!(count = upcoming.len(), "Re-evaluating upcoming occurrences");

        for occurrence in &upcoming {
            let outcome = self
                .propagator
                .propagate_subscription(group, &report.subscription, occurrence)
                .await;
            match outcome {
                Ok(SubscriberOutcome::Joined) => report.joined.push(occurrence.id),
                Ok(SubscriberOutcome::Released) => report.released.push(occurrence.id),
                Ok(SubscriberOutcome::Skipped) => {}
                Err(error) => {
                    tracing::warn!(occurrence_id = %occurrence.id, %error, "Occurrence could not be reconciled");
                    report.failures.push(OccurrenceFailure {
                        occurrence_id: occurrence.id,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            joined = report.joined.len(),
            released = report.released.len(),
            failed = report.failures.len(),
            "Upcoming occurrences reconciled"
        );
        Ok(())
    }
}

fn validate(group: &RecurrenceGroup, update: &SubscriptionUpdate) -> ServiceResult<()> {
    if group.is_closed() {
        return Err(ServiceError::ValidationError(format!(
            "recurrence group {} is closed",
            group.id
        )));
    }
    if let (Some(from), Some(until)) = (update.active_from, update.active_until)
        && from > until
    {
        return Err(ServiceError::ValidationError(format!(
            "subscription window starts {from} after it ends {until}"
        )));
    }
    if update.days.is_empty() {
        return Ok(());
    }
    update.days.validate(group.period.day_key_kind())?;
    update.days.validate_subset_of(&group.recurrence_days()?)?;
    Ok(())
}
