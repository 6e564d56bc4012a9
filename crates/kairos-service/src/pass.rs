//! One materialization run over every open recurrence group.

use futures::stream::{self, StreamExt};
use kairos_db::model::group::RecurrenceGroup;
use kairos_db::model::occurrence::Occurrence;

use crate::availability::{AvailabilityExpander, MaterializeOutcome, MaterializeRequest};
use crate::context::EngineContext;
use crate::error::{ServiceError, ServiceResult};
use crate::recurrence::{AdvanceOutcome, RecurrenceMaterializer};

/// What a pass did for one group.
#[derive(Debug)]
pub enum GroupOutcome {
    /// A recurring series got its next occurrence.
    Advanced(Occurrence),
    /// An availability template's subscribed slots were materialized.
    Expanded { occurrences: usize, failed: usize },
    Idle,
}

#[derive(Debug)]
pub struct GroupFailure {
    pub group_id: uuid::Uuid,
    pub error: ServiceError,
}

#[derive(Debug, Default)]
pub struct PassReport {
    pub groups: usize,
    pub advanced: usize,
    pub expanded: usize,
    pub idle: usize,
    pub failures: Vec<GroupFailure>,
}

impl PassReport {
    fn record(&mut self, group_id: uuid::Uuid, result: ServiceResult<GroupOutcome>) {
        self.groups += 1;
        match result {
            Ok(GroupOutcome::Advanced(_)) => self.advanced += 1,
            Ok(GroupOutcome::Expanded { occurrences, .. }) => self.expanded += occurrences,
            Ok(GroupOutcome::Idle) => self.idle += 1,
            Err(error) => self.failures.push(GroupFailure { group_id, error }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MaterializationPass {
    ctx: EngineContext,
    materializer: RecurrenceMaterializer,
    expander: AvailabilityExpander,
}

impl MaterializationPass {
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            materializer: RecurrenceMaterializer::new(ctx.clone()),
            expander: AvailabilityExpander::new(ctx.clone()),
            ctx,
        }
    }

    /// ## Summary
    /// Processes every open group, up to `worker_concurrency` groups at a time.
    ///
    /// ## Errors
    /// Returns an error only if the open groups cannot be listed. Failures of single groups
    /// are collected in the report.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> ServiceResult<PassReport> {
        let groups = self.ctx.store.open_groups().await?;
        let concurrency = self.ctx.settings.worker_concurrency.max(1);
        tracing::debug!(groups = groups.len(), concurrency, "Starting materialization pass");

        let mut results = stream::iter(groups)
            .map(|group| async move {
                let group_id = group.id;
                (group_id, self.process(group).await)
            })
            .buffer_unordered(concurrency);

        let mut report = PassReport::default();
        while let Some((group_id, result)) = results.next().await {
            if let Err(error) = &result {
                tracing::warn!(%group_id, %error, "Group not materialized");
            }
            report.record(group_id, result);
        }

        tracing::info!(
            groups = report.groups,
            advanced = report.advanced,
            expanded = report.expanded,
            idle = report.idle,
            failed = report.failures.len(),
            "Materialization pass finished"
        );
        Ok(report)
    }

    /// ## Summary
    /// Processes a single group.
    ///
    /// ## Errors
    /// Returns `NotFound` for an unknown group, or the error that stopped its materialization.
    #[tracing::instrument(skip(self))]
    pub async fn run_group(&self, group_id: uuid::Uuid) -> ServiceResult<GroupOutcome> {
        let group = self
            .ctx
            .store
            .group(group_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("recurrence group {group_id}")))?;
        self.process(group).await
    }

    async fn process(&self, group: RecurrenceGroup) -> ServiceResult<GroupOutcome> {
        let Some(template_id) = group.template_id else {
            return match self.materializer.advance_detailed(group.id).await? {
                AdvanceOutcome::Created { occurrence, .. }
                | AdvanceOutcome::Resumed { occurrence, .. } => Ok(GroupOutcome::Advanced(occurrence)),
                AdvanceOutcome::Existing(_) | AdvanceOutcome::Idle(_) => Ok(GroupOutcome::Idle),
            };
        };
        if group.is_closed() {
            return Ok(GroupOutcome::Idle);
        }

        let slots = self.expander.subscribed_slots(&group).await?;
        if slots.is_empty() {
            tracing::trace!(group_id = %group.id, "No subscribed slots");
            return Ok(GroupOutcome::Idle);
        }
        let request = MaterializeRequest {
            template_id,
            requested_slots: Some(slots),
            ..MaterializeRequest::default()
        };
        match self.expander.materialize(request).await? {
            MaterializeOutcome::Committed {
                occurrences,
                failures,
            } => Ok(GroupOutcome::Expanded {
                occurrences: occurrences.len(),
                failed: failures.len(),
            }),
            MaterializeOutcome::Quote(_) => Err(ServiceError::InvariantViolation(
                "commit request answered with a quote",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Weekday};
    use kairos_core::schedule::{DayKey, RecurrenceDays, TimeSlot};
    use kairos_db::db::enums::PaymentType;
    use kairos_db::model::subscription::NewSubscription;
    use kairos_db::store::{GroupStore, SubscriptionStore};

    use super::*;
    use crate::availability::{AvailabilityService, TemplateInput};
    use crate::testing::{Harness, utc};

    fn slot(start: &str, end: &str) -> TimeSlot {
        TimeSlot::parse(start, end).expect("valid slot")
    }

    fn mondays() -> RecurrenceDays {
        RecurrenceDays::single(DayKey::Weekday(Weekday::Mon), slot("18:00", "19:00"))
    }

    async fn template_group(harness: &Harness) -> RecurrenceGroup {
        AvailabilityService::new(harness.ctx.clone())
            .create_template(TemplateInput {
                publisher_id: harness.publisher_id,
                community_id: harness.community_id,
                title: "Tennis court".to_string(),
                slots: RecurrenceDays::single(DayKey::Weekday(Weekday::Wed), slot("08:00", "09:00")),
                timezone: "Europe/Berlin".to_string(),
                capacity_min: 0,
                capacity_max: Some(4),
                payment_type: PaymentType::Free,
                payment_amount: 0,
                payment_currency: "EUR".to_string(),
                location: None,
            })
            .await
            .expect("template created")
            .1
    }

    /// ## Summary
    /// A pass advances a started series, expands a subscribed template and leaves the rest idle.
    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn pass_dispatches_by_group_kind() {
        // Tuesday 2026-10-13, 09:00 UTC.
        let harness = Harness::new(utc(2026, 10, 13, 9, 0));

        let series = harness.group(&mondays()).await;
        let mut started = harness.new_occurrence(utc(2026, 10, 12, 16, 0));
        started.group_id = Some(series.id);
        harness.occurrence(started).await;

        let waiting = harness.group(&mondays()).await;
        let mut upcoming = harness.new_occurrence(utc(2026, 10, 19, 16, 0));
        upcoming.group_id = Some(waiting.id);
        harness.occurrence(upcoming).await;

        let subscribed = template_group(&harness).await;
        let subscriber = uuid::Uuid::now_v7();
        let new = NewSubscription::new(
            subscriber,
            subscribed.id,
            &RecurrenceDays::whole_day(DayKey::Weekday(Weekday::Wed)),
            (None, None),
            &[],
        )
        .expect("encodable");
        harness.store.upsert_subscription(new).await.expect("stored");
        template_group(&harness).await;

        let report = MaterializationPass::new(harness.ctx.clone())
            .run()
            .await
            .expect("pass ran");

        assert_eq!(report.groups, 4);
        assert_eq!(report.advanced, 1);
        assert_eq!(report.expanded, 1);
        assert_eq!(report.idle, 2);
        assert!(report.failures.is_empty());
        // Two seeded, one advanced, one expanded.
        assert_eq!(harness.store.occurrence_count(), 4);
    }

    #[test_log::test(tokio::test)]
    async fn failing_group_does_not_stop_the_pass() {
        let harness = Harness::new(utc(2026, 10, 13, 9, 0));
        let healthy = harness.group(&mondays()).await;
        let mut started = harness.new_occurrence(utc(2026, 10, 12, 16, 0));
        started.group_id = Some(healthy.id);
        harness.occurrence(started).await;

        let mut broken = harness.new_group(&mondays());
        broken.days = serde_json::json!({ "funday": [] });
        let broken = harness.store.create_group(broken).await.expect("stored");
        let mut seed = harness.new_occurrence(utc(2026, 10, 12, 16, 0));
        seed.group_id = Some(broken.id);
        harness.occurrence(seed).await;

        let report = MaterializationPass::new(harness.ctx.clone())
            .run()
            .await
            .expect("pass ran");
        assert_eq!(report.advanced, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].group_id, broken.id);
    }

    #[test_log::test(tokio::test)]
    async fn run_group_twice_is_idempotent() {
        let harness = Harness::new(utc(2026, 10, 13, 9, 0));
        let series = harness.group(&mondays()).await;
        let mut started = harness.new_occurrence(utc(2026, 10, 12, 16, 0));
        started.group_id = Some(series.id);
        harness.occurrence(started).await;
        let pass = MaterializationPass::new(harness.ctx.clone());

        let first = pass.run_group(series.id).await.expect("ran");
        let GroupOutcome::Advanced(next) = first else {
            panic!("expected an advance, got {first:?}");
        };
        assert_eq!(next.start_time, utc(2026, 10, 19, 16, 0));
        assert!(matches!(
            pass.run_group(series.id).await.expect("ran"),
            GroupOutcome::Idle
        ));

        harness.clock.advance(TimeDelta::days(7));
        assert!(matches!(
            pass.run_group(series.id).await.expect("ran"),
            GroupOutcome::Advanced(_)
        ));
        assert!(matches!(
            pass.run_group(uuid::Uuid::now_v7()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
