//! Creates the next occurrence of a recurring series once the current one has started.

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use kairos_core::timezone::local_to_utc;
use kairos_db::model::group::RecurrenceGroup;
use kairos_db::model::occurrence::{NewOccurrence, Occurrence};
use kairos_db::model::terms::{Location, PaymentTerms};

use super::next_slot::{NextSlot, next_slot};
use crate::context::EngineContext;
use crate::error::{ServiceError, ServiceResult};
use crate::notify::{EventKind, NotificationEvent};
use crate::propagation::{PropagationReport, SubscriptionPropagator};

/// Why an advance left the series as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    GroupClosed,
    NoOccurrence,
    /// The latest occurrence is still upcoming.
    NotStarted,
    HorizonExhausted,
    /// The next start falls after the group's validity window.
    PastActiveUntil,
}

#[derive(Debug)]
pub enum AdvanceOutcome {
    Created {
        occurrence: Occurrence,
        propagation: PropagationReport,
    },
    /// An earlier call created the occurrence but did not finish propagating it; this call did.
    Resumed {
        occurrence: Occurrence,
        propagation: PropagationReport,
    },
    /// Another writer created the same occurrence first.
    Existing(Occurrence),
    Idle(IdleReason),
}

impl AdvanceOutcome {
    #[must_use]
    pub fn into_occurrence(self) -> Option<Occurrence> {
        match self {
            Self::Created { occurrence, .. }
            | Self::Resumed { occurrence, .. }
            | Self::Existing(occurrence) => Some(occurrence),
            Self::Idle(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RecurrenceMaterializer {
    ctx: EngineContext,
    propagator: SubscriptionPropagator,
}

impl RecurrenceMaterializer {
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        let propagator = SubscriptionPropagator::new(ctx.clone());
        Self { ctx, propagator }
    }

    /// ## Summary
    /// Materializes the next occurrence of a group if its latest one has started.
    ///
    /// Safe to call repeatedly and concurrently: at most one occurrence exists per start time
    /// and every caller receives it.
    ///
    /// ## Errors
    /// Returns `NotFound` for an unknown group, or an error if the latest occurrence's terms
    /// cannot be carried over.
    pub async fn advance(&self, group_id: uuid::Uuid) -> ServiceResult<Option<Occurrence>> {
        Ok(self.advance_detailed(group_id).await?.into_occurrence())
    }

    /// ## Summary
    /// Like [`Self::advance`], reporting why nothing happened or what propagation did.
    ///
    /// ## Side Effects
    /// - Creates at most one occurrence
    /// - Publishes the creation, only when this call created it
    /// - Propagates subscriptions to an occurrence not yet stamped as propagated, which resumes
    ///   a propagation an earlier call did not finish
    ///
    /// ## Errors
    /// See [`Self::advance`].
    #[tracing::instrument(skip(self), fields(%group_id))]
    pub async fn advance_detailed(&self, group_id: uuid::Uuid) -> ServiceResult<AdvanceOutcome> {
        let store = &self.ctx.store;
        let group = store
            .group(group_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("recurrence group {group_id}")))?;
        if group.is_closed() {
            tracing::debug!("Group closed");
            return Ok(AdvanceOutcome::Idle(IdleReason::GroupClosed));
        }

        let Some(latest) = store.latest_in_group(group_id).await? else {
            tracing::debug!("Group has no occurrence to advance from");
            return Ok(AdvanceOutcome::Idle(IdleReason::NoOccurrence));
        };
        let now = self.ctx.clock.now();
        if !latest.has_started(now) {
            if !latest.is_propagated() {
                return self.resume(&group, latest).await;
            }
            tracing::debug!(start = %latest.start_time, "Latest occurrence not started yet");
            return Ok(AdvanceOutcome::Idle(IdleReason::NotStarted));
        }

        let tz = latest.tz()?;
        let days = group.recurrence_days()?;
        let reference = reference_time(&group, &latest)?;

        let NextSlot::Found(next) =
            next_slot(&days, tz, reference, self.ctx.settings.series_horizon_days)
        else {
            tracing::warn!(
                horizon_days = self.ctx.settings.series_horizon_days,
                "No qualifying day within horizon"
            );
            return Ok(AdvanceOutcome::Idle(IdleReason::HorizonExhausted));
        };
        if group.ends_before(next.local_date) {
            tracing::debug!(next = %next.local_date, "Next start is past the validity window");
            return Ok(AdvanceOutcome::Idle(IdleReason::PastActiveUntil));
        }

        let new = successor(&group, &latest, next.start)?;
        let (occurrence, created) = store.create_occurrence_if_absent(new).await?;
        if !created {
            if !occurrence.is_propagated() {
                return self.resume(&group, occurrence).await;
            }
            tracing::debug!(occurrence_id = %occurrence.id, "Occurrence already materialized");
            return Ok(AdvanceOutcome::Existing(occurrence));
        }

        tracing::info!(
            occurrence_id = %occurrence.id,
            start = %occurrence.start_time,
            "Materialized next occurrence"
        );
        self.ctx.bus.publish(NotificationEvent {
            occurrence_id: occurrence.id,
            kind: EventKind::OccurrenceCreated,
            payload: serde_json::json!({ "group_id": group.id }),
        });
        let propagation = self.propagator.propagate(&group, &occurrence).await?;

        Ok(AdvanceOutcome::Created {
            occurrence,
            propagation,
        })
    }

    async fn resume(&self, group: &RecurrenceGroup, occurrence: Occurrence) -> ServiceResult<AdvanceOutcome> {
        tracing::info!(occurrence_id = %occurrence.id, "Resuming unfinished propagation");
        let propagation = self.propagator.propagate(group, &occurrence).await?;
        Ok(AdvanceOutcome::Resumed {
            occurrence,
            propagation,
        })
    }
}

/// The instant the next start must follow: the latest start, moved up to the group's first
/// active day when that lies later.
fn reference_time(group: &RecurrenceGroup, latest: &Occurrence) -> ServiceResult<DateTime<Utc>> {
    let tz = latest.tz()?;
    let reference = latest.start_time;
    let Some(from) = group.active_from else {
        return Ok(reference);
    };
    if reference.with_timezone(&tz).date_naive() >= from {
        return Ok(reference);
    }
    Ok(local_to_utc(tz, from.and_time(NaiveTime::MIN))
        .map_or(reference, |midnight| midnight - TimeDelta::seconds(1)))
}

/// A copy of `latest` starting at `start`, with the same duration and terms.
fn successor(
    group: &RecurrenceGroup,
    latest: &Occurrence,
    start: DateTime<Utc>,
) -> ServiceResult<NewOccurrence> {
    let location = latest.location()?;
    let terms = PaymentTerms::new(
        latest.payment_type,
        latest.payment_amount,
        &latest.payment_currency,
    )?;

    Ok(NewOccurrence {
        id: uuid::Uuid::now_v7(),
        group_id: Some(group.id),
        template_id: group.template_id,
        publisher_id: latest.publisher_id,
        community_id: latest.community_id,
        title: latest.title.clone(),
        labels: latest.labels.clone(),
        start_time: start,
        end_time: start + latest.duration(),
        timezone: latest.timezone.clone(),
        capacity_min: latest.capacity_min,
        capacity_max: latest.capacity_max,
        payment_type: terms.kind,
        payment_amount: terms.amount,
        payment_currency: terms.currency,
        location: Location::to_column(location.as_ref())?,
        propagation_pending: true,
    })
}
