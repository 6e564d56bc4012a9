//! Lifecycle of single occurrences: creation, turning one into a series, edits and closing.

use chrono::{DateTime, NaiveDate, Utc};
use kairos_core::capacity::Capacity;
use kairos_core::schedule::RecurrenceDays;
use kairos_core::timezone::parse_timezone;
use kairos_db::db::enums::{Going, PaymentStatus, PaymentType, Period};
use kairos_db::model::group::{NewRecurrenceGroup, RecurrenceGroup};
use kairos_db::model::occurrence::{NewOccurrence, Occurrence, OccurrenceChanges};
use kairos_db::model::participation::Participation;
use kairos_db::model::terms::{Location, PaymentTerms};
use kairos_db::store::UpdateOutcome;

use crate::context::EngineContext;
use crate::error::{ServiceError, ServiceResult};
use crate::notify::{EventKind, NotificationEvent};
use crate::participation::{ParticipationEngine, SetGoingOptions};

#[derive(Debug, Clone)]
pub struct OccurrenceInput {
    pub publisher_id: uuid::Uuid,
    pub community_id: uuid::Uuid,
    pub title: String,
    pub labels: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timezone: String,
    pub capacity: Capacity,
    pub payment_type: PaymentType,
    pub payment_amount: i64,
    pub payment_currency: String,
    pub location: Option<Location>,
}

/// The pattern an occurrence is repeated on.
#[derive(Debug, Clone)]
pub struct RecurrenceInput {
    pub period: Period,
    pub days: RecurrenceDays,
    pub active_from: Option<NaiveDate>,
    pub active_until: Option<NaiveDate>,
}

/// Changes to an occurrence that has not started. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct OccurrenceUpdate {
    pub title: Option<String>,
    pub labels: Option<Vec<String>>,
    pub capacity: Option<Capacity>,
    /// Kind, amount and currency, replaced together.
    pub payment: Option<(PaymentType, i64, String)>,
    /// `Some(None)` removes the location.
    pub location: Option<Option<Location>>,
}

#[derive(Debug)]
pub struct ParticipantFailure {
    pub user_id: uuid::Uuid,
    pub error: ServiceError,
}

#[derive(Debug)]
pub struct CloseReport {
    pub occurrence: Occurrence,
    /// Participations moved to `no` by the close.
    pub cancelled: Vec<Participation>,
    /// Cancelled participants whose refund did not go through and is still owed.
    pub refunds_pending: Vec<uuid::Uuid>,
    pub failures: Vec<ParticipantFailure>,
}

#[derive(Clone, Debug)]
pub struct OccurrenceService {
    ctx: EngineContext,
    engine: ParticipationEngine,
}

impl OccurrenceService {
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            engine: ParticipationEngine::new(ctx.clone()),
            ctx,
        }
    }

    /// ## Summary
    /// Creates a standalone occurrence.
    ///
    /// ## Errors
    /// Returns a validation error for an empty title, an end not after the start, an unknown
    /// timezone, or invalid capacity or payment terms.
    #[tracing::instrument(skip(self, input), fields(
        publisher_id = %input.publisher_id,
        start = %input.start_time
    ))]
    pub async fn create(&self, input: OccurrenceInput) -> ServiceResult<Occurrence> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(ServiceError::ValidationError(
                "occurrence title must not be empty".to_string(),
            ));
        }
        if input.end_time <= input.start_time {
            return Err(ServiceError::ValidationError(format!(
                "occurrence must end after it starts ({} <= {})",
                input.end_time, input.start_time
            )));
        }
        parse_timezone(&input.timezone)?;
        let capacity = Capacity::new(input.capacity.min, input.capacity.max)?;
        let terms = PaymentTerms::new(
            input.payment_type,
            input.payment_amount,
            &input.payment_currency,
        )?;

        let new = NewOccurrence {
            id: uuid::Uuid::now_v7(),
            group_id: None,
            template_id: None,
            publisher_id: input.publisher_id,
            community_id: input.community_id,
            title: title.to_string(),
            labels: input.labels,
            start_time: input.start_time,
            end_time: input.end_time,
            timezone: input.timezone.trim().to_string(),
            capacity_min: capacity.min,
            capacity_max: capacity.max,
            payment_type: terms.kind,
            payment_amount: terms.amount,
            payment_currency: terms.currency,
            location: Location::to_column(input.location.as_ref())?,
            propagation_pending: false,
        };
        let occurrence = self.ctx.store.create_occurrence(new).await?;

        tracing::info!(occurrence_id = %occurrence.id, "Occurrence created");
        self.ctx.bus.publish(NotificationEvent {
            occurrence_id: occurrence.id,
            kind: EventKind::OccurrenceCreated,
            payload: serde_json::json!({}),
        });
        Ok(occurrence)
    }

    /// ## Summary
    /// Makes an occurrence the first of a recurring series.
    ///
    /// The group is created only the first time; later calls return the group the occurrence
    /// already belongs to, unchanged.
    ///
    /// ## Errors
    /// Returns `NotFound` for an unknown occurrence, and a validation error for a closed
    /// occurrence, day keys that do not match the period or an inverted validity window.
    #[tracing::instrument(skip(self, recurrence), fields(%occurrence_id, period = %recurrence.period))]
    pub async fn make_recurring(
        &self,
        occurrence_id: uuid::Uuid,
        recurrence: RecurrenceInput,
    ) -> ServiceResult<RecurrenceGroup> {
        recurrence.days.validate(recurrence.period.day_key_kind())?;
        if let (Some(from), Some(until)) = (recurrence.active_from, recurrence.active_until)
            && from > until
        {
            return Err(ServiceError::ValidationError(format!(
                "recurrence starts {from} after it ends {until}"
            )));
        }
        let occurrence = self.find(occurrence_id).await?;
        if occurrence.is_closed() {
            return Err(ServiceError::OccurrenceClosed(occurrence_id));
        }

        let new = NewRecurrenceGroup {
            id: uuid::Uuid::now_v7(),
            publisher_id: occurrence.publisher_id,
            community_id: occurrence.community_id,
            period: recurrence.period,
            days: recurrence.days.to_json(),
            timezone: occurrence.timezone.clone(),
            active_from: recurrence.active_from,
            active_until: recurrence.active_until,
            template_id: None,
        };
        let (group, created) = self.ctx.store.attach_group(occurrence_id, new).await?;
        if created {
            tracing::info!(group_id = %group.id, "Recurrence group created");
        } else {
            tracing::debug!(group_id = %group.id, "Occurrence already recurring");
        }
        Ok(group)
    }

    /// ## Summary
    /// Applies changes to an occurrence that has not started.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown occurrence
    /// - `OccurrenceClosed` or `OccurrenceAlreadyStarted` when it can no longer change
    /// - A validation error for invalid terms, or a capacity below the confirmed attendance
    #[tracing::instrument(skip(self, update), fields(%occurrence_id))]
    pub async fn update(
        &self,
        occurrence_id: uuid::Uuid,
        update: OccurrenceUpdate,
    ) -> ServiceResult<Occurrence> {
        let store = &self.ctx.store;
        let occurrence = self.find(occurrence_id).await?;
        if occurrence.is_closed() {
            return Err(ServiceError::OccurrenceClosed(occurrence_id));
        }
        if occurrence.has_started(self.ctx.clock.now()) {
            return Err(ServiceError::OccurrenceAlreadyStarted(occurrence_id));
        }

        let mut changes = OccurrenceChanges::default();
        if let Some(title) = update.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(ServiceError::ValidationError(
                    "occurrence title must not be empty".to_string(),
                ));
            }
            changes.title = Some(title.to_string());
        }
        changes.labels = update.labels;
        if let Some(capacity) = update.capacity {
            let capacity = Capacity::new(capacity.min, capacity.max)?;
            changes.capacity_min = Some(capacity.min);
            changes.capacity_max = Some(capacity.max);
        }
        if let Some((kind, amount, currency)) = update.payment {
            let terms = PaymentTerms::new(kind, amount, &currency)?;
            changes.payment_type = Some(terms.kind);
            changes.payment_amount = Some(terms.amount);
            changes.payment_currency = Some(terms.currency);
        }
        if let Some(location) = update.location {
            changes.location = Some(Location::to_column(location.as_ref())?);
        }

        if changes == OccurrenceChanges::default() {
            tracing::debug!("Nothing to change");
            return Ok(occurrence);
        }
        let updated = match store.update_occurrence(occurrence_id, changes).await? {
            UpdateOutcome::Updated(updated) => updated,
            UpdateOutcome::CapacityBelowGoing {
                capacity_max,
                going,
            } => {
                return Err(ServiceError::ValidationError(format!(
                    "capacity {capacity_max} is below the {going} confirmed participants"
                )));
            }
        };
        tracing::info!("Occurrence updated");
        self.ctx.bus.publish(NotificationEvent {
            occurrence_id,
            kind: EventKind::OccurrenceUpdated,
            payload: serde_json::json!({}),
        });
        Ok(updated)
    }

    /// ## Summary
    /// Soft-closes an occurrence and cancels everyone on it.
    ///
    /// The occurrence is closed before participants are moved, so nobody can join meanwhile.
    /// Paid participants are refunded when the occurrence has not started; a failed refund
    /// is listed in `refunds_pending` and retried by a later cancellation.
    ///
    /// ## Side Effects
    /// - Closes the occurrence
    /// - Moves every active participant to `no`, refunding where due
    /// - Publishes the close
    ///
    /// ## Errors
    /// Returns `NotFound` for an unknown occurrence. Per-participant failures are reported.
    #[tracing::instrument(skip(self), fields(%actor_id, %occurrence_id))]
    pub async fn close(
        &self,
        actor_id: uuid::Uuid,
        occurrence_id: uuid::Uuid,
    ) -> ServiceResult<CloseReport> {
        let store = &self.ctx.store;
        self.find(occurrence_id).await?;
        let occurrence = store
            .close_occurrence(occurrence_id, self.ctx.clock.now())
            .await?;
        let participants = store.participants(occurrence_id).await?;

        let mut report = CloseReport {
            occurrence,
            cancelled: Vec::new(),
            refunds_pending: Vec::new(),
            failures: Vec::new(),
        };
        let affected = participants
            .iter()
            .filter(|record| {
                record.going.is_active() || record.holds_charge() || record.payment_status.is_claimed()
            });
        for record in affected {
            let result = self
                .engine
                .set_going(
                    actor_id,
                    record.user_id,
                    occurrence_id,
                    Going::No,
                    &SetGoingOptions::default(),
                )
                .await;
            match result {
                Ok(cancelled) => {
                    if (cancelled.holds_charge()
                        || cancelled.payment_status == PaymentStatus::Refunding)
                        && !report.occurrence.has_started(self.ctx.clock.now())
                    {
                        report.refunds_pending.push(cancelled.user_id);
                    }
                    report.cancelled.push(cancelled);
                }
                Err(error) => {
                    tracing::warn!(user_id = %record.user_id, %error, "Participant not cancelled");
                    report.failures.push(ParticipantFailure {
                        user_id: record.user_id,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            cancelled = report.cancelled.len(),
            refunds_pending = report.refunds_pending.len(),
            failed = report.failures.len(),
            "Occurrence closed"
        );
        self.ctx.bus.publish(NotificationEvent {
            occurrence_id,
            kind: EventKind::OccurrenceClosed,
            payload: serde_json::json!({ "cancelled": report.cancelled.len() }),
        });
        Ok(report)
    }

    async fn find(&self, occurrence_id: uuid::Uuid) -> ServiceResult<Occurrence> {
        self.ctx
            .store
            .occurrence(occurrence_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("occurrence {occurrence_id}")))
    }
}
