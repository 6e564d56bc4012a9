//! The participation state machine: one user's attendance on one occurrence.
//!
//! A participation moves through `no -> maybe -> yes-unpaid -> yes-paid` and can fall back to
//! `no` from anywhere. Joining is gated on capacity and payment; leaving before the start
//! refunds whatever the user was charged.

mod options;
mod payment;

pub use options::SetGoingOptions;

use chrono::{DateTime, Utc};
use kairos_db::db::enums::{Going, ParticipantRole, PaymentStatus};
use kairos_db::model::audit::NewParticipationAudit;
use kairos_db::model::occurrence::Occurrence;
use kairos_db::model::participation::{NewParticipation, Participation};
use kairos_db::store::{CoRegistrationUpdate, JoinOutcome, ParticipationWrite, PriorState};

use crate::context::EngineContext;
use crate::error::{ServiceError, ServiceResult};
use crate::ledger::{ChargeRequest, RefundRequest};
use crate::notify::{EventKind, NotificationEvent};
pub(crate) use payment::Offer;
use payment::{PayerStanding, PaymentPlan};

/// Reads of the record before giving up on a transition that keeps finding it changed.
const TRANSITION_ATTEMPTS: u32 = 2;

/// Result of one attempt at a transition.
enum Attempt {
    Done(Participation),
    /// The stored record changed between reading and writing it.
    Stale,
}

#[derive(Clone, Debug)]
pub struct ParticipationEngine {
    ctx: EngineContext,
}

impl ParticipationEngine {
    #[must_use]
    pub const fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// ## Summary
    /// Moves `user_id` to `target` on an occurrence, on behalf of `actor_id`.
    ///
    /// Repeating the current state returns the stored record untouched. A user without a
    /// record who asks for `no` gets an unsaved record in the `no` state.
    ///
    /// Every write is conditional on the record read before it. A charge or refund first claims
    /// the record (`charging` or `refunding`), so a concurrent transition of the same user sees
    /// the claim instead of paying or refunding a second time. A write that finds the record
    /// changed is retried once from a fresh read.
    ///
    /// ## Side Effects
    /// - Charges or refunds through the ledger
    /// - Writes the participation, its co-registrations and an audit row atomically
    /// - Publishes a participation change and updates the group channel membership
    ///
    /// ## Errors
    /// - `NotFound` if the occurrence does not exist
    /// - `UserNotFound`, `OccurrenceClosed` or `OccurrenceAlreadyStarted` when joining
    /// - `CapacityExceeded`, `PaymentRequired` or `PaymentFailed` on `yes`
    /// - `TransitionInProgress` while another call holds a payment claim on the record
    #[tracing::instrument(skip(self, options), fields(
        %occurrence_id,
        %user_id,
        %actor_id,
        going = %target,
        auto_charge = options.auto_charge,
        via_subscription = options.via_subscription
    ))]
    pub async fn set_going(
        &self,
        actor_id: uuid::Uuid,
        user_id: uuid::Uuid,
        occurrence_id: uuid::Uuid,
        target: Going,
        options: &SetGoingOptions,
    ) -> ServiceResult<Participation> {
        let store = &self.ctx.store;
        let occurrence = store
            .occurrence(occurrence_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("occurrence {occurrence_id}")))?;

        for attempt in 1..=TRANSITION_ATTEMPTS {
            let existing = store.participation(occurrence_id, user_id).await?;
            let outcome = self
                .transition(actor_id, user_id, &occurrence, existing, target, options)
                .await?;
            match outcome {
                Attempt::Done(stored) => return Ok(stored),
                Attempt::Stale => {
                    tracing::debug!(attempt, "Participation changed concurrently, re-reading");
                }
            }
        }
        Err(ServiceError::TransitionInProgress {
            occurrence_id,
            user_id,
        })
    }

    /// ## Summary
    /// Every participation recorded on an occurrence, oldest first.
    ///
    /// ## Errors
    /// Returns a database error if the store cannot be read.
    #[tracing::instrument(skip(self))]
    pub async fn participants(&self, occurrence_id: uuid::Uuid) -> ServiceResult<Vec<Participation>> {
        Ok(self.ctx.store.participants(occurrence_id).await?)
    }

    /// ## Summary
    /// What moving `user_id` to `yes` would be charged right now. Nothing is written.
    ///
    /// Priced exactly like a join: stored payments, payments made elsewhere, exemptions and
    /// fee-requiring co-registrants all count. A user already at `yes` owes nothing.
    ///
    /// ## Errors
    /// Returns an error if the store, directory or ledger cannot be read.
    pub(crate) async fn owed_on_join(&self, offer: &Offer<'_>, user_id: uuid::Uuid) -> ServiceResult<i64> {
        if !offer.terms.is_required() {
            return Ok(0);
        }
        let (existing, previous) = match offer.occurrence {
            Some(occurrence) => (
                self.ctx.store.participation(occurrence.id, user_id).await?,
                self.ctx.store.co_registrations(occurrence.id, user_id).await?,
            ),
            None => (None, Vec::new()),
        };
        if existing.as_ref().is_some_and(|record| record.going == Going::Yes) {
            return Ok(0);
        }

        let standing = self.standing(offer, user_id, existing.as_ref()).await?;
        let wanted = payment::requested_from(&previous);
        let plan = payment::plan_payment(&offer.terms, existing.as_ref(), &wanted, &previous, standing)?;
        Ok(plan.owed)
    }

    async fn transition(
        &self,
        actor_id: uuid::Uuid,
        user_id: uuid::Uuid,
        occurrence: &Occurrence,
        existing: Option<Participation>,
        target: Going,
        options: &SetGoingOptions,
    ) -> ServiceResult<Attempt> {
        let now = self.ctx.clock.now();

        if let Some(record) = existing.as_ref().filter(|record| record.payment_status.is_claimed()) {
            if target != Going::No {
                tracing::debug!(payment_status = %record.payment_status, "Participation is claimed");
                return Err(in_progress(record));
            }
            if record.payment_status == PaymentStatus::Refunding {
                let record = record.clone();
                return self.settle_refund(actor_id, occurrence, record, options).await;
            }
        }

        let current = existing.as_ref().map_or(Going::No, |record| record.going);
        if current == target {
            match existing {
                Some(record)
                    if target == Going::No
                        && (record.payment_status == PaymentStatus::Charging
                            || (record.holds_charge() && !occurrence.has_started(now))) =>
                {
                    tracing::debug!("Settling the payment of a cancelled participation");
                    return self.leave(actor_id, occurrence, record, options, now).await;
                }
                Some(record) => {
                    tracing::debug!("Participation already in target state");
                    return Ok(Attempt::Done(record));
                }
                None => {
                    tracing::debug!("No participation to cancel");
                    return Ok(Attempt::Done(unsaved_no(occurrence.id, user_id, now)));
                }
            }
        }

        match (target, existing) {
            (Going::No, Some(record)) => self.leave(actor_id, occurrence, record, options, now).await,
            (Going::No, None) => Ok(Attempt::Done(unsaved_no(occurrence.id, user_id, now))),
            (Going::Maybe, existing) => {
                self.ensure_joinable(occurrence, user_id, now).await?;
                self.hold(actor_id, user_id, occurrence, existing, options)
                    .await
            }
            (Going::Yes, existing) => {
                self.ensure_joinable(occurrence, user_id, now).await?;
                self.join(actor_id, user_id, occurrence, existing, options)
                    .await
            }
        }
    }

    async fn ensure_joinable(
        &self,
        occurrence: &Occurrence,
        user_id: uuid::Uuid,
        now: DateTime<Utc>,
    ) -> ServiceResult<()> {
        if !self.ctx.directory.user_exists(user_id).await? {
            tracing::warn!("Unknown user tried to join");
            return Err(ServiceError::UserNotFound(user_id));
        }
        if occurrence.is_closed() {
            return Err(ServiceError::OccurrenceClosed(occurrence.id));
        }
        if occurrence.has_started(now) {
            return Err(ServiceError::OccurrenceAlreadyStarted(occurrence.id));
        }
        Ok(())
    }

    /// Transition to `no`, refunding a held charge before the start.
    async fn leave(
        &self,
        actor_id: uuid::Uuid,
        occurrence: &Occurrence,
        existing: Participation,
        options: &SetGoingOptions,
        now: DateTime<Utc>,
    ) -> ServiceResult<Attempt> {
        let mut record = NewParticipation::from(&existing);
        record.going = Going::No;
        record.payment_status = settled_status(&existing);
        record.via_subscription = options.via_subscription;

        if existing.holds_charge() {
            if occurrence.has_started(now) {
                tracing::debug!("Occurrence already started, charge is kept");
            } else {
                return self.refund_and_leave(actor_id, occurrence, &existing, record).await;
            }
        }

        let audit = audit_row(actor_id, Some(&existing), &record, 0, occurrence);
        let write = ParticipationWrite {
            record,
            co_registrations: CoRegistrationUpdate::DropAutoJoin,
            audit,
            expected: Some(PriorState::from(&existing)),
        };
        match self.commit(occurrence, write).await? {
            Attempt::Done(stored) => self.finish_leave(occurrence, stored).await,
            Attempt::Stale => Ok(Attempt::Stale),
        }
    }

    /// ## Summary
    /// Claims the record for a refund, refunds, then settles the record.
    ///
    /// A failed refund puts the record back to `fully-paid` at `no`, so the next cancellation
    /// retries it.
    async fn refund_and_leave(
        &self,
        actor_id: uuid::Uuid,
        occurrence: &Occurrence,
        existing: &Participation,
        mut record: NewParticipation,
    ) -> ServiceResult<Attempt> {
        let amount = existing.charged_amount;
        let claim = ParticipationWrite {
            record: NewParticipation {
                payment_status: PaymentStatus::Refunding,
                charged_amount: amount,
                ..record.clone()
            },
            co_registrations: CoRegistrationUpdate::Keep,
            audit: None,
            expected: Some(PriorState::from(existing)),
        };
        let Attempt::Done(claimed) = self.commit(occurrence, claim).await? else {
            return Ok(Attempt::Stale);
        };

        let refund = RefundRequest {
            from_user_id: occurrence.publisher_id,
            to_user_id: existing.user_id,
            amount,
            currency: occurrence.payment_currency.clone(),
            reference: occurrence.payment_reference(),
        };
        let refunded = match self.ctx.ledger.refund(refund).await {
            Ok(receipt) => {
                tracing::info!(amount, transaction_id = %receipt.transaction_id, "Refund issued");
                record.payment_status = PaymentStatus::Refunded;
                record.charged_amount = 0;
                amount
            }
            Err(err) => {
                tracing::warn!(error = %err, "Refund failed, will retry on next cancellation");
                0
            }
        };

        let audit = audit_row(actor_id, Some(existing), &record, -refunded, occurrence);
        let write = ParticipationWrite {
            record,
            co_registrations: CoRegistrationUpdate::DropAutoJoin,
            audit,
            expected: Some(PriorState::from(&claimed)),
        };
        match self.ctx.store.commit_participation(write).await? {
            JoinOutcome::Committed(stored) => self.finish_leave(occurrence, stored).await,
            JoinOutcome::Conflict(Some(current))
                if current.payment_status == PaymentStatus::Refunded =>
            {
                tracing::debug!("Refund was settled by a concurrent cancellation");
                self.finish_leave(occurrence, current).await
            }
            JoinOutcome::Conflict(_) => {
                tracing::error!(refunded, "Refund claim was overwritten");
                Err(in_progress(existing))
            }
            JoinOutcome::CapacityExceeded {
                capacity_max,
                going,
            } => Err(ServiceError::CapacityExceeded {
                occurrence_id: occurrence.id,
                capacity_max,
                going,
            }),
        }
    }

    /// ## Summary
    /// Cancels a record left in `refunding`, without refunding a second time.
    ///
    /// The ledger decides: once it no longer reports the payment the refund went through and
    /// the record is settled as `refunded`. While it still does, the refund is in flight or was
    /// lost, and the record is returned unchanged.
    async fn settle_refund(
        &self,
        actor_id: uuid::Uuid,
        occurrence: &Occurrence,
        existing: Participation,
        options: &SetGoingOptions,
    ) -> ServiceResult<Attempt> {
        let still_paid = self
            .ctx
            .ledger
            .check_paid(existing.user_id, &occurrence.payment_reference())
            .await
            .map_err(ServiceError::PaymentFailed)?;
        if still_paid {
            tracing::warn!(amount = existing.charged_amount, "Refund still pending on the ledger");
            return Ok(Attempt::Done(existing));
        }

        let mut record = NewParticipation::from(&existing);
        record.payment_status = PaymentStatus::Refunded;
        record.charged_amount = 0;
        record.via_subscription = options.via_subscription;

        let paid = Participation {
            payment_status: PaymentStatus::FullyPaid,
            ..existing.clone()
        };
        let audit = audit_row(actor_id, Some(&paid), &record, -existing.charged_amount, occurrence);
        let write = ParticipationWrite {
            record,
            co_registrations: CoRegistrationUpdate::DropAutoJoin,
            audit,
            expected: Some(PriorState::from(&existing)),
        };
        match self.commit(occurrence, write).await? {
            Attempt::Done(stored) => {
                tracing::info!("Interrupted refund settled");
                self.finish_leave(occurrence, stored).await
            }
            Attempt::Stale => Ok(Attempt::Stale),
        }
    }

    async fn finish_leave(&self, occurrence: &Occurrence, stored: Participation) -> ServiceResult<Attempt> {
        if let Some(group_id) = occurrence.group_id
            && self.ctx.store.active_in_group(stored.user_id, group_id).await? == 0
        {
            self.ctx.bus.unsubscribe_from_group(stored.user_id, group_id);
        }

        tracing::info!(payment_status = %stored.payment_status, "Participation cancelled");
        self.publish_change(&stored);
        Ok(Attempt::Done(stored))
    }

    /// Transition to `maybe`: no capacity or payment gating.
    async fn hold(
        &self,
        actor_id: uuid::Uuid,
        user_id: uuid::Uuid,
        occurrence: &Occurrence,
        existing: Option<Participation>,
        options: &SetGoingOptions,
    ) -> ServiceResult<Attempt> {
        let previous = self
            .ctx
            .store
            .co_registrations(occurrence.id, user_id)
            .await?;
        let mut record = base_record(occurrence.id, user_id, existing.as_ref(), options);
        record.going = Going::Maybe;

        let co_registrations = match &options.co_registrants {
            Some(wanted) => CoRegistrationUpdate::Replace(payment::co_registration_rows(
                occurrence.id,
                user_id,
                wanted,
                &previous,
                false,
                options.via_subscription,
            )),
            None => CoRegistrationUpdate::Keep,
        };
        let audit = audit_row(actor_id, existing.as_ref(), &record, 0, occurrence);
        let write = ParticipationWrite {
            record,
            co_registrations,
            audit,
            expected: existing.as_ref().map(PriorState::from),
        };
        let Attempt::Done(stored) = self.commit(occurrence, write).await? else {
            return Ok(Attempt::Stale);
        };

        self.track_group(occurrence, user_id).await?;
        tracing::info!("Participation tentative");
        self.publish_change(&stored);
        Ok(Attempt::Done(stored))
    }

    /// ## Summary
    /// Transition to `yes`, gated on capacity and payment.
    ///
    /// When something is owed the record is claimed as `charging` before the ledger is called,
    /// and the final write is conditional on that claim. A charge that cannot be used is
    /// refunded and the claim released.
    async fn join(
        &self,
        actor_id: uuid::Uuid,
        user_id: uuid::Uuid,
        occurrence: &Occurrence,
        existing: Option<Participation>,
        options: &SetGoingOptions,
    ) -> ServiceResult<Attempt> {
        let store = &self.ctx.store;

        // Cheap early answer; the commit below re-checks atomically.
        let going = store.count_going(occurrence.id).await?;
        if !occurrence.capacity().has_room(going) {
            return Err(capacity_exceeded(occurrence, going));
        }

        let previous = store.co_registrations(occurrence.id, user_id).await?;
        let wanted = options
            .co_registrants
            .clone()
            .unwrap_or_else(|| payment::requested_from(&previous));

        let offer = Offer::for_occurrence(occurrence);
        let standing = self.standing(&offer, user_id, existing.as_ref()).await?;
        let plan = payment::plan_payment(&offer.terms, existing.as_ref(), &wanted, &previous, standing)?;
        tracing::debug!(owed = plan.owed, status = %plan.status, "Payment planned");

        if plan.owed > 0 && !options.auto_charge {
            return Err(ServiceError::PaymentRequired {
                amount: plan.owed,
                currency: offer.terms.currency,
            });
        }

        let mut record = base_record(occurrence.id, user_id, existing.as_ref(), options);
        record.going = Going::Yes;
        record.payment_status = plan.status;
        record.charged_amount = plan.charged_amount;

        let co_registrations = if options.co_registrants.is_some() || plan.settles_co_registrants {
            CoRegistrationUpdate::Replace(payment::co_registration_rows(
                occurrence.id,
                user_id,
                &wanted,
                &previous,
                plan.settles_co_registrants,
                options.via_subscription,
            ))
        } else {
            CoRegistrationUpdate::Keep
        };
        let audit = audit_row(actor_id, existing.as_ref(), &record, plan.owed, occurrence);
        let mut write = ParticipationWrite {
            record,
            co_registrations,
            audit,
            expected: existing.as_ref().map(PriorState::from),
        };

        if plan.owed == 0 {
            return match self.commit(occurrence, write).await? {
                Attempt::Done(stored) => self.finish_join(occurrence, stored).await,
                Attempt::Stale => Ok(Attempt::Stale),
            };
        }

        let claim = ParticipationWrite {
            record: NewParticipation {
                payment_status: PaymentStatus::Charging,
                ..existing.as_ref().map_or_else(
                    || NewParticipation::attendee(occurrence.id, user_id),
                    NewParticipation::from,
                )
            },
            co_registrations: CoRegistrationUpdate::Keep,
            audit: None,
            expected: existing.as_ref().map(PriorState::from),
        };
        let Attempt::Done(claimed) = self.commit(occurrence, claim).await? else {
            return Ok(Attempt::Stale);
        };

        if let Err(err) = self.charge(occurrence, user_id, plan.owed).await {
            self.release_claim(occurrence, &claimed, existing.as_ref()).await;
            return Err(err);
        }

        write.expected = Some(PriorState::from(&claimed));
        match store.commit_participation(write).await? {
            JoinOutcome::Committed(stored) => self.finish_join(occurrence, stored).await,
            JoinOutcome::CapacityExceeded {
                capacity_max,
                going,
            } => {
                tracing::warn!(capacity_max, going, "Occurrence filled up while joining");
                self.refund_unused_charge(occurrence, user_id, plan).await;
                self.release_claim(occurrence, &claimed, existing.as_ref()).await;
                Err(ServiceError::CapacityExceeded {
                    occurrence_id: occurrence.id,
                    capacity_max,
                    going,
                })
            }
            JoinOutcome::Conflict(_) => {
                tracing::warn!("Participation changed while charging");
                self.refund_unused_charge(occurrence, user_id, plan).await;
                Err(in_progress(&claimed))
            }
        }
    }

    async fn finish_join(&self, occurrence: &Occurrence, stored: Participation) -> ServiceResult<Attempt> {
        self.track_group(occurrence, stored.user_id).await?;
        tracing::info!(payment_status = %stored.payment_status, "Participation confirmed");
        self.publish_change(&stored);
        Ok(Attempt::Done(stored))
    }

    async fn standing(
        &self,
        offer: &Offer<'_>,
        user_id: uuid::Uuid,
        existing: Option<&Participation>,
    ) -> ServiceResult<PayerStanding> {
        if !offer.terms.is_required() {
            return Ok(PayerStanding::default());
        }

        let exempt = user_id == offer.publisher_id
            || self
                .ctx
                .directory
                .is_admin(user_id, offer.community_id)
                .await?;
        let already_paid = existing.is_some_and(|record| record.payment_status == PaymentStatus::FullyPaid);
        let paid_externally = match offer.occurrence {
            Some(occurrence) if !exempt && !already_paid => self
                .ctx
                .ledger
                .check_paid(user_id, &occurrence.payment_reference())
                .await
                .map_err(ServiceError::PaymentFailed)?,
            _ => false,
        };

        Ok(PayerStanding {
            exempt,
            paid_externally,
        })
    }

    async fn charge(
        &self,
        occurrence: &Occurrence,
        user_id: uuid::Uuid,
        amount: i64,
    ) -> ServiceResult<()> {
        let request = ChargeRequest {
            user_id,
            amount,
            currency: occurrence.payment_currency.clone(),
            reason: occurrence.title.clone(),
            reference: occurrence.payment_reference(),
        };
        match self.ctx.ledger.charge(request).await {
            Ok(receipt) => {
                tracing::info!(amount, transaction_id = %receipt.transaction_id, "Charge taken");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "Charge failed");
                Err(ServiceError::PaymentFailed(err))
            }
        }
    }

    /// Gives back a charge taken for a join that could not be committed.
    async fn refund_unused_charge(&self, occurrence: &Occurrence, user_id: uuid::Uuid, plan: PaymentPlan) {
        let refund = RefundRequest {
            from_user_id: occurrence.publisher_id,
            to_user_id: user_id,
            amount: plan.owed,
            currency: occurrence.payment_currency.clone(),
            reference: occurrence.payment_reference(),
        };
        if let Err(err) = self.ctx.ledger.refund(refund).await {
            tracing::error!(error = %err, amount = plan.owed, "Could not refund charge of rejected join");
        }
    }

    /// Puts a `charging` claim back to the state it was taken from.
    async fn release_claim(&self, occurrence: &Occurrence, claimed: &Participation, before: Option<&Participation>) {
        let record = before.map_or_else(
            || NewParticipation::attendee(occurrence.id, claimed.user_id),
            NewParticipation::from,
        );
        let write = ParticipationWrite {
            record,
            co_registrations: CoRegistrationUpdate::Keep,
            audit: None,
            expected: Some(PriorState::from(claimed)),
        };
        match self.ctx.store.commit_participation(write).await {
            Ok(JoinOutcome::Committed(_)) => tracing::debug!("Charge claim released"),
            Ok(outcome) => tracing::debug!(?outcome, "Charge claim already replaced"),
            Err(err) => tracing::error!(error = %err, "Could not release charge claim"),
        }
    }

    async fn commit(
        &self,
        occurrence: &Occurrence,
        write: ParticipationWrite,
    ) -> ServiceResult<Attempt> {
        match self.ctx.store.commit_participation(write).await? {
            JoinOutcome::Committed(stored) => Ok(Attempt::Done(stored)),
            JoinOutcome::Conflict(_) => Ok(Attempt::Stale),
            JoinOutcome::CapacityExceeded {
                capacity_max,
                going,
            } => Err(ServiceError::CapacityExceeded {
                occurrence_id: occurrence.id,
                capacity_max,
                going,
            }),
        }
    }

    /// Keeps a joining user subscribed to the occurrence's group.
    async fn track_group(&self, occurrence: &Occurrence, user_id: uuid::Uuid) -> ServiceResult<()> {
        let Some(group_id) = occurrence.group_id else {
            return Ok(());
        };
        if self.ctx.store.ensure_subscription(user_id, group_id).await? {
            tracing::debug!(%group_id, "Created subscription on first join");
        }
        self.ctx.bus.subscribe_to_group(user_id, group_id);
        Ok(())
    }

    fn publish_change(&self, record: &Participation) {
        self.ctx.bus.publish(NotificationEvent {
            occurrence_id: record.occurrence_id,
            kind: EventKind::ParticipationChanged,
            payload: serde_json::json!({
                "user_id": record.user_id,
                "going": record.going.as_str(),
                "payment_status": record.payment_status.as_str(),
            }),
        });
    }
}

/// The stored record adjusted for a new transition, or a fresh attendee record.
fn base_record(
    occurrence_id: uuid::Uuid,
    user_id: uuid::Uuid,
    existing: Option<&Participation>,
    options: &SetGoingOptions,
) -> NewParticipation {
    let mut record = existing.map_or_else(
        || NewParticipation::attendee(occurrence_id, user_id),
        NewParticipation::from,
    );
    if let Some(roles) = &options.roles {
        record.roles.clone_from(roles);
    }
    if record.roles.is_empty() {
        record.roles = vec![ParticipantRole::Attendee];
    }
    record.via_subscription = options.via_subscription;
    record
}

fn unsaved_no(occurrence_id: uuid::Uuid, user_id: uuid::Uuid, now: DateTime<Utc>) -> Participation {
    let record = NewParticipation::attendee(occurrence_id, user_id);
    Participation {
        occurrence_id,
        user_id,
        going: record.going,
        payment_status: record.payment_status,
        roles: record.roles,
        charged_amount: record.charged_amount,
        via_subscription: record.via_subscription,
        created_at: now,
        updated_at: now,
    }
}

/// The status a record settles to when a `no` leaves its payment alone.
fn settled_status(record: &Participation) -> PaymentStatus {
    match record.payment_status {
        PaymentStatus::Charging if record.charged_amount > 0 => PaymentStatus::FullyPaid,
        PaymentStatus::Charging => PaymentStatus::None,
        other => other,
    }
}

fn in_progress(record: &Participation) -> ServiceError {
    ServiceError::TransitionInProgress {
        occurrence_id: record.occurrence_id,
        user_id: record.user_id,
    }
}

fn capacity_exceeded(occurrence: &Occurrence, going: i64) -> ServiceError {
    ServiceError::CapacityExceeded {
        occurrence_id: occurrence.id,
        capacity_max: occurrence.capacity_max.unwrap_or(i32::MAX),
        going,
    }
}

/// An audit row when the transition changes the payment status.
fn audit_row(
    actor_id: uuid::Uuid,
    before: Option<&Participation>,
    after: &NewParticipation,
    amount: i64,
    occurrence: &Occurrence,
) -> Option<NewParticipationAudit> {
    let (from_going, from_payment) = before.map_or((Going::No, PaymentStatus::None), |record| {
        (record.going, record.payment_status)
    });
    (from_payment != after.payment_status).then(|| NewParticipationAudit {
        id: uuid::Uuid::now_v7(),
        occurrence_id: after.occurrence_id,
        user_id: after.user_id,
        actor_id,
        from_going,
        to_going: after.going,
        from_payment,
        to_payment: after.payment_status,
        amount,
        currency: occurrence.payment_currency.clone(),
    })
}
