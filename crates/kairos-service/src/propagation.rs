//! Applies standing subscriptions to occurrences of their group.

use kairos_core::schedule::DayKey;
use kairos_db::db::enums::Going;
use kairos_db::model::group::RecurrenceGroup;
use kairos_db::model::occurrence::Occurrence;
use kairos_db::model::subscription::Subscription;

use crate::context::EngineContext;
use crate::error::ServiceResult;
use crate::participation::{ParticipationEngine, SetGoingOptions};

/// What propagation did for one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberOutcome {
    Joined,
    /// An earlier automatic join was withdrawn because the subscription no longer selects the
    /// occurrence.
    Released,
    Skipped,
}

#[derive(Debug)]
pub struct SubscriberFailure {
    pub user_id: uuid::Uuid,
    pub error: crate::error::ServiceError,
}

#[derive(Debug, Default)]
pub struct PropagationReport {
    pub occurrence_id: uuid::Uuid,
    pub joined: Vec<uuid::Uuid>,
    pub released: Vec<uuid::Uuid>,
    pub skipped: Vec<uuid::Uuid>,
    pub failures: Vec<SubscriberFailure>,
}

#[derive(Clone, Debug)]
pub struct SubscriptionPropagator {
    ctx: EngineContext,
    engine: ParticipationEngine,
}

impl SubscriptionPropagator {
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        let engine = ParticipationEngine::new(ctx.clone());
        Self { ctx, engine }
    }

    /// ## Summary
    /// Joins every subscriber whose days select the occurrence.
    ///
    /// Subscribers that do not select it are left alone, except that a participation the
    /// subscription itself created earlier is withdrawn. Failures are collected per subscriber
    /// and never stop the batch.
    ///
    /// ## Side Effects
    /// Clears the occurrence's pending propagation once every subscriber has been visited. A call
    /// that fails before that leaves it pending, and the next pass propagates again.
    ///
    /// ## Errors
    /// Returns an error only if the subscriptions cannot be read or the occurrence's timezone
    /// is unknown.
    #[tracing::instrument(skip(self, group, occurrence), fields(
        group_id = %group.id,
        occurrence_id = %occurrence.id
    ))]
    pub async fn propagate(
        &self,
        group: &RecurrenceGroup,
        occurrence: &Occurrence,
    ) -> ServiceResult<PropagationReport> {
        let subscriptions = self.ctx.store.subscriptions_for_group(group.id).await?;
        tracing::debug!(count = subscriptions.len(), "Propagating subscriptions");

        let mut report = PropagationReport {
            occurrence_id: occurrence.id,
            ..PropagationReport::default()
        };
        for subscription in &subscriptions {
            match self.propagate_subscription(group, subscription, occurrence).await {
                Ok(SubscriberOutcome::Joined) => report.joined.push(subscription.user_id),
                Ok(SubscriberOutcome::Released) => report.released.push(subscription.user_id),
                Ok(SubscriberOutcome::Skipped) => report.skipped.push(subscription.user_id),
                Err(error) => {
                    tracing::warn!(user_id = %subscription.user_id, %error, "Subscriber could not be propagated");
                    report.failures.push(SubscriberFailure {
                        user_id: subscription.user_id,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            joined = report.joined.len(),
            released = report.released.len(),
            failed = report.failures.len(),
            "Propagation finished"
        );
        self.ctx.store.mark_propagated(occurrence.id).await?;
        Ok(report)
    }

    /// ## Summary
    /// Applies one subscription to one occurrence.
    ///
    /// The occurrence's day key and start time are taken in the occurrence's own timezone.
    /// Subscriptions whose validity window does not cover today are skipped.
    ///
    /// ## Errors
    /// Returns the participation error of the subscriber, or a validation error if stored data
    /// cannot be decoded.
    pub async fn propagate_subscription(
        &self,
        group: &RecurrenceGroup,
        subscription: &Subscription,
        occurrence: &Occurrence,
    ) -> ServiceResult<SubscriberOutcome> {
        let tz = occurrence.tz()?;
        let today = self.ctx.clock.now().with_timezone(&tz).date_naive();
        if !subscription.covers(today) {
            tracing::trace!(user_id = %subscription.user_id, "Subscription not active today");
            return Ok(SubscriberOutcome::Skipped);
        }

        let local_start = occurrence.local_start()?;
        let key = DayKey::for_date(local_start.date(), group.period.day_key_kind());
        let days = subscription.recurrence_days()?;
        let user_id = subscription.user_id;

        if days.selects(key, local_start.time()) {
            let options = SetGoingOptions::for_subscription(subscription.co_registrants()?);
            self.engine
                .set_going(user_id, user_id, occurrence.id, Going::Yes, &options)
                .await?;
            return Ok(SubscriberOutcome::Joined);
        }

        let auto_joined = self
            .ctx
            .store
            .participation(occurrence.id, user_id)
            .await?
            .is_some_and(|record| record.via_subscription && record.going.is_active());
        if auto_joined {
            let options = SetGoingOptions {
                via_subscription: true,
                ..SetGoingOptions::default()
            };
            self.engine
                .set_going(user_id, user_id, occurrence.id, Going::No, &options)
                .await?;
            return Ok(SubscriberOutcome::Released);
        }

        Ok(SubscriberOutcome::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;
    use kairos_core::schedule::{RecurrenceDays, TimeSlot};
    use kairos_db::db::enums::{PaymentStatus, PaymentType};
    use kairos_db::model::subscription::{CoRegistrant, NewSubscription};
    use kairos_db::store::{OccurrenceStore, ParticipationStore, SubscriptionStore};

    use super::*;
    use crate::testing::{Harness, date, utc};

    fn slot(start: &str, end: &str) -> TimeSlot {
        TimeSlot::parse(start, end).expect("valid slot")
    }

    async fn subscribe(
        harness: &Harness,
        group: &RecurrenceGroup,
        days: &RecurrenceDays,
        co_registrants: &[CoRegistrant],
    ) -> uuid::Uuid {
        let user = uuid::Uuid::now_v7();
        let new = NewSubscription::new(user, group.id, days, (None, None), co_registrants)
            .expect("encodable");
        harness
            .store
            .upsert_subscription(new)
            .await
            .expect("stored");
        user
    }

    /// Wednesday 2026-10-14 18:00 in Berlin.
    async fn wednesday_evening(harness: &Harness, group: &RecurrenceGroup, payment: (PaymentType, i64)) -> Occurrence {
        let mut new = harness.new_occurrence(utc(2026, 10, 14, 16, 0));
        new.group_id = Some(group.id);
        new.payment_type = payment.0;
        new.payment_amount = payment.1;
        harness.occurrence(new).await
    }

    /// ## Summary
    /// A whole-day subscription joins its owner to a free occurrence on that day.
    #[test_log::test(tokio::test)]
    async fn whole_day_subscription_joins_free_occurrence() {
        let harness = Harness::new(utc(2026, 10, 12, 9, 0));
        let group = harness
            .group(&RecurrenceDays::single(
                DayKey::Weekday(Weekday::Wed),
                slot("18:00", "19:00"),
            ))
            .await;
        let subscriber = subscribe(
            &harness,
            &group,
            &RecurrenceDays::whole_day(DayKey::Weekday(Weekday::Wed)),
            &[],
        )
        .await;
        let occurrence = wednesday_evening(&harness, &group, (PaymentType::Free, 0)).await;

        let report = SubscriptionPropagator::new(harness.ctx.clone())
            .propagate(&group, &occurrence)
            .await
            .expect("propagated");

        assert_eq!(report.joined, vec![subscriber]);
        let record = harness
            .store
            .participation(occurrence.id, subscriber)
            .await
            .expect("readable")
            .expect("joined");
        assert_eq!(record.going, Going::Yes);
        assert!(record.via_subscription);
        assert!(harness.ledger.charges().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn slot_subscription_matches_local_start_only() {
        let harness = Harness::new(utc(2026, 10, 12, 9, 0));
        let group = harness
            .group(
                &[(
                    DayKey::Weekday(Weekday::Wed),
                    vec![slot("9:00", "10:00"), slot("18:00", "19:00")],
                )]
                .into_iter()
                .collect(),
            )
            .await;
        let evening = subscribe(
            &harness,
            &group,
            &RecurrenceDays::single(DayKey::Weekday(Weekday::Wed), slot("18:00", "19:00")),
            &[],
        )
        .await;
        let morning = subscribe(
            &harness,
            &group,
            &RecurrenceDays::single(DayKey::Weekday(Weekday::Wed), slot("09:00", "10:00")),
            &[],
        )
        .await;
        let thursday = subscribe(
            &harness,
            &group,
            &RecurrenceDays::whole_day(DayKey::Weekday(Weekday::Thu)),
            &[],
        )
        .await;
        let occurrence = wednesday_evening(&harness, &group, (PaymentType::Free, 0)).await;

        let report = SubscriptionPropagator::new(harness.ctx.clone())
            .propagate(&group, &occurrence)
            .await
            .expect("propagated");

        assert_eq!(report.joined, vec![evening]);
        assert!(report.skipped.contains(&morning));
        assert!(report.skipped.contains(&thursday));
        assert!(
            harness
                .store
                .participation(occurrence.id, morning)
                .await
                .expect("readable")
                .is_none()
        );
    }

    /// ## Summary
    /// One subscriber's declined charge does not stop the others from being joined.
    #[test_log::test(tokio::test)]
    async fn failed_charge_is_isolated() {
        let harness = Harness::new(utc(2026, 10, 12, 9, 0));
        let group = harness
            .group(&RecurrenceDays::whole_day(DayKey::Weekday(Weekday::Wed)))
            .await;
        let whole_day = RecurrenceDays::whole_day(DayKey::Weekday(Weekday::Wed));
        let admin = subscribe(&harness, &group, &whole_day, &[]).await;
        let payer = subscribe(&harness, &group, &whole_day, &[]).await;
        harness.directory.grant_admin(admin, harness.community_id);
        harness.ledger.decline_charges(true);
        let occurrence = wednesday_evening(&harness, &group, (PaymentType::Required, 10)).await;

        let report = SubscriptionPropagator::new(harness.ctx.clone())
            .propagate(&group, &occurrence)
            .await
            .expect("propagated");

        assert_eq!(report.joined, vec![admin]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].user_id, payer);
        assert!(matches!(
            report.failures[0].error,
            crate::error::ServiceError::PaymentFailed(_)
        ));
        let admin_record = harness
            .store
            .participation(occurrence.id, admin)
            .await
            .expect("readable")
            .expect("joined");
        assert_eq!(admin_record.payment_status, PaymentStatus::Reserved);
    }

    #[test_log::test(tokio::test)]
    async fn expired_subscription_is_skipped() {
        let harness = Harness::new(utc(2026, 10, 12, 9, 0));
        let whole_day = RecurrenceDays::whole_day(DayKey::Weekday(Weekday::Wed));
        let group = harness.group(&whole_day).await;
        let user = uuid::Uuid::now_v7();
        let new = NewSubscription::new(
            user,
            group.id,
            &whole_day,
            (None, Some(date(2026, 10, 1))),
            &[],
        )
        .expect("encodable");
        harness.store.upsert_subscription(new).await.expect("stored");
        let occurrence = wednesday_evening(&harness, &group, (PaymentType::Free, 0)).await;

        let report = SubscriptionPropagator::new(harness.ctx.clone())
            .propagate(&group, &occurrence)
            .await
            .expect("propagated");
        assert_eq!(report.skipped, vec![user]);
    }

    #[test_log::test(tokio::test)]
    async fn automatic_join_is_released_when_days_change() {
        let harness = Harness::new(utc(2026, 10, 12, 9, 0));
        let whole_day = RecurrenceDays::whole_day(DayKey::Weekday(Weekday::Wed));
        let group = harness.group(&whole_day).await;
        let user = subscribe(&harness, &group, &whole_day, &[]).await;
        let occurrence = wednesday_evening(&harness, &group, (PaymentType::Free, 0)).await;
        let propagator = SubscriptionPropagator::new(harness.ctx.clone());
        propagator
            .propagate(&group, &occurrence)
            .await
            .expect("propagated");

        let friday = RecurrenceDays::whole_day(DayKey::Weekday(Weekday::Fri));
        let new = NewSubscription::new(user, group.id, &friday, (None, None), &[])
            .expect("encodable");
        let subscription = harness.store.upsert_subscription(new).await.expect("stored");

        let outcome = propagator
            .propagate_subscription(&group, &subscription, &occurrence)
            .await
            .expect("applied");
        assert_eq!(outcome, SubscriberOutcome::Released);
        let record = harness
            .store
            .participation(occurrence.id, user)
            .await
            .expect("readable")
            .expect("kept");
        assert_eq!(record.going, Going::No);
    }

    #[test_log::test(tokio::test)]
    async fn propagation_clears_pending_flag() {
        let harness = Harness::new(utc(2026, 10, 12, 9, 0));
        let group = harness
            .group(&RecurrenceDays::single(
                DayKey::Weekday(Weekday::Wed),
                slot("18:00", "19:00"),
            ))
            .await;
        subscribe(
            &harness,
            &group,
            &RecurrenceDays::whole_day(DayKey::Weekday(Weekday::Wed)),
            &[],
        )
        .await;
        let mut new = harness.new_occurrence(utc(2026, 10, 14, 16, 0));
        new.group_id = Some(group.id);
        new.propagation_pending = true;
        let occurrence = harness.occurrence(new).await;
        assert!(!occurrence.is_propagated());

        SubscriptionPropagator::new(harness.ctx.clone())
            .propagate(&group, &occurrence)
            .await
            .expect("propagated");

        let stored = harness
            .store
            .occurrence(occurrence.id)
            .await
            .expect("readable")
            .expect("exists");
        assert!(stored.is_propagated());
    }
}
