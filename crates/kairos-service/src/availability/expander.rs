//! Expands a template's slot catalog into concrete occurrences for the coming week.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use kairos_core::schedule::{DayKey, RecurrenceDays, TimeSlot};
use kairos_db::db::enums::Going;
use kairos_db::model::group::RecurrenceGroup;
use kairos_db::model::occurrence::{NewOccurrence, Occurrence, OccurrenceKey};
use kairos_db::model::template::AvailabilityTemplate;
use kairos_db::model::terms::Location;

use crate::context::EngineContext;
use crate::error::{ServiceError, ServiceResult};
use crate::notify::{EventKind, NotificationEvent};
use crate::participation::{Offer, ParticipationEngine, SetGoingOptions};
use crate::propagation::SubscriptionPropagator;
use crate::recurrence::{SlotMatch, next_slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaterializeMode {
    #[default]
    Commit,
    /// Only work out what the user would be charged; nothing is written.
    PaymentCheck,
}

#[derive(Debug, Clone, Default)]
pub struct MaterializeRequest {
    pub template_id: uuid::Uuid,
    /// Slots to book. `None` means the catalog, narrowed to the days active subscriptions want.
    pub requested_slots: Option<RecurrenceDays>,
    pub user_id: Option<uuid::Uuid>,
    pub mode: MaterializeMode,
    /// Join `user_id` to every materialized occurrence.
    pub auto_join: bool,
    pub auto_charge: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentQuote {
    pub required_amount: i64,
    pub currency: String,
    pub slot_count: usize,
}

#[derive(Debug)]
pub struct SlotFailure {
    pub key: DayKey,
    pub slot: TimeSlot,
    pub error: ServiceError,
}

#[derive(Debug)]
pub enum MaterializeOutcome {
    Committed {
        occurrences: Vec<Occurrence>,
        failures: Vec<SlotFailure>,
    },
    Quote(PaymentQuote),
}

/// One catalog slot resolved to its next start.
struct ResolvedSlot {
    key: DayKey,
    slot: TimeSlot,
    found: SlotMatch,
}

#[derive(Clone, Debug)]
pub struct AvailabilityExpander {
    ctx: EngineContext,
    propagator: SubscriptionPropagator,
    engine: ParticipationEngine,
}

impl AvailabilityExpander {
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            propagator: SubscriptionPropagator::new(ctx.clone()),
            engine: ParticipationEngine::new(ctx.clone()),
            ctx,
        }
    }

    /// ## Summary
    /// Resolves the requested slots to their next starts within the booking horizon and either
    /// materializes them or quotes their price.
    ///
    /// A whole-day entry in `requested_slots` stands for every catalog slot on that day.
    /// Existing occurrences are reused, so each slot start is materialized at most once.
    ///
    /// ## Side Effects
    /// In commit mode:
    /// - Creates missing occurrences linked to the template and its group
    /// - Publishes newly created occurrences
    /// - Propagates subscriptions to occurrences not yet stamped as propagated
    /// - Joins `user_id` when `auto_join` is set
    ///
    /// ## Errors
    /// Returns `NotFound` for an unknown template and a validation error for a closed template
    /// or a request outside the catalog. Per-slot failures are reported in the outcome.
    #[tracing::instrument(skip(self, request), fields(
        template_id = %request.template_id,
        user_id = ?request.user_id,
        mode = ?request.mode
    ))]
    pub async fn materialize(&self, request: MaterializeRequest) -> ServiceResult<MaterializeOutcome> {
        let store = &self.ctx.store;
        let template = store
            .template(request.template_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("availability template {}", request.template_id))
            })?;
        if template.is_closed() {
            return Err(ServiceError::ValidationError(format!(
                "availability template {} is closed",
                template.id
            )));
        }
        let group = store
            .group_for_template(template.id)
            .await?
            .ok_or(ServiceError::InvariantViolation(
                "availability template without recurrence group",
            ))?;
        let catalog = template.catalog()?;
        let tz = template.tz()?;

        let wanted = match &request.requested_slots {
            Some(requested) => {
                requested.validate_subset_of(&catalog)?;
                catalog.restricted_to([requested])
            }
            None => {
                let selections = self.active_selections(&group, tz).await?;
                if selections.is_empty() {
                    catalog
                } else {
                    catalog.restricted_to(&selections)
                }
            }
        };

        let resolved = self.resolve(&wanted, tz, self.ctx.clock.now());
        tracing::debug!(slots = resolved.len(), "Slots resolved");

        match request.mode {
            MaterializeMode::PaymentCheck => {
                let user_id = request.user_id.ok_or_else(|| {
                    ServiceError::ValidationError("a payment check needs a user".to_string())
                })?;
                let quote = self.quote(&template, user_id, &resolved).await?;
                Ok(MaterializeOutcome::Quote(quote))
            }
            MaterializeMode::Commit => {
                Ok(self.commit(&template, &group, &request, tz, resolved).await)
            }
        }
    }

    /// ## Summary
    /// The catalog slots that active, non-empty subscriptions of the template's group select.
    ///
    /// ## Errors
    /// Returns an error if the template or its subscriptions cannot be read.
    pub async fn subscribed_slots(&self, group: &RecurrenceGroup) -> ServiceResult<RecurrenceDays> {
        let Some(template_id) = group.template_id else {
            return Ok(RecurrenceDays::new());
        };
        let template = self
            .ctx
            .store
            .template(template_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("availability template {template_id}")))?;
        let selections = self.active_selections(group, template.tz()?).await?;
        Ok(template.catalog()?.restricted_to(&selections))
    }

    /// Day selections of the subscriptions active today that name at least one day.
    async fn active_selections(
        &self,
        group: &RecurrenceGroup,
        tz: Tz,
    ) -> ServiceResult<Vec<RecurrenceDays>> {
        let today = self.ctx.clock.now().with_timezone(&tz).date_naive();
        let subscriptions = self.ctx.store.subscriptions_for_group(group.id).await?;

        let mut selections = Vec::new();
        for subscription in subscriptions.iter().filter(|s| s.covers(today)) {
            match subscription.recurrence_days() {
                Ok(days) if !days.is_empty() => selections.push(days),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(user_id = %subscription.user_id, error = %err, "Skipping malformed subscription");
                }
            }
        }
        Ok(selections)
    }

    fn resolve(&self, wanted: &RecurrenceDays, tz: Tz, now: DateTime<Utc>) -> Vec<ResolvedSlot> {
        let horizon = self.ctx.settings.booking_horizon_days;
        wanted
            .pairs()
            .filter_map(|(key, slot)| {
                let found = next_slot(&RecurrenceDays::single(key, slot), tz, now, horizon).found();
                if found.is_none() {
                    tracing::warn!(%key, %slot, horizon, "Slot has no start within horizon");
                }
                found.map(|found| ResolvedSlot { key, slot, found })
            })
            .collect()
    }

    /// ## Summary
    /// Sums what joining each resolved slot would charge `user_id`.
    ///
    /// Slots that already have an occurrence are priced against it, so stored and external
    /// payments and the user's co-registrants count as they would on a real join.
    async fn quote(
        &self,
        template: &AvailabilityTemplate,
        user_id: uuid::Uuid,
        resolved: &[ResolvedSlot],
    ) -> ServiceResult<PaymentQuote> {
        let terms = template.payment_terms();
        let mut required_amount: i64 = 0;
        for item in resolved {
            let key = OccurrenceKey::Template {
                template_id: template.id,
                start_time: item.found.start,
            };
            let occurrence = self.ctx.store.find_occurrence(key).await?;
            let offer = match &occurrence {
                Some(occurrence) => Offer::for_occurrence(occurrence),
                None => Offer {
                    terms: terms.clone(),
                    publisher_id: template.publisher_id,
                    community_id: template.community_id,
                    occurrence: None,
                },
            };
            let owed = self.engine.owed_on_join(&offer, user_id).await?;
            required_amount = required_amount
                .checked_add(owed)
                .ok_or(ServiceError::InvariantViolation("payment amount overflow"))?;
        }

        tracing::debug!(required_amount, slot_count = resolved.len(), "Payment quoted");
        Ok(PaymentQuote {
            required_amount,
            currency: terms.currency,
            slot_count: resolved.len(),
        })
    }

    async fn commit(
        &self,
        template: &AvailabilityTemplate,
        group: &RecurrenceGroup,
        request: &MaterializeRequest,
        tz: Tz,
        resolved: Vec<ResolvedSlot>,
    ) -> MaterializeOutcome {
        let mut occurrences = Vec::with_capacity(resolved.len());
        let mut failures = Vec::new();

        for item in resolved {
            let result = self.commit_slot(template, group, request, tz, &item).await;
            match result {
                Ok(occurrence) => occurrences.push(occurrence),
                Err(error) => {
                    tracing::warn!(key = %item.key, slot = %item.slot, %error, "Slot not materialized");
                    failures.push(SlotFailure {
                        key: item.key,
                        slot: item.slot,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            occurrences = occurrences.len(),
            failed = failures.len(),
            "Availability expanded"
        );
        MaterializeOutcome::Committed {
            occurrences,
            failures,
        }
    }

    async fn commit_slot(
        &self,
        template: &AvailabilityTemplate,
        group: &RecurrenceGroup,
        request: &MaterializeRequest,
        tz: Tz,
        item: &ResolvedSlot,
    ) -> ServiceResult<Occurrence> {
        let new = NewOccurrence {
            id: uuid::Uuid::now_v7(),
            group_id: Some(group.id),
            template_id: Some(template.id),
            publisher_id: template.publisher_id,
            community_id: template.community_id,
            title: template.title.clone(),
            labels: Vec::new(),
            start_time: item.found.start,
            end_time: item.found.end(tz),
            timezone: template.timezone.clone(),
            capacity_min: template.capacity_min,
            capacity_max: template.capacity_max,
            payment_type: template.payment_type,
            payment_amount: template.payment_amount,
            payment_currency: template.payment_currency.clone(),
            location: Location::to_column(template.location()?.as_ref())?,
            propagation_pending: true,
        };

        let (occurrence, created) = self.ctx.store.create_occurrence_if_absent(new).await?;
        if created {
            tracing::info!(occurrence_id = %occurrence.id, start = %occurrence.start_time, "Slot materialized");
            self.ctx.bus.publish(NotificationEvent {
                occurrence_id: occurrence.id,
                kind: EventKind::OccurrenceCreated,
                payload: serde_json::json!({
                    "group_id": group.id,
                    "template_id": template.id,
                }),
            });
        }
        if !occurrence.is_propagated() {
            if !created {
                tracing::info!(occurrence_id = %occurrence.id, "Resuming unfinished propagation");
            }
            self.propagator.propagate(group, &occurrence).await?;
        }

        if request.auto_join
            && let Some(user_id) = request.user_id
        {
            let options = SetGoingOptions {
                auto_charge: request.auto_charge,
                ..SetGoingOptions::default()
            };
            self.engine
                .set_going(user_id, user_id, occurrence.id, Going::Yes, &options)
                .await?;
        }

        Ok(occurrence)
    }
}
