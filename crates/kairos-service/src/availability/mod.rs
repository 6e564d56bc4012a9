//! Reservable availability templates and their expansion into occurrences.

mod expander;

pub use expander::{
    AvailabilityExpander, MaterializeMode, MaterializeOutcome, MaterializeRequest, PaymentQuote,
    SlotFailure,
};

use kairos_core::capacity::Capacity;
use kairos_core::schedule::{DayKeyKind, RecurrenceDays};
use kairos_core::timezone::parse_timezone;
use kairos_db::db::enums::{PaymentType, Period};
use kairos_db::model::group::{NewRecurrenceGroup, RecurrenceGroup};
use kairos_db::model::template::{AvailabilityTemplate, NewAvailabilityTemplate};
use kairos_db::model::terms::{Location, PaymentTerms};

use crate::context::EngineContext;
use crate::error::{ServiceError, ServiceResult};

/// A reservable offering as submitted by its publisher.
#[derive(Debug, Clone)]
pub struct TemplateInput {
    pub publisher_id: uuid::Uuid,
    pub community_id: uuid::Uuid,
    pub title: String,
    /// Weekly catalog of offered slots.
    pub slots: RecurrenceDays,
    pub timezone: String,
    pub capacity_min: i32,
    pub capacity_max: Option<i32>,
    pub payment_type: PaymentType,
    pub payment_amount: i64,
    pub payment_currency: String,
    pub location: Option<Location>,
}

#[derive(Clone, Debug)]
pub struct AvailabilityService {
    ctx: EngineContext,
}

impl AvailabilityService {
    #[must_use]
    pub const fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// ## Summary
    /// Creates a template together with the weekly recurrence group that tracks subscriptions
    /// to it.
    ///
    /// ## Errors
    /// Returns a validation error if the catalog, timezone, capacity or payment terms are
    /// invalid. Nothing is stored in that case.
    #[tracing::instrument(skip(self, input), fields(
        publisher_id = %input.publisher_id,
        title = %input.title
    ))]
    pub async fn create_template(
        &self,
        input: TemplateInput,
    ) -> ServiceResult<(AvailabilityTemplate, RecurrenceGroup)> {
        if input.title.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "template title must not be empty".to_string(),
            ));
        }
        input.slots.validate(DayKeyKind::Weekday)?;
        if let Some((key, _)) = input.slots.iter().find(|(_, slots)| slots.is_empty()) {
            return Err(ServiceError::ValidationError(format!(
                "offered day '{key}' must list at least one slot"
            )));
        }
        parse_timezone(&input.timezone)?;
        let capacity = Capacity::new(input.capacity_min, input.capacity_max)?;
        let terms = PaymentTerms::new(
            input.payment_type,
            input.payment_amount,
            &input.payment_currency,
        )?;
        let location = Location::to_column(input.location.as_ref())?;

        let template = NewAvailabilityTemplate {
            id: uuid::Uuid::now_v7(),
            publisher_id: input.publisher_id,
            community_id: input.community_id,
            title: input.title.trim().to_string(),
            slots: input.slots.to_json(),
            timezone: input.timezone.trim().to_string(),
            capacity_min: capacity.min,
            capacity_max: capacity.max,
            payment_type: terms.kind,
            payment_amount: terms.amount,
            payment_currency: terms.currency,
            location,
        };
        let group = NewRecurrenceGroup {
            id: uuid::Uuid::now_v7(),
            publisher_id: input.publisher_id,
            community_id: input.community_id,
            period: Period::Weekly,
            days: input.slots.to_json(),
            timezone: template.timezone.clone(),
            active_from: None,
            active_until: None,
            template_id: Some(template.id),
        };

        let (template, group) = self.ctx.store.create_template(template, group).await?;
        tracing::info!(template_id = %template.id, group_id = %group.id, "Availability template created");
        Ok((template, group))
    }
}
