use kairos_db::db::enums::ParticipantRole;
use kairos_db::model::subscription::CoRegistrant;

/// Options of one `set_going` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetGoingOptions {
    /// Charge the ledger when joining needs payment, instead of answering `PaymentRequired`.
    pub auto_charge: bool,
    /// The complete set of entities joined alongside the user. `None` keeps the current set.
    pub co_registrants: Option<Vec<CoRegistrant>>,
    /// Set when the transition is applied on behalf of a standing subscription.
    pub via_subscription: bool,
    /// Replaces the user's roles on the occurrence. `None` keeps them.
    pub roles: Option<Vec<ParticipantRole>>,
}

impl SetGoingOptions {
    #[must_use]
    pub fn auto_charge() -> Self {
        Self {
            auto_charge: true,
            ..Self::default()
        }
    }

    /// ## Summary
    /// Options used when a subscription joins its owner to a new occurrence.
    #[must_use]
    pub fn for_subscription(co_registrants: Vec<CoRegistrant>) -> Self {
        Self {
            auto_charge: true,
            co_registrants: Some(co_registrants),
            via_subscription: true,
            roles: None,
        }
    }

    #[must_use]
    pub fn with_co_registrants(mut self, co_registrants: Vec<CoRegistrant>) -> Self {
        self.co_registrants = Some(co_registrants);
        self
    }
}
