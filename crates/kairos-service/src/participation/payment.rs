//! Amount owed when joining an occurrence.

use kairos_core::error::CoreResult;
use kairos_core::money::total_for_seats;
use kairos_db::db::enums::PaymentStatus;
use kairos_db::model::co_registration::{CoRegistration, NewCoRegistration};
use kairos_db::model::occurrence::Occurrence;
use kairos_db::model::participation::Participation;
use kairos_db::model::subscription::CoRegistrant;
use kairos_db::model::terms::PaymentTerms;

/// How a `yes` transition settles payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PaymentPlan {
    pub status: PaymentStatus,
    /// Amount to charge before committing.
    pub owed: i64,
    /// Amount held once the charge went through.
    pub charged_amount: i64,
    /// Whether fee-requiring co-registrants count as paid afterwards.
    pub settles_co_registrants: bool,
}

/// What a join is priced against: a stored occurrence, or a slot not materialized yet.
#[derive(Debug, Clone)]
pub(crate) struct Offer<'a> {
    pub terms: PaymentTerms,
    pub publisher_id: uuid::Uuid,
    pub community_id: uuid::Uuid,
    pub occurrence: Option<&'a Occurrence>,
}

impl<'a> Offer<'a> {
    pub(crate) fn for_occurrence(occurrence: &'a Occurrence) -> Self {
        Self {
            terms: occurrence.payment_terms(),
            publisher_id: occurrence.publisher_id,
            community_id: occurrence.community_id,
            occurrence: Some(occurrence),
        }
    }
}

/// Inputs of [`plan_payment`] that depend on collaborators.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PayerStanding {
    /// Publisher or community admin.
    pub exempt: bool,
    /// The ledger reports a payment under the occurrence's reference.
    pub paid_externally: bool,
}

/// ## Summary
/// Works out what joining costs for a user who is not yet at `yes`.
///
/// Non-required terms never charge and keep the current status. Exempt users get a reserved
/// seat. Everybody else owes the price for themselves unless already paid, plus the price for
/// each fee-requiring co-registrant not yet paid.
///
/// ## Errors
/// Returns an invariant violation if the amount overflows.
pub(crate) fn plan_payment(
    terms: &PaymentTerms,
    existing: Option<&Participation>,
    co_registrants: &[CoRegistrant],
    previous: &[CoRegistration],
    standing: PayerStanding,
) -> CoreResult<PaymentPlan> {
    let current_status = existing.map_or(PaymentStatus::None, |record| record.payment_status);
    let current_charge = existing.map_or(0, |record| record.charged_amount);

    if !terms.is_required() {
        return Ok(PaymentPlan {
            status: current_status,
            owed: 0,
            charged_amount: current_charge,
            settles_co_registrants: false,
        });
    }

    if standing.exempt {
        let status = if current_status == PaymentStatus::FullyPaid {
            current_status
        } else {
            PaymentStatus::Reserved
        };
        return Ok(PaymentPlan {
            status,
            owed: 0,
            charged_amount: current_charge,
            settles_co_registrants: false,
        });
    }

    let (already_held, self_owed) = if current_status == PaymentStatus::FullyPaid {
        (current_charge, 0)
    } else if standing.paid_externally {
        (terms.amount, 0)
    } else {
        (0, terms.amount)
    };

    let unpaid_seats = unpaid_fee_seats(co_registrants, previous);
    let owed = total_for_seats(terms.amount, unpaid_seats)?
        .checked_add(self_owed)
        .ok_or(kairos_core::error::CoreError::InvariantViolation(
            "payment amount overflow",
        ))?;

    Ok(PaymentPlan {
        status: PaymentStatus::FullyPaid,
        owed,
        charged_amount: already_held.saturating_add(owed),
        settles_co_registrants: true,
    })
}

fn unpaid_fee_seats(co_registrants: &[CoRegistrant], previous: &[CoRegistration]) -> usize {
    co_registrants
        .iter()
        .filter(|wanted| wanted.fee_required && !was_paid(previous, wanted.entity_id))
        .count()
}

fn was_paid(previous: &[CoRegistration], entity_id: uuid::Uuid) -> bool {
    previous
        .iter()
        .any(|row| row.entity_id == entity_id && row.paid)
}

/// The co-registrants currently stored for a user, as they would be requested again.
pub(crate) fn requested_from(previous: &[CoRegistration]) -> Vec<CoRegistrant> {
    previous
        .iter()
        .map(|row| CoRegistrant {
            entity_id: row.entity_id,
            fee_required: row.fee_required,
        })
        .collect()
}

/// Rows replacing a user's co-registrations on an occurrence.
pub(crate) fn co_registration_rows(
    occurrence_id: uuid::Uuid,
    user_id: uuid::Uuid,
    co_registrants: &[CoRegistrant],
    previous: &[CoRegistration],
    settled: bool,
    auto_join: bool,
) -> Vec<NewCoRegistration> {
    co_registrants
        .iter()
        .map(|wanted| NewCoRegistration {
            occurrence_id,
            user_id,
            entity_id: wanted.entity_id,
            fee_required: wanted.fee_required,
            paid: was_paid(previous, wanted.entity_id) || (settled && wanted.fee_required),
            auto_join,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use kairos_db::db::enums::{Going, ParticipantRole, PaymentType};

    use super::*;

    fn required(amount: i64) -> PaymentTerms {
        PaymentTerms::new(PaymentType::Required, amount, "USD").expect("valid terms")
    }

    fn standing(exempt: bool, paid_externally: bool) -> PayerStanding {
        PayerStanding {
            exempt,
            paid_externally,
        }
    }

    fn record(status: PaymentStatus, charged_amount: i64) -> Participation {
        let now = Utc::now();
        Participation {
            occurrence_id: uuid::Uuid::now_v7(),
            user_id: uuid::Uuid::now_v7(),
            going: Going::Maybe,
            payment_status: status,
            roles: vec![ParticipantRole::Attendee],
            charged_amount,
            via_subscription: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn co_registrant(fee_required: bool) -> CoRegistrant {
        CoRegistrant {
            entity_id: uuid::Uuid::now_v7(),
            fee_required,
        }
    }

    #[test]
    fn test_free_terms_never_charge() {
        let terms = PaymentTerms::free("USD");
        let plan = plan_payment(&terms, None, &[co_registrant(true)], &[], standing(false, false))
            .expect("plan");
        assert_eq!(plan.owed, 0);
        assert_eq!(plan.status, PaymentStatus::None);
    }

    #[test]
    fn test_optional_terms_never_gate() {
        let terms = PaymentTerms::new(PaymentType::Optional, 500, "USD").expect("valid terms");
        let plan = plan_payment(&terms, None, &[], &[], standing(false, false)).expect("plan");
        assert_eq!(plan.owed, 0);
    }

    #[test]
    fn test_exempt_user_reserves() {
        let plan = plan_payment(&required(10), None, &[], &[], standing(true, false)).expect("plan");
        assert_eq!(plan.status, PaymentStatus::Reserved);
        assert_eq!(plan.owed, 0);
    }

    #[test]
    fn test_owes_price_plus_fee_requiring_co_registrants() {
        let wanted = [co_registrant(true), co_registrant(false), co_registrant(true)];
        let plan =
            plan_payment(&required(10), None, &wanted, &[], standing(false, false)).expect("plan");
        assert_eq!(plan.owed, 30);
        assert_eq!(plan.charged_amount, 30);
        assert_eq!(plan.status, PaymentStatus::FullyPaid);
    }

    #[test]
    fn test_already_paid_user_only_owes_for_new_co_registrants() {
        let existing = record(PaymentStatus::FullyPaid, 10);
        let wanted = [co_registrant(true)];
        let plan = plan_payment(
            &required(10),
            Some(&existing),
            &wanted,
            &[],
            standing(false, false),
        )
        .expect("plan");
        assert_eq!(plan.owed, 10);
        assert_eq!(plan.charged_amount, 20);
    }

    #[test]
    fn test_external_payment_counts_as_paid() {
        let plan =
            plan_payment(&required(10), None, &[], &[], standing(false, true)).expect("plan");
        assert_eq!(plan.owed, 0);
        assert_eq!(plan.charged_amount, 10);
        assert_eq!(plan.status, PaymentStatus::FullyPaid);
    }

    #[test]
    fn test_paid_co_registrant_is_not_charged_again() {
        let wanted = co_registrant(true);
        let previous = CoRegistration {
            occurrence_id: uuid::Uuid::now_v7(),
            user_id: uuid::Uuid::now_v7(),
            entity_id: wanted.entity_id,
            fee_required: true,
            paid: true,
            auto_join: false,
            created_at: Utc::now(),
        };
        let existing = record(PaymentStatus::FullyPaid, 20);
        let plan = plan_payment(
            &required(10),
            Some(&existing),
            &[wanted],
            std::slice::from_ref(&previous),
            standing(false, false),
        )
        .expect("plan");
        assert_eq!(plan.owed, 0);

        let rows = co_registration_rows(
            previous.occurrence_id,
            previous.user_id,
            &[wanted],
            &[previous],
            false,
            false,
        );
        assert!(rows.iter().all(|row| row.paid));
    }
}
