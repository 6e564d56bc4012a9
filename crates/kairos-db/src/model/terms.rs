//! Value objects shared by occurrences and availability templates.

use kairos_core::error::{CoreError, CoreResult};
use kairos_core::money::normalize_currency;

use crate::db::enums::PaymentType;
use crate::error::DbResult;

/// Price and currency of an occurrence. Amounts are minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PaymentTerms {
    pub kind: PaymentType,
    pub amount: i64,
    pub currency: String,
}

impl PaymentTerms {
    /// ## Summary
    /// Builds validated payment terms, normalizing the currency code.
    ///
    /// ## Errors
    /// Returns a validation error if the amount is negative, if a paid occurrence has no
    /// price, or if the currency is not a three-letter code.
    pub fn new(kind: PaymentType, amount: i64, currency: &str) -> CoreResult<Self> {
        if amount < 0 {
            return Err(CoreError::ValidationError(format!(
                "payment amount must not be negative, got {amount}"
            )));
        }
        if kind != PaymentType::Free && amount == 0 {
            return Err(CoreError::ValidationError(format!(
                "{kind} payment terms need a positive amount"
            )));
        }
        Ok(Self {
            kind,
            amount,
            currency: normalize_currency(currency)?,
        })
    }

    #[must_use]
    pub fn free(currency: &str) -> Self {
        Self {
            kind: PaymentType::Free,
            amount: 0,
            currency: currency.to_ascii_uppercase(),
        }
    }

    /// Whether joining is gated on payment.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.kind == PaymentType::Required
    }
}

/// Where an occurrence takes place.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    Venue {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<String>,
    },
    Teleconference {
        url: String,
    },
}

impl Location {
    /// ## Summary
    /// Decodes an optional location column.
    ///
    /// ## Errors
    /// Returns a decode error if the JSON does not describe a location.
    pub fn from_column(value: Option<&serde_json::Value>) -> DbResult<Option<Self>> {
        value
            .map(|value| super::decode_json("location", value))
            .transpose()
    }

    /// ## Summary
    /// Encodes a location for storage.
    ///
    /// ## Errors
    /// Returns a decode error if serialization fails.
    pub fn to_column(location: Option<&Self>) -> DbResult<Option<serde_json::Value>> {
        location
            .map(|location| super::encode_json("location", location))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_terms_validation() {
        assert!(PaymentTerms::new(PaymentType::Required, 0, "USD").is_err());
        assert!(PaymentTerms::new(PaymentType::Optional, -5, "USD").is_err());
        assert!(PaymentTerms::new(PaymentType::Required, 1000, "dollars").is_err());

        let terms = PaymentTerms::new(PaymentType::Required, 1000, "usd").expect("valid terms");
        assert_eq!(terms.currency, "USD");
        assert!(terms.is_required());
        assert!(PaymentTerms::new(PaymentType::Free, 0, "EUR").is_ok());
    }

    #[test]
    fn test_location_column_shape() {
        let location = Location::Teleconference {
            url: "https://meet.example.org/standup".to_string(),
        };
        let column = Location::to_column(Some(&location)).expect("encodes");
        assert_eq!(
            column,
            Some(serde_json::json!({
                "kind": "teleconference",
                "url": "https://meet.example.org/standup"
            }))
        );
        assert_eq!(
            Location::from_column(column.as_ref()).expect("decodes"),
            Some(location)
        );
        assert_eq!(Location::from_column(None).expect("decodes"), None);
        assert!(Location::from_column(Some(&serde_json::json!({ "kind": "moon" }))).is_err());
    }
}
