//! Database enum types with Diesel serialization.
//!
//! Each enum maps to a `TEXT` column guarded by a CHECK constraint and implements `ToSql` and
//! `FromSql` for conversion between Rust and `PostgreSQL`.

use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use kairos_core::schedule::DayKeyKind;
use std::fmt;
use std::io::Write;

/// Recurrence period of a group.
///
/// Maps to `recurrence_group.period` CHECK constraint.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsExpression,
    FromSqlRow,
    serde::Serialize,
    serde::Deserialize,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Weekly,
    Monthly,
}

impl ToSql<Text, Pg> for Period {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for Period {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"weekly" => Ok(Self::Weekly),
            b"monthly" => Ok(Self::Monthly),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl Period {
    /// Returns the database string representation of this period.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// The day key family a group with this period is keyed by.
    #[must_use]
    pub const fn day_key_kind(self) -> DayKeyKind {
        match self {
            Self::Weekly => DayKeyKind::Weekday,
            Self::Monthly => DayKeyKind::MonthDay,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an occurrence is paid for.
///
/// Maps to the `payment_type` CHECK constraint on occurrences and templates.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsExpression,
    FromSqlRow,
    serde::Serialize,
    serde::Deserialize,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Free,
    Optional,
    Required,
}

impl ToSql<Text, Pg> for PaymentType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let s = match self {
            Self::Free => "free",
            Self::Optional => "optional",
            Self::Required => "required",
        };
        out.write_all(s.as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for PaymentType {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"free" => Ok(Self::Free),
            b"optional" => Ok(Self::Optional),
            b"required" => Ok(Self::Required),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl PaymentType {
    /// Returns the database string representation of this payment type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Optional => "optional",
            Self::Required => "required",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's declared attendance.
///
/// Maps to `participation.going` CHECK constraint.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsExpression,
    FromSqlRow,
    serde::Serialize,
    serde::Deserialize,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum Going {
    No,
    Maybe,
    Yes,
}

impl ToSql<Text, Pg> for Going {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for Going {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"no" => Ok(Self::No),
            b"maybe" => Ok(Self::Maybe),
            b"yes" => Ok(Self::Yes),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl Going {
    /// Returns the database string representation of this value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Maybe => "maybe",
            Self::Yes => "yes",
        }
    }

    /// Whether the user still counts as an active participant.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Maybe | Self::Yes)
    }
}

impl fmt::Display for Going {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state of a participation.
///
/// Maps to `participation.payment_status` CHECK constraint.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsExpression,
    FromSqlRow,
    serde::Serialize,
    serde::Deserialize,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentStatus {
    None,
    /// Seat held without payment, granted to the publisher and community admins.
    Reserved,
    FullyPaid,
    Refunded,
    /// A charge for a pending join is in flight. Claimed before the ledger is called.
    Charging,
    /// A refund of `charged_amount` is in flight. Claimed before the ledger is called.
    Refunding,
}

impl ToSql<Text, Pg> for PaymentStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for PaymentStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"none" => Ok(Self::None),
            b"reserved" => Ok(Self::Reserved),
            b"fully-paid" => Ok(Self::FullyPaid),
            b"refunded" => Ok(Self::Refunded),
            b"charging" => Ok(Self::Charging),
            b"refunding" => Ok(Self::Refunding),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl PaymentStatus {
    /// Returns the database string representation of this payment status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Reserved => "reserved",
            Self::FullyPaid => "fully-paid",
            Self::Refunded => "refunded",
            Self::Charging => "charging",
            Self::Refunding => "refunding",
        }
    }

    /// Whether a ledger call for this participation is claimed and not yet settled.
    #[must_use]
    pub const fn is_claimed(self) -> bool {
        matches!(self, Self::Charging | Self::Refunding)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role flag carried by a participation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsExpression,
    FromSqlRow,
    serde::Serialize,
    serde::Deserialize,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Attendee,
    Staff,
    Speaker,
    Organizer,
}

impl ToSql<Text, Pg> for ParticipantRole {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for ParticipantRole {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"attendee" => Ok(Self::Attendee),
            b"staff" => Ok(Self::Staff),
            b"speaker" => Ok(Self::Speaker),
            b"organizer" => Ok(Self::Organizer),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl ParticipantRole {
    /// Returns the database string representation of this role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attendee => "attendee",
            Self::Staff => "staff",
            Self::Speaker => "speaker",
            Self::Organizer => "organizer",
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_matches_database_strings() {
        assert_eq!(
            serde_json::to_value(PaymentStatus::FullyPaid).ok(),
            Some(serde_json::json!(PaymentStatus::FullyPaid.as_str()))
        );
        assert_eq!(
            serde_json::to_value(Going::Maybe).ok(),
            Some(serde_json::json!(Going::Maybe.as_str()))
        );
        assert_eq!(
            serde_json::to_value(PaymentType::Required).ok(),
            Some(serde_json::json!("required"))
        );
    }

    #[test]
    fn test_period_day_key_kind() {
        assert_eq!(Period::Weekly.day_key_kind(), DayKeyKind::Weekday);
        assert_eq!(Period::Monthly.day_key_kind(), DayKeyKind::MonthDay);
    }

    #[test]
    fn test_active_going() {
        assert!(Going::Yes.is_active());
        assert!(Going::Maybe.is_active());
        assert!(!Going::No.is_active());
    }
}
