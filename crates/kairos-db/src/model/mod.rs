pub mod audit;
pub mod co_registration;
pub mod group;
pub mod occurrence;
pub mod participation;
pub mod subscription;
pub mod template;
pub mod terms;

use crate::error::{DbError, DbResult};

/// Decodes a JSON column into its typed form, naming the column on failure.
pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    column: &'static str,
    value: &serde_json::Value,
) -> DbResult<T> {
    serde_json::from_value(value.clone()).map_err(|err| DbError::DecodeError {
        column,
        reason: err.to_string(),
    })
}

/// Encodes a typed value for a JSON column.
pub(crate) fn encode_json<T: serde::Serialize>(
    column: &'static str,
    value: &T,
) -> DbResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|err| DbError::DecodeError {
        column,
        reason: err.to_string(),
    })
}
