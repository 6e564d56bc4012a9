use thiserror::Error;

/// Errors raised while parsing or checking schedule values and settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Loaded settings are structurally valid but unusable.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Caller-supplied schedule, timezone, currency or capacity input is unusable.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Text that should hold a number or date could not be read at all.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Arithmetic on already-validated values left its domain (e.g. amount overflow).
    #[error("Invariant violation: {0}")]
    InvariantViolation(&'static str),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
