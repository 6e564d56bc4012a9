use thiserror::Error;

/// Application-level errors (process wiring and HTTP adapters)
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    ServiceError(#[from] kairos_service::error::ServiceError),

    #[error(transparent)]
    DatabaseError(#[from] kairos_db::error::DbError),

    #[error(transparent)]
    CoreError(#[from] kairos_core::error::CoreError),

    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),
}

pub type AppResult<T> = std::result::Result<T, AppError>;
