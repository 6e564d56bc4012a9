use thiserror::Error;

/// Database layer errors
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),

    #[error("Pool error: {0}")]
    PoolError(#[from] diesel_async::pooled_connection::bb8::RunError),

    #[error("Migration error: {0}")]
    MigrationError(String),

    /// A JSON column holds a value that no longer matches its expected shape.
    #[error("Stored {column} could not be decoded: {reason}")]
    DecodeError { column: &'static str, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: uuid::Uuid,
    },

    #[error(transparent)]
    CoreError(#[from] kairos_core::error::CoreError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;
