//! Contract of the external identity directory.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Directory transport error: {0}")]
    Transport(String),

    #[error("Directory answered with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// ## Errors
    /// Returns a `DirectoryError` if the directory could not be asked.
    async fn is_admin(
        &self,
        user_id: uuid::Uuid,
        community_id: uuid::Uuid,
    ) -> Result<bool, DirectoryError>;

    /// ## Errors
    /// Returns a `DirectoryError` if the directory could not be asked.
    async fn user_exists(&self, user_id: uuid::Uuid) -> Result<bool, DirectoryError>;
}
