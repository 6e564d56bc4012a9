//! Lifecycle operations on recurrence groups.

use kairos_db::model::group::RecurrenceGroup;

use crate::context::EngineContext;
use crate::error::{ServiceError, ServiceResult};

#[derive(Clone, Debug)]
pub struct RecurrenceService {
    ctx: EngineContext,
}

impl RecurrenceService {
    #[must_use]
    pub const fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// ## Summary
    /// Soft-closes a group so that no further occurrences are materialized for it.
    ///
    /// Existing occurrences stay as they are. Closing a closed group is a no-op.
    ///
    /// ## Errors
    /// Returns `NotFound` if the group does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn close_group(&self, group_id: uuid::Uuid) -> ServiceResult<RecurrenceGroup> {
        let store = &self.ctx.store;
        if store.group(group_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("recurrence group {group_id}")));
        }
        let group = store.close_group(group_id, self.ctx.clock.now()).await?;
        tracing::info!(closed_at = ?group.closed_at, "Recurrence group closed");
        Ok(group)
    }
}
