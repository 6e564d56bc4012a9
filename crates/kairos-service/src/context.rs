//! Collaborators shared by every engine operation.

use std::sync::Arc;

use kairos_core::config::EngineConfig;
use kairos_db::store::Store;

use crate::clock::Clock;
use crate::identity::Directory;
use crate::ledger::Ledger;
use crate::notify::NotificationBus;

/// Handles to the store and the external collaborators.
///
/// Cheap to clone; every service holds its own copy.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn Store>,
    pub ledger: Arc<dyn Ledger>,
    pub bus: Arc<dyn NotificationBus>,
    pub directory: Arc<dyn Directory>,
    pub clock: Arc<dyn Clock>,
    pub settings: EngineConfig,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
