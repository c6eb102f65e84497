//! Shared Application State
//!
//! One [`AppState`] is assembled at startup and cloned into every handler.
//! Collaborators are trait objects so tests swap in the in-memory store and
//! the mock providers without touching the routes.

use crate::auth::IdentityResolver;
use crate::config::FilesConfig;
use banter_llm::{ChatProvider, Ingestor, Retriever, VisionProvider};
use banter_storage::{ChatStore, FileStore};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub files: Arc<dyn FileStore>,
    pub chat: Arc<dyn ChatProvider>,
    pub vision: Arc<dyn VisionProvider>,
    pub retriever: Arc<dyn Retriever>,
    pub ingestor: Arc<dyn Ingestor>,
    pub resolver: Arc<IdentityResolver>,
    pub files_config: FilesConfig,
    pub start_time: Instant,
}

impl AppState {
    /// Group name granting admin privileges.
    pub fn admin_group(&self) -> &str {
        &self.resolver.config().admin_group
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("files_config", &self.files_config)
            .field("resolver", &self.resolver)
            .finish()
    }
}
