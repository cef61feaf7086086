//! Shared application state, generalizing `ob-poc-web/src/state.rs`'s
//! `AppState` to the five-component pipeline's C5 boundary: the store,
//! the queue, and the progress bus handles every handler needs.

use std::sync::Arc;

use forge_progress::ProgressBus;
use forge_store::{JobStore, TaskQueue};

use crate::settings::Settings;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub progress: Arc<ProgressBus>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        progress: Arc<ProgressBus>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            store,
            queue,
            progress,
            settings,
        }
    }
}
