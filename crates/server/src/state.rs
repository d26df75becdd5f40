use std::sync::Arc;

use listgrab_core::{Config, JobController};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    controller: Arc<JobController>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(
        config: Config,
        controller: Arc<JobController>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            config,
            controller,
            ws_broadcaster,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn controller(&self) -> &JobController {
        self.controller.as_ref()
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
