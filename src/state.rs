use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::RelayResult;
use crate::publisher::ProgressPublisher;
use crate::relay::RelayEngine;
use crate::store::StatusStore;
use crate::subscribe::SubscribeOptions;
use crate::telemetry::{HostTelemetry, ProcTelemetry};

/// shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: RelayEngine,
    pub publisher: ProgressPublisher,
    /// latest snapshot of every live or recently ended transfer
    pub store: Arc<StatusStore>,
    pub subscribe_options: SubscribeOptions,
    pub telemetry: Arc<dyn HostTelemetry>,
    /// cancelled on shutdown, ends open subscriptions
    pub shutdown: CancellationToken,
}

impl AppState {
    /// create a new app state from the given configuration
    pub fn new(config: &Config) -> RelayResult<Self> {
        let store = Arc::new(StatusStore::new());

        Ok(Self {
            engine: RelayEngine::new(config)?,
            publisher: ProgressPublisher::new(store.clone(), config.retire_after),
            store,
            subscribe_options: SubscribeOptions::from(config),
            telemetry: Arc::new(ProcTelemetry::new()),
            shutdown: CancellationToken::new(),
        })
    }

    /// swap the host telemetry source
    pub fn with_telemetry(mut self, telemetry: Arc<dyn HostTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }
}
