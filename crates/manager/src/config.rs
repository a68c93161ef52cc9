//! Manager settings.

use serde::{Deserialize, Serialize};
use vista_reactive::DispatcherConfig;

use crate::handle::HandleStrategy;

/// Settings for a [`Manager`](crate::Manager). Loadable from JSON; missing
/// fields take their defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub handle_strategy: HandleStrategy,
    pub dispatcher: DispatcherConfig,
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_strategy(mut self, strategy: HandleStrategy) -> Self {
        self.handle_strategy = strategy;
        self
    }

    pub fn dispatcher(mut self, dispatcher: DispatcherConfig) -> Self {
        self.dispatcher = dispatcher;
        self
    }
}
