use std::time::Duration;

use crate::message::types::MESSAGE_EVENT;

pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`Router`](super::Router).
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Event name envelopes are sent and received under
    pub event_name: String,
    /// How long `invoke` waits for a reply
    pub invoke_timeout: Duration,
    /// Deliver events named after a registered channel straight to its handler
    pub direct_events: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            event_name: MESSAGE_EVENT.to_string(),
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            direct_events: true,
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = name.into();
        self
    }

    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    pub fn with_direct_events(mut self, enabled: bool) -> Self {
        self.direct_events = enabled;
        self
    }
}
