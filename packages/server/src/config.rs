//! Server-side runtime configuration.

use std::time::Duration;

/// Hub and emitter tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Interval between HEARTBEAT envelopes sent to every connection.
    pub heartbeat_interval: Duration,
    /// A connection not seen for this long is removed by the sweep.
    pub stale_timeout: Duration,
    pub sweep_interval: Duration,
    /// Buffer size of each emitter channel.
    pub emitter_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            stale_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
            emitter_capacity: 1024,
        }
    }
}
