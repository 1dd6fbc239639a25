//! Transport connection states.

use std::fmt;

/// Connection state of a [`TransportClient`](super::TransportClient).
///
/// ```text
/// Disconnected -> Connecting -> Connected
/// Connected -> Reconnecting -> Connecting   (transport error / stale)
/// *         -> IntentionallyDisconnected    (disconnect / destroy / page hide)
/// ```
///
/// `IntentionallyDisconnected` is only left through `reconnect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    IntentionallyDisconnected,
}

impl ConnectionState {
    /// Whether a connection attempt is running or scheduled.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::IntentionallyDisconnected => "intentionally_disconnected",
        };
        f.write_str(label)
    }
}

/// Page lifecycle signals forwarded by the host (browser shell, CLI, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The page became hidden
    Hidden,
    /// The page became visible again
    Visible,
    /// Navigation away / tab close
    PageHide,
    /// The page was restored from a back/forward cache
    Resumed,
}
