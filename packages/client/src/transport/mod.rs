//! Transport layer: one reconnecting server-push stream per client.
//!
//! - `state`: connection states and page lifecycle signals
//! - `backoff`: reconnect strategies (`Backoff` by default, `Native`)
//! - `source`: the underlying stream (`EventSource` trait, HTTP implementation)
//! - `client`: `TransportClient`, the state machine driving a source
//!
//! Delivery is at-most-once. After every (re)connect the caller fetches the
//! full game state; missed envelopes are never replayed.

mod backoff;
mod client;
mod source;
mod state;

pub use backoff::{BackoffConfig, MAX_JITTER, ReconnectStrategy};
pub use client::{TransportClient, TransportConfig, TransportEvent};
pub use source::{EventSource, FrameStream, HttpEventSource, game_stream_url, user_stream_url};
pub use state::{ConnectionState, LifecycleEvent};
