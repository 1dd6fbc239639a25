//! Sync client for the checkers platform.
//!
//! - `transport`: reconnecting server-sent event stream with heartbeat monitoring
//! - `api`: HTTP calls (versioned move submission, state fetch, chat, draw)
//! - `optimistic`: pending local moves keyed by correlation id
//! - `sync`: reducer-driven sync state, offline/retry queue and reconciliation
//! - `queue_store`: persistence of the move queue across restarts
//! - `formatter` / `runner`: the interactive terminal client

pub mod api;
pub mod error;
pub mod formatter;
pub mod optimistic;
pub mod queue_store;
pub mod runner;
pub mod sync;
pub mod transport;
