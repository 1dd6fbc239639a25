//! Authoritative checkers game server.
//!
//! Moves are applied against a versioned game session and the resulting
//! events are fanned out to server-sent event streams through an in-process
//! emitter and hub.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod app;
pub mod config;
