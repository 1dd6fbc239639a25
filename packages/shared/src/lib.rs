//! Code shared by the checkers server and client.
//!
//! - `logger`: tracing subscriber setup for both binaries
//! - `time`: timestamps and a clock abstraction for testability
//! - `game`: board, pieces and moves, plus the basic rule engine
//! - `protocol`: wire types exchanged over HTTP and the event stream

pub mod game;
pub mod logger;
pub mod protocol;
pub mod time;
