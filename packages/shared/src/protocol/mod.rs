//! Wire protocol shared by the server and the client.
//!
//! - `envelope`: the typed, timestamped unit pushed over the event stream
//! - `events`: payloads carried by the domain envelopes
//! - `api`: request/response bodies of the HTTP endpoints
//! - `sse`: server-sent event framing

pub mod api;
pub mod envelope;
pub mod events;
pub mod sse;

pub use envelope::{Envelope, EventType};
