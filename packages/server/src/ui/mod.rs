//! HTTP / SSE server implementation.

mod handler;
mod server;
mod signal;
pub mod state;

pub use handler::{ApiError, AuthUser, USER_ID_HEADER};
pub use server::{Server, router};
