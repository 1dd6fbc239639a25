//! Repository の実装
//!
//! - `inmemory`: HashMap を使った実装
//! - 将来的に: `postgres` など

pub mod inmemory;

pub use inmemory::InMemoryGameRepository;
