//! Infrastructure layer.
//!
//! ドメイン層が定義した trait の具体的な実装を提供します。

pub mod emitter;
pub mod hub;
pub mod repository;
