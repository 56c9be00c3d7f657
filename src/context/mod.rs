//! Dialogue context
//!
//! Session state keyed by session id, persisted through a `ContextStore`
//! and only ever mutated by the `ContextManager`.

pub mod manager;
pub mod session;
pub mod store;

pub use manager::{ContextManager, LoadedContext, Resolution};
pub use session::SessionContext;
pub use store::{ContextStore, InMemoryContextStore, JsonFileContextStore};
