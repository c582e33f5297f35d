//! Optimistic task cache for the Pomokan client.
//!
//! [`TodoStore`] holds the in-memory snapshot the boards render from. User
//! actions mutate it synchronously, before the server round-trip, so edits
//! and drag-and-drop feel instantaneous; every mutation path has a defined
//! rollback when the server disagrees.

mod todos;

pub use todos::TodoStore;
