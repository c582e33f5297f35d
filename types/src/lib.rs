//! Core domain types for the Pomokan client.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies. Everything here can be used from any layer of the client.
//!
//! Wire field names follow the task service's schema (`due_date`,
//! `is_completed`, `pomodoro_count`, ...), so these types serialize directly
//! into request and response bodies.

mod credential;
mod error;
mod todo;
mod user;

pub use credential::Credential;
pub use error::ApiError;
pub use todo::{Status, Todo, TodoDraft, TodoId, TodoPatch};
pub use user::{PasswordChange, RegisterUser, User};
