//! Email/password authentication for Network Map.
//!
//! This crate provides:
//! - The session state machine (`SessionManager`) with change notifications
//! - A client for the hosted GoTrue auth API
//! - An in-memory auth backend for tests and offline development

mod backend;
mod error;
mod gotrue;
mod session;
mod user;

pub use backend::*;
pub use error::*;
pub use gotrue::*;
pub use session::*;
pub use user::*;

/// Refresh sessions this many seconds before they expire.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Wait this many seconds before retrying a refresh the service could not answer.
pub const REFRESH_RETRY_SECS: u64 = 30;

/// Capacity of the session event channel.
pub const SESSION_EVENT_CAPACITY: usize = 64;
