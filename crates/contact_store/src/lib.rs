//! Contact storage for Network Map
//!
//! This crate provides a storage abstraction for contacts. It supports a
//! JSON file on the local machine (single-user mode, no accounts) and a
//! hosted REST table scoped to the signed-in user (multi-user mode).

mod error;
mod local;
mod memory;
mod remote;
mod traits;

pub use error::*;
pub use local::*;
pub use memory::*;
pub use remote::*;
pub use traits::*;
