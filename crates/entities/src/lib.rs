//! Core entity definitions for Network Map.
//!
//! This crate defines the data types shared by the storage, geocoding and
//! server crates: contacts as they are stored and the raw form input they are
//! created from.

mod contact;
mod draft;

pub use contact::*;
pub use draft::*;
