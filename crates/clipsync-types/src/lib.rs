//! Wire types shared by the ClipSync server crates.
//!
//! Everything here serializes as camelCase JSON, which is what the desktop
//! and mobile clients speak.

pub mod api;
pub mod models;
