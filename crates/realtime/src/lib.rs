//! # Realtime Core
//!
//! Core modules shared by the fleet position sync and route spacing crates.

mod error;
mod provider;

pub mod model;

pub use crate::error::*;
pub use crate::model::*;
pub use crate::provider::*;
