//! # corpus-core
//!
//! Core types, traits, and abstractions for the corpus knowledge base.
//!
//! This crate provides the foundational data structures and trait
//! definitions that the other corpus crates depend on: document/chunk/
//! version models, the job state machine, repository traits, the error
//! taxonomy, and shared defaults.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{extract_timestamp, is_v7, new_v7};
