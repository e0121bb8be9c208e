//! Bulkmail Common - Shared types and settings
//!
//! This crate provides the data model, error taxonomy and settings
//! loading shared by every bulkmail component.

pub mod config;
pub mod error;
pub mod types;

pub use config::Settings;
pub use error::{Error, Result};
