//! # Filmroom Common Library
//!
//! Shared code for the filmroom crates including:
//! - Timecode conversion (`H:MM:SS` text <-> whole seconds)
//! - Common error type
//! - Bootstrap configuration loading
//! - Atomic file replacement for checkpoint artifacts

pub mod config;
pub mod error;
pub mod fs;
pub mod timecode;

pub use error::{Error, Result};
pub use timecode::Timecode;
