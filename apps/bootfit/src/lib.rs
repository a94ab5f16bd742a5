//! # Bootfit Library
//!
//! This library exposes the bootfit modules for testing and integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod cli;
pub mod counter;
pub mod error;

// Re-export bootfit_core for convenience
pub use bootfit_core;
