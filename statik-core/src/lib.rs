//! Statik Core Library
//!
//! This crate provides the shared pieces of the Statik static asset server:
//! configuration management, the mount table, the gateway-independent
//! request/response model, and error handling.

pub mod config;
pub mod error;
pub mod server;

pub use error::{Error, Result};

/// Statik version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
