//! `Hushroom` Core Library
//!
//! Shared functionality for `Hushroom` components:
//! - Configuration files for the relay and the client
//! - Tracing/logging initialisation
//! - Common error types

pub mod config;
pub mod error;
pub mod tracing_init;

pub use config::{ClientConfig, Config, ReconnectConfig, RelayConfig};
pub use error::{Error, Result};
