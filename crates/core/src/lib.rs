//! Core types and utilities for the price streaming service
//!
//! This crate provides shared types used across all components:
//! - Price observations and currency codes
//! - Outbound message projection
//! - Persisted observation form
//! - Service configuration and error types

pub mod types;
pub mod projection;
pub mod persisted;
pub mod config;
pub mod errors;

pub use types::*;
pub use projection::*;
pub use persisted::*;
pub use config::*;
pub use errors::*;
