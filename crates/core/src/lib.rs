//! Core types for the ticker aggregator
//!
//! This crate provides shared types used across all components:
//! - Instrument, price sample and feed slot definitions
//! - Consensus sample type
//! - Feed and sample error types
//! - Engine configuration

pub mod types;
pub mod config;
pub mod errors;

pub use types::*;
pub use config::*;
pub use errors::*;
