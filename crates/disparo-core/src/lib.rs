//! # disparo-core
//!
//! Core types, traits, configuration, and error handling for Disparo.

pub mod config;
pub mod error;
pub mod message;
pub mod recipients;
pub mod session;
pub mod status;
pub mod traits;
