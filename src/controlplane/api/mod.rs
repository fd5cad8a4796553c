//! API Module
//!
//! Provides the REST API for the provider operations, health and metrics.

pub mod server;
pub mod rest;

pub use server::*;
pub use rest::*;
