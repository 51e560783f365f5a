//! Shared types and models for the stock ledger and reconciliation engine
//!
//! This crate holds the domain types and the pure rules over them
//! (projection, drift, severity, health aggregation) used by the backend
//! service and CLI.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
