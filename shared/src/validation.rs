//! Validation utilities for ledger input and operator arguments

use crate::models::{normalize_state, MAX_MOVEMENT_QUANTITY};
use crate::types::StateFilter;

/// Validate a movement quantity; quantities are always positive and bounded
pub fn validate_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    if quantity > MAX_MOVEMENT_QUANTITY {
        return Err("Quantity exceeds the per-movement maximum");
    }
    Ok(())
}

/// Validate a low-stock threshold override
pub fn validate_threshold(threshold: i64) -> Result<(), &'static str> {
    if threshold < 0 {
        return Err("Threshold cannot be negative");
    }
    Ok(())
}

/// Validate an identifier issued by the external inventory system
pub fn validate_external_id(id: &str) -> Result<(), &'static str> {
    if id.trim().is_empty() {
        return Err("External identifier cannot be empty");
    }
    if id.len() > 64 {
        return Err("External identifier must be at most 64 characters");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("External identifier must be alphanumeric");
    }
    Ok(())
}

/// Parse a `--state` argument: `all` or one of the known states
pub fn parse_state_filter(value: &str) -> Result<StateFilter, &'static str> {
    if value.trim().eq_ignore_ascii_case("all") {
        return Ok(StateFilter::All);
    }
    normalize_state(value)
        .map(|s| StateFilter::Only(s.to_string()))
        .ok_or("Unknown state")
}
