//! Domain models for the stock ledger and reconciliation engine

mod agent;
mod bin;
mod conflict;
mod geography;
mod health;
mod movement;
mod stock;
mod sync;

pub use agent::*;
pub use bin::*;
pub use conflict::*;
pub use geography::*;
pub use health::*;
pub use movement::*;
pub use stock::*;
pub use sync::*;
