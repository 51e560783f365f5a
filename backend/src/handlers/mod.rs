//! HTTP handlers

pub mod agents;
pub mod archive;
pub mod conflicts;
pub mod health;
pub mod movements;
pub mod stock;
pub mod sync;

pub use agents::{activate_agent, deactivate_agent, link_agent};
pub use archive::archive_movements;
pub use conflicts::{list_conflicts, resolve_conflicts};
pub use health::{health_check, sync_health};
pub use movements::{approve_movement, get_movement, list_movements, record_movement, reject_movement};
pub use stock::{get_stock, list_snapshots, low_stock};
pub use sync::{queue_status, sync_bins};
