//! External inventory system integration

pub mod inventory_api;
pub mod retry;
pub mod source;

pub use inventory_api::InventoryApiClient;
pub use retry::RetryPolicy;
pub use source::{
    CachedInventorySource, ExternalBin, ExternalBinItem, ExternalLocation, ExternalWarehouse,
    ExternalZone, InventorySource,
};
