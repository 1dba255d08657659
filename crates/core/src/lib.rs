#![warn(clippy::all, missing_docs)]

//! Core logic of Guardian Nexus.
//!
//! This crate hosts the item transfer orchestration, the loadout apply
//! engine, the local inventory mirror, loadout persistence, and the
//! platform client used by the command-line frontend.

pub mod cache;
pub mod config;
pub mod error;
pub mod inventory;
pub mod loadout;
pub mod models;
pub mod platform;
pub mod transfer;

pub use config::AppConfig;
pub use error::{MoveError, TransferError};
pub use inventory::{Inventory, InventoryItem};
pub use loadout::{
    ApplyClassification, ApplyLoadoutResult, ApplyMode, Loadout, LoadoutApplyEngine,
    LoadoutItem, LoadoutStore,
};
pub use models::{CharacterId, ItemInstanceId, Location, TransferRequest};
pub use platform::{BungieClient, PlatformActions};
pub use transfer::{TransferOrchestrator, TransferOutcome};
