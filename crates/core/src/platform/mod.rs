//! Ports onto the game platform and the HTTP client implementing them.

pub mod bungie;
pub mod equip;
pub mod profile;

use async_trait::async_trait;

use crate::{
    error::MoveError,
    models::{CharacterId, ItemHash, ItemInstanceId, Location},
};

pub use bungie::BungieClient;
pub use equip::EquipFailureReason;
pub use profile::ProfileResponse;

/// Arguments of one single-hop transfer as the platform expects them.
///
/// The platform only knows "character to vault" and "vault to character";
/// `character_id` is the current owner when `transfer_to_vault` is set and the
/// receiving character otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItemCall {
    /// Definition hash of the item.
    pub item_hash: ItemHash,
    /// Instance being moved.
    pub item_instance_id: ItemInstanceId,
    /// Character on the non-vault side of the hop.
    pub character_id: CharacterId,
    /// Direction of the hop.
    pub transfer_to_vault: bool,
}

/// Mutating actions offered by the platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformActions: Send + Sync {
    /// Perform one hop between a character and the vault.
    async fn transfer_item(&self, call: TransferItemCall) -> Result<(), MoveError>;

    /// Equip an instance that already sits on `character_id`.
    async fn equip_item(
        &self,
        item_instance_id: ItemInstanceId,
        character_id: CharacterId,
    ) -> Result<(), MoveError>;
}

/// Read access to where item instances currently live.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryLookup: Send + Sync {
    /// Current location of an instance, `None` when the account no longer has it.
    async fn locate(&self, item_instance_id: &ItemInstanceId)
        -> Result<Option<Location>, MoveError>;
}
