//! Single platform hop.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    error::MoveError,
    models::{CharacterId, ItemHash, ItemInstanceId},
    platform::{PlatformActions, TransferItemCall},
};

use super::Hop;

/// Performs exactly one platform hop per call and reports the raw outcome.
///
/// No retries happen here; callers decide whether a failure is worth another try.
#[derive(Clone)]
pub struct LocationMoveExecutor {
    platform: Arc<dyn PlatformActions>,
}

impl LocationMoveExecutor {
    /// Wrap a platform implementation.
    pub fn new(platform: Arc<dyn PlatformActions>) -> Self {
        Self { platform }
    }

    /// Move one instance between `character_id` and the vault.
    pub async fn move_item(
        &self,
        item_hash: ItemHash,
        item_instance_id: &ItemInstanceId,
        character_id: &CharacterId,
        transfer_to_vault: bool,
    ) -> Result<(), MoveError> {
        debug!(
            item = %item_instance_id,
            item_hash,
            character = %character_id,
            transfer_to_vault,
            "transfer hop"
        );

        let call = TransferItemCall {
            item_hash,
            item_instance_id: item_instance_id.clone(),
            character_id: character_id.clone(),
            transfer_to_vault,
        };

        match self.platform.transfer_item(call).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(item = %item_instance_id, character = %character_id, %err, "transfer hop failed");
                Err(err)
            }
        }
    }

    /// Execute a planned hop.
    pub async fn execute(
        &self,
        item_hash: ItemHash,
        item_instance_id: &ItemInstanceId,
        hop: &Hop,
    ) -> Result<(), MoveError> {
        self.move_item(
            item_hash,
            item_instance_id,
            &hop.character_id,
            hop.transfer_to_vault(),
        )
        .await
    }
}
