//! Local mirror of the account's item locations.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::{
    error::{MoveError, TransferError},
    loadout::{ApplyFailure, ApplyLoadoutResult, ItemOutcome},
    models::{CharacterId, ItemHash, ItemInstanceId, Location, TransferRequest},
    platform::{InventoryLookup, ProfileResponse},
    transfer::{TransferOrchestrator, TransferOutcome},
};

/// One instanced item as last seen on the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    /// Instance id.
    pub item_instance_id: ItemInstanceId,
    /// Definition hash.
    pub item_hash: ItemHash,
    /// Bucket (slot) hash.
    pub bucket_hash: u32,
    /// Current location.
    pub location: Location,
    /// Currently equipped on its character.
    pub equipped: bool,
    /// Power level, when known.
    pub power: Option<i32>,
}

/// Thread-safe mirror of item locations, hydrated from a profile response.
#[derive(Clone, Default)]
pub struct Inventory {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    items: HashMap<ItemInstanceId, InventoryItem>,
    classes: HashMap<CharacterId, i32>,
}

impl Inventory {
    /// Empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror built from a profile response.
    pub fn from_profile(profile: &ProfileResponse) -> Self {
        let inventory = Self::new();
        inventory.hydrate(profile);
        inventory
    }

    /// Replace the mirror with the contents of `profile`.
    ///
    /// Items without an instance id (consumables, materials) are skipped; they
    /// cannot be transferred individually.
    pub fn hydrate(&self, profile: &ProfileResponse) {
        let mut items = HashMap::new();
        let mut classes = HashMap::new();

        if let Some(characters) = profile.characters.as_ref().and_then(|c| c.data.as_ref()) {
            for character in characters.values() {
                classes.insert(
                    CharacterId::new(character.character_id.clone()),
                    character.class_type,
                );
            }
        }

        let mut add = |component: &crate::platform::profile::ItemComponent,
                       location: Location,
                       equipped: bool| {
            let Some(instance_id) = component.item_instance_id.as_deref() else {
                return;
            };
            let id = ItemInstanceId::new(instance_id);
            items.insert(
                id.clone(),
                InventoryItem {
                    item_instance_id: id,
                    item_hash: component.item_hash,
                    bucket_hash: component.bucket_hash,
                    location,
                    equipped,
                    power: profile.power_of(instance_id),
                },
            );
        };

        if let Some(vault) = profile.profile_inventory.as_ref().and_then(|c| c.data.as_ref()) {
            for component in &vault.items {
                add(component, Location::Vault, false);
            }
        }
        if let Some(inventories) = profile
            .character_inventories
            .as_ref()
            .and_then(|c| c.data.as_ref())
        {
            for (character_id, list) in inventories {
                for component in &list.items {
                    add(component, Location::character(character_id.clone()), false);
                }
            }
        }
        if let Some(equipment) = profile
            .character_equipment
            .as_ref()
            .and_then(|c| c.data.as_ref())
        {
            for (character_id, list) in equipment {
                for component in &list.items {
                    add(component, Location::character(character_id.clone()), true);
                }
            }
        }

        let mut inner = self.inner.write();
        inner.items = items;
        inner.classes = classes;
        info!(
            items = inner.items.len(),
            characters = inner.classes.len(),
            "Inventory hydrated"
        );
    }

    /// Add or replace one item.
    pub fn insert(&self, item: InventoryItem) {
        self.inner
            .write()
            .items
            .insert(item.item_instance_id.clone(), item);
    }

    /// Register a character and its class.
    pub fn insert_character(&self, character_id: CharacterId, class: i32) {
        self.inner.write().classes.insert(character_id, class);
    }

    /// Look up one item.
    pub fn get(&self, item_instance_id: &ItemInstanceId) -> Option<InventoryItem> {
        self.inner.read().items.get(item_instance_id).cloned()
    }

    /// Number of mirrored items.
    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    /// True when nothing is mirrored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    /// Known characters, sorted by id.
    pub fn characters(&self) -> Vec<(CharacterId, i32)> {
        let mut characters: Vec<_> = self
            .inner
            .read()
            .classes
            .iter()
            .map(|(id, class)| (id.clone(), *class))
            .collect();
        characters.sort();
        characters
    }

    /// Class of a character, when known.
    pub fn character_class(&self, character_id: &CharacterId) -> Option<i32> {
        self.inner.read().classes.get(character_id).copied()
    }

    /// Items at `location`, sorted by instance id.
    pub fn items_on(&self, location: &Location) -> Vec<InventoryItem> {
        let mut items: Vec<_> = self
            .inner
            .read()
            .items
            .values()
            .filter(|item| &item.location == location)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.item_instance_id.cmp(&b.item_instance_id));
        items
    }

    /// Items equipped on `character_id`, sorted by bucket then instance id.
    pub fn equipped_on(&self, character_id: &CharacterId) -> Vec<InventoryItem> {
        let mut items: Vec<_> = self
            .inner
            .read()
            .items
            .values()
            .filter(|item| item.equipped && item.location.character_id() == Some(character_id))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.bucket_hash
                .cmp(&b.bucket_hash)
                .then_with(|| a.item_instance_id.cmp(&b.item_instance_id))
        });
        items
    }

    /// Record a new location; moved items are never equipped.
    pub fn relocate(&self, item_instance_id: &ItemInstanceId, location: Location) -> bool {
        let mut inner = self.inner.write();
        match inner.items.get_mut(item_instance_id) {
            Some(item) => {
                item.location = location;
                item.equipped = false;
                true
            }
            None => false,
        }
    }

    /// Record an equip, unequipping whatever shared the bucket on that character.
    pub fn mark_equipped(&self, item_instance_id: &ItemInstanceId) -> bool {
        let mut inner = self.inner.write();
        let Some((location, bucket)) = inner
            .items
            .get(item_instance_id)
            .map(|item| (item.location.clone(), item.bucket_hash))
        else {
            return false;
        };
        if location.is_vault() {
            return false;
        }
        for item in inner.items.values_mut() {
            if item.location == location && item.bucket_hash == bucket {
                item.equipped = &item.item_instance_id == item_instance_id;
            }
        }
        true
    }

    /// Move an item to `target` with an optimistic local update.
    ///
    /// The instance is reserved before the mirror is read, so a second call
    /// for the same item fails with [`TransferError::AlreadyInProgress`]
    /// instead of trusting the optimistic location. The mirror shows the item
    /// at `target` while the transfer runs. On failure the previous state is
    /// restored, except after a partial move where the item is recorded at its
    /// actual resident location.
    pub async fn transfer(
        &self,
        orchestrator: &TransferOrchestrator,
        item_instance_id: &ItemInstanceId,
        target: Location,
    ) -> Result<TransferOutcome, TransferError> {
        let guard = orchestrator.claim(item_instance_id)?;
        let previous = self
            .get(item_instance_id)
            .ok_or_else(|| TransferError::ItemNotFound(item_instance_id.clone()))?;

        let request = TransferRequest::new(
            item_instance_id.clone(),
            previous.item_hash,
            previous.location.clone(),
            target.clone(),
        );
        if request.source == request.target {
            return orchestrator.move_claimed(&request, &guard).await;
        }

        self.relocate(item_instance_id, target);
        match orchestrator.move_claimed(&request, &guard).await {
            Ok(outcome) => {
                debug!(item = %item_instance_id, "Move confirmed by platform");
                Ok(outcome)
            }
            Err(err) => {
                match err.resident_location() {
                    Some(resident) => {
                        self.relocate(item_instance_id, resident.clone());
                    }
                    None => self.insert(previous),
                }
                warn!(item = %item_instance_id, %err, "Move failed, mirror reverted");
                Err(err)
            }
        }
    }

    /// Fold the outcome of a loadout apply into the mirror.
    pub fn record_apply(&self, result: &ApplyLoadoutResult, target: &CharacterId) {
        let destination = Location::Character(target.clone());
        for report in &result.items {
            let id = &report.item_instance_id;
            match &report.outcome {
                ItemOutcome::Applied { moved, equipped } => {
                    if *moved {
                        self.relocate(id, destination.clone());
                    }
                    if *equipped {
                        self.mark_equipped(id);
                    }
                }
                ItemOutcome::Failed(ApplyFailure::Equip { moved: true, .. }) => {
                    self.relocate(id, destination.clone());
                }
                ItemOutcome::Failed(ApplyFailure::Transfer(err)) => {
                    if let Some(resident) = err.resident_location() {
                        self.relocate(id, resident.clone());
                    }
                }
                ItemOutcome::Failed(ApplyFailure::ItemNotFound) => {
                    self.inner.write().items.remove(id);
                }
                ItemOutcome::Failed(_) => {}
            }
        }
    }
}

#[async_trait]
impl InventoryLookup for Inventory {
    async fn locate(&self, item_instance_id: &ItemInstanceId) -> Result<Option<Location>, MoveError> {
        Ok(self.get(item_instance_id).map(|item| item.location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        loadout::{ApplyClassification, ItemReport},
        platform::{MockPlatformActions, PlatformActions, TransferItemCall},
    };
    use anyhow::Result;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::sync::{oneshot, Notify};

    const PROFILE: &str = r#"{
        "characters": { "data": {
            "11": { "characterId": "11", "classType": 0, "light": 1810 },
            "22": { "characterId": "22", "classType": 2 }
        }},
        "profileInventory": { "data": { "items": [
            { "itemHash": 100, "itemInstanceId": "V1", "bucketHash": 138197802 },
            { "itemHash": 3159615086, "bucketHash": 138197802, "quantity": 250 }
        ]}},
        "characterInventories": { "data": {
            "11": { "items": [ { "itemHash": 200, "itemInstanceId": "C1", "bucketHash": 1498876634 } ] }
        }},
        "characterEquipment": { "data": {
            "11": { "items": [ { "itemHash": 300, "itemInstanceId": "E1", "bucketHash": 1498876634 } ] },
            "22": { "items": [ { "itemHash": 400, "itemInstanceId": "E2", "bucketHash": 2465295065 } ] }
        }},
        "itemComponents": { "instances": { "data": {
            "E1": { "primaryStat": { "value": 1815 }, "isEquipped": true }
        }}}
    }"#;

    fn inventory() -> Result<Inventory> {
        let profile: ProfileResponse = serde_json::from_str(PROFILE)?;
        Ok(Inventory::from_profile(&profile))
    }

    #[test]
    fn hydrates_instanced_items_only() -> Result<()> {
        let inventory = inventory()?;
        assert_eq!(inventory.len(), 4);
        assert_eq!(inventory.items_on(&Location::Vault).len(), 1);
        assert_eq!(inventory.character_class(&"22".into()), Some(2));

        let equipped = inventory.equipped_on(&"11".into());
        assert_eq!(equipped.len(), 1);
        assert_eq!(equipped[0].item_instance_id.as_str(), "E1");
        assert_eq!(equipped[0].power, Some(1815));
        Ok(())
    }

    #[test]
    fn mark_equipped_swaps_within_bucket() -> Result<()> {
        let inventory = inventory()?;
        assert!(inventory.mark_equipped(&"C1".into()));
        let equipped = inventory.equipped_on(&"11".into());
        assert_eq!(equipped.len(), 1);
        assert_eq!(equipped[0].item_instance_id.as_str(), "C1");
        assert!(!inventory.mark_equipped(&"V1".into()));
        Ok(())
    }

    #[tokio::test]
    async fn locate_reports_missing_items_as_none() -> Result<()> {
        let inventory = inventory()?;
        assert_eq!(inventory.locate(&"V1".into()).await, Ok(Some(Location::Vault)));
        assert_eq!(inventory.locate(&"nope".into()).await, Ok(None));
        Ok(())
    }

    #[tokio::test]
    async fn transfer_commits_on_success() -> Result<()> {
        let inventory = inventory()?;
        let mut platform = MockPlatformActions::new();
        platform.expect_transfer_item().times(2).returning(|_| Ok(()));
        let orchestrator = TransferOrchestrator::new(Arc::new(platform));

        let outcome = inventory
            .transfer(&orchestrator, &"E1".into(), Location::character("22"))
            .await;
        assert_eq!(outcome, Ok(TransferOutcome::Moved { hops: 2 }));
        let item = inventory.get(&"E1".into()).expect("item exists");
        assert_eq!(item.location, Location::character("22"));
        assert!(!item.equipped);
        Ok(())
    }

    #[tokio::test]
    async fn transfer_reverts_on_failure() -> Result<()> {
        let inventory = inventory()?;
        let mut platform = MockPlatformActions::new();
        platform
            .expect_transfer_item()
            .times(1)
            .returning(|_| Err(MoveError::Network("timeout".to_string())));
        let orchestrator = TransferOrchestrator::new(Arc::new(platform));

        let before = inventory.get(&"E1".into());
        let result = inventory
            .transfer(&orchestrator, &"E1".into(), Location::Vault)
            .await;
        assert!(matches!(result, Err(TransferError::HopFailed { .. })));
        assert_eq!(inventory.get(&"E1".into()), before);

        let missing = inventory
            .transfer(&orchestrator, &"nope".into(), Location::Vault)
            .await;
        assert_eq!(missing, Err(TransferError::ItemNotFound("nope".into())));
        Ok(())
    }

    #[tokio::test]
    async fn transfer_records_partial_move_in_vault() -> Result<()> {
        let inventory = inventory()?;
        let mut platform = MockPlatformActions::new();
        platform
            .expect_transfer_item()
            .withf(|call| call.transfer_to_vault)
            .returning(|_| Ok(()));
        platform
            .expect_transfer_item()
            .withf(|call| !call.transfer_to_vault)
            .returning(|_| Err(MoveError::rejected("DestinyNoRoomInDestination")));
        let orchestrator = TransferOrchestrator::new(Arc::new(platform));

        let result = inventory
            .transfer(&orchestrator, &"C1".into(), Location::character("22"))
            .await;
        assert!(matches!(result, Err(TransferError::PartiallyMoved { .. })));
        let item = inventory.get(&"C1".into()).expect("item exists");
        assert_eq!(item.location, Location::Vault);
        Ok(())
    }

    struct BlockingPlatform {
        entered: Arc<Notify>,
        release: Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl PlatformActions for BlockingPlatform {
        async fn transfer_item(&self, _call: TransferItemCall) -> Result<(), MoveError> {
            let gate = self.release.lock().take();
            match gate {
                Some(gate) => {
                    self.entered.notify_one();
                    let _ = gate.await;
                    Err(MoveError::rejected("DestinyItemActionForbidden"))
                }
                None => Ok(()),
            }
        }

        async fn equip_item(
            &self,
            _item_instance_id: ItemInstanceId,
            _character_id: CharacterId,
        ) -> Result<(), MoveError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn second_transfer_of_moving_item_is_refused() -> Result<()> {
        let inventory = inventory()?;
        let (release_tx, release_rx) = oneshot::channel();
        let entered = Arc::new(Notify::new());
        let orchestrator = TransferOrchestrator::new(Arc::new(BlockingPlatform {
            entered: Arc::clone(&entered),
            release: Mutex::new(Some(release_rx)),
        }));

        let first = {
            let inventory = inventory.clone();
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                inventory
                    .transfer(&orchestrator, &"E1".into(), Location::Vault)
                    .await
            })
        };
        entered.notified().await;
        assert_eq!(
            inventory.get(&"E1".into()).map(|item| item.location),
            Some(Location::Vault)
        );

        let second = inventory
            .transfer(&orchestrator, &"E1".into(), Location::Vault)
            .await;
        assert_eq!(second, Err(TransferError::AlreadyInProgress("E1".into())));

        let _ = release_tx.send(());
        let first = first.await?;
        assert!(matches!(first, Err(TransferError::HopFailed { .. })));
        assert_eq!(
            inventory.get(&"E1".into()).map(|item| item.location),
            Some(Location::character("11"))
        );
        assert_eq!(orchestrator.in_flight_count(), 0);
        Ok(())
    }

    #[test]
    fn record_apply_updates_locations() -> Result<()> {
        let inventory = inventory()?;
        let target = CharacterId::from("22");
        let result = ApplyLoadoutResult {
            classification: ApplyClassification::Partial,
            items: vec![
                ItemReport {
                    item_instance_id: "V1".into(),
                    item_hash: 100,
                    outcome: ItemOutcome::Applied {
                        moved: true,
                        equipped: true,
                    },
                },
                ItemReport {
                    item_instance_id: "C1".into(),
                    item_hash: 200,
                    outcome: ItemOutcome::Failed(ApplyFailure::ItemNotFound),
                },
            ],
        };

        inventory.record_apply(&result, &target);
        let moved = inventory.get(&"V1".into()).expect("item exists");
        assert_eq!(moved.location, Location::character("22"));
        assert!(moved.equipped);
        assert!(inventory.get(&"C1".into()).is_none());
        Ok(())
    }
}
