//! Reapplying a stored loadout to a character.

use std::{fmt, sync::Arc};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    error::{MoveError, TransferError},
    models::{CharacterId, ItemHash, ItemInstanceId, Location, TransferRequest},
    platform::{InventoryLookup, PlatformActions},
    transfer::TransferOrchestrator,
};

use super::{Loadout, LoadoutItem};

/// How per-item work is scheduled during an apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMode {
    /// One item after another, in declaration order.
    #[default]
    Sequential,
    /// All items at once; reports still come back in declaration order.
    Concurrent,
}

/// Why one loadout item could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyFailure {
    /// The instance is no longer on the account.
    #[error("item not found")]
    ItemNotFound,

    /// The current location could not be determined.
    #[error("lookup failed: {0}")]
    Lookup(MoveError),

    /// Relocating the item to the target character failed.
    #[error("transfer failed: {0}")]
    Transfer(TransferError),

    /// The item reached the character (or was already there) but did not equip.
    #[error("equip failed: {source}")]
    Equip {
        /// Whether the item was moved before the equip attempt.
        moved: bool,
        /// Platform failure of the equip call.
        source: MoveError,
    },
}

impl ApplyFailure {
    fn equip_reason(&self) -> Option<crate::platform::EquipFailureReason> {
        match self {
            ApplyFailure::Equip {
                source: MoveError::EquipBlocked(reason),
                ..
            } => Some(*reason),
            _ => None,
        }
    }
}

/// Result of applying one loadout item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The item ended on the target character.
    Applied {
        /// A transfer was needed.
        moved: bool,
        /// The item was equipped.
        equipped: bool,
    },
    /// The item could not be applied.
    Failed(ApplyFailure),
}

impl ItemOutcome {
    /// True for [`ItemOutcome::Applied`].
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Applied { .. })
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemOutcome::Applied {
                moved: true,
                equipped: true,
            } => f.write_str("moved, equipped"),
            ItemOutcome::Applied {
                moved: true,
                equipped: false,
            } => f.write_str("moved, not equipped"),
            ItemOutcome::Applied {
                moved: false,
                equipped: true,
            } => f.write_str("already present, equipped"),
            ItemOutcome::Applied {
                moved: false,
                equipped: false,
            } => f.write_str("already present"),
            ItemOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Per-item entry of an [`ApplyLoadoutResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    /// Instance the report is about.
    pub item_instance_id: ItemInstanceId,
    /// Definition hash of the instance.
    pub item_hash: ItemHash,
    /// What happened.
    pub outcome: ItemOutcome,
}

impl ItemReport {
    /// Failure reason, when the item failed.
    pub fn reason(&self) -> Option<&ApplyFailure> {
        match &self.outcome {
            ItemOutcome::Failed(reason) => Some(reason),
            ItemOutcome::Applied { .. } => None,
        }
    }
}

/// Aggregate classification of an apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApplyClassification {
    /// Every item succeeded (an empty loadout included).
    Success,
    /// At least one success and at least one failure.
    Partial,
    /// No item succeeded.
    Failure,
}

impl ApplyClassification {
    fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) => ApplyClassification::Success,
            (0, _) => ApplyClassification::Failure,
            _ => ApplyClassification::Partial,
        }
    }
}

/// Snapshot of apply progress, also sent while an apply runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApplyProgress {
    /// Items in the loadout.
    pub total: usize,
    /// Items applied so far.
    pub succeeded: usize,
    /// Items failed so far.
    pub failed: usize,
    /// Every item has a report.
    pub is_complete: bool,
}

impl ApplyProgress {
    fn new(total: usize, succeeded: usize, failed: usize) -> Self {
        Self {
            total,
            succeeded,
            failed,
            is_complete: succeeded + failed >= total,
        }
    }
}

/// Outcome of [`LoadoutApplyEngine::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyLoadoutResult {
    /// Aggregate over `items`.
    pub classification: ApplyClassification,
    /// One report per loadout item, in declaration order.
    pub items: Vec<ItemReport>,
}

impl ApplyLoadoutResult {
    fn from_reports(items: Vec<ItemReport>) -> Self {
        let succeeded = items.iter().filter(|r| r.outcome.is_success()).count();
        let classification = ApplyClassification::from_counts(succeeded, items.len() - succeeded);
        Self {
            classification,
            items,
        }
    }

    /// Reports of failed items.
    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|r| !r.outcome.is_success())
    }

    /// Counts over the finished apply.
    pub fn progress(&self) -> ApplyProgress {
        let failed = self.failures().count();
        ApplyProgress::new(self.items.len(), self.items.len() - failed, failed)
    }

    /// Some item was refused because another exotic is equipped.
    pub fn has_exotic_conflict(&self) -> bool {
        self.failures()
            .filter_map(|r| r.reason().and_then(ApplyFailure::equip_reason))
            .any(|reason| reason.is_exotic_conflict())
    }

    /// Some item was refused because the character is in a restricted activity.
    pub fn has_activity_restriction(&self) -> bool {
        self.failures()
            .filter_map(|r| r.reason().and_then(ApplyFailure::equip_reason))
            .any(|reason| reason.is_activity_restriction())
    }
}

/// Reapplies loadouts item by item, never letting one item abort the rest.
#[derive(Clone)]
pub struct LoadoutApplyEngine {
    orchestrator: TransferOrchestrator,
    platform: Arc<dyn PlatformActions>,
    inventory: Arc<dyn InventoryLookup>,
    mode: ApplyMode,
}

impl LoadoutApplyEngine {
    /// Engine sharing `orchestrator`'s in-flight registry.
    pub fn new(
        orchestrator: TransferOrchestrator,
        platform: Arc<dyn PlatformActions>,
        inventory: Arc<dyn InventoryLookup>,
    ) -> Self {
        Self {
            orchestrator,
            platform,
            inventory,
            mode: ApplyMode::default(),
        }
    }

    /// Change how items are scheduled.
    pub fn with_mode(mut self, mode: ApplyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Apply `loadout` to `target`.
    pub async fn apply(&self, loadout: &Loadout, target: &CharacterId) -> ApplyLoadoutResult {
        self.run(loadout, target, None).await
    }

    /// Apply `loadout` to `target`, sending a progress snapshot after each item.
    pub async fn apply_with_progress(
        &self,
        loadout: &Loadout,
        target: &CharacterId,
        progress: mpsc::Sender<ApplyProgress>,
    ) -> ApplyLoadoutResult {
        self.run(loadout, target, Some(progress)).await
    }

    async fn run(
        &self,
        loadout: &Loadout,
        target: &CharacterId,
        progress: Option<mpsc::Sender<ApplyProgress>>,
    ) -> ApplyLoadoutResult {
        let total = loadout.items.len();
        info!(
            loadout = %loadout.name,
            items = total,
            character = %target,
            mode = ?self.mode,
            "applying loadout"
        );

        let mut tally = Tally::new(total, progress);
        let reports = match self.mode {
            ApplyMode::Sequential => {
                let mut reports = Vec::with_capacity(total);
                for item in &loadout.items {
                    let report = self.apply_item(item, target).await;
                    tally.record(&report).await;
                    reports.push(report);
                }
                reports
            }
            ApplyMode::Concurrent => {
                let mut pending: FuturesUnordered<_> = loadout
                    .items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| async move { (index, self.apply_item(item, target).await) })
                    .collect();
                let mut slots: Vec<Option<ItemReport>> = (0..total).map(|_| None).collect();
                while let Some((index, report)) = pending.next().await {
                    tally.record(&report).await;
                    slots[index] = Some(report);
                }
                slots.into_iter().flatten().collect()
            }
        };

        let result = ApplyLoadoutResult::from_reports(reports);
        let summary = result.progress();
        info!(
            loadout = %loadout.name,
            succeeded = summary.succeeded,
            failed = summary.failed,
            classification = ?result.classification,
            "loadout applied"
        );
        if result.has_activity_restriction() {
            warn!("some items could not be equipped; the character may be in an activity");
        }
        if result.has_exotic_conflict() {
            warn!("exotic conflict detected; remove the conflicting exotic first");
        }
        result
    }

    async fn apply_item(&self, item: &LoadoutItem, target: &CharacterId) -> ItemReport {
        let outcome = match self.place_item(item, target).await {
            Ok((moved, equipped)) => ItemOutcome::Applied { moved, equipped },
            Err(reason) => {
                warn!(item = %item.item_instance_id, %reason, "loadout item failed");
                ItemOutcome::Failed(reason)
            }
        };
        ItemReport {
            item_instance_id: item.item_instance_id.clone(),
            item_hash: item.item_hash,
            outcome,
        }
    }

    async fn place_item(
        &self,
        item: &LoadoutItem,
        target: &CharacterId,
    ) -> Result<(bool, bool), ApplyFailure> {
        let id = &item.item_instance_id;
        let current = match self.inventory.locate(id).await {
            Ok(Some(location)) => location,
            Ok(None) | Err(MoveError::ItemNotFound) => return Err(ApplyFailure::ItemNotFound),
            Err(err) => return Err(ApplyFailure::Lookup(err)),
        };

        let destination = Location::Character(target.clone());
        let moved = current != destination;
        if moved {
            let request = TransferRequest::new(id.clone(), item.item_hash, current, destination);
            match self.orchestrator.move_item(&request).await {
                Ok(_) => {}
                Err(TransferError::HopFailed {
                    source: MoveError::ItemNotFound,
                    ..
                }) => return Err(ApplyFailure::ItemNotFound),
                Err(err) => return Err(ApplyFailure::Transfer(err)),
            }
        }

        if item.equip {
            self.platform
                .equip_item(id.clone(), target.clone())
                .await
                .map_err(|source| ApplyFailure::Equip { moved, source })?;
        }

        Ok((moved, item.equip))
    }
}

struct Tally {
    total: usize,
    succeeded: usize,
    failed: usize,
    sender: Option<mpsc::Sender<ApplyProgress>>,
}

impl Tally {
    fn new(total: usize, sender: Option<mpsc::Sender<ApplyProgress>>) -> Self {
        Self {
            total,
            succeeded: 0,
            failed: 0,
            sender,
        }
    }

    async fn record(&mut self, report: &ItemReport) {
        if report.outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        if let Some(sender) = &self.sender {
            let _ = sender
                .send(ApplyProgress::new(self.total, self.succeeded, self.failed))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::Location,
        platform::{EquipFailureReason, MockInventoryLookup, MockPlatformActions},
    };
    use std::collections::HashMap;

    const TITAN: &str = "2305843009261519028";

    fn lookup(entries: &[(&str, Location)]) -> MockInventoryLookup {
        let locations: HashMap<ItemInstanceId, Location> = entries
            .iter()
            .map(|(id, location)| (ItemInstanceId::from(*id), location.clone()))
            .collect();
        let mut inventory = MockInventoryLookup::new();
        inventory
            .expect_locate()
            .returning(move |id| Ok(locations.get(id).cloned()));
        inventory
    }

    fn engine(platform: MockPlatformActions, inventory: MockInventoryLookup) -> LoadoutApplyEngine {
        let platform: Arc<dyn PlatformActions> = Arc::new(platform);
        LoadoutApplyEngine::new(
            TransferOrchestrator::new(Arc::clone(&platform)),
            platform,
            Arc::new(inventory),
        )
    }

    fn loadout(items: Vec<LoadoutItem>) -> Loadout {
        Loadout::new("test", "Raid", CharacterId::from(TITAN), 0, items)
    }

    #[tokio::test]
    async fn empty_loadout_is_success() {
        let mut platform = MockPlatformActions::new();
        platform.expect_transfer_item().never();
        platform.expect_equip_item().never();
        let engine = engine(platform, lookup(&[]));

        let result = engine.apply(&loadout(Vec::new()), &TITAN.into()).await;
        assert_eq!(result.classification, ApplyClassification::Success);
        assert!(result.items.is_empty());
        assert!(result.progress().is_complete);
    }

    #[tokio::test]
    async fn present_item_is_equipped_and_vault_item_is_moved() {
        let mut platform = MockPlatformActions::new();
        platform
            .expect_transfer_item()
            .withf(|call| {
                call.item_instance_id.as_str() == "B"
                    && !call.transfer_to_vault
                    && call.character_id.as_str() == TITAN
            })
            .times(1)
            .returning(|_| Ok(()));
        platform
            .expect_equip_item()
            .withf(|id, character| id.as_str() == "A" && character.as_str() == TITAN)
            .times(1)
            .returning(|_, _| Ok(()));
        let engine = engine(
            platform,
            lookup(&[("A", Location::character(TITAN)), ("B", Location::Vault)]),
        );

        let result = engine
            .apply(
                &loadout(vec![
                    LoadoutItem::equipped("A", 1, 10),
                    LoadoutItem::carried("B", 2, 20),
                ]),
                &TITAN.into(),
            )
            .await;

        assert_eq!(result.classification, ApplyClassification::Success);
        assert_eq!(
            result.items[0].outcome,
            ItemOutcome::Applied {
                moved: false,
                equipped: true
            }
        );
        assert_eq!(result.items[0].outcome.to_string(), "already present, equipped");
        assert_eq!(
            result.items[1].outcome,
            ItemOutcome::Applied {
                moved: true,
                equipped: false
            }
        );
        assert_eq!(result.items[1].outcome.to_string(), "moved, not equipped");
    }

    #[tokio::test]
    async fn missing_item_is_reported_and_batch_continues() {
        let mut platform = MockPlatformActions::new();
        platform.expect_transfer_item().never();
        platform
            .expect_equip_item()
            .times(1)
            .returning(|_, _| Ok(()));
        let engine = engine(platform, lookup(&[("B", Location::character(TITAN))]));

        let result = engine
            .apply(
                &loadout(vec![
                    LoadoutItem::equipped("gone", 1, 10),
                    LoadoutItem::equipped("B", 2, 20),
                ]),
                &TITAN.into(),
            )
            .await;

        assert_eq!(result.classification, ApplyClassification::Partial);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].reason(), Some(&ApplyFailure::ItemNotFound));
        assert!(result.items[1].outcome.is_success());
    }

    #[tokio::test]
    async fn item_deleted_during_transfer_is_reported_as_missing() {
        let mut platform = MockPlatformActions::new();
        platform
            .expect_transfer_item()
            .withf(|call| call.item_instance_id.as_str() == "gone")
            .times(1)
            .returning(|_| Err(MoveError::ItemNotFound));
        platform
            .expect_transfer_item()
            .withf(|call| call.item_instance_id.as_str() == "B")
            .times(1)
            .returning(|_| Ok(()));
        platform
            .expect_equip_item()
            .withf(|id, _| id.as_str() == "B")
            .times(1)
            .returning(|_, _| Ok(()));
        let engine = engine(
            platform,
            lookup(&[("gone", Location::Vault), ("B", Location::Vault)]),
        );

        let result = engine
            .apply(
                &loadout(vec![
                    LoadoutItem::equipped("gone", 1, 10),
                    LoadoutItem::equipped("B", 2, 20),
                ]),
                &TITAN.into(),
            )
            .await;

        assert_eq!(result.classification, ApplyClassification::Partial);
        assert_eq!(result.items[0].reason(), Some(&ApplyFailure::ItemNotFound));
        assert_eq!(
            result.items[1].outcome,
            ItemOutcome::Applied {
                moved: true,
                equipped: true
            }
        );
    }

    #[tokio::test]
    async fn lookup_error_is_reported_and_batch_continues() {
        let mut inventory = MockInventoryLookup::new();
        inventory
            .expect_locate()
            .withf(|id| id.as_str() == "A")
            .returning(|_| Err(MoveError::Network("connection reset".to_string())));
        inventory
            .expect_locate()
            .returning(|_| Ok(Some(Location::character(TITAN))));
        let mut platform = MockPlatformActions::new();
        platform.expect_transfer_item().never();
        platform
            .expect_equip_item()
            .withf(|id, _| id.as_str() == "B")
            .times(1)
            .returning(|_, _| Ok(()));
        let engine = engine(platform, inventory);

        let result = engine
            .apply(
                &loadout(vec![
                    LoadoutItem::equipped("A", 1, 10),
                    LoadoutItem::equipped("B", 2, 20),
                ]),
                &TITAN.into(),
            )
            .await;

        assert_eq!(result.classification, ApplyClassification::Partial);
        assert_eq!(
            result.items[0].reason(),
            Some(&ApplyFailure::Lookup(MoveError::Network(
                "connection reset".to_string()
            )))
        );
        assert!(result.items[1].outcome.is_success());
    }

    #[tokio::test]
    async fn partial_failures_are_counted() {
        let mut platform = MockPlatformActions::new();
        platform
            .expect_transfer_item()
            .withf(|call| call.item_instance_id.as_str() == "C")
            .returning(|_| Err(MoveError::rejected("DestinyNoRoomInDestination")));
        platform
            .expect_transfer_item()
            .returning(|_| Ok(()));
        platform
            .expect_equip_item()
            .withf(|id, _| id.as_str() == "D")
            .returning(|_, _| Err(MoveError::EquipBlocked(EquipFailureReason::from_bits(2))));
        platform
            .expect_equip_item()
            .returning(|_, _| Ok(()));
        let engine = engine(
            platform,
            lookup(&[
                ("A", Location::Vault),
                ("B", Location::character("99")),
                ("C", Location::Vault),
                ("D", Location::character(TITAN)),
            ]),
        );

        let result = engine
            .apply(
                &loadout(vec![
                    LoadoutItem::equipped("A", 1, 10),
                    LoadoutItem::equipped("B", 2, 20),
                    LoadoutItem::equipped("C", 3, 30),
                    LoadoutItem::equipped("D", 4, 40),
                ]),
                &TITAN.into(),
            )
            .await;

        assert_eq!(result.classification, ApplyClassification::Partial);
        assert_eq!(result.items.len(), 4);
        let failed: Vec<&str> = result
            .failures()
            .map(|r| r.item_instance_id.as_str())
            .collect();
        assert_eq!(failed, vec!["C", "D"]);
        assert!(matches!(
            result.items[2].reason(),
            Some(ApplyFailure::Transfer(TransferError::HopFailed { .. }))
        ));
        assert!(result.has_exotic_conflict());
        assert!(!result.has_activity_restriction());
        assert_eq!(
            result.progress(),
            ApplyProgress {
                total: 4,
                succeeded: 2,
                failed: 2,
                is_complete: true
            }
        );
    }

    #[tokio::test]
    async fn all_failures_classify_as_failure() {
        let mut platform = MockPlatformActions::new();
        platform
            .expect_equip_item()
            .returning(|_, _| Err(MoveError::Unauthorized));
        let engine = engine(
            platform,
            lookup(&[("A", Location::character(TITAN)), ("B", Location::character(TITAN))]),
        );

        let result = engine
            .apply(
                &loadout(vec![
                    LoadoutItem::equipped("A", 1, 10),
                    LoadoutItem::equipped("B", 2, 20),
                ]),
                &TITAN.into(),
            )
            .await;

        assert_eq!(result.classification, ApplyClassification::Failure);
        assert_eq!(
            result.items[0].reason(),
            Some(&ApplyFailure::Equip {
                moved: false,
                source: MoveError::Unauthorized
            })
        );
    }

    #[tokio::test]
    async fn concurrent_mode_keeps_declaration_order_and_reports_progress() {
        let mut platform = MockPlatformActions::new();
        platform.expect_transfer_item().returning(|_| Ok(()));
        platform.expect_equip_item().returning(|_, _| Ok(()));
        let engine = engine(
            platform,
            lookup(&[
                ("A", Location::Vault),
                ("B", Location::character("77")),
                ("C", Location::character(TITAN)),
            ]),
        )
        .with_mode(ApplyMode::Concurrent);

        let (tx, mut rx) = mpsc::channel(8);
        let result = engine
            .apply_with_progress(
                &loadout(vec![
                    LoadoutItem::equipped("A", 1, 10),
                    LoadoutItem::equipped("B", 2, 20),
                    LoadoutItem::carried("C", 3, 30),
                ]),
                &TITAN.into(),
                tx,
            )
            .await;

        let order: Vec<&str> = result
            .items
            .iter()
            .map(|r| r.item_instance_id.as_str())
            .collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert_eq!(result.classification, ApplyClassification::Success);

        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }
        assert_eq!(updates.len(), 3);
        assert!(updates.last().map(|p| p.is_complete).unwrap_or(false));
    }
}
