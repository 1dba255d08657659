//! Loadout snapshots, their persistence and their reapplication.

pub mod apply;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{CharacterId, ItemHash, ItemInstanceId};

pub use apply::{
    ApplyClassification, ApplyFailure, ApplyLoadoutResult, ApplyMode, ApplyProgress, ItemOutcome,
    ItemReport, LoadoutApplyEngine,
};
pub use store::{class_name, for_character, grouped_by_class, LoadoutStore};

/// One item captured in a loadout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadoutItem {
    /// Instance to put on the character.
    pub item_instance_id: ItemInstanceId,
    /// Definition hash of the instance.
    pub item_hash: ItemHash,
    /// Inventory bucket (slot) the item occupies.
    pub bucket_hash: u32,
    /// Equip after moving; otherwise the item is only carried.
    #[serde(default = "default_equip")]
    pub equip: bool,
    /// Display name cached at snapshot time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Power level at snapshot time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<i32>,
}

fn default_equip() -> bool {
    true
}

impl LoadoutItem {
    /// Item that should be equipped.
    pub fn equipped(
        item_instance_id: impl Into<ItemInstanceId>,
        item_hash: ItemHash,
        bucket_hash: u32,
    ) -> Self {
        Self {
            item_instance_id: item_instance_id.into(),
            item_hash,
            bucket_hash,
            equip: true,
            label: None,
            power: None,
        }
    }

    /// Item that should only be carried.
    pub fn carried(
        item_instance_id: impl Into<ItemInstanceId>,
        item_hash: ItemHash,
        bucket_hash: u32,
    ) -> Self {
        Self {
            equip: false,
            ..Self::equipped(item_instance_id, item_hash, bucket_hash)
        }
    }
}

/// Snapshot of a character's gear, reapplicable later.
///
/// A loadout does not follow the items after it is taken; applying it twice
/// without outside changes converges on the same equipped state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loadout {
    /// Stable identifier, also the file stem in the store.
    pub id: String,
    /// User-facing name.
    pub name: String,
    /// Character the snapshot was taken from.
    pub character_id: CharacterId,
    /// 0 Titan, 1 Hunter, 2 Warlock, -1 unknown.
    pub character_class: i32,
    /// Items in application order.
    pub items: Vec<LoadoutItem>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Loadout {
    /// New loadout stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        character_id: CharacterId,
        character_class: i32,
        items: Vec<LoadoutItem>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            character_id,
            character_class,
            items,
            created_at: now,
            updated_at: now,
            notes: None,
        }
    }
}
