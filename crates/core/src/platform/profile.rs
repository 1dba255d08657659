//! Subset of the GetProfile response needed to mirror item locations.

use std::collections::HashMap;

use serde::Deserialize;

/// Profile components requested: characters, vault, character inventories,
/// character equipment, item instances.
pub const PROFILE_COMPONENTS: &str = "200,102,201,205,300";

/// GetProfile payload, keyed by component.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    /// Characters by id (component 200).
    #[serde(default)]
    pub characters: Option<Component<HashMap<String, CharacterComponent>>>,
    /// Vault contents (component 102).
    #[serde(default)]
    pub profile_inventory: Option<Component<ItemList>>,
    /// Unequipped items per character (component 201).
    #[serde(default)]
    pub character_inventories: Option<Component<HashMap<String, ItemList>>>,
    /// Equipped items per character (component 205).
    #[serde(default)]
    pub character_equipment: Option<Component<HashMap<String, ItemList>>>,
    /// Per-instance details (component 300).
    #[serde(default)]
    pub item_components: Option<ItemComponents>,
}

/// Wrapper the platform puts around every component.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Component<T> {
    /// Missing when the component is privacy-restricted.
    #[serde(default)]
    pub data: Option<T>,
}

/// One character of the account.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterComponent {
    /// Character id.
    pub character_id: String,
    /// 0 Titan, 1 Hunter, 2 Warlock.
    #[serde(default = "unknown_class")]
    pub class_type: i32,
}

fn unknown_class() -> i32 {
    -1
}

/// Items of one bucket list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemList {
    /// Entries in platform order.
    #[serde(default)]
    pub items: Vec<ItemComponent>,
}

/// One inventory entry; stackables carry no instance id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemComponent {
    /// Definition hash.
    pub item_hash: u32,
    /// Instance id, absent for stackables.
    #[serde(default)]
    pub item_instance_id: Option<String>,
    /// Bucket (slot) hash.
    #[serde(default)]
    pub bucket_hash: u32,
}

/// Instance-level components.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemComponents {
    /// Instance details by instance id.
    #[serde(default)]
    pub instances: Option<Component<HashMap<String, InstanceComponent>>>,
}

/// Details of one instance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceComponent {
    /// Power, for weapons and armor.
    #[serde(default)]
    pub primary_stat: Option<StatValue>,
}

/// A single stat value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatValue {
    /// Stat value.
    pub value: i32,
}

impl ProfileResponse {
    /// Power level of an instance, when the instance component is present.
    pub fn power_of(&self, item_instance_id: &str) -> Option<i32> {
        self.item_components
            .as_ref()?
            .instances
            .as_ref()?
            .data
            .as_ref()?
            .get(item_instance_id)?
            .primary_stat
            .as_ref()
            .map(|stat| stat.value)
    }
}
