//! Loadout persistence, one JSON file per loadout.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::{inventory::Inventory, models::CharacterId};

use super::{Loadout, LoadoutItem};

/// Directory under the user's data directory used for loadouts.
pub const DEFAULT_LOADOUT_DIR: &str = "nexus/loadouts";

/// Display name of a character class id.
pub fn class_name(class: i32) -> &'static str {
    match class {
        0 => "Titan",
        1 => "Hunter",
        2 => "Warlock",
        _ => "Unknown",
    }
}

/// Manager responsible for loading and writing loadout files.
pub struct LoadoutStore {
    root: PathBuf,
}

impl LoadoutStore {
    /// Create a store rooted at the provided directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default location under the user's data directory.
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_LOADOUT_DIR)
    }

    /// Directory holding the loadout files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All stored loadouts, newest first.
    pub fn list(&self) -> Result<Vec<Loadout>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut loadouts = Vec::new();
        for entry in fs::read_dir(&self.root).context("failed to read loadout directory")? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if entry.path().extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            match read_loadout(&entry.path()) {
                Ok(loadout) => loadouts.push(loadout),
                Err(err) => warn!("Failed to read loadout {:?}: {err}", entry.path()),
            }
        }

        loadouts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(loadouts)
    }

    /// Load one loadout by id.
    pub fn get(&self, id: &str) -> Result<Option<Loadout>> {
        let Some(path) = self.path_for(id) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        read_loadout(&path).map(Some)
    }

    /// Write a loadout, replacing any previous version with the same id.
    pub fn save(&self, loadout: &Loadout) -> Result<PathBuf> {
        let path = self
            .path_for(&loadout.id)
            .ok_or_else(|| anyhow::anyhow!("invalid loadout id '{}'", loadout.id))?;
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        let serialised = serde_json::to_vec_pretty(loadout)?;
        fs::write(&path, serialised)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Capture the items currently equipped on `character_id` as a new loadout.
    ///
    /// Returns `None` when the character has nothing equipped. A blank name
    /// falls back to "Loadout N".
    pub fn snapshot(
        &self,
        inventory: &Inventory,
        character_id: &CharacterId,
        name: &str,
    ) -> Result<Option<Loadout>> {
        let equipped = inventory.equipped_on(character_id);
        if equipped.is_empty() {
            warn!(character = %character_id, "No equipped items found; is the profile loaded?");
            return Ok(None);
        }

        let items = equipped
            .into_iter()
            .map(|item| LoadoutItem {
                item_instance_id: item.item_instance_id,
                item_hash: item.item_hash,
                bucket_hash: item.bucket_hash,
                equip: true,
                label: None,
                power: item.power,
            })
            .collect::<Vec<_>>();

        let name = match name.trim() {
            "" => format!("Loadout {}", self.list()?.len() + 1),
            trimmed => trimmed.to_string(),
        };
        let class = inventory.character_class(character_id).unwrap_or(-1);
        let id = self.unique_id(&name);

        let loadout = Loadout::new(id, name, character_id.clone(), class, items);
        self.save(&loadout)?;
        info!(
            loadout = %loadout.name,
            items = loadout.items.len(),
            character = %character_id,
            "Snapshot saved"
        );
        Ok(Some(loadout))
    }

    /// Remove a loadout; `false` when it did not exist.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let Some(path) = self.path_for(id) else {
            return Ok(false);
        };
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("failed to delete {}", path.display()))?;
        info!(loadout = id, "Deleted loadout");
        Ok(true)
    }

    /// Rename a loadout. Blank names are ignored.
    pub fn rename(&self, id: &str, name: &str) -> Result<Option<Loadout>> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return self.get(id);
        }
        let trimmed = trimmed.to_string();
        self.modify(id, move |loadout| loadout.name = trimmed)
    }

    /// Replace the notes of a loadout; an empty string clears them.
    pub fn update_notes(&self, id: &str, notes: &str) -> Result<Option<Loadout>> {
        let notes = Some(notes.to_string()).filter(|value| !value.trim().is_empty());
        self.modify(id, move |loadout| loadout.notes = notes)
    }

    /// Replace the items of a loadout.
    pub fn update_items(&self, id: &str, items: Vec<LoadoutItem>) -> Result<Option<Loadout>> {
        self.modify(id, move |loadout| loadout.items = items)
    }

    fn modify(&self, id: &str, change: impl FnOnce(&mut Loadout)) -> Result<Option<Loadout>> {
        let Some(mut loadout) = self.get(id)? else {
            return Ok(None);
        };
        change(&mut loadout);
        loadout.updated_at = Utc::now();
        self.save(&loadout)?;
        Ok(Some(loadout))
    }

    fn path_for(&self, id: &str) -> Option<PathBuf> {
        if id.is_empty() || sanitize_component(id) != id {
            return None;
        }
        Some(self.root.join(format!("{id}.json")))
    }

    fn unique_id(&self, name: &str) -> String {
        let base = format!(
            "{}_{}",
            sanitize_component(name),
            Utc::now().format("%Y%m%d%H%M%S%3f")
        );
        let mut candidate = base.clone();
        let mut counter = 1;
        while self.root.join(format!("{candidate}.json")).exists() {
            candidate = format!("{base}-{counter}");
            counter += 1;
        }
        candidate
    }
}

/// Loadouts snapshotted from `character_id`.
pub fn for_character<'a>(loadouts: &'a [Loadout], character_id: &CharacterId) -> Vec<&'a Loadout> {
    loadouts
        .iter()
        .filter(|loadout| &loadout.character_id == character_id)
        .collect()
}

/// Loadouts grouped by character class id.
pub fn grouped_by_class(loadouts: &[Loadout]) -> BTreeMap<i32, Vec<&Loadout>> {
    let mut grouped: BTreeMap<i32, Vec<&Loadout>> = BTreeMap::new();
    for loadout in loadouts {
        grouped
            .entry(loadout.character_class)
            .or_default()
            .push(loadout);
    }
    grouped
}

fn read_loadout(path: &Path) -> Result<Loadout> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let loadout = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(loadout)
}

fn sanitize_component(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_') {
            result.push(ch);
        }
    }
    if result.is_empty() {
        "loadout".to_string()
    } else {
        result
    }
}
