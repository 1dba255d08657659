//! Shared domain models.

use std::{fmt, str::FromStr};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TransferError;

/// Literal used by the platform and by persisted data for the shared vault.
pub const VAULT_ID: &str = "vault";

static CHARACTER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+$").expect("invalid character id regex"));

/// Opaque identifier of one concrete copy of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemInstanceId(String);

impl ItemInstanceId {
    /// Wrap a raw instance id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemInstanceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Platform character identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(String);

impl CharacterId {
    /// Wrap a raw character id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CharacterId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Item definition hash (shared by every copy of the same item).
pub type ItemHash = u32;

/// Where an item instance currently lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Location {
    /// Account-wide vault, one hop away from every character.
    Vault,
    /// A character's inventory (equipped or not).
    Character(CharacterId),
}

impl Location {
    /// Shorthand for a character location.
    pub fn character(id: impl Into<String>) -> Self {
        Location::Character(CharacterId::new(id))
    }

    /// True for the vault.
    pub fn is_vault(&self) -> bool {
        matches!(self, Location::Vault)
    }

    /// Character id when this is a character location.
    pub fn character_id(&self) -> Option<&CharacterId> {
        match self {
            Location::Character(id) => Some(id),
            Location::Vault => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Vault => f.write_str(VAULT_ID),
            Location::Character(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for Location {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case(VAULT_ID) {
            return Ok(Location::Vault);
        }
        if CHARACTER_ID_RE.is_match(trimmed) {
            return Ok(Location::character(trimmed));
        }
        Err(TransferError::InvalidLocation(s.to_string()))
    }
}

impl From<Location> for String {
    fn from(value: Location) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Location {
    type Error = TransferError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A request to relocate one item instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Instance being moved.
    pub item_instance_id: ItemInstanceId,
    /// Definition hash of the instance.
    pub item_hash: ItemHash,
    /// Current resident location.
    pub source: Location,
    /// Desired location.
    pub target: Location,
}

impl TransferRequest {
    /// Build a request between two known locations.
    pub fn new(
        item_instance_id: impl Into<ItemInstanceId>,
        item_hash: ItemHash,
        source: Location,
        target: Location,
    ) -> Self {
        Self {
            item_instance_id: item_instance_id.into(),
            item_hash,
            source,
            target,
        }
    }

    /// Build a request from raw location strings as they arrive from a frontend.
    pub fn parse(
        item_instance_id: impl Into<ItemInstanceId>,
        item_hash: ItemHash,
        source: &str,
        target: &str,
    ) -> Result<Self, TransferError> {
        Ok(Self::new(
            item_instance_id,
            item_hash,
            source.parse()?,
            target.parse()?,
        ))
    }
}

impl From<String> for ItemInstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
