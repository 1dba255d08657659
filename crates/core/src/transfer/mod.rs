//! Single- and multi-hop item transfers.

pub mod executor;
pub mod guard;
pub mod orchestrator;

use std::fmt;

use crate::models::{CharacterId, Location};

pub use executor::LocationMoveExecutor;
pub use guard::{InFlightGuard, InFlightRegistry};
pub use orchestrator::{TransferOrchestrator, TransferOutcome};

/// Direction of a hop relative to the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HopDirection {
    /// Character inventory into the vault.
    ToVault,
    /// Vault into a character inventory.
    FromVault,
}

/// One call of the platform's single-hop transfer primitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hop {
    /// Character on the non-vault end of the hop.
    pub character_id: CharacterId,
    /// Which way the item travels.
    pub direction: HopDirection,
}

impl Hop {
    /// Hop from `character_id` into the vault.
    pub fn to_vault(character_id: CharacterId) -> Self {
        Self {
            character_id,
            direction: HopDirection::ToVault,
        }
    }

    /// Hop from the vault onto `character_id`.
    pub fn from_vault(character_id: CharacterId) -> Self {
        Self {
            character_id,
            direction: HopDirection::FromVault,
        }
    }

    /// Where the item sits before the hop.
    pub fn origin(&self) -> Location {
        match self.direction {
            HopDirection::ToVault => Location::Character(self.character_id.clone()),
            HopDirection::FromVault => Location::Vault,
        }
    }

    /// Where the item sits after the hop.
    pub fn destination(&self) -> Location {
        match self.direction {
            HopDirection::ToVault => Location::Vault,
            HopDirection::FromVault => Location::Character(self.character_id.clone()),
        }
    }

    /// Flag the platform expects for this hop.
    pub fn transfer_to_vault(&self) -> bool {
        self.direction == HopDirection::ToVault
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.origin(), self.destination())
    }
}

/// Minimal hop sequence between two locations.
///
/// Characters never reach each other directly, so a character-to-character
/// move stages through the vault. Equal locations need no hop.
pub fn plan_hops(source: &Location, target: &Location) -> Vec<Hop> {
    match (source, target) {
        (a, b) if a == b => Vec::new(),
        (Location::Vault, Location::Character(to)) => vec![Hop::from_vault(to.clone())],
        (Location::Character(from), Location::Vault) => vec![Hop::to_vault(from.clone())],
        (Location::Character(from), Location::Character(to)) => {
            vec![Hop::to_vault(from.clone()), Hop::from_vault(to.clone())]
        }
        (Location::Vault, Location::Vault) => Vec::new(),
    }
}
