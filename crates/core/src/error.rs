//! Error types shared by the transfer and loadout layers.

use thiserror::Error;

use crate::{
    models::{ItemInstanceId, Location},
    platform::EquipFailureReason,
    transfer::Hop,
};

/// Failure of a single platform call (one hop or one equip).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    /// Transport failure before the platform produced an answer.
    #[error("network error: {0}")]
    Network(String),

    /// Credentials missing, expired or refused.
    #[error("unauthorized")]
    Unauthorized,

    /// The platform answered and refused the request.
    #[error("rejected by platform ({status} {code}): {message}")]
    Rejected {
        /// Numeric platform error code.
        code: i32,
        /// Symbolic platform error status.
        status: String,
        /// Human-readable platform message.
        message: String,
    },

    /// The instance no longer exists on the account.
    #[error("item not found")]
    ItemNotFound,

    /// The equip call was answered with a non-zero failure bitmask.
    #[error("cannot equip: {}", .0.label())]
    EquipBlocked(EquipFailureReason),
}

impl MoveError {
    /// Shorthand for a platform rejection without a numeric code.
    pub fn rejected(message: impl Into<String>) -> Self {
        MoveError::Rejected {
            code: 0,
            status: "Rejected".to_string(),
            message: message.into(),
        }
    }
}

/// Failure of an orchestrated, possibly multi-hop, transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// A location string did not name the vault or a character.
    #[error("invalid location '{0}'")]
    InvalidLocation(String),

    /// The instance is not known locally, so its source cannot be determined.
    #[error("item {0} not found in inventory")]
    ItemNotFound(ItemInstanceId),

    /// Another transfer of the same instance is still running.
    #[error("transfer already in progress for {0}")]
    AlreadyInProgress(ItemInstanceId),

    /// A hop failed and the item stayed where that hop started.
    #[error("hop {hop} failed: {source}")]
    HopFailed {
        /// The hop that failed.
        hop: Hop,
        /// Underlying platform failure.
        #[source]
        source: MoveError,
    },

    /// An earlier hop succeeded and a later one failed; the item is parked in between.
    #[error("item left in {resident} after a failed hop: {source}")]
    PartiallyMoved {
        /// Where the item now resides.
        resident: Location,
        /// Underlying platform failure of the hop that did not complete.
        #[source]
        source: MoveError,
    },
}

impl TransferError {
    /// Location the item occupies after this failure, when it differs from the source.
    pub fn resident_location(&self) -> Option<&Location> {
        match self {
            TransferError::PartiallyMoved { resident, .. } => Some(resident),
            _ => None,
        }
    }

    /// Underlying platform error, if the failure came from a hop.
    pub fn move_error(&self) -> Option<&MoveError> {
        match self {
            TransferError::HopFailed { source, .. } | TransferError::PartiallyMoved { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}
