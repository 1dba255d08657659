//! Hop sequencing with one transfer per instance in flight.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    error::TransferError,
    models::{ItemInstanceId, TransferRequest},
    platform::PlatformActions,
};

use super::{plan_hops, InFlightGuard, InFlightRegistry, LocationMoveExecutor};

/// Successful result of [`TransferOrchestrator::move_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Source and target were identical; nothing was sent to the platform.
    Unchanged,
    /// The item reached the target after this many hops.
    Moved {
        /// Hops executed (1 or 2).
        hops: usize,
    },
}

/// Sequences the hops of a transfer and keeps one transfer per instance in flight.
#[derive(Clone)]
pub struct TransferOrchestrator {
    executor: LocationMoveExecutor,
    in_flight: InFlightRegistry<ItemInstanceId>,
}

impl TransferOrchestrator {
    /// Orchestrator over the given platform.
    pub fn new(platform: Arc<dyn PlatformActions>) -> Self {
        Self::with_executor(LocationMoveExecutor::new(platform))
    }

    /// Orchestrator over an existing executor.
    pub fn with_executor(executor: LocationMoveExecutor) -> Self {
        Self {
            executor,
            in_flight: InFlightRegistry::new(),
        }
    }

    /// Whether a transfer of `item_instance_id` is currently running.
    pub fn is_in_flight(&self, item_instance_id: &ItemInstanceId) -> bool {
        self.in_flight.contains(item_instance_id)
    }

    /// Number of transfers currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Move one item from `request.source` to `request.target`.
    ///
    /// Hops run strictly in order and the first failure stops the sequence.
    /// When the first hop of a character-to-character move succeeds and the
    /// second fails, the item is reported as [`TransferError::PartiallyMoved`]
    /// with the vault as its resident location.
    pub async fn move_item(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, TransferError> {
        let item = &request.item_instance_id;

        if request.source == request.target {
            debug!(%item, location = %request.source, "transfer skipped, already in place");
            return Ok(TransferOutcome::Unchanged);
        }

        let _guard = self.claim(item)?;
        self.run_hops(request).await
    }

    /// Reserve `item_instance_id` for a transfer the caller drives itself.
    ///
    /// The reservation lasts until the guard is dropped; pass the request to
    /// [`TransferOrchestrator::move_claimed`] while holding it.
    pub fn claim(
        &self,
        item_instance_id: &ItemInstanceId,
    ) -> Result<InFlightGuard<ItemInstanceId>, TransferError> {
        self.in_flight
            .try_acquire(item_instance_id.clone())
            .ok_or_else(|| TransferError::AlreadyInProgress(item_instance_id.clone()))
    }

    /// Move an item whose instance is already reserved by `guard`.
    pub async fn move_claimed(
        &self,
        request: &TransferRequest,
        guard: &InFlightGuard<ItemInstanceId>,
    ) -> Result<TransferOutcome, TransferError> {
        if guard.key() != &request.item_instance_id {
            return self.move_item(request).await;
        }
        if request.source == request.target {
            return Ok(TransferOutcome::Unchanged);
        }
        self.run_hops(request).await
    }

    async fn run_hops(&self, request: &TransferRequest) -> Result<TransferOutcome, TransferError> {
        let item = &request.item_instance_id;
        let hops = plan_hops(&request.source, &request.target);
        debug!(
            %item,
            source = %request.source,
            target = %request.target,
            hops = hops.len(),
            "transfer started"
        );

        for (index, hop) in hops.iter().enumerate() {
            if let Err(source) = self
                .executor
                .execute(request.item_hash, item, hop)
                .await
            {
                let err = if index == 0 {
                    TransferError::HopFailed {
                        hop: hop.clone(),
                        source,
                    }
                } else {
                    TransferError::PartiallyMoved {
                        resident: hop.origin(),
                        source,
                    }
                };
                warn!(%item, %err, "transfer aborted");
                return Err(err);
            }
        }

        info!(
            %item,
            source = %request.source,
            target = %request.target,
            "transfer complete"
        );
        Ok(TransferOutcome::Moved { hops: hops.len() })
    }
}
