//! Error types for the reorder engine.

use crate::platform::DeliveryError;
use crate::reo::types::LinkId;
use crate::reo::wrap::PktCtr;

/// Failure of a single engine operation.
///
/// None of these are fatal to the engine. The frame that triggered the error
/// is dropped; queued frames are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum ReoError {
    /// A required input was absent or left unfilled by the collaborator.
    #[error("missing input: {what}")]
    MissingInput { what: &'static str },

    /// Link index out of range or not resolvable to a live link.
    #[error("invalid link id {link_id}")]
    InvalidLinkId { link_id: u8 },

    /// Hardware snapshot invalid while a downstream snapshot is valid.
    #[error("inconsistent snapshots on link {link}")]
    SnapshotInconsistent { link: LinkId },

    /// The host snapshot did not advance for a new frame on its link.
    #[error("packet counter regression on link {link}: host saw {host}, frame has {incoming}")]
    CounterRegression { link: LinkId, host: PktCtr, incoming: PktCtr },

    /// The reorder list could not grow.
    #[error("failed to allocate a reorder list entry")]
    AllocationFailure,

    /// The delivery callback rejected a released frame. The frame is gone.
    #[error("delivery failed: {0}")]
    DeliveryFailure(#[from] DeliveryError),

    /// The engine has been shut down.
    #[error("engine is shut down")]
    ShutDown,
}
