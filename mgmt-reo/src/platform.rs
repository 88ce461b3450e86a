//! Collaborator interface between the engine and the surrounding system.
//!
//! The engine never talks to hardware or the upper stack directly. A
//! [`Platform`] supplies the firmware-published snapshots of each link,
//! resolves link ids to live link handles and takes ownership of released
//! frames.

use crate::reo::release::DeliveredFrame;
use crate::reo::snapshot::SharedSnapshots;
use crate::reo::types::LinkId;

/// Error returned by [`Platform::deliver`].
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The link was torn down between release and delivery.
    #[error("link {0} is gone")]
    LinkGone(LinkId),
    /// The upper layer refused the frame.
    #[error("upper layer rejected frame: {0}")]
    Rejected(String),
}

/// Services the engine consumes.
///
/// Implementations must be callable from any thread. `deliver` is invoked
/// without any engine list lock held, but under the engine's release-order
/// lock: it must not call back into the same engine's event path.
pub trait Platform: Send + Sync + 'static {
    /// Handle to a live link, passed back on delivery.
    type Link;
    /// Frame payload moved from the event into the delivery callback.
    type Payload: Send + 'static;

    /// Reads the firmware-published snapshots of `link`.
    ///
    /// `None` means the snapshot source itself is unavailable.
    fn read_snapshots(&self, link: LinkId) -> Option<SharedSnapshots>;

    /// Resolves a link id. `None` means the link does not exist right now.
    fn resolve_link(&self, link: LinkId) -> Option<Self::Link>;

    /// Hands a released frame to the upper layer.
    ///
    /// # Errors
    /// Any error is recorded by the engine; the frame is not re-queued.
    fn deliver(
        &self,
        link: Self::Link,
        frame: DeliveredFrame<Self::Payload>,
    ) -> Result<(), DeliveryError>;
}
