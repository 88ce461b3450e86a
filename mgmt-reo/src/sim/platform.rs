//! In-memory [`Platform`] with writable snapshots and a delivery log.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::platform::{DeliveryError, Platform};
use crate::reo::release::DeliveredFrame;
use crate::reo::snapshot::{SharedSnapshots, Snapshot, SnapshotKind};
use crate::reo::types::{LinkId, MAX_LINKS};
use crate::reo::wrap::{GlobalTs, PktCtr};

/// Payload used by the simulator: enough to identify a frame after delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimFrame {
    /// Unique across the run, in generation order.
    pub id: u64,
    pub link: LinkId,
    pub packet_counter: PktCtr,
    pub global_timestamp: GlobalTs,
}

#[derive(Debug, Clone, Copy)]
struct LinkState {
    active: bool,
    /// `None` makes snapshot reads fail.
    snapshots: Option<SharedSnapshots>,
}

/// Platform whose links, snapshots and delivery outcome are set by the
/// caller.
///
/// Links `0..num_links` start active with all snapshots invalid.
#[derive(Debug)]
pub struct SimPlatform<P = SimFrame> {
    links: Mutex<[LinkState; MAX_LINKS]>,
    delivered: Mutex<Vec<DeliveredFrame<P>>>,
    reject_deliveries: AtomicBool,
}

impl<P> SimPlatform<P> {
    /// # Panics
    /// Panics if `num_links > MAX_LINKS`.
    #[must_use]
    pub fn new(num_links: usize) -> Self {
        assert!(num_links <= MAX_LINKS, "num_links must be <= {MAX_LINKS}");
        let mut links = [LinkState {
            active: false,
            snapshots: Some(SharedSnapshots::INVALID),
        }; MAX_LINKS];
        for state in links.iter_mut().take(num_links) {
            state.active = true;
        }
        Self {
            links: Mutex::new(links),
            delivered: Mutex::new(Vec::new()),
            reject_deliveries: AtomicBool::new(false),
        }
    }

    pub fn set_link_active(&self, link: LinkId, active: bool) {
        self.links.lock()[link.index()].active = active;
    }

    /// Overwrites one snapshot of `link`.
    ///
    /// # Panics
    /// Panics on [`SnapshotKind::HostSeen`], which only the engine maintains.
    pub fn set_snapshot(&self, link: LinkId, kind: SnapshotKind, snapshot: Snapshot) {
        let mut links = self.links.lock();
        let shared = links[link.index()].snapshots.get_or_insert(SharedSnapshots::INVALID);
        match kind {
            SnapshotKind::HwSeen => shared.hw_seen = snapshot,
            SnapshotKind::FwForwarded => shared.fw_forwarded = snapshot,
            SnapshotKind::FwConsumed => shared.fw_consumed = snapshot,
            SnapshotKind::HostSeen => panic!("host snapshot is engine-owned"),
        }
    }

    pub fn set_snapshots(&self, link: LinkId, snapshots: SharedSnapshots) {
        self.links.lock()[link.index()].snapshots = Some(snapshots);
    }

    /// Makes snapshot reads of `link` fail until snapshots are set again.
    pub fn break_snapshot_source(&self, link: LinkId) {
        self.links.lock()[link.index()].snapshots = None;
    }

    /// Makes every subsequent delivery fail.
    pub fn reject_deliveries(&self, reject: bool) {
        self.reject_deliveries.store(reject, Ordering::Release);
    }

    /// Takes all frames delivered so far, in delivery order.
    pub fn take_delivered(&self) -> Vec<DeliveredFrame<P>> {
        std::mem::take(&mut *self.delivered.lock())
    }

    #[must_use]
    pub fn delivered_len(&self) -> usize {
        self.delivered.lock().len()
    }
}

impl<P: Send + 'static> Platform for SimPlatform<P> {
    type Link = LinkId;
    type Payload = P;

    fn read_snapshots(&self, link: LinkId) -> Option<SharedSnapshots> {
        self.links.lock()[link.index()].snapshots
    }

    fn resolve_link(&self, link: LinkId) -> Option<LinkId> {
        self.links.lock()[link.index()].active.then_some(link)
    }

    fn deliver(&self, link: LinkId, frame: DeliveredFrame<P>) -> Result<(), DeliveryError> {
        if self.reject_deliveries.load(Ordering::Acquire) {
            return Err(DeliveryError::Rejected(format!(
                "link {link} ts {} refused",
                frame.meta.global_timestamp
            )));
        }
        self.delivered.lock().push(frame);
        Ok(())
    }
}
