//! Per-link snapshots and their validation.
//!
//! Every link publishes three progress markers written by hardware and
//! firmware, plus one maintained by the engine itself:
//!
//! ```text
//! MAC HW ──> HwSeen ──> FW ──┬──> FwForwarded ──> host ──> HostSeen
//!                            └──> FwConsumed
//! ```
//!
//! A snapshot is the `(packet_counter, global_timestamp)` of the last frame
//! that passed that stage. Along the pipeline each stage can only lag the one
//! before it, so a valid set satisfies
//! `HwSeen >= FwForwarded, FwConsumed >= HostSeen` (roughly: host must be
//! covered by at least one firmware marker).
//!
//! The firmware-written values are read without synchronisation and may be
//! torn, stale, or reset. [`SnapshotValidator`] turns a raw read into a set
//! the wait-count calculation can trust, invalidating whatever contradicts
//! the ordering rather than failing the whole computation.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{LinkId, MAX_LINKS};
use super::wrap::{GlobalTs, PktCtr};
use crate::error::ReoError;
use crate::trace::debug;

/// Progress marker of one pipeline stage on one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub valid: bool,
    pub packet_counter: PktCtr,
    pub global_timestamp: GlobalTs,
}

impl Snapshot {
    /// No information.
    pub const INVALID: Self = Self {
        valid: false,
        packet_counter: PktCtr(0),
        global_timestamp: GlobalTs(0),
    };

    /// A valid snapshot.
    #[must_use]
    pub const fn new(packet_counter: u16, global_timestamp: u32) -> Self {
        Self {
            valid: true,
            packet_counter: PktCtr(packet_counter),
            global_timestamp: GlobalTs(global_timestamp),
        }
    }

    /// Both fields wrap-safe `>=` those of `other`. Validity is not checked.
    #[inline]
    #[must_use]
    pub const fn gte(&self, other: &Self) -> bool {
        self.global_timestamp.gte(other.global_timestamp)
            && self.packet_counter.gte(other.packet_counter)
    }

    /// Timestamp order and counter order relative to `other` agree.
    #[inline]
    #[must_use]
    const fn order_agrees(&self, other: &Self) -> bool {
        self.global_timestamp.gte(other.global_timestamp)
            == self.packet_counter.gte(other.packet_counter)
    }

    #[inline]
    fn invalidate(&mut self) {
        self.valid = false;
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            write!(f, "(ctr {}, ts {})", self.packet_counter, self.global_timestamp)
        } else {
            f.write_str("(invalid)")
        }
    }
}

/// Which pipeline stage a snapshot describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotKind {
    HwSeen,
    FwForwarded,
    FwConsumed,
    HostSeen,
}

impl SnapshotKind {
    /// Kinds published outside the engine.
    pub const SHARED: [Self; 3] = [Self::HwSeen, Self::FwForwarded, Self::FwConsumed];
}

/// The three externally written snapshots of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SharedSnapshots {
    pub hw_seen: Snapshot,
    pub fw_forwarded: Snapshot,
    pub fw_consumed: Snapshot,
}

impl SharedSnapshots {
    /// Nothing published yet.
    pub const INVALID: Self = Self {
        hw_seen: Snapshot::INVALID,
        fw_forwarded: Snapshot::INVALID,
        fw_consumed: Snapshot::INVALID,
    };
}

/// All four snapshots of a link after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkSnapshots {
    pub hw_seen: Snapshot,
    pub fw_forwarded: Snapshot,
    pub fw_consumed: Snapshot,
    pub host_seen: Snapshot,
}

impl LinkSnapshots {
    /// A link with no usable information.
    pub const INVALID: Self = Self {
        hw_seen: Snapshot::INVALID,
        fw_forwarded: Snapshot::INVALID,
        fw_consumed: Snapshot::INVALID,
        host_seen: Snapshot::INVALID,
    };

    #[must_use]
    pub const fn get(&self, kind: SnapshotKind) -> &Snapshot {
        match kind {
            SnapshotKind::HwSeen => &self.hw_seen,
            SnapshotKind::FwForwarded => &self.fw_forwarded,
            SnapshotKind::FwConsumed => &self.fw_consumed,
            SnapshotKind::HostSeen => &self.host_seen,
        }
    }

    fn get_mut(&mut self, kind: SnapshotKind) -> &mut Snapshot {
        match kind {
            SnapshotKind::HwSeen => &mut self.hw_seen,
            SnapshotKind::FwForwarded => &mut self.fw_forwarded,
            SnapshotKind::FwConsumed => &mut self.fw_consumed,
            SnapshotKind::HostSeen => &mut self.host_seen,
        }
    }

    /// Checks the pipeline ordering. Used by tests and debug assertions.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        if !self.hw_seen.valid {
            return !self.fw_forwarded.valid && !self.fw_consumed.valid && !self.host_seen.valid;
        }
        let hw = &self.hw_seen;
        let under_hw = [&self.fw_forwarded, &self.fw_consumed, &self.host_seen]
            .into_iter()
            .all(|s| !s.valid || hw.gte(s));
        if !under_hw {
            return false;
        }
        if !self.host_seen.valid {
            return true;
        }
        let host = &self.host_seen;
        match (self.fw_forwarded.valid, self.fw_consumed.valid) {
            (true, true) => self.fw_forwarded.gte(host) || self.fw_consumed.gte(host),
            (true, false) => self.fw_forwarded.gte(host),
            (false, true) => self.fw_consumed.gte(host),
            (false, false) => true,
        }
    }
}

/// Turns raw snapshot reads into a trustworthy set, remembering the last
/// accepted value of every externally written snapshot.
#[derive(Debug)]
pub(crate) struct SnapshotValidator {
    last_good: [SharedSnapshots; MAX_LINKS],
}

impl SnapshotValidator {
    pub(crate) const fn new() -> Self {
        Self {
            last_good: [SharedSnapshots::INVALID; MAX_LINKS],
        }
    }

    /// Validates one read of `link`'s snapshots together with the engine's
    /// own host snapshot.
    ///
    /// Invalidation only affects the returned copy: the caller's host
    /// snapshot is never modified.
    ///
    /// # Errors
    /// [`ReoError::SnapshotInconsistent`] if the hardware snapshot is invalid
    /// while a later stage claims progress.
    pub(crate) fn sanitize(
        &mut self,
        link: LinkId,
        shared: SharedSnapshots,
        host_seen: Snapshot,
    ) -> Result<LinkSnapshots, ReoError> {
        let mut ss = LinkSnapshots {
            hw_seen: shared.hw_seen,
            fw_forwarded: shared.fw_forwarded,
            fw_consumed: shared.fw_consumed,
            host_seen,
        };

        if !ss.hw_seen.valid
            && (ss.fw_forwarded.valid || ss.fw_consumed.valid || ss.host_seen.valid)
        {
            debug!(
                %link,
                fw_forwarded = %ss.fw_forwarded,
                fw_consumed = %ss.fw_consumed,
                host_seen = %ss.host_seen,
                "hw snapshot invalid while later stages are valid"
            );
            return Err(ReoError::SnapshotInconsistent { link });
        }

        self.reject_regressions(link, &mut ss);
        if !ss.hw_seen.valid {
            // Nothing downstream can be judged without the hw marker.
            return Ok(LinkSnapshots::INVALID);
        }
        invalidate_out_of_order(link, &mut ss);

        debug_assert!(ss.is_consistent(), "sanitized snapshots still inconsistent: {ss:?}");
        Ok(ss)
    }

    /// Invalidates snapshots that moved backwards since the last accepted
    /// read. The regressed value still replaces the cached one, so a firmware
    /// restart is trusted again from the next read onwards.
    fn reject_regressions(&mut self, link: LinkId, ss: &mut LinkSnapshots) {
        let cache = &mut self.last_good[link.index()];
        for kind in SnapshotKind::SHARED {
            let current = ss.get_mut(kind);
            if !current.valid {
                continue;
            }
            let cached = match kind {
                SnapshotKind::HwSeen => &mut cache.hw_seen,
                SnapshotKind::FwForwarded => &mut cache.fw_forwarded,
                SnapshotKind::FwConsumed => &mut cache.fw_consumed,
                SnapshotKind::HostSeen => continue,
            };
            let regressed = cached.valid && !current.gte(cached);
            *cached = *current;
            if regressed {
                debug!(%link, ?kind, snapshot = %current, "snapshot regressed, ignoring this read");
                current.invalidate();
            }
        }
    }

    /// Last accepted value of each externally written snapshot of `link`.
    pub(crate) fn last_good(&self, link: LinkId) -> SharedSnapshots {
        self.last_good[link.index()]
    }
}

/// Drops every snapshot that contradicts pipeline order.
fn invalidate_out_of_order(link: LinkId, ss: &mut LinkSnapshots) {
    if ss.hw_seen.valid {
        let hw = ss.hw_seen;
        for kind in [SnapshotKind::FwForwarded, SnapshotKind::FwConsumed, SnapshotKind::HostSeen] {
            let s = ss.get_mut(kind);
            if s.valid && !hw.gte(s) {
                debug!(%link, ?kind, snapshot = %s, hw_seen = %hw, "snapshot ahead of hw, ignoring");
                s.invalidate();
            }
        }
    }

    if !ss.host_seen.valid {
        return;
    }
    let host = ss.host_seen;

    // A firmware marker whose timestamp and counter disagree about being
    // before or after the host marker was torn mid-update.
    for kind in [SnapshotKind::FwForwarded, SnapshotKind::FwConsumed] {
        let s = ss.get_mut(kind);
        if s.valid && !host.order_agrees(s) {
            debug!(%link, ?kind, snapshot = %s, host_seen = %host, "torn fw snapshot, ignoring");
            s.invalidate();
        }
    }

    let fwd_covers = ss.fw_forwarded.valid && ss.fw_forwarded.gte(&host);
    let cons_covers = ss.fw_consumed.valid && ss.fw_consumed.gte(&host);
    match (ss.fw_forwarded.valid, ss.fw_consumed.valid) {
        (true, true) if !fwd_covers && !cons_covers => {
            debug!(%link, host_seen = %host, "fw snapshots behind host, ignoring both");
            ss.fw_forwarded.invalidate();
            ss.fw_consumed.invalidate();
        }
        (true, false) if !fwd_covers => ss.fw_forwarded.invalidate(),
        (false, true) if !cons_covers => ss.fw_consumed.invalidate(),
        _ => {}
    }
}
