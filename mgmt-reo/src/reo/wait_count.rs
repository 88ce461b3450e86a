//! Wait counts: how many frames on other links may still precede a frame.
//!
//! For an incoming frame `F` and another link `L`, the wait count is an upper
//! bound on the frames of `L` that the host has not seen yet and whose global
//! timestamp may be lower than `F`'s. A frame with a zero total can be
//! delivered immediately; anything else waits in the reorder list until later
//! arrivals shrink the bound or a timer forces it out.
//!
//! The estimate walks down the snapshot pipeline of `L`:
//!
//! ```text
//! host_seen.ctr ........ fw_consumed.ctr ..... fw_forwarded.ctr .... hw_seen.ctr
//!   |<----- pending: seen by HW, not yet by host ------------------------->|
//! ```
//!
//! Each firmware marker whose timestamp is at or past `F` cuts the range: no
//! frame received after it can be older than `F`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::snapshot::LinkSnapshots;
use super::types::{LinkId, MAX_LINKS};
use super::wrap::GlobalTs;

/// Per-link upper bounds and their sum.
///
/// A link whose host snapshot is unknown contributes `u32::MAX`; `total` is
/// 64-bit so that several such links do not overflow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitCount {
    per_link: [u32; MAX_LINKS],
    total: u64,
}

impl Default for WaitCount {
    fn default() -> Self {
        Self::ZERO
    }
}

impl WaitCount {
    /// Nothing to wait for.
    pub const ZERO: Self = Self {
        per_link: [0; MAX_LINKS],
        total: 0,
    };

    /// Builds a wait count from explicit per-link bounds.
    #[must_use]
    pub fn from_per_link(per_link: [u32; MAX_LINKS]) -> Self {
        let total = per_link.iter().map(|&c| u64::from(c)).sum();
        Self { per_link, total }
    }

    #[inline]
    #[must_use]
    pub const fn per_link(&self, link: LinkId) -> u32 {
        self.per_link[link.index()]
    }

    #[inline]
    #[must_use]
    pub const fn per_link_all(&self) -> &[u32; MAX_LINKS] {
        &self.per_link
    }

    #[inline]
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    #[inline]
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.total == 0
    }

    pub(crate) fn set(&mut self, link: LinkId, count: u32) {
        let slot = &mut self.per_link[link.index()];
        self.total = self.total - u64::from(*slot) + u64::from(count);
        *slot = count;
        self.debug_check();
    }

    /// Lowers every per-link bound to `other`'s where `other` is tighter.
    ///
    /// Valid when `other` belongs to a frame with a timestamp at or after
    /// this one: anything it may wait for on a link, this frame may too, but
    /// never more.
    pub(crate) fn refine(&mut self, other: &Self) {
        for (mine, &theirs) in self.per_link.iter_mut().zip(other.per_link.iter()) {
            if theirs < *mine {
                self.total -= u64::from(*mine - theirs);
                *mine = theirs;
            }
        }
        self.debug_check();
    }

    /// Accounts for `frames` newly seen frames on `link`, floored at zero.
    pub(crate) fn consume(&mut self, link: LinkId, frames: u32) {
        let slot = &mut self.per_link[link.index()];
        let taken = (*slot).min(frames);
        *slot -= taken;
        self.total -= u64::from(taken);
        self.debug_check();
    }

    #[inline]
    fn debug_check(&self) {
        debug_assert_eq!(
            self.total,
            self.per_link.iter().map(|&c| u64::from(c)).sum::<u64>(),
            "wait count total out of sync with per-link counts"
        );
    }
}

impl fmt::Display for WaitCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.total)?;
        for (i, c) in self.per_link.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if *c == u32::MAX {
                f.write_str("max")?;
            } else {
                write!(f, "{c}")?;
            }
        }
        f.write_str("]")
    }
}

/// Upper bound on frames of one other link that may precede a frame stamped
/// `in_ts`, given that link's validated snapshots.
#[must_use]
pub fn pending_frames(ss: &LinkSnapshots, in_ts: GlobalTs) -> u32 {
    let hw = &ss.hw_seen;
    let host = &ss.host_seen;
    let fwd = &ss.fw_forwarded;
    let cons = &ss.fw_consumed;

    // Link has not received anything yet.
    if !hw.valid {
        return 0;
    }
    // Nothing known about what the host has seen: wait for everything until
    // the first frame of this link shows up.
    if !host.valid {
        return u32::MAX;
    }
    let seen_by_hw_only = hw.packet_counter.sub(host.packet_counter);
    if seen_by_hw_only == 0 {
        return 0;
    }
    // Host already saw a frame of this link at or after in_ts.
    if host.global_timestamp.gte(in_ts) {
        return 0;
    }

    let mut pending = seen_by_hw_only.max(0);

    if pending > 0 && hw.global_timestamp.gte(in_ts) {
        // The last frame HW saw is not older than in_ts.
        pending -= 1;

        if cons.valid && cons.global_timestamp.gte(in_ts) {
            // Everything from the last consumed frame onwards is not older.
            pending = cons.packet_counter.sub(host.packet_counter) - 1;

            if fwd.valid && !fwd.global_timestamp.gte(in_ts) {
                // Frames after the last forwarded one were all consumed.
                pending = fwd.packet_counter.sub(host.packet_counter).max(0);
            }
        }

        if fwd.valid && fwd.global_timestamp.gte(in_ts) {
            let before_fwd = fwd.packet_counter.sub(host.packet_counter) - 1;
            pending = pending.min(before_fwd);
        }
    }

    u32::try_from(pending.max(0)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reo::snapshot::Snapshot;

    fn link(n: u8) -> LinkId {
        LinkId::new(n).unwrap()
    }

    fn ss(hw: Snapshot, fwd: Snapshot, cons: Snapshot, host: Snapshot) -> LinkSnapshots {
        LinkSnapshots {
            hw_seen: hw,
            fw_forwarded: fwd,
            fw_consumed: cons,
            host_seen: host,
        }
    }

    const NONE: Snapshot = Snapshot::INVALID;

    #[test]
    fn refine_and_consume_keep_total_in_sync() {
        let mut wc = WaitCount::from_per_link([3, 0, u32::MAX, 0, 0, 0, 1]);
        assert_eq!(wc.total(), 4 + u64::from(u32::MAX));

        wc.refine(&WaitCount::from_per_link([5, 0, 2, 0, 0, 0, 0]));
        assert_eq!(wc.per_link_all(), &[3, 0, 2, 0, 0, 0, 0]);
        assert_eq!(wc.total(), 5);

        wc.consume(link(0), 10);
        assert_eq!(wc.per_link(link(0)), 0);
        assert_eq!(wc.total(), 2);

        wc.set(link(2), 0);
        assert!(wc.is_zero());
    }

    #[test]
    fn several_unknown_links_do_not_overflow() {
        let mut wc = WaitCount::ZERO;
        for l in LinkId::all() {
            wc.set(l, u32::MAX);
        }
        assert_eq!(wc.total(), MAX_LINKS as u64 * u64::from(u32::MAX));
    }

    #[test]
    fn idle_or_unknown_links() {
        let in_ts = GlobalTs(1000);
        assert_eq!(pending_frames(&LinkSnapshots::INVALID, in_ts), 0);
        assert_eq!(pending_frames(&ss(Snapshot::new(4, 900), NONE, NONE, NONE), in_ts), u32::MAX);
    }

    #[test]
    fn host_caught_up_with_hw() {
        let s = Snapshot::new(4, 900);
        assert_eq!(pending_frames(&ss(s, s, NONE, s), GlobalTs(1000)), 0);
    }

    #[test]
    fn host_already_past_incoming() {
        let snaps = ss(Snapshot::new(9, 1500), NONE, NONE, Snapshot::new(6, 1200));
        assert_eq!(pending_frames(&snaps, GlobalTs(1000)), 0);
    }

    #[test]
    fn all_hw_frames_may_be_older() {
        let snaps = ss(Snapshot::new(9, 950), NONE, NONE, Snapshot::new(6, 600));
        assert_eq!(pending_frames(&snaps, GlobalTs(1000)), 3);
    }

    #[test]
    fn last_hw_frame_is_newer() {
        let snaps = ss(Snapshot::new(9, 1100), NONE, NONE, Snapshot::new(6, 600));
        assert_eq!(pending_frames(&snaps, GlobalTs(1000)), 2);
    }

    #[test]
    fn consumed_marker_cuts_the_range() {
        // Host at 6, consumed 8 is newer than in_ts: only 7 may be older.
        let snaps = ss(
            Snapshot::new(12, 1400),
            NONE,
            Snapshot::new(8, 1050),
            Snapshot::new(6, 600),
        );
        assert_eq!(pending_frames(&snaps, GlobalTs(1000)), 1);
    }

    #[test]
    fn forwarded_before_incoming_after_newer_consumed() {
        // Forwarded 7 is older than in_ts, consumed 10 newer: 8..10 were
        // consumed by firmware, only 7 is still headed to the host.
        let snaps = ss(
            Snapshot::new(12, 1400),
            Snapshot::new(7, 700),
            Snapshot::new(10, 1050),
            Snapshot::new(6, 600),
        );
        assert_eq!(pending_frames(&snaps, GlobalTs(1000)), 1);
    }

    #[test]
    fn forwarded_marker_newer_than_incoming() {
        let snaps = ss(
            Snapshot::new(12, 1400),
            Snapshot::new(9, 1020),
            NONE,
            Snapshot::new(6, 600),
        );
        // 12 - 6 - 1 = 5 from hw, tightened to 9 - 6 - 1 = 2 by forwarded.
        assert_eq!(pending_frames(&snaps, GlobalTs(1000)), 2);
    }

    #[test]
    fn pending_never_negative() {
        // Consumed right after host and newer than in_ts: nothing pending.
        let snaps = ss(
            Snapshot::new(12, 1400),
            NONE,
            Snapshot::new(7, 1010),
            Snapshot::new(6, 600),
        );
        assert_eq!(pending_frames(&snaps, GlobalTs(1000)), 0);
    }

    #[test]
    fn estimate_across_counter_and_timestamp_wrap() {
        let snaps = ss(
            Snapshot::new(2, 40),
            NONE,
            NONE,
            Snapshot::new(65_534, u32::MAX - 100),
        );
        // hw - host = 4 across the wrap, last hw frame older than in_ts.
        assert_eq!(pending_frames(&snaps, GlobalTs(50)), 4);
    }
}
