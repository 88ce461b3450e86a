//! Timestamp-ordered list of frames waiting for release.
//!
//! # Invariants
//!
//! - Entries are sorted ascending by global timestamp (wrap-safe).
//! - Every entry's wait count satisfies `total == Σ per_link`.
//! - `WAITING` is set exactly when an entry's total is non-zero.
//! - No entry older than the last released frame is ever inserted, except a
//!   frame received in parallel with it.
//!
//! The list owns the [`LastReleased`] watermark: staleness checks and the
//! release path both need it under the same lock.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{EventKind, FrameEvent, LinkId, RxMeta};
use super::wait_count::WaitCount;
use super::wrap::GlobalTs;
use crate::trace::{debug, trace};

/// Status flags of a list entry.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryStatus(u8);

impl EntryStatus {
    /// Wait count is non-zero.
    pub const WAITING: Self = Self(1 << 0);
    /// Sat in the list longer than the entry timeout.
    pub const AGED_OUT: Self = Self(1 << 1);
    /// Precedes an aged-out entry.
    pub const OLDER_THAN_AGED_OUT: Self = Self(1 << 2);
    /// Head of a list that grew past its size cap.
    pub const OVER_CAPACITY: Self = Self(1 << 3);

    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::WAITING, "WAITING"),
            (Self::AGED_OUT, "AGED_OUT"),
            (Self::OLDER_THAN_AGED_OUT, "OLDER_THAN_AGED_OUT"),
            (Self::OVER_CAPACITY, "OVER_CAPACITY"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("READY")?;
        }
        Ok(())
    }
}

/// Why an entry left the list. At least one bit is set for every released
/// entry.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReleaseReason(u8);

impl ReleaseReason {
    pub const ZERO_WAIT_COUNT: Self = Self(1 << 0);
    pub const AGED_OUT: Self = Self(1 << 1);
    pub const OLDER_THAN_AGED_OUT: Self = Self(1 << 2);
    pub const OVER_CAPACITY: Self = Self(1 << 3);

    /// Number of distinct reason bits, for per-reason counters.
    pub const BITS: usize = 4;

    /// No reason recorded.
    pub const NONE: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for ReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::ZERO_WAIT_COUNT, "zero-wait"),
            (Self::AGED_OUT, "aged-out"),
            (Self::OLDER_THAN_AGED_OUT, "older-than-aged-out"),
            (Self::OVER_CAPACITY, "over-capacity"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("+")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Window of the most recently released frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LastReleased {
    pub valid: bool,
    pub global_ts: GlobalTs,
    pub start_ts: GlobalTs,
    pub end_ts: GlobalTs,
}

impl LastReleased {
    fn record(&mut self, meta: &RxMeta) {
        self.valid = true;
        self.global_ts = meta.global_timestamp;
        self.start_ts = meta.start_ts;
        self.end_ts = meta.end_ts;
    }

    /// Classifies a frame against this watermark.
    ///
    /// A frame older than the last released one is stale, unless its
    /// reception window encloses the released frame's window: such frames
    /// were received in parallel and their relative order is meaningless.
    #[must_use]
    pub fn classify(&self, meta: &RxMeta) -> Staleness {
        if !self.valid {
            return Staleness::default();
        }
        let parallel = self.start_ts.gte(meta.start_ts) && meta.end_ts.gte(self.end_ts);
        let stale = !parallel && meta.global_timestamp.lt(self.global_ts);
        Staleness { stale, parallel }
    }
}

/// Outcome of [`LastReleased::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Staleness {
    pub stale: bool,
    pub parallel: bool,
}

/// A frame waiting in the list.
#[derive(Debug)]
pub struct ListEntry<P> {
    pub payload: P,
    pub meta: RxMeta,
    pub wait_count: WaitCount,
    /// Wait count at insertion, kept for diagnostics.
    pub initial_wait_count: WaitCount,
    /// Engine clock at insertion, microseconds.
    pub insertion_ts: u64,
    /// Engine clock when the event arrived, microseconds.
    pub ingress_ts: u64,
    pub status: EntryStatus,
    pub is_parallel_rx: bool,
}

impl<P> ListEntry<P> {
    #[inline]
    fn ts(&self) -> GlobalTs {
        self.meta.global_timestamp
    }

    /// Ready for release: no more waiting, or forced out.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.wait_count.is_zero()
            || self.status.contains(EntryStatus::AGED_OUT)
            || self.status.contains(EntryStatus::OLDER_THAN_AGED_OUT)
            || self.status.contains(EntryStatus::OVER_CAPACITY)
    }

    fn sync_waiting(&mut self) {
        if self.wait_count.is_zero() {
            self.status.remove(EntryStatus::WAITING);
        } else {
            self.status.insert(EntryStatus::WAITING);
        }
    }

    fn release_reason(&self) -> ReleaseReason {
        let mut reason = ReleaseReason::NONE;
        if self.wait_count.is_zero() {
            reason.insert(ReleaseReason::ZERO_WAIT_COUNT);
        }
        if self.status.contains(EntryStatus::AGED_OUT) {
            reason.insert(ReleaseReason::AGED_OUT);
        }
        if self.status.contains(EntryStatus::OLDER_THAN_AGED_OUT) {
            reason.insert(ReleaseReason::OLDER_THAN_AGED_OUT);
        }
        if self.status.contains(EntryStatus::OVER_CAPACITY) {
            reason.insert(ReleaseReason::OVER_CAPACITY);
        }
        reason
    }

    fn info(&self, now_us: u64) -> EntryInfo {
        EntryInfo {
            meta: self.meta,
            wait_count: self.wait_count,
            initial_wait_count: self.initial_wait_count,
            status: self.status,
            is_parallel_rx: self.is_parallel_rx,
            age_us: now_us.saturating_sub(self.insertion_ts),
        }
    }
}

/// Payload-free view of a list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub meta: RxMeta,
    pub wait_count: WaitCount,
    pub initial_wait_count: WaitCount,
    pub status: EntryStatus,
    pub is_parallel_rx: bool,
    pub age_us: u64,
}

/// A frame event after the host snapshot update and wait-count computation.
#[derive(Debug)]
pub(crate) struct IncomingFrame<P> {
    pub(crate) event: FrameEvent<P>,
    pub(crate) meta: RxMeta,
    pub(crate) wait_count: WaitCount,
    /// Frames of this link the host learned about with this event.
    pub(crate) pkt_ctr_delta: u32,
    pub(crate) ingress_ts: u64,
}

/// Result of [`ReorderList::update`].
#[derive(Debug)]
pub(crate) struct UpdateOutcome<P> {
    pub(crate) staleness: Staleness,
    pub(crate) queued: bool,
    /// Queued at the head with nothing to wait for.
    pub(crate) immediate_delivery: bool,
    pub(crate) insertion_pos: Option<usize>,
    /// Wait count after refinement by the least-greater neighbour.
    pub(crate) wait_count: WaitCount,
    /// List size when the event arrived.
    pub(crate) list_size_rx: usize,
    /// A host-consumed payload that was not queued.
    pub(crate) rejected: Option<P>,
    pub(crate) alloc_failed: bool,
}

/// The reorder list proper.
#[derive(Debug)]
pub(crate) struct ReorderList<P> {
    entries: VecDeque<ListEntry<P>>,
    max_size: usize,
    last_released: LastReleased,
}

impl<P> ReorderList<P> {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_size,
            last_released: LastReleased::default(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn last_released(&self) -> LastReleased {
        self.last_released
    }

    pub(crate) fn invalidate_last_released(&mut self) {
        self.last_released.valid = false;
    }

    /// Applies one frame event to the list.
    ///
    /// Entries older than the frame are refined with its wait count, the
    /// frame itself is queued if it is deliverable and not stale, and every
    /// entry after it learns that `pkt_ctr_delta` more frames of its link
    /// have been seen.
    pub(crate) fn update(&mut self, incoming: IncomingFrame<P>, now_us: u64) -> UpdateOutcome<P> {
        let IncomingFrame {
            event,
            meta,
            mut wait_count,
            pkt_ctr_delta,
            ingress_ts,
        } = incoming;
        let list_size_rx = self.entries.len();
        let staleness = self.last_released.classify(&meta);

        // Refine everything strictly older than the incoming frame.
        let mut idx = 0;
        while let Some(entry) = self.entries.get_mut(idx) {
            if !entry.ts().lt(meta.global_timestamp) {
                break;
            }
            entry.wait_count.refine(&wait_count);
            entry.sync_waiting();
            idx += 1;
        }
        let least_greater = idx;

        let mut outcome = UpdateOutcome {
            staleness,
            queued: false,
            immediate_delivery: false,
            insertion_pos: None,
            wait_count,
            list_size_rx,
            rejected: None,
            alloc_failed: false,
        };

        let reorder_required = event.reorder_required;
        if let EventKind::HostConsumed { payload } = event.kind {
            if staleness.stale || !reorder_required {
                outcome.rejected = Some(payload);
            } else if self.entries.try_reserve(1).is_err() {
                debug!(link = %meta.link, ts = %meta.global_timestamp, "list allocation failed");
                outcome.alloc_failed = true;
                outcome.rejected = Some(payload);
            } else {
                if let Some(neighbour) = self.entries.get(least_greater) {
                    wait_count.refine(&neighbour.wait_count);
                }
                let mut entry = ListEntry {
                    payload,
                    meta,
                    wait_count,
                    initial_wait_count: wait_count,
                    insertion_ts: now_us,
                    ingress_ts,
                    status: EntryStatus::default(),
                    is_parallel_rx: staleness.parallel,
                };
                entry.sync_waiting();
                self.entries.insert(least_greater, entry);

                outcome.queued = true;
                outcome.wait_count = wait_count;
                outcome.insertion_pos = Some(least_greater);
                outcome.immediate_delivery = wait_count.is_zero() && least_greater == 0;
                trace!(
                    link = %meta.link,
                    ctr = %meta.packet_counter,
                    ts = %meta.global_timestamp,
                    pos = least_greater,
                    wait = %wait_count,
                    "queued"
                );
            }
        }

        // Later entries were waiting on frames of this link; some just arrived,
        // stale or not.
        let after = least_greater + usize::from(outcome.queued);
        for entry in self.entries.iter_mut().skip(after) {
            entry.wait_count.consume(meta.link, pkt_ctr_delta);
            entry.sync_waiting();
        }

        if self.entries.len() > self.max_size {
            if let Some(head) = self.entries.front_mut() {
                head.status.insert(EntryStatus::OVER_CAPACITY);
            }
        }

        self.debug_check();
        outcome
    }

    /// Pops the head if it is ready, updating the last-released watermark.
    ///
    /// Returns the entry, why it was released, and whether the watermark
    /// moved.
    pub(crate) fn pop_ready(&mut self) -> Option<(ListEntry<P>, ReleaseReason, bool)> {
        let over_capacity = self.entries.len() > self.max_size;
        let head = self.entries.front_mut()?;
        if over_capacity {
            head.status.insert(EntryStatus::OVER_CAPACITY);
        }
        if !head.is_ready() {
            return None;
        }
        let entry = self.entries.pop_front()?;
        let reason = entry.release_reason();
        debug_assert!(!reason.is_empty(), "released entry without a reason");

        let advance = !entry.is_parallel_rx
            && (!self.last_released.valid || entry.ts().gte(self.last_released.global_ts));
        if advance {
            self.last_released.record(&entry.meta);
        }
        Some((entry, reason, advance))
    }

    /// Marks entries that sat in the list for at least `timeout_us`, and
    /// everything before the newest of them.
    ///
    /// Returns true if any entry aged out during this sweep.
    pub(crate) fn age_out(&mut self, now_us: u64, timeout_us: u64) -> bool {
        let mut newly_aged = false;
        let mut latest_aged = None;
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            if now_us.saturating_sub(entry.insertion_ts) >= timeout_us {
                if !entry.status.contains(EntryStatus::AGED_OUT) {
                    entry.status.insert(EntryStatus::AGED_OUT);
                    newly_aged = true;
                }
                latest_aged = Some(idx);
            }
        }
        if let Some(latest) = latest_aged {
            for entry in self.entries.iter_mut().take(latest) {
                entry.status.insert(EntryStatus::OLDER_THAN_AGED_OUT);
            }
        }
        newly_aged
    }

    /// Drops every entry without delivering it.
    pub(crate) fn flush(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub(crate) fn entry_infos(&self, now_us: u64) -> Vec<EntryInfo> {
        self.entries.iter().map(|e| e.info(now_us)).collect()
    }

    #[cfg(test)]
    pub(crate) fn entries(&self) -> &VecDeque<ListEntry<P>> {
        &self.entries
    }

    #[inline]
    fn debug_check(&self) {
        debug_assert!(
            self.entries
                .iter()
                .zip(self.entries.iter().skip(1))
                .all(|(a, b)| b.ts().gte(a.ts())),
            "reorder list out of order"
        );
    }
}

/// Links an entry waits on, for log lines.
#[must_use]
pub fn waiting_links(wait_count: &WaitCount) -> Vec<LinkId> {
    LinkId::all().filter(|&l| wait_count.per_link(l) > 0).collect()
}
