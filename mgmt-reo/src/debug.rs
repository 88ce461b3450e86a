//! Ingress/egress statistics and bounded frame history.
//!
//! Counters are always maintained; per-frame history is only kept when the
//! configured history length is non-zero. Ingress state lives under the
//! engine's computation lock, egress state under the release-order lock, so
//! neither needs its own synchronisation.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reo::list::ReleaseReason;
use crate::reo::types::{DescriptorKind, LinkId, MAX_LINKS, RxMeta};
use crate::reo::wait_count::WaitCount;

type PerKind = [u64; DescriptorKind::COUNT];

/// Counters for frames entering the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressStats {
    /// Events per link and kind.
    pub ingress: [PerKind; MAX_LINKS],
    /// Events older than the last released frame.
    pub stale: [PerKind; MAX_LINKS],
    /// Events rejected by validation or failing mid-computation.
    pub errors: [PerKind; MAX_LINKS],
    pub queued: [u64; MAX_LINKS],
    /// Frames whose computed wait count was zero.
    pub zero_wait_count_rx: [u64; MAX_LINKS],
    /// Frames queued at the head with nothing to wait for.
    pub immediate_delivery: [u64; MAX_LINKS],
    pub parallel_rx: [u64; MAX_LINKS],
    /// Snapshot reads of a link that had to be discarded as inconsistent.
    pub snapshot_inconsistent: [u64; MAX_LINKS],
    /// Links skipped because their snapshots could not be read at all.
    pub snapshot_read_failures: [u64; MAX_LINKS],
}

impl IngressStats {
    /// Events across all links and kinds.
    #[must_use]
    pub fn total_ingress(&self) -> u64 {
        self.ingress.iter().flatten().sum()
    }

    /// Stale events across all links and kinds.
    #[must_use]
    pub fn total_stale(&self) -> u64 {
        self.stale.iter().flatten().sum()
    }

    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.errors.iter().flatten().sum()
    }

    #[must_use]
    pub fn total_queued(&self) -> u64 {
        self.queued.iter().sum()
    }

    /// Per-link snapshot reads skipped, inconsistent or unreadable.
    #[must_use]
    pub fn total_snapshot_skips(&self) -> u64 {
        let inconsistent: u64 = self.snapshot_inconsistent.iter().sum();
        inconsistent + self.snapshot_read_failures.iter().sum::<u64>()
    }
}

/// Counters for frames leaving the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressStats {
    pub delivery_attempts: [u64; MAX_LINKS],
    pub delivery_success: [u64; MAX_LINKS],
    /// Released while still waiting on another link.
    pub premature_delivery: [u64; MAX_LINKS],
    /// Releases per link and reason bit, in [`ReleaseReason`] bit order.
    pub release_reasons: [[u64; ReleaseReason::BITS]; MAX_LINKS],
    /// Frames delivered without passing through the list.
    pub bypassed: [u64; MAX_LINKS],
    /// Entries dropped by a flush.
    pub flushed: u64,
}

impl EgressStats {
    #[must_use]
    pub fn total_delivered(&self) -> u64 {
        self.delivery_success.iter().sum()
    }

    #[must_use]
    pub fn total_attempts(&self) -> u64 {
        self.delivery_attempts.iter().sum()
    }

    #[must_use]
    pub fn total_premature(&self) -> u64 {
        self.premature_delivery.iter().sum()
    }
}

/// Snapshot of all engine counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReoStats {
    pub ingress: IngressStats,
    pub egress: EgressStats,
}

impl fmt::Display for ReoStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let i = &self.ingress;
        let e = &self.egress;
        writeln!(
            f,
            "{:>4} {:>9} {:>9} {:>9} {:>7} {:>7} {:>7} {:>9} {:>9} {:>9} {:>9}",
            "link", "host", "fw-cons", "error", "stale", "err", "queued", "zero-wait", "delivered",
            "premature", "bypassed"
        )?;
        for link in LinkId::all() {
            let l = link.index();
            let ingress: u64 = i.ingress[l].iter().sum();
            if ingress == 0 && e.delivery_attempts[l] == 0 {
                continue;
            }
            writeln!(
                f,
                "{:>4} {:>9} {:>9} {:>9} {:>7} {:>7} {:>7} {:>9} {:>9} {:>9} {:>9}",
                link,
                i.ingress[l][DescriptorKind::HostConsumed.index()],
                i.ingress[l][DescriptorKind::FwConsumed.index()],
                i.ingress[l][DescriptorKind::Error.index()],
                i.stale[l].iter().sum::<u64>(),
                i.errors[l].iter().sum::<u64>(),
                i.queued[l],
                i.zero_wait_count_rx[l],
                e.delivery_success[l],
                e.premature_delivery[l],
                e.bypassed[l],
            )?;
        }
        write!(
            f,
            "total: ingress {} stale {} errors {} queued {} snapshot-skips {} delivered {} premature {} flushed {}",
            i.total_ingress(),
            i.total_stale(),
            i.total_errors(),
            i.total_queued(),
            i.total_snapshot_skips(),
            e.total_delivered(),
            e.total_premature(),
            e.flushed
        )
    }
}

/// One processed frame event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressFrameInfo {
    pub meta: RxMeta,
    pub kind: DescriptorKind,
    pub wait_count: WaitCount,
    pub pkt_ctr_delta: u32,
    pub is_stale: bool,
    pub is_parallel_rx: bool,
    pub queued: bool,
    pub error: bool,
    pub list_size_rx: usize,
    pub insertion_pos: Option<usize>,
    pub ingress_ts: u64,
}

/// One delivered (or failed) frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressFrameInfo {
    pub meta: RxMeta,
    pub release_reason: ReleaseReason,
    pub initial_wait_count: WaitCount,
    pub final_wait_count: WaitCount,
    pub is_parallel_rx: bool,
    pub is_premature: bool,
    pub delivered: bool,
    pub egress_ts: u64,
}

impl fmt::Display for IngressFrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "link {} {} ctr {:>5} ts {:>10} delta {} wait {} list {}",
            self.meta.link,
            self.kind,
            self.meta.packet_counter,
            self.meta.global_timestamp,
            self.pkt_ctr_delta,
            self.wait_count,
            self.list_size_rx,
        )?;
        match self.insertion_pos {
            Some(pos) => write!(f, " at {pos}")?,
            None if self.is_stale => f.write_str(" stale")?,
            None if self.error => f.write_str(" ERROR")?,
            None => {}
        }
        if self.is_parallel_rx {
            f.write_str(" parallel")?;
        }
        Ok(())
    }
}

impl fmt::Display for EgressFrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "link {} ctr {:>5} ts {:>10} reason {} wait {} -> {}{}{}",
            self.meta.link,
            self.meta.packet_counter,
            self.meta.global_timestamp,
            self.release_reason,
            self.initial_wait_count,
            self.final_wait_count,
            if self.is_parallel_rx { " parallel" } else { "" },
            if self.delivered { "" } else { " FAILED" },
        )
    }
}

/// Fixed-capacity ring of the most recent records.
#[derive(Debug, Clone)]
pub(crate) struct History<T> {
    records: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> History<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, record: T) {
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records oldest first.
    pub(crate) fn to_vec(&self) -> Vec<T> {
        self.records.iter().cloned().collect()
    }
}

#[derive(Debug)]
pub(crate) struct IngressLog {
    pub(crate) stats: IngressStats,
    pub(crate) history: History<IngressFrameInfo>,
}

impl IngressLog {
    pub(crate) fn new(history_len: usize) -> Self {
        Self {
            stats: IngressStats::default(),
            history: History::new(history_len),
        }
    }

    /// Counts a processed event and keeps its record.
    pub(crate) fn record(&mut self, info: IngressFrameInfo) {
        let l = info.meta.link.index();
        let k = info.kind.index();
        let s = &mut self.stats;
        s.ingress[l][k] += 1;
        if info.error {
            s.errors[l][k] += 1;
        }
        if info.is_stale {
            s.stale[l][k] += 1;
        }
        if info.is_parallel_rx {
            s.parallel_rx[l] += 1;
        }
        if info.queued {
            s.queued[l] += 1;
            if info.wait_count.is_zero() {
                s.zero_wait_count_rx[l] += 1;
                if info.insertion_pos == Some(0) {
                    s.immediate_delivery[l] += 1;
                }
            }
        }
        self.history.push(info);
    }
}

#[derive(Debug)]
pub(crate) struct EgressLog {
    pub(crate) stats: EgressStats,
    pub(crate) history: History<EgressFrameInfo>,
}

impl EgressLog {
    pub(crate) fn new(history_len: usize) -> Self {
        Self {
            stats: EgressStats::default(),
            history: History::new(history_len),
        }
    }

    pub(crate) fn record(&mut self, info: EgressFrameInfo) {
        let l = info.meta.link.index();
        let s = &mut self.stats;
        s.delivery_attempts[l] += 1;
        if info.delivered {
            s.delivery_success[l] += 1;
        }
        if info.release_reason.is_empty() {
            s.bypassed[l] += 1;
        } else {
            if info.is_premature {
                s.premature_delivery[l] += 1;
            }
            for bit in 0..ReleaseReason::BITS {
                if info.release_reason.bits() & (1 << bit) != 0 {
                    s.release_reasons[l][bit] += 1;
                }
            }
        }
        self.history.push(info);
    }
}
