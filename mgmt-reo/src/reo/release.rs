//! Frames handed to the upper layer and the state guarded by the
//! release-order lock.

use super::list::{ListEntry, ReleaseReason};
use super::types::RxMeta;
use super::wait_count::WaitCount;
use crate::debug::EgressLog;

/// A frame leaving the engine, passed by value to
/// [`Platform::deliver`](crate::platform::Platform::deliver).
#[derive(Debug)]
pub struct DeliveredFrame<P> {
    pub payload: P,
    pub meta: RxMeta,
    /// Empty for frames that bypassed the list.
    pub release_reason: ReleaseReason,
    /// False when the frame did not need cross-link ordering.
    pub reordered: bool,
    pub is_parallel_rx: bool,
    /// Released while still waiting on other links (aged out or overflow).
    pub is_premature: bool,
    pub initial_wait_count: WaitCount,
    pub final_wait_count: WaitCount,
}

impl<P> DeliveredFrame<P> {
    pub(crate) fn released(entry: ListEntry<P>, release_reason: ReleaseReason) -> Self {
        Self {
            payload: entry.payload,
            meta: entry.meta,
            release_reason,
            reordered: true,
            is_parallel_rx: entry.is_parallel_rx,
            is_premature: !release_reason.contains(ReleaseReason::ZERO_WAIT_COUNT),
            initial_wait_count: entry.initial_wait_count,
            final_wait_count: entry.wait_count,
        }
    }

    pub(crate) fn bypass(payload: P, meta: RxMeta) -> Self {
        Self {
            payload,
            meta,
            release_reason: ReleaseReason::NONE,
            reordered: false,
            is_parallel_rx: false,
            is_premature: false,
            initial_wait_count: WaitCount::ZERO,
            final_wait_count: WaitCount::ZERO,
        }
    }
}

/// Everything serialized by the release-order lock.
#[derive(Debug)]
pub(crate) struct ReleaseState {
    /// Engine clock at which the last-released watermark expires.
    pub(crate) quiescence_deadline_us: Option<u64>,
    pub(crate) egress: EgressLog,
}

impl ReleaseState {
    pub(crate) fn new(egress: EgressLog) -> Self {
        Self {
            quiescence_deadline_us: None,
            egress,
        }
    }
}
