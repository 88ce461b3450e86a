//! Link identifiers and the frame events fed into the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::wrap::{GlobalTs, PktCtr};
use crate::error::ReoError;

/// Maximum number of links a single engine tracks.
pub const MAX_LINKS: usize = 7;

/// Hardware link index in `[0, MAX_LINKS)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(u8);

impl LinkId {
    /// Validates a raw link index.
    ///
    /// # Errors
    /// Returns [`ReoError::InvalidLinkId`] if `raw >= MAX_LINKS`.
    pub fn new(raw: u8) -> Result<Self, ReoError> {
        if usize::from(raw) < MAX_LINKS {
            Ok(Self(raw))
        } else {
            Err(ReoError::InvalidLinkId { link_id: raw })
        }
    }

    /// Raw link index.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Link index as an array index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// All valid link ids in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        // MAX_LINKS fits in u8.
        (0..MAX_LINKS as u8).map(Self)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What happened to a frame before it reached the engine.
///
/// Only host-consumed frames carry a payload and can be queued. The other
/// kinds still advance the host view of their link, which lets queued frames
/// stop waiting for them.
#[derive(Debug)]
pub enum EventKind<P> {
    /// Frame handed to the host for delivery upstream.
    HostConsumed { payload: P },
    /// Frame consumed by firmware; the host only learns that it existed.
    FwConsumed,
    /// Frame dropped on the host path because of an error.
    Error,
}

impl<P> EventKind<P> {
    /// Payload-free kind, used for statistics and history.
    #[must_use]
    pub const fn descriptor(&self) -> DescriptorKind {
        match self {
            Self::HostConsumed { .. } => DescriptorKind::HostConsumed,
            Self::FwConsumed => DescriptorKind::FwConsumed,
            Self::Error => DescriptorKind::Error,
        }
    }
}

/// Payload-free event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorKind {
    HostConsumed,
    FwConsumed,
    Error,
}

impl DescriptorKind {
    /// Number of kinds, for per-kind counters.
    pub const COUNT: usize = 3;

    /// Index into per-kind counter arrays.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::HostConsumed => 0,
            Self::FwConsumed => 1,
            Self::Error => 2,
        }
    }

    /// All kinds in counter order.
    pub const ALL: [Self; Self::COUNT] = [Self::HostConsumed, Self::FwConsumed, Self::Error];
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HostConsumed => "host-consumed",
            Self::FwConsumed => "fw-consumed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// A frame arrival notification for one link.
#[derive(Debug)]
pub struct FrameEvent<P> {
    pub kind: EventKind<P>,
    /// Per-link counter stamped by the MAC.
    pub packet_counter: PktCtr,
    /// Global timestamp used for cross-link ordering.
    pub global_timestamp: GlobalTs,
    /// Start of the reception window, for parallel-receive detection.
    pub start_ts: GlobalTs,
    /// End of the reception window.
    pub end_ts: GlobalTs,
    /// Air time in microseconds. Zero means the collaborator failed to fill it.
    pub duration_us: u32,
    /// Frames that do not need ordering bypass the list.
    pub reorder_required: bool,
}

impl<P> FrameEvent<P> {
    /// Host-consumed frame with a reception window of `duration_us` starting
    /// at `ts`.
    pub fn host_consumed(payload: P, ctr: u16, ts: u32, duration_us: u32) -> Self {
        Self::with_kind(EventKind::HostConsumed { payload }, ctr, ts, duration_us)
    }

    /// Frame consumed by firmware.
    pub fn fw_consumed(ctr: u16, ts: u32, duration_us: u32) -> Self {
        Self::with_kind(EventKind::FwConsumed, ctr, ts, duration_us)
    }

    /// Frame dropped on the host path.
    pub fn error(ctr: u16, ts: u32) -> Self {
        Self::with_kind(EventKind::Error, ctr, ts, 0)
    }

    fn with_kind(kind: EventKind<P>, ctr: u16, ts: u32, duration_us: u32) -> Self {
        let start = GlobalTs(ts);
        Self {
            kind,
            packet_counter: PktCtr(ctr),
            global_timestamp: start,
            start_ts: start,
            end_ts: start.add_us(duration_us),
            duration_us,
            reorder_required: true,
        }
    }

    /// Overrides the reception window.
    #[must_use]
    pub fn with_window(mut self, start_ts: u32, end_ts: u32) -> Self {
        self.start_ts = GlobalTs(start_ts);
        self.end_ts = GlobalTs(end_ts);
        self
    }

    /// Marks the frame as not needing cross-link ordering.
    #[must_use]
    pub fn without_reorder(mut self) -> Self {
        self.reorder_required = false;
        self
    }

    /// Header fields of this event, tagged with its link.
    #[must_use]
    pub const fn meta(&self, link: LinkId) -> RxMeta {
        RxMeta {
            link,
            packet_counter: self.packet_counter,
            global_timestamp: self.global_timestamp,
            start_ts: self.start_ts,
            end_ts: self.end_ts,
            duration_us: self.duration_us,
        }
    }
}

/// Reception metadata that travels with a frame through the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxMeta {
    pub link: LinkId,
    pub packet_counter: PktCtr,
    pub global_timestamp: GlobalTs,
    pub start_ts: GlobalTs,
    pub end_ts: GlobalTs,
    pub duration_us: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_id_bounds() {
        assert_eq!(LinkId::new(0).map(LinkId::get).ok(), Some(0));
        assert!(LinkId::new(MAX_LINKS as u8 - 1).is_ok());
        assert!(matches!(
            LinkId::new(MAX_LINKS as u8),
            Err(ReoError::InvalidLinkId { link_id }) if link_id as usize == MAX_LINKS
        ));
        assert_eq!(LinkId::all().count(), MAX_LINKS);
    }

    #[test]
    fn event_window_follows_duration() {
        let ev = FrameEvent::host_consumed((), 3, u32::MAX - 5, 10);
        assert_eq!(ev.start_ts, GlobalTs(u32::MAX - 5));
        assert_eq!(ev.end_ts, GlobalTs(4));
        assert!(ev.reorder_required);
        assert!(!ev.without_reorder().reorder_required);
    }
}
