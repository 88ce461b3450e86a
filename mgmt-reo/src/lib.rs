//! Management-frame receive reordering across the links of a multi-link
//! radio.
//!
//! Each link hands management frames to the host independently, with its own
//! 16-bit packet counter. The upper stack needs a single stream ordered by
//! the 32-bit global timestamp that all links share. [`ReoEngine`] rebuilds
//! that order from per-link progress snapshots published by hardware and
//! firmware, holding a frame back only while some other link may still
//! deliver an older one, and forcing it out after a timeout or when the
//! reorder list overflows.
//!
//! ```ignore
//! use std::sync::Arc;
//! use mgmt_reo::{FrameEvent, ReoConfig, ReoEngine};
//!
//! let engine = Arc::new(ReoEngine::new(ReoConfig::default(), platform));
//! engine.start_timers();
//!
//! // From each link's receive path:
//! engine.on_frame_event(link_id, FrameEvent::host_consumed(frame, ctr, ts, duration_us))?;
//!
//! // Teardown: stop timers, drop whatever is still queued.
//! engine.shutdown();
//! ```

pub mod config;
pub mod debug;
pub mod error;
pub mod platform;
pub mod reo;
pub mod runtime;
pub mod sim;
pub mod trace;

pub use config::ReoConfig;
pub use debug::{EgressFrameInfo, IngressFrameInfo, ReoStats};
pub use error::ReoError;
pub use platform::{DeliveryError, Platform};
pub use reo::engine::ReoEngine;
pub use reo::list::{EntryInfo, EntryStatus, LastReleased, ReleaseReason};
pub use reo::release::DeliveredFrame;
pub use reo::snapshot::{LinkSnapshots, SharedSnapshots, Snapshot, SnapshotKind};
pub use reo::types::{DescriptorKind, EventKind, FrameEvent, LinkId, MAX_LINKS, RxMeta};
pub use reo::wait_count::WaitCount;
pub use reo::wrap::{GlobalTs, PktCtr, gte16, gte32, sub16, sub32};
pub use runtime::clock::{Clock, ManualClock, MonotonicClock};
