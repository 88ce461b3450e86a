//! Cross-link receive reordering.
//!
//! # Data flow
//!
//! ```text
//! FrameEvent(link L)
//!   │ host snapshot of L advanced            (engine)
//!   │ wait count from every link's snapshots (snapshot + wait_count)
//!   │ list updated: refine, insert or drop   (list)
//!   ▼
//! release: pop ready heads in order          (engine + release)
//!   ▼
//! Platform::deliver
//! ```
//!
//! Timers feed the same release path: entries that wait too long are forced
//! out, and a quiet period resets the last-released watermark.

pub mod engine;
pub mod list;
pub mod release;
pub mod snapshot;
pub mod types;
pub mod wait_count;
pub mod wrap;
