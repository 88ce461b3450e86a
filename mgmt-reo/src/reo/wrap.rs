//! Wraparound-safe comparison and subtraction for link counters and timestamps.
//!
//! Packet counters are 16-bit per link, global timestamps are 32-bit
//! microseconds shared by all links. Both wrap, so ordering is defined on the
//! half range: `a` is "greater or equal" to `b` when the forward distance from
//! `b` to `a` is at most half the counter range.
//!
//! The true distance between two compared values is assumed never to exceed
//! half the range. Nothing checks this; callers feeding values further apart
//! get an answer with the opposite sign.

use std::fmt;

use serde::{Deserialize, Serialize};

const PKT_CTR_HALF_RANGE: u16 = 0x8000;
const PKT_CTR_RANGE: i32 = 0x1_0000;
const GLOBAL_TS_HALF_RANGE: u32 = 0x8000_0000;
const GLOBAL_TS_RANGE: i64 = 0x1_0000_0000;

/// `a >= b` on the 16-bit circle.
#[inline]
#[must_use]
pub const fn gte16(a: u16, b: u16) -> bool {
    a.wrapping_sub(b) <= PKT_CTR_HALF_RANGE
}

/// Signed distance `a - b` on the 16-bit circle.
#[inline]
#[must_use]
pub const fn sub16(a: u16, b: u16) -> i32 {
    let delta = a.wrapping_sub(b);
    if delta > PKT_CTR_HALF_RANGE {
        delta as i32 - PKT_CTR_RANGE
    } else {
        delta as i32
    }
}

/// `a >= b` on the 32-bit circle.
#[inline]
#[must_use]
pub const fn gte32(a: u32, b: u32) -> bool {
    a.wrapping_sub(b) <= GLOBAL_TS_HALF_RANGE
}

/// Signed distance `a - b` on the 32-bit circle.
#[inline]
#[must_use]
pub const fn sub32(a: u32, b: u32) -> i64 {
    let delta = a.wrapping_sub(b);
    if delta > GLOBAL_TS_HALF_RANGE {
        delta as i64 - GLOBAL_TS_RANGE
    } else {
        delta as i64
    }
}

/// Per-link 16-bit packet counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PktCtr(pub u16);

impl PktCtr {
    /// Wrap-safe `self >= other`.
    #[inline]
    #[must_use]
    pub const fn gte(self, other: Self) -> bool {
        gte16(self.0, other.0)
    }

    /// Wrap-safe signed `self - other`.
    #[inline]
    #[must_use]
    pub const fn sub(self, other: Self) -> i32 {
        sub16(self.0, other.0)
    }

    /// Next counter value (wraps on overflow).
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl From<u16> for PktCtr {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

impl From<PktCtr> for u16 {
    fn from(c: PktCtr) -> Self {
        c.0
    }
}

impl fmt::Display for PktCtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 32-bit global timestamp in microseconds, common to all links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GlobalTs(pub u32);

impl GlobalTs {
    /// Wrap-safe `self >= other`.
    #[inline]
    #[must_use]
    pub const fn gte(self, other: Self) -> bool {
        gte32(self.0, other.0)
    }

    /// Wrap-safe `self < other`.
    #[inline]
    #[must_use]
    pub const fn lt(self, other: Self) -> bool {
        !gte32(self.0, other.0)
    }

    /// Wrap-safe signed `self - other`.
    #[inline]
    #[must_use]
    pub const fn sub(self, other: Self) -> i64 {
        sub32(self.0, other.0)
    }

    /// Timestamp `us` microseconds later (wraps on overflow).
    #[inline]
    #[must_use]
    pub const fn add_us(self, us: u32) -> Self {
        Self(self.0.wrapping_add(us))
    }
}

impl From<u32> for GlobalTs {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<GlobalTs> for u32 {
    fn from(ts: GlobalTs) -> Self {
        ts.0
    }
}

impl fmt::Display for GlobalTs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
