//! Engine configuration.
//!
//! # Tuning Guidelines
//!
//! - **`entry_timeout`** bounds the extra latency a frame can suffer while
//!   waiting for a link that went quiet. It must comfortably exceed the
//!   worst-case firmware-to-host delay, or frames are released early and
//!   their late predecessors dropped as stale.
//! - **`ageout_period`** should be a fraction of `entry_timeout`; the
//!   effective worst-case hold time is their sum.
//! - **`quiescence_timeout`** only needs to be long enough to outlive
//!   any plausible delivery gap; after it fires, the next frame is never
//!   considered stale.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`ReoEngine`](crate::ReoEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReoConfig {
    /// Maximum number of frames held in the reorder list.
    ///
    /// Past this size the oldest frame is released regardless of its wait
    /// count.
    ///
    /// **Default**: 100
    pub max_list_size: usize,

    /// How long a frame may wait before it is forced out.
    ///
    /// **Default**: 500ms
    pub entry_timeout: Duration,

    /// How often the age-out sweep runs.
    ///
    /// **Default**: 250ms
    pub ageout_period: Duration,

    /// Idle time after the last release before the last-released watermark
    /// is forgotten.
    ///
    /// **Default**: 10min
    pub quiescence_timeout: Duration,

    /// Warn when a link's packet counter jumps by more than this between
    /// two consecutive frames seen by the host. 0 disables the warning.
    ///
    /// **Default**: 0
    pub pkt_ctr_delta_warn_threshold: u16,

    /// Number of ingress frame records kept for debugging. 0 disables.
    ///
    /// **Default**: 0
    pub ingress_history_len: usize,

    /// Number of egress frame records kept for debugging. 0 disables.
    ///
    /// **Default**: 0
    pub egress_history_len: usize,
}

impl ReoConfig {
    /// Creates a configuration with validation.
    ///
    /// # Panics
    ///
    /// Panics if `max_list_size == 0`, or either `entry_timeout` or
    /// `ageout_period` is zero.
    #[must_use]
    fn new_validated(
        max_list_size: usize,
        entry_timeout: Duration,
        ageout_period: Duration,
        quiescence_timeout: Duration,
        pkt_ctr_delta_warn_threshold: u16,
        ingress_history_len: usize,
        egress_history_len: usize,
    ) -> Self {
        assert!(max_list_size > 0, "max_list_size must be > 0");
        assert!(!entry_timeout.is_zero(), "entry_timeout must be > 0");
        assert!(!ageout_period.is_zero(), "ageout_period must be > 0");

        Self {
            max_list_size,
            entry_timeout,
            ageout_period,
            quiescence_timeout,
            pkt_ctr_delta_warn_threshold,
            ingress_history_len,
            egress_history_len,
        }
    }

    /// Default timing with frame history capture and counter-jump warnings
    /// enabled.
    #[must_use]
    pub fn debug() -> Self {
        Self::new_validated(
            100,
            Duration::from_millis(500),
            Duration::from_millis(250),
            Duration::from_secs(600),
            8,
            1000,
            1000,
        )
    }

    /// Entry timeout in microseconds of the engine clock.
    #[inline]
    #[must_use]
    pub fn entry_timeout_us(&self) -> u64 {
        u64::try_from(self.entry_timeout.as_micros()).unwrap_or(u64::MAX)
    }

    /// Quiescence timeout in microseconds of the engine clock.
    #[inline]
    #[must_use]
    pub fn quiescence_timeout_us(&self) -> u64 {
        u64::try_from(self.quiescence_timeout.as_micros()).unwrap_or(u64::MAX)
    }
}

impl Default for ReoConfig {
    fn default() -> Self {
        Self::new_validated(
            100,
            Duration::from_millis(500),
            Duration::from_millis(250),
            Duration::from_secs(600),
            0,
            0,
            0,
        )
    }
}

impl ReoConfig {
    /// Builder-style setter for the list size cap.
    ///
    /// # Panics
    ///
    /// Panics if `size == 0`.
    #[must_use]
    pub const fn with_max_list_size(mut self, size: usize) -> Self {
        assert!(size > 0, "max_list_size must be > 0");
        self.max_list_size = size;
        self
    }

    /// Builder-style setter for the entry timeout.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` is zero.
    #[must_use]
    pub const fn with_entry_timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "entry_timeout must be > 0");
        self.entry_timeout = timeout;
        self
    }

    /// Builder-style setter for the age-out sweep period.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    #[must_use]
    pub const fn with_ageout_period(mut self, period: Duration) -> Self {
        assert!(!period.is_zero(), "ageout_period must be > 0");
        self.ageout_period = period;
        self
    }

    /// Builder-style setter for the quiescence timeout.
    #[must_use]
    pub const fn with_quiescence_timeout(mut self, timeout: Duration) -> Self {
        self.quiescence_timeout = timeout;
        self
    }

    /// Builder-style setter for the packet-counter jump warning threshold.
    #[must_use]
    pub const fn with_pkt_ctr_delta_warn_threshold(mut self, threshold: u16) -> Self {
        self.pkt_ctr_delta_warn_threshold = threshold;
        self
    }

    /// Builder-style setter for both frame history lengths.
    #[must_use]
    pub const fn with_history_len(mut self, ingress: usize, egress: usize) -> Self {
        self.ingress_history_len = ingress;
        self.egress_history_len = egress;
        self
    }
}
