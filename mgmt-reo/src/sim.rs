//! Synthetic multi-link traffic for exercising the engine end to end.
//!
//! Each generated frame goes through three per-link FIFO stages, each
//! publishing a snapshot as the frame passes:
//!
//! ```text
//! MAC HW (global ts assigned, HwSeen)
//!   └─ random delay ─> FW (FwForwarded or FwConsumed)
//!                        └─ random delay ─> host (FrameEvent into the engine)
//! ```
//!
//! Inter-frame gaps and stage delays are random, so frames of different
//! links reach the host out of timestamp order. The run is a deterministic
//! discrete-event replay on a [`ManualClock`]: the same seed always produces
//! the same report.
//!
//! Afterwards every delivered frame is checked against the master list of
//! generated frames: host-consumed frames must be delivered exactly once
//! unless dropped as stale, and deliveries must respect timestamp order
//! except for parallel receptions.

mod platform;

pub use platform::{SimFrame, SimPlatform};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::ReoConfig;
use crate::debug::ReoStats;
use crate::reo::engine::ReoEngine;
use crate::reo::snapshot::{Snapshot, SnapshotKind};
use crate::reo::types::{DescriptorKind, FrameEvent, LinkId, MAX_LINKS};
use crate::reo::wrap::{GlobalTs, PktCtr};
use crate::runtime::clock::ManualClock;
use crate::trace::{debug, info, warn};

/// Simulation error.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Command-line or configuration value out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The run completed but delivered frames broke the ordering rules.
    #[error(
        "delivery check failed: {ordering_violations} ordering violations, \
         {duplicates} duplicates, {unaccounted} undelivered frames"
    )]
    CheckFailed {
        ordering_violations: u64,
        duplicates: u64,
        unaccounted: u64,
    },
}

/// Traffic shape of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Active links, `1..=MAX_LINKS`.
    ///
    /// **Default**: 3
    pub num_links: usize,

    /// Frames generated across all links.
    ///
    /// **Default**: 2000
    pub num_frames: usize,

    /// RNG seed.
    ///
    /// **Default**: 0
    pub seed: u64,

    /// Gap between consecutive frames at the MAC, in microseconds.
    ///
    /// **Default**: 300..=500
    pub inter_frame_us: (u32, u32),

    /// MAC to firmware delay, in microseconds.
    ///
    /// **Default**: 500..=3000
    pub hw_to_fw_us: (u32, u32),

    /// Firmware to host delay, in microseconds.
    ///
    /// **Default**: 500..=3000
    pub fw_to_host_us: (u32, u32),

    /// Percentage of frames consumed by firmware.
    ///
    /// **Default**: 10
    pub fw_consumed_pct: u8,

    /// Percentage of forwarded frames the host fails to process.
    ///
    /// **Default**: 10
    pub error_pct: u8,

    /// Air time of every frame, in microseconds.
    ///
    /// **Default**: 100
    pub frame_duration_us: u32,

    /// Global timestamp of the first frame.
    ///
    /// **Default**: 0
    pub start_ts: u32,

    /// Packet counter of the first frame on every link.
    ///
    /// **Default**: 1
    pub start_ctr: u16,

    /// Engine configuration.
    pub reo: ReoConfig,
}

impl SimConfig {
    /// # Panics
    /// Panics on an out-of-range link count, an inverted delay range, or a
    /// percentage above 100.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    fn new_validated(
        num_links: usize,
        num_frames: usize,
        seed: u64,
        inter_frame_us: (u32, u32),
        hw_to_fw_us: (u32, u32),
        fw_to_host_us: (u32, u32),
        fw_consumed_pct: u8,
        error_pct: u8,
        reo: ReoConfig,
    ) -> Self {
        let config = Self {
            num_links,
            num_frames,
            seed,
            inter_frame_us,
            hw_to_fw_us,
            fw_to_host_us,
            fw_consumed_pct,
            error_pct,
            frame_duration_us: 100,
            start_ts: 0,
            start_ctr: 1,
            reo,
        };
        config.validate();
        config
    }

    fn validate(&self) {
        assert!(
            (1..=MAX_LINKS).contains(&self.num_links),
            "num_links must be in 1..={MAX_LINKS}"
        );
        for (name, (lo, hi)) in [
            ("inter_frame_us", self.inter_frame_us),
            ("hw_to_fw_us", self.hw_to_fw_us),
            ("fw_to_host_us", self.fw_to_host_us),
        ] {
            assert!(lo <= hi, "{name}: min must be <= max");
        }
        assert!(self.inter_frame_us.0 > 0, "inter_frame_us must be > 0");
        assert!(self.fw_consumed_pct <= 100, "fw_consumed_pct must be <= 100");
        assert!(self.error_pct <= 100, "error_pct must be <= 100");
        assert!(self.frame_duration_us > 0, "frame_duration_us must be > 0");
    }

    /// Traffic where every frame reaches the host intact.
    #[must_use]
    pub fn lossless() -> Self {
        Self::default().with_loss(0, 0)
    }

    /// Builder-style setter for the link count.
    #[must_use]
    pub fn with_links(mut self, num_links: usize) -> Self {
        self.num_links = num_links;
        self.validate();
        self
    }

    /// Builder-style setter for the frame count.
    #[must_use]
    pub const fn with_frames(mut self, num_frames: usize) -> Self {
        self.num_frames = num_frames;
        self
    }

    /// Builder-style setter for the seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder-style setter for firmware-consumed and error percentages.
    #[must_use]
    pub fn with_loss(mut self, fw_consumed_pct: u8, error_pct: u8) -> Self {
        self.fw_consumed_pct = fw_consumed_pct;
        self.error_pct = error_pct;
        self.validate();
        self
    }

    /// Builder-style setter for both stage delay ranges.
    #[must_use]
    pub fn with_stage_delays(mut self, hw_to_fw_us: (u32, u32), fw_to_host_us: (u32, u32)) -> Self {
        self.hw_to_fw_us = hw_to_fw_us;
        self.fw_to_host_us = fw_to_host_us;
        self.validate();
        self
    }

    /// Builder-style setter for the starting timestamp and counter, to run
    /// across a wraparound.
    #[must_use]
    pub const fn with_start(mut self, start_ts: u32, start_ctr: u16) -> Self {
        self.start_ts = start_ts;
        self.start_ctr = start_ctr;
        self
    }

    /// Builder-style setter for the engine configuration.
    #[must_use]
    pub fn with_reo(mut self, reo: ReoConfig) -> Self {
        self.reo = reo;
        self
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new_validated(
            3,
            2000,
            0,
            (300, 500),
            (500, 3000),
            (500, 3000),
            10,
            10,
            ReoConfig::default(),
        )
    }
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimReport {
    pub frames: u64,
    pub host_consumed: u64,
    pub fw_consumed: u64,
    pub errors: u64,
    pub delivered: u64,
    /// Host-consumed frames dropped as stale.
    pub stale: u64,
    pub premature: u64,
    pub parallel: u64,
    /// Deliveries older than an earlier non-parallel delivery.
    pub ordering_violations: u64,
    pub duplicates: u64,
    /// Host-consumed frames neither delivered nor dropped as stale.
    pub unaccounted: u64,
    /// Engine calls that returned an error.
    pub engine_errors: u64,
    pub max_list_len: usize,
    pub stats: ReoStats,
}

impl SimReport {
    /// No ordering violation, nothing delivered twice, nothing lost without
    /// being counted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.ordering_violations == 0 && self.duplicates == 0 && self.unaccounted == 0
    }

    /// # Errors
    /// [`SimError::CheckFailed`] unless [`SimReport::is_clean`].
    pub fn check(&self) -> Result<(), SimError> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(SimError::CheckFailed {
                ordering_violations: self.ordering_violations,
                duplicates: self.duplicates,
                unaccounted: self.unaccounted,
            })
        }
    }
}

impl fmt::Display for SimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "frames {} (host {}, fw-consumed {}, error {})",
            self.frames, self.host_consumed, self.fw_consumed, self.errors
        )?;
        writeln!(
            f,
            "delivered {} stale {} premature {} parallel {} max list {}",
            self.delivered, self.stale, self.premature, self.parallel, self.max_list_len
        )?;
        writeln!(
            f,
            "violations {} duplicates {} unaccounted {} engine errors {}",
            self.ordering_violations, self.duplicates, self.unaccounted, self.engine_errors
        )?;
        write!(f, "{}", self.stats)
    }
}

/// Fate of a generated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    HostConsumed,
    FwConsumed,
    Error,
}

#[derive(Debug, Clone, Copy)]
struct GenFrame {
    frame: SimFrame,
    fate: Fate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Hw,
    Fw,
    Host,
}

#[derive(Debug, Clone, Copy)]
struct Step {
    at_us: u64,
    seq: u64,
    stage: Stage,
    frame: usize,
}

/// Generates the master frame list and the time-ordered stage schedule.
fn generate(config: &SimConfig, rng: &mut StdRng) -> (Vec<GenFrame>, Vec<Step>) {
    let mut frames = Vec::with_capacity(config.num_frames);
    let mut steps = Vec::with_capacity(config.num_frames * 3);
    let mut next_ctr = [PktCtr(config.start_ctr); MAX_LINKS];
    let mut fw_free = [0u64; MAX_LINKS];
    let mut host_free = [0u64; MAX_LINKS];
    let mut now = 0u64;
    let mut seq = 0u64;

    let links: Vec<LinkId> = LinkId::all().take(config.num_links).collect();
    let range = |(lo, hi): (u32, u32), rng: &mut StdRng| u64::from(rng.gen_range(lo..=hi));

    for id in 0..config.num_frames {
        if id > 0 {
            now += range(config.inter_frame_us, rng);
        }
        let link = links[rng.gen_range(0..links.len())];
        let l = link.index();
        let ctr = next_ctr[l];
        next_ctr[l] = ctr.next();

        let fate = if rng.gen_range(0..100) < config.fw_consumed_pct {
            Fate::FwConsumed
        } else if rng.gen_range(0..100) < config.error_pct {
            Fate::Error
        } else {
            Fate::HostConsumed
        };

        // Per-link FIFO at firmware and host.
        let fw_at = (now + range(config.hw_to_fw_us, rng)).max(fw_free[l]);
        fw_free[l] = fw_at;
        let host_at = (fw_at + range(config.fw_to_host_us, rng)).max(host_free[l]);
        host_free[l] = host_at;

        // Sim time fits the timestamp domain by wrapping.
        let ts = GlobalTs(config.start_ts).add_us(now as u32);
        frames.push(GenFrame {
            frame: SimFrame {
                id: id as u64,
                link,
                packet_counter: ctr,
                global_timestamp: ts,
            },
            fate,
        });
        for (stage, at_us) in [(Stage::Hw, now), (Stage::Fw, fw_at), (Stage::Host, host_at)] {
            steps.push(Step {
                at_us,
                seq,
                stage,
                frame: id,
            });
            seq += 1;
        }
    }

    steps.sort_by_key(|s| (s.at_us, s.seq));
    (frames, steps)
}

/// Runs one simulation and checks the delivered stream.
#[must_use]
pub fn run(config: &SimConfig) -> SimReport {
    config.validate();
    info!(
        links = config.num_links,
        frames = config.num_frames,
        seed = config.seed,
        "simulation starting"
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let (frames, steps) = generate(config, &mut rng);

    let clock = ManualClock::new();
    let engine = ReoEngine::with_clock(
        config.reo.clone(),
        SimPlatform::<SimFrame>::new(config.num_links),
        Arc::new(clock.clone()),
    );
    let period_us = u64::try_from(config.reo.ageout_period.as_micros()).unwrap_or(u64::MAX);
    let mut next_sweep = period_us;
    let mut engine_errors = 0u64;
    let mut max_list_len = 0usize;

    let sweep_until = |t: u64, next_sweep: &mut u64, engine_errors: &mut u64| {
        while *next_sweep <= t {
            clock.set_us(*next_sweep);
            if let Err(e) = engine.age_out_tick() {
                debug!(error = %e, "age-out release failed");
                *engine_errors += 1;
            }
            engine.check_quiescence();
            *next_sweep += period_us;
        }
    };

    for step in &steps {
        sweep_until(step.at_us, &mut next_sweep, &mut engine_errors);
        clock.set_us(step.at_us);

        let g = &frames[step.frame];
        let f = g.frame;
        let snapshot = Snapshot::new(f.packet_counter.0, f.global_timestamp.0);
        match step.stage {
            Stage::Hw => engine.platform().set_snapshot(f.link, SnapshotKind::HwSeen, snapshot),
            Stage::Fw => {
                let kind = if g.fate == Fate::FwConsumed {
                    SnapshotKind::FwConsumed
                } else {
                    SnapshotKind::FwForwarded
                };
                engine.platform().set_snapshot(f.link, kind, snapshot);
            }
            Stage::Host => {
                let (ctr, ts, dur) = (f.packet_counter.0, f.global_timestamp.0, config.frame_duration_us);
                let event = match g.fate {
                    Fate::HostConsumed => FrameEvent::host_consumed(f, ctr, ts, dur),
                    Fate::FwConsumed => FrameEvent::fw_consumed(ctr, ts, dur),
                    Fate::Error => FrameEvent::error(ctr, ts),
                };
                if let Err(e) = engine.on_frame_event(f.link.get(), event) {
                    warn!(link = %f.link, id = f.id, error = %e, "engine rejected frame");
                    engine_errors += 1;
                }
                max_list_len = max_list_len.max(engine.list_len());
            }
        }
    }

    // Let every remaining entry age out.
    let end = steps.last().map_or(0, |s| s.at_us)
        + config.reo.entry_timeout_us()
        + 2 * period_us;
    sweep_until(end, &mut next_sweep, &mut engine_errors);

    let stats = engine.stats();
    let delivered = engine.platform().take_delivered();
    let leftover = engine.shutdown();

    let mut report = SimReport {
        frames: frames.len() as u64,
        host_consumed: count_fate(&frames, Fate::HostConsumed),
        fw_consumed: count_fate(&frames, Fate::FwConsumed),
        errors: count_fate(&frames, Fate::Error),
        delivered: delivered.len() as u64,
        stale: stats.ingress.stale.iter().map(|k| k[DescriptorKind::HostConsumed.index()]).sum(),
        premature: 0,
        parallel: 0,
        ordering_violations: 0,
        duplicates: 0,
        unaccounted: 0,
        engine_errors,
        max_list_len,
        stats,
    };

    let mut seen = HashSet::with_capacity(delivered.len());
    let mut watermark: Option<GlobalTs> = None;
    for d in &delivered {
        if !seen.insert(d.payload.id) {
            report.duplicates += 1;
        }
        if d.is_premature {
            report.premature += 1;
        }
        if d.is_parallel_rx {
            report.parallel += 1;
            continue;
        }
        let ts = d.meta.global_timestamp;
        match watermark {
            Some(w) if ts.lt(w) => {
                warn!(id = d.payload.id, %ts, watermark = %w, "delivered out of order");
                report.ordering_violations += 1;
            }
            _ => watermark = Some(ts),
        }
    }
    let delivered_unique = seen.len() as u64;
    report.unaccounted = report
        .host_consumed
        .saturating_sub(delivered_unique + report.stale + leftover as u64);

    info!(
        delivered = report.delivered,
        stale = report.stale,
        violations = report.ordering_violations,
        "simulation finished"
    );
    report
}

fn count_fate(frames: &[GenFrame], fate: Fate) -> u64 {
    frames.iter().filter(|g| g.fate == fate).count() as u64
}
