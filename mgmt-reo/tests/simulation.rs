//! Whole-system runs of the simulator: generated multi-link traffic through
//! hardware, firmware and host stages into the engine.
//!
//! ```bash
//! RUST_LOG=mgmt_reo=debug cargo test --test simulation -- --nocapture
//! ```

use std::sync::Once;
use std::time::Duration;

use mgmt_reo::sim::{self, SimConfig};
use mgmt_reo::{MAX_LINKS, ReoConfig};

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        mgmt_reo::trace::init_tracing_with_default("mgmt_reo=error");
    });
}

#[test]
fn lossless_traffic_is_delivered_complete_and_in_order() {
    init_test_tracing();
    for seed in [1, 2, 3] {
        let report = sim::run(&SimConfig::lossless().with_frames(3000).with_seed(seed));
        assert!(report.is_clean(), "seed {seed}:\n{report}");
        assert_eq!(report.stale, 0, "seed {seed}:\n{report}");
        assert_eq!(report.delivered, report.host_consumed, "seed {seed}:\n{report}");
        assert_eq!(report.engine_errors, 0);
        assert_eq!(report.parallel, 0);
    }
}

#[test]
fn lossy_traffic_stays_ordered() {
    init_test_tracing();
    for seed in [10, 11, 12] {
        let report = sim::run(&SimConfig::default().with_loss(20, 15).with_seed(seed));
        assert!(report.fw_consumed > 0 && report.errors > 0);
        report.check().unwrap_or_else(|e| panic!("seed {seed}: {e}\n{report}"));
        assert_eq!(report.engine_errors, 0);
        assert!(report.delivered + report.stale <= report.host_consumed);
    }
}

#[test]
fn counters_and_timestamps_wrap() {
    init_test_tracing();
    let config = SimConfig::default()
        .with_frames(4000)
        .with_seed(5)
        .with_start(u32::MAX - 100_000, 65_500);
    let report = sim::run(&config);
    report.check().unwrap_or_else(|e| panic!("{e}\n{report}"));
    assert_eq!(report.engine_errors, 0);
}

#[test]
fn all_links() {
    init_test_tracing();
    let config = SimConfig::default()
        .with_links(MAX_LINKS)
        .with_frames(5000)
        .with_seed(99);
    let report = sim::run(&config);
    report.check().unwrap_or_else(|e| panic!("{e}\n{report}"));
    let active_links = report
        .stats
        .ingress
        .ingress
        .iter()
        .filter(|kinds| kinds.iter().sum::<u64>() > 0)
        .count();
    assert_eq!(active_links, MAX_LINKS);
}

#[test]
fn tiny_list_overflows_but_stays_ordered() {
    init_test_tracing();
    // Slow firmware keeps many frames in flight; a two-entry list must force
    // frames out early.
    let config = SimConfig::default()
        .with_frames(2000)
        .with_seed(3)
        .with_stage_delays((2000, 8000), (2000, 8000))
        .with_reo(ReoConfig::default().with_max_list_size(2));
    let report = sim::run(&config);
    report.check().unwrap_or_else(|e| panic!("{e}\n{report}"));
    assert!(report.max_list_len <= 2);
    assert!(report.premature > 0, "{report}");
}

#[test]
fn short_timeout_releases_prematurely() {
    init_test_tracing();
    let reo = ReoConfig::default()
        .with_entry_timeout(Duration::from_millis(1))
        .with_ageout_period(Duration::from_micros(500));
    let config = SimConfig::default()
        .with_frames(2000)
        .with_seed(8)
        .with_stage_delays((2000, 8000), (2000, 8000))
        .with_reo(reo);
    let report = sim::run(&config);
    report.check().unwrap_or_else(|e| panic!("{e}\n{report}"));
    assert!(report.premature > 0, "{report}");
}
