//! Reordering scenarios driven frame by frame through the public API.
//!
//! Each test sets up link snapshots on a [`SimPlatform`], feeds frame events
//! and checks what reached the upper layer and in which order.
//!
//! ```bash
//! RUST_LOG=mgmt_reo=trace cargo test --test scenarios -- --nocapture
//! ```

use std::sync::{Arc, Once};
use std::time::Duration;

use mgmt_reo::sim::SimPlatform;
use mgmt_reo::{
    DeliveredFrame, FrameEvent, LinkId, ManualClock, ReleaseReason, ReoConfig, ReoEngine, ReoError,
    Snapshot, SnapshotKind,
};

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        mgmt_reo::trace::init_tracing();
    });
}

/// Payload is the frame's timestamp, which makes delivery order easy to read.
type Engine = ReoEngine<SimPlatform<u32>>;

fn link(n: u8) -> LinkId {
    LinkId::new(n).unwrap()
}

fn setup(num_links: usize, config: ReoConfig) -> (Engine, ManualClock) {
    init_test_tracing();
    let clock = ManualClock::new();
    let engine = ReoEngine::with_clock(config, SimPlatform::new(num_links), Arc::new(clock.clone()));
    (engine, clock)
}

/// Marks the frame as seen by hardware and forwarded by firmware, then
/// delivers the host event.
fn feed(engine: &Engine, l: u8, ctr: u16, ts: u32) -> Result<bool, ReoError> {
    let snap = Snapshot::new(ctr, ts);
    engine.platform().set_snapshot(link(l), SnapshotKind::HwSeen, snap);
    engine.platform().set_snapshot(link(l), SnapshotKind::FwForwarded, snap);
    engine.on_frame_event(l, FrameEvent::host_consumed(ts, ctr, ts, 10))
}

/// Makes every frame on other links wait for `l`: hardware has seen a frame
/// the host has not.
fn block_on(engine: &Engine, l: u8) {
    engine
        .platform()
        .set_snapshot(link(l), SnapshotKind::HwSeen, Snapshot::new(1, 10));
}

fn payloads(delivered: &[DeliveredFrame<u32>]) -> Vec<u32> {
    delivered.iter().map(|f| f.payload).collect()
}

#[test]
fn older_frame_after_release_is_stale() {
    let (engine, _) = setup(2, ReoConfig::default());

    let first = FrameEvent::host_consumed(100, 10, 100, 10).with_window(100, 110);
    assert!(engine.on_frame_event(0, first).unwrap());
    assert_eq!(payloads(&engine.platform().take_delivered()), vec![100]);

    let late = FrameEvent::host_consumed(50, 1, 50, 10).with_window(50, 60);
    assert!(!engine.on_frame_event(1, late).unwrap());
    assert_eq!(engine.platform().delivered_len(), 0);
    assert_eq!(engine.list_len(), 0);

    let stats = engine.stats();
    assert_eq!(stats.ingress.total_stale(), 1);
    assert_eq!(stats.egress.total_delivered(), 1);
}

#[test]
fn parallel_reception_is_delivered_not_stale() {
    let (engine, _) = setup(2, ReoConfig::default());

    let first = FrameEvent::host_consumed(100, 1, 100, 10).with_window(100, 110);
    assert!(engine.on_frame_event(0, first).unwrap());
    let before = engine.last_released();

    // Older timestamp, but its window encloses the released frame's window.
    let wide = FrameEvent::host_consumed(90, 1, 90, 40).with_window(90, 130);
    assert!(engine.on_frame_event(1, wide).unwrap());

    let delivered = engine.platform().take_delivered();
    assert_eq!(payloads(&delivered), vec![100, 90]);
    assert!(delivered[1].is_parallel_rx);
    assert_eq!(engine.last_released(), before);
    assert_eq!(engine.stats().ingress.parallel_rx[1], 1);
}

#[test]
fn frame_waits_for_older_frame_on_other_link() {
    let (engine, _) = setup(2, ReoConfig::default());
    block_on(&engine, 1);

    assert!(feed(&engine, 0, 1, 200).unwrap());
    assert_eq!(engine.platform().delivered_len(), 0);
    let waiting = engine.dump_list();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].wait_count.per_link(link(1)), u32::MAX);

    // Link 1 delivers an older frame: it goes out first, and the waiting
    // entry learns one link-1 frame arrived.
    assert!(feed(&engine, 1, 1, 150).unwrap());
    assert_eq!(payloads(&engine.platform().take_delivered()), vec![150]);
    assert_eq!(engine.dump_list()[0].wait_count.per_link(link(1)), u32::MAX - 1);

    // A newer link-1 frame proves nothing older is still on its way.
    assert!(feed(&engine, 1, 2, 250).unwrap());
    let delivered = engine.platform().take_delivered();
    assert_eq!(payloads(&delivered), vec![200, 250]);
    assert!(delivered.iter().all(|f| f.release_reason == ReleaseReason::ZERO_WAIT_COUNT));
    assert!(delivered.iter().all(|f| !f.is_premature));
    assert_eq!(engine.list_len(), 0);
}

#[test]
fn aged_out_entry_releases_everything_before_it() {
    let config = ReoConfig::default().with_entry_timeout(Duration::from_millis(500));
    let (engine, clock) = setup(3, config);
    block_on(&engine, 1);

    assert!(feed(&engine, 0, 1, 200).unwrap());
    clock.advance(Duration::from_millis(300));
    assert!(feed(&engine, 2, 1, 100).unwrap());
    assert_eq!(engine.age_out_tick().unwrap(), 0);

    let order: Vec<u32> = engine.dump_list().iter().map(|e| e.meta.global_timestamp.0).collect();
    assert_eq!(order, vec![100, 200]);

    // Only the ts=200 entry is old enough, but the younger ts=100 entry sits
    // ahead of it.
    clock.advance(Duration::from_millis(200));
    assert_eq!(engine.age_out_tick().unwrap(), 2);

    let delivered = engine.platform().take_delivered();
    assert_eq!(payloads(&delivered), vec![100, 200]);
    assert_eq!(delivered[0].release_reason, ReleaseReason::OLDER_THAN_AGED_OUT);
    assert_eq!(delivered[1].release_reason, ReleaseReason::AGED_OUT);
    assert!(delivered.iter().all(|f| f.is_premature));
    assert_eq!(engine.stats().egress.total_premature(), 2);
}

#[test]
fn overflow_forces_out_exactly_the_head() {
    let (engine, _) = setup(2, ReoConfig::default().with_max_list_size(4));
    block_on(&engine, 1);

    for i in 1..=4u16 {
        assert!(feed(&engine, 0, i, u32::from(i) * 100).unwrap());
    }
    assert_eq!(engine.list_len(), 4);
    assert_eq!(engine.platform().delivered_len(), 0);

    assert!(feed(&engine, 0, 5, 500).unwrap());
    assert_eq!(engine.list_len(), 4);
    let delivered = engine.platform().take_delivered();
    assert_eq!(payloads(&delivered), vec![100]);
    assert_eq!(delivered[0].release_reason, ReleaseReason::OVER_CAPACITY);
    assert!(delivered[0].is_premature);
    assert_eq!(engine.stats().egress.release_reasons[0][3], 1);
}

#[test]
fn stale_frames_leave_no_trace() {
    let (engine, _) = setup(3, ReoConfig::default());
    block_on(&engine, 2);
    assert!(feed(&engine, 0, 1, 1000).unwrap());
    assert_eq!(engine.list_len(), 1);

    // Release the ts=1000 frame by letting link 2 catch up.
    assert!(feed(&engine, 2, 1, 1100).unwrap());
    assert_eq!(payloads(&engine.platform().take_delivered()), vec![1000, 1100]);

    let watermark = engine.last_released();
    let list = engine.dump_list();
    for (ctr, ts) in [(1, 500), (2, 600)] {
        assert!(!feed(&engine, 1, ctr, ts).unwrap());
        assert_eq!(engine.last_released(), watermark);
        assert_eq!(engine.dump_list(), list);
    }
    assert_eq!(engine.platform().delivered_len(), 0);
    assert_eq!(engine.stats().ingress.stale[1].iter().sum::<u64>(), 2);
}

#[test]
fn delivery_order_follows_timestamps_across_links() {
    let (engine, _) = setup(3, ReoConfig::default());

    // Hardware has already seen every frame; the host gets them late and
    // interleaved. Each link stays in counter order.
    for (l, ctr, ts) in [(0, 4, 1000), (1, 3, 900), (2, 3, 800)] {
        engine
            .platform()
            .set_snapshot(link(l), SnapshotKind::HwSeen, Snapshot::new(ctr, ts));
    }
    let arrivals = [
        (0, 1, 300),
        (2, 1, 100),
        (0, 2, 600),
        (1, 1, 200),
        (2, 2, 400),
        (1, 2, 500),
        (1, 3, 900),
        (2, 3, 800),
        (0, 3, 700),
        (0, 4, 1000),
    ];
    for (l, ctr, ts) in arrivals {
        engine
            .platform()
            .set_snapshot(link(l), SnapshotKind::FwForwarded, Snapshot::new(ctr, ts));
        assert!(engine.on_frame_event(l, FrameEvent::host_consumed(ts, ctr, ts, 10)).unwrap());
    }

    let delivered = engine.platform().take_delivered();
    assert_eq!(
        payloads(&delivered),
        vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000]
    );
    assert!(delivered.iter().all(|f| !f.is_premature));
    assert_eq!(engine.stats().ingress.total_stale(), 0);
    assert_eq!(engine.list_len(), 0);
}

#[test]
fn errors_are_counted_per_link_and_kind() {
    let (engine, _) = setup(2, ReoConfig::default());
    assert!(matches!(
        engine.on_frame_event(0, FrameEvent::host_consumed(1, 1, 100, 0)),
        Err(ReoError::MissingInput { .. })
    ));
    assert!(feed(&engine, 0, 1, 100).unwrap());
    assert!(matches!(feed(&engine, 0, 1, 200), Err(ReoError::CounterRegression { .. })));

    let stats = engine.stats();
    assert_eq!(stats.ingress.total_errors(), 2);
    assert_eq!(stats.ingress.total_ingress(), 3);
    assert!(stats.to_string().contains("link"));
}

#[test]
fn inconsistent_link_snapshots_do_not_block_other_links() {
    let (engine, _) = setup(2, ReoConfig::default());
    assert!(feed(&engine, 1, 1, 100).unwrap());
    assert_eq!(payloads(&engine.platform().take_delivered()), vec![100]);

    // Firmware and host still report link 1 progress, hardware does not.
    engine
        .platform()
        .set_snapshot(link(1), SnapshotKind::HwSeen, Snapshot::INVALID);
    assert!(feed(&engine, 0, 1, 200).unwrap());

    assert_eq!(payloads(&engine.platform().take_delivered()), vec![200]);
    assert_eq!(engine.list_len(), 0);
    let stats = engine.stats();
    assert_eq!(stats.ingress.snapshot_inconsistent[1], 1);
    assert_eq!(stats.ingress.snapshot_inconsistent[0], 0);
    assert_eq!(stats.ingress.total_errors(), 0);
}
