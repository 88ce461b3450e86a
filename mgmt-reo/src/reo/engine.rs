//! The reorder engine: event ingestion, release and timer entry points.
//!
//! # Locking
//!
//! ```text
//! compute  ── host snapshots, snapshot cache, ingress log
//!    └─> list  ── reorder list, last-released watermark
//! release  ── egress log, quiescence deadline
//!    └─> list
//! ```
//!
//! Processing an event holds the compute lock across the host snapshot
//! update, the wait-count computation and the list update, so those three
//! steps are atomic with respect to other events. The list lock is only ever
//! held for short list operations. The release lock is held for an entire
//! drain so that frames reach the upper layer in list order even when
//! several threads drain at once; the list lock is released before each
//! delivery call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::list::{EntryInfo, IncomingFrame, LastReleased, ReorderList, UpdateOutcome, waiting_links};
use super::release::{DeliveredFrame, ReleaseState};
use super::snapshot::{SharedSnapshots, Snapshot, SnapshotValidator};
use super::types::{DescriptorKind, FrameEvent, LinkId, MAX_LINKS, RxMeta};
use super::wait_count::{WaitCount, pending_frames};
use crate::config::ReoConfig;
use crate::debug::{EgressFrameInfo, EgressLog, IngressFrameInfo, IngressLog, ReoStats};
use crate::error::ReoError;
use crate::platform::{DeliveryError, Platform};
use crate::runtime::clock::{Clock, MonotonicClock};
use crate::runtime::timers::TimerThread;
use crate::trace::{debug, error, info, trace, warn};

/// State guarded by the computation lock.
#[derive(Debug)]
struct ComputeState {
    host_seen: [Snapshot; MAX_LINKS],
    validator: SnapshotValidator,
    ingress: IngressLog,
}

/// Management-frame reorder engine for one group of links.
///
/// Cheap to share behind an [`Arc`]; every entry point takes `&self` and may
/// be called from any thread.
pub struct ReoEngine<P: Platform> {
    config: ReoConfig,
    platform: P,
    clock: Arc<dyn Clock>,
    compute: Mutex<ComputeState>,
    list: Mutex<ReorderList<P::Payload>>,
    release: Mutex<ReleaseState>,
    timers: Mutex<Option<TimerThread>>,
    shut_down: AtomicBool,
}

impl<P: Platform> ReoEngine<P> {
    /// Creates an engine on the monotonic system clock. Timers are not
    /// started; see [`ReoEngine::start_timers`].
    pub fn new(config: ReoConfig, platform: P) -> Self {
        Self::with_clock(config, platform, Arc::new(MonotonicClock::new()))
    }

    /// Creates an engine on a caller-supplied clock.
    pub fn with_clock(config: ReoConfig, platform: P, clock: Arc<dyn Clock>) -> Self {
        info!(
            max_list_size = config.max_list_size,
            entry_timeout_ms = config.entry_timeout.as_millis() as u64,
            ageout_period_ms = config.ageout_period.as_millis() as u64,
            quiescence_timeout_s = config.quiescence_timeout.as_secs(),
            "reorder engine created"
        );
        Self {
            compute: Mutex::new(ComputeState {
                host_seen: [Snapshot::INVALID; MAX_LINKS],
                validator: SnapshotValidator::new(),
                ingress: IngressLog::new(config.ingress_history_len),
            }),
            list: Mutex::new(ReorderList::new(config.max_list_size)),
            release: Mutex::new(ReleaseState::new(EgressLog::new(config.egress_history_len))),
            timers: Mutex::new(None),
            shut_down: AtomicBool::new(false),
            config,
            platform,
            clock,
        }
    }

    /// Starts the background thread running the age-out sweep and the
    /// quiescence check every `ageout_period`. Calling it again is a no-op.
    ///
    /// # Panics
    /// Panics if the thread cannot be spawned.
    pub fn start_timers(self: &Arc<Self>) {
        let mut timers = self.timers.lock();
        if timers.is_none() && !self.is_shut_down() {
            *timers = Some(TimerThread::spawn(Arc::downgrade(self), self.config.ageout_period));
        }
    }

    #[must_use]
    pub fn config(&self) -> &ReoConfig {
        &self.config
    }

    #[must_use]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Feeds one frame event of link `link_id` into the engine and releases
    /// whatever became deliverable.
    ///
    /// Returns true if the frame was queued for ordered delivery. It may
    /// already have been delivered when this returns. False means the frame
    /// bypassed the list, was stale, or carried no payload.
    ///
    /// # Errors
    /// On any error the event's payload, if any, is dropped. A
    /// [`ReoError::DeliveryFailure`] refers to some released frame, not
    /// necessarily this one; this frame's queuing still happened.
    pub fn on_frame_event(
        &self,
        link_id: u8,
        event: FrameEvent<P::Payload>,
    ) -> Result<bool, ReoError> {
        if self.is_shut_down() {
            return Err(ReoError::ShutDown);
        }
        let link = LinkId::new(link_id)?;
        if self.platform.resolve_link(link).is_none() {
            warn!(%link, "frame event on unknown link");
            return Err(ReoError::InvalidLinkId { link_id });
        }

        let meta = event.meta(link);
        let reorder_required = event.reorder_required;
        let ingress_ts = self.clock.now_us();

        let outcome = {
            let mut compute = self.compute.lock();
            let kind = event.kind.descriptor();
            match self.ingest(&mut compute, meta, event, ingress_ts) {
                Ok(outcome) => outcome,
                Err(e) => {
                    compute.ingress.record(error_info(meta, kind, ingress_ts));
                    debug!(%link, ctr = %meta.packet_counter, ts = %meta.global_timestamp, error = %e, "frame event rejected");
                    return Err(e);
                }
            }
        };

        let mut first_err = None;
        if let Some(payload) = outcome.rejected {
            if reorder_required {
                trace!(%link, ts = %meta.global_timestamp, "dropping unqueued frame");
                drop(payload);
            } else if let Err(e) = self.deliver_bypass(payload, meta) {
                first_err = Some(e);
            }
        }

        if let Err(e) = self.release_ready() {
            first_err.get_or_insert(e);
        }
        if outcome.alloc_failed {
            return Err(ReoError::AllocationFailure);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(outcome.queued),
        }
    }

    /// Host snapshot update, wait-count computation and list update, all
    /// under the computation lock.
    fn ingest(
        &self,
        compute: &mut ComputeState,
        meta: RxMeta,
        event: FrameEvent<P::Payload>,
        ingress_ts: u64,
    ) -> Result<UpdateOutcome<P::Payload>, ReoError> {
        let kind = event.kind.descriptor();
        if kind != DescriptorKind::Error && meta.duration_us == 0 {
            return Err(ReoError::MissingInput { what: "frame duration" });
        }

        let pkt_ctr_delta = self.advance_host_snapshot(compute, &meta)?;
        let wait_count = self.compute_wait_count(compute, meta.link, meta);

        let outcome = {
            let mut list = self.list.lock();
            list.update(
                IncomingFrame {
                    event,
                    meta,
                    wait_count,
                    pkt_ctr_delta,
                    ingress_ts,
                },
                self.clock.now_us(),
            )
        };

        if !outcome.wait_count.is_zero() && outcome.queued {
            trace!(
                link = %meta.link,
                ts = %meta.global_timestamp,
                waiting_on = ?waiting_links(&outcome.wait_count),
                "frame waiting"
            );
        }
        if outcome.alloc_failed {
            error!(link = %meta.link, ts = %meta.global_timestamp, "reorder list allocation failed, frame dropped");
        }
        compute.ingress.record(IngressFrameInfo {
            meta,
            kind,
            wait_count: outcome.wait_count,
            pkt_ctr_delta,
            is_stale: outcome.staleness.stale,
            is_parallel_rx: outcome.staleness.parallel,
            queued: outcome.queued,
            error: outcome.alloc_failed,
            list_size_rx: outcome.list_size_rx,
            insertion_pos: outcome.insertion_pos,
            ingress_ts,
        });
        if outcome.staleness.stale {
            debug!(
                link = %meta.link,
                ctr = %meta.packet_counter,
                ts = %meta.global_timestamp,
                ?kind,
                "stale frame"
            );
        }
        Ok(outcome)
    }

    /// Moves the host snapshot of the frame's link to the frame and returns
    /// how many frames of that link the host learned about.
    fn advance_host_snapshot(
        &self,
        compute: &mut ComputeState,
        meta: &RxMeta,
    ) -> Result<u32, ReoError> {
        let link = meta.link;
        let host = &mut compute.host_seen[link.index()];
        let incoming = Snapshot {
            valid: true,
            packet_counter: meta.packet_counter,
            global_timestamp: meta.global_timestamp,
        };

        if !host.valid {
            *host = incoming;
            return Ok(1);
        }
        if host.packet_counter.gte(meta.packet_counter) {
            warn!(
                %link,
                host_ctr = %host.packet_counter,
                incoming_ctr = %meta.packet_counter,
                "packet counter regression, resynchronising host snapshot"
            );
            let err = ReoError::CounterRegression {
                link,
                host: host.packet_counter,
                incoming: meta.packet_counter,
            };
            *host = incoming;
            return Err(err);
        }

        // Positive: gte failed above.
        let delta = u32::try_from(meta.packet_counter.sub(host.packet_counter)).unwrap_or(1);
        if delta > 1 {
            debug!(%link, delta, "host missed frames on link");
        }
        let threshold = u32::from(self.config.pkt_ctr_delta_warn_threshold);
        if threshold != 0 && delta > threshold {
            warn!(%link, delta, threshold, "large packet counter jump");
        }
        *host = incoming;
        Ok(delta)
    }

    /// Wait count of a frame on `own` stamped `meta.global_timestamp`.
    ///
    /// A link whose snapshots cannot be read or are inconsistent contributes
    /// nothing for this frame.
    fn compute_wait_count(
        &self,
        compute: &mut ComputeState,
        own: LinkId,
        meta: RxMeta,
    ) -> WaitCount {
        let mut wait_count = WaitCount::ZERO;
        for link in LinkId::all() {
            if link == own || self.platform.resolve_link(link).is_none() {
                continue;
            }
            let Some(shared) = self.platform.read_snapshots(link) else {
                debug!(%link, "snapshot source unavailable, ignoring link for this frame");
                compute.ingress.stats.snapshot_read_failures[link.index()] += 1;
                continue;
            };
            let host = compute.host_seen[link.index()];
            let snapshots = match compute.validator.sanitize(link, shared, host) {
                Ok(ss) => ss,
                Err(e) => {
                    debug!(%link, error = %e, "ignoring link for this frame");
                    compute.ingress.stats.snapshot_inconsistent[link.index()] += 1;
                    continue;
                }
            };
            wait_count.set(link, pending_frames(&snapshots, meta.global_timestamp));
        }
        trace!(link = %own, ts = %meta.global_timestamp, wait = %wait_count, "wait count");
        wait_count
    }

    /// Releases ready entries from the head of the list until one is not
    /// ready. Returns the number delivered successfully.
    ///
    /// # Errors
    /// The first delivery failure. Draining continues past failures.
    pub fn release_ready(&self) -> Result<usize, ReoError> {
        let mut release = self.release.lock();
        let mut delivered = 0;
        let mut first_err = None;
        loop {
            let popped = self.list.lock().pop_ready();
            let Some((entry, reason, advanced)) = popped else {
                break;
            };
            let now = self.clock.now_us();
            if advanced {
                release.quiescence_deadline_us =
                    Some(now.saturating_add(self.config.quiescence_timeout_us()));
            }
            trace!(
                link = %entry.meta.link,
                ctr = %entry.meta.packet_counter,
                ts = %entry.meta.global_timestamp,
                %reason,
                "releasing"
            );
            let frame = DeliveredFrame::released(entry, reason);
            match self.deliver(&mut release.egress, frame, now) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(delivered), Err)
    }

    fn deliver_bypass(&self, payload: P::Payload, meta: RxMeta) -> Result<(), ReoError> {
        let mut release = self.release.lock();
        let now = self.clock.now_us();
        self.deliver(&mut release.egress, DeliveredFrame::bypass(payload, meta), now)
    }

    fn deliver(
        &self,
        egress: &mut EgressLog,
        frame: DeliveredFrame<P::Payload>,
        now: u64,
    ) -> Result<(), ReoError> {
        let link = frame.meta.link;
        let info = EgressFrameInfo {
            meta: frame.meta,
            release_reason: frame.release_reason,
            initial_wait_count: frame.initial_wait_count,
            final_wait_count: frame.final_wait_count,
            is_parallel_rx: frame.is_parallel_rx,
            is_premature: frame.is_premature,
            delivered: false,
            egress_ts: now,
        };
        let result = match self.platform.resolve_link(link) {
            Some(handle) => self.platform.deliver(handle, frame),
            None => Err(DeliveryError::LinkGone(link)),
        };
        egress.record(EgressFrameInfo {
            delivered: result.is_ok(),
            ..info
        });
        result.map_err(|e| {
            warn!(%link, ts = %info.meta.global_timestamp, error = %e, "delivery failed");
            ReoError::from(e)
        })
    }

    /// One age-out sweep: marks entries past the entry timeout and releases
    /// if any newly aged out.
    ///
    /// # Errors
    /// The first delivery failure of the triggered drain.
    pub fn age_out_tick(&self) -> Result<usize, ReoError> {
        let now = self.clock.now_us();
        let aged = self.list.lock().age_out(now, self.config.entry_timeout_us());
        if aged {
            debug!(now_us = now, "entries aged out");
            self.release_ready()
        } else {
            Ok(0)
        }
    }

    /// Forgets the last-released watermark if nothing was released for the
    /// quiescence timeout. Returns true if it fired.
    pub fn check_quiescence(&self) -> bool {
        let now = self.clock.now_us();
        let mut release = self.release.lock();
        match release.quiescence_deadline_us {
            Some(deadline) if now >= deadline => {
                self.list.lock().invalidate_last_released();
                release.quiescence_deadline_us = None;
                info!("no release within quiescence timeout, last-released watermark reset");
                true
            }
            _ => false,
        }
    }

    /// Periodic work run by the timer thread.
    pub(crate) fn on_timer_tick(&self) {
        if let Err(e) = self.age_out_tick() {
            debug!(error = %e, "delivery failure during age-out release");
        }
        self.check_quiescence();
    }

    /// Drops every queued frame without delivering it. Returns how many were
    /// dropped.
    pub fn force_release_all(&self) -> usize {
        let mut release = self.release.lock();
        let flushed = self.list.lock().flush();
        release.egress.stats.flushed += flushed as u64;
        if flushed > 0 {
            info!(flushed, "reorder list flushed");
        }
        flushed
    }

    /// Stops the timers, rejects further events and flushes the list.
    /// Returns the number of frames dropped.
    pub fn shutdown(&self) -> usize {
        info!("reorder engine shutdown initiated");
        self.shut_down.store(true, Ordering::Release);
        let timers = self.timers.lock().take();
        if let Some(timers) = timers {
            timers.shutdown();
        }
        let flushed = self.force_release_all();
        info!(flushed, "reorder engine shutdown complete");
        flushed
    }

    /// All counters.
    #[must_use]
    pub fn stats(&self) -> ReoStats {
        let ingress = self.compute.lock().ingress.stats.clone();
        let egress = self.release.lock().egress.stats.clone();
        ReoStats { ingress, egress }
    }

    /// Recent ingress records, oldest first. Empty unless history is enabled.
    #[must_use]
    pub fn ingress_history(&self) -> Vec<IngressFrameInfo> {
        self.compute.lock().ingress.history.to_vec()
    }

    /// Recent egress records, oldest first. Empty unless history is enabled.
    #[must_use]
    pub fn egress_history(&self) -> Vec<EgressFrameInfo> {
        self.release.lock().egress.history.to_vec()
    }

    /// Entries currently waiting, head first.
    #[must_use]
    pub fn dump_list(&self) -> Vec<EntryInfo> {
        let now = self.clock.now_us();
        self.list.lock().entry_infos(now)
    }

    #[must_use]
    pub fn list_len(&self) -> usize {
        self.list.lock().len()
    }

    #[must_use]
    pub fn last_released(&self) -> LastReleased {
        self.list.lock().last_released()
    }

    /// The engine's view of the last frame the host saw on `link`.
    #[must_use]
    pub fn host_snapshot(&self, link: LinkId) -> Snapshot {
        self.compute.lock().host_seen[link.index()]
    }

    /// Last accepted firmware-published snapshots of `link`.
    #[must_use]
    pub fn last_good_snapshots(&self, link: LinkId) -> SharedSnapshots {
        self.compute.lock().validator.last_good(link)
    }
}

impl<P: Platform> Drop for ReoEngine<P> {
    fn drop(&mut self) {
        // Timer thread holds only a weak reference; dropping its handle
        // signals it to exit.
        self.shut_down.store(true, Ordering::Release);
    }
}

fn error_info(meta: RxMeta, kind: DescriptorKind, ingress_ts: u64) -> IngressFrameInfo {
    IngressFrameInfo {
        meta,
        kind,
        wait_count: WaitCount::ZERO,
        pkt_ctr_delta: 0,
        is_stale: false,
        is_parallel_rx: false,
        queued: false,
        error: true,
        list_size_rx: 0,
        insertion_pos: None,
        ingress_ts,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::reo::list::ReleaseReason;
    use crate::reo::snapshot::SnapshotKind;
    use crate::reo::wrap::GlobalTs;
    use crate::runtime::clock::ManualClock;
    use crate::sim::SimPlatform;

    type Engine = ReoEngine<SimPlatform<u32>>;

    fn link(n: u8) -> LinkId {
        LinkId::new(n).unwrap()
    }

    fn engine(num_links: usize, config: ReoConfig) -> (Engine, ManualClock) {
        let clock = ManualClock::new();
        let engine = ReoEngine::with_clock(config, SimPlatform::new(num_links), Arc::new(clock.clone()));
        (engine, clock)
    }

    /// Publishes hw and fw-forwarded progress for a frame, then hands it to
    /// the engine.
    fn feed(engine: &Engine, l: u8, ctr: u16, ts: u32) -> Result<bool, ReoError> {
        let snap = Snapshot::new(ctr, ts);
        engine.platform().set_snapshot(link(l), SnapshotKind::HwSeen, snap);
        engine.platform().set_snapshot(link(l), SnapshotKind::FwForwarded, snap);
        engine.on_frame_event(l, FrameEvent::host_consumed(ts, ctr, ts, 10))
    }

    fn delivered_ts(engine: &Engine) -> Vec<u32> {
        engine.platform().take_delivered().into_iter().map(|f| f.payload).collect()
    }

    #[test]
    fn unknown_links_are_rejected() {
        let (engine, _) = engine(2, ReoConfig::default());
        assert!(matches!(
            engine.on_frame_event(9, FrameEvent::host_consumed(1, 1, 100, 10)),
            Err(ReoError::InvalidLinkId { link_id: 9 })
        ));
        assert!(matches!(
            engine.on_frame_event(2, FrameEvent::host_consumed(1, 1, 100, 10)),
            Err(ReoError::InvalidLinkId { link_id: 2 })
        ));
        assert_eq!(engine.platform().delivered_len(), 0);
    }

    #[test]
    fn zero_duration_is_missing_input() {
        let (engine, _) = engine(2, ReoConfig::default());
        let err = engine.on_frame_event(0, FrameEvent::host_consumed(1, 1, 100, 0)).unwrap_err();
        assert!(matches!(err, ReoError::MissingInput { .. }));
        assert!(!engine.host_snapshot(link(0)).valid);
        assert_eq!(engine.stats().ingress.errors[0][DescriptorKind::HostConsumed.index()], 1);

        // Error events carry no duration.
        assert!(!engine.on_frame_event(0, FrameEvent::error(1, 100)).unwrap());
        assert!(engine.host_snapshot(link(0)).valid);
    }

    #[test]
    fn counter_regression_resyncs_host_snapshot() {
        let (engine, _) = engine(2, ReoConfig::default());
        assert!(feed(&engine, 0, 5, 100).unwrap());

        let err = engine.on_frame_event(0, FrameEvent::host_consumed(200, 5, 200, 10)).unwrap_err();
        assert!(matches!(err, ReoError::CounterRegression { .. }));
        assert_eq!(engine.host_snapshot(link(0)), Snapshot::new(5, 200));

        assert!(feed(&engine, 0, 6, 300).unwrap());
        assert_eq!(delivered_ts(&engine), vec![100, 300]);
    }

    #[test]
    fn frames_without_reorder_bypass_the_list() {
        let (engine, _) = engine(2, ReoConfig::default());
        // Link 1 holds everything back.
        engine.platform().set_snapshot(link(1), SnapshotKind::HwSeen, Snapshot::new(1, 50));
        assert!(feed(&engine, 0, 1, 200).unwrap());

        let queued = engine
            .on_frame_event(0, FrameEvent::host_consumed(300, 2, 300, 10).without_reorder())
            .unwrap();
        assert!(!queued);
        assert_eq!(engine.list_len(), 1);

        let delivered = engine.platform().take_delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].payload, 300);
        assert!(delivered[0].release_reason.is_empty());
        assert!(!delivered[0].reordered);
        assert_eq!(engine.stats().egress.bypassed[0], 1);
    }

    #[test]
    fn fw_consumed_events_unblock_waiting_frames() {
        let (engine, _) = engine(2, ReoConfig::default());
        engine.platform().set_snapshot(link(1), SnapshotKind::HwSeen, Snapshot::new(1, 150));
        assert!(feed(&engine, 0, 1, 200).unwrap());
        assert_eq!(engine.dump_list()[0].wait_count.per_link(link(1)), u32::MAX);

        let consumed = Snapshot::new(1, 150);
        engine.platform().set_snapshot(link(1), SnapshotKind::FwConsumed, consumed);
        assert!(!engine.on_frame_event(1, FrameEvent::fw_consumed(1, 150, 10)).unwrap());
        assert_eq!(engine.dump_list()[0].wait_count.per_link(link(1)), u32::MAX - 1);

        let consumed = Snapshot::new(2, 250);
        engine.platform().set_snapshot(link(1), SnapshotKind::HwSeen, consumed);
        engine.platform().set_snapshot(link(1), SnapshotKind::FwConsumed, consumed);
        assert!(!engine.on_frame_event(1, FrameEvent::fw_consumed(2, 250, 10)).unwrap());

        assert_eq!(engine.list_len(), 0);
        let delivered = engine.platform().take_delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].release_reason, ReleaseReason::ZERO_WAIT_COUNT);
        assert!(!delivered[0].is_premature);
        assert!(delivered[0].reordered);
    }

    #[test]
    fn delivery_failures_do_not_stop_the_drain() {
        let (engine, _) = engine(2, ReoConfig::default());
        engine.platform().reject_deliveries(true);
        let err = feed(&engine, 0, 1, 100).unwrap_err();
        assert!(matches!(err, ReoError::DeliveryFailure(DeliveryError::Rejected(_))));
        assert_eq!(engine.list_len(), 0);

        engine.platform().reject_deliveries(false);
        assert!(feed(&engine, 0, 2, 200).unwrap());
        assert_eq!(delivered_ts(&engine), vec![200]);

        let egress = engine.stats().egress;
        assert_eq!(egress.delivery_attempts[0], 2);
        assert_eq!(egress.delivery_success[0], 1);
    }

    #[test]
    fn force_release_drops_queued_frames() {
        let (engine, _) = engine(2, ReoConfig::default());
        engine.platform().set_snapshot(link(1), SnapshotKind::HwSeen, Snapshot::new(1, 50));
        assert!(feed(&engine, 0, 1, 200).unwrap());

        engine.platform().set_link_active(link(0), false);
        engine.platform().set_link_active(link(1), false);
        assert_eq!(engine.force_release_all(), 1);
        assert_eq!(engine.stats().egress.flushed, 1);
        assert!(matches!(
            engine.on_frame_event(0, FrameEvent::host_consumed(1, 2, 300, 10)),
            Err(ReoError::InvalidLinkId { link_id: 0 })
        ));
    }

    #[test]
    fn quiescence_forgets_last_released() {
        let config = ReoConfig::default().with_quiescence_timeout(Duration::from_secs(1));
        let (engine, clock) = engine(2, config);
        assert!(feed(&engine, 0, 1, 1000).unwrap());
        assert!(engine.last_released().valid);
        assert!(!engine.check_quiescence());

        clock.advance(Duration::from_secs(1));
        assert!(engine.check_quiescence());
        assert!(!engine.last_released().valid);
        // Fires once per quiet period.
        assert!(!engine.check_quiescence());

        // Older than the forgotten watermark, no longer stale.
        assert!(feed(&engine, 1, 1, 500).unwrap());
        assert_eq!(delivered_ts(&engine), vec![1000, 500]);
    }

    #[test]
    fn stale_frames_are_counted_not_delivered() {
        let (engine, _) = engine(2, ReoConfig::default());
        assert!(feed(&engine, 0, 1, 1000).unwrap());
        assert!(!feed(&engine, 1, 1, 500).unwrap());
        assert_eq!(delivered_ts(&engine), vec![1000]);
        assert_eq!(engine.stats().ingress.stale[1][DescriptorKind::HostConsumed.index()], 1);
    }

    #[test]
    fn shutdown_flushes_and_rejects_events() {
        let (engine, _) = engine(2, ReoConfig::default());
        engine.platform().set_snapshot(link(1), SnapshotKind::HwSeen, Snapshot::new(1, 50));
        assert!(feed(&engine, 0, 1, 200).unwrap());

        assert_eq!(engine.shutdown(), 1);
        assert!(engine.is_shut_down());
        assert!(matches!(feed(&engine, 0, 2, 300), Err(ReoError::ShutDown)));
        assert_eq!(engine.platform().delivered_len(), 0);
    }

    #[test]
    fn unreadable_link_is_skipped_not_fatal() {
        let (engine, _) = engine(3, ReoConfig::default());
        assert!(feed(&engine, 1, 1, 100).unwrap());
        assert_eq!(delivered_ts(&engine), vec![100]);

        // Link 1 saw two more frames in hardware, one older than 200.
        engine.platform().set_snapshot(link(1), SnapshotKind::HwSeen, Snapshot::new(3, 300));
        assert!(feed(&engine, 0, 1, 200).unwrap());
        let list = engine.dump_list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].wait_count.per_link(link(1)), 1);
        assert_eq!(engine.last_good_snapshots(link(1)).hw_seen, Snapshot::new(3, 300));

        engine.platform().break_snapshot_source(link(2));
        engine.platform().set_snapshot(link(1), SnapshotKind::FwForwarded, Snapshot::new(2, 150));
        assert!(engine.on_frame_event(1, FrameEvent::host_consumed(150, 2, 150, 10)).unwrap());

        assert_eq!(delivered_ts(&engine), vec![150, 200]);
        assert_eq!(engine.list_len(), 0);
        let stats = engine.stats();
        assert_eq!(stats.ingress.snapshot_read_failures[2], 1);
        assert_eq!(stats.ingress.total_errors(), 0);
    }

    #[test]
    fn history_records_both_directions() {
        let (engine, _) = engine(2, ReoConfig::debug());
        assert!(feed(&engine, 0, 1, 100).unwrap());
        assert!(feed(&engine, 0, 2, 200).unwrap());

        let ingress = engine.ingress_history();
        assert_eq!(ingress.len(), 2);
        assert_eq!(ingress[1].pkt_ctr_delta, 1);
        assert!(ingress.iter().all(|i| i.queued && i.wait_count.is_zero()));

        let egress = engine.egress_history();
        assert_eq!(egress.len(), 2);
        assert!(egress.iter().all(|e| e.delivered));
        assert_eq!(egress[0].meta.global_timestamp, GlobalTs(100));
    }
}
