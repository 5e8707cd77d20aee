//! Per-gate polling of the latest transaction
//!
//! Each `GatePoller` runs one timer task selecting over a fetch ticker that
//! issues one request per interval and a one-second countdown for display.
//! Issuing a fetch restarts the countdown from the full interval, so both stay
//! in phase. Fetches run as their own
//! tasks, so a slow backend never delays the next tick and never blocks
//! another gate. The interval gates issue, not completion.
//!
//! Every start/stop bumps an epoch. A response is applied only if its epoch
//! is still current, so results arriving after a disable or dispose are
//! dropped. Within one epoch responses are applied in arrival order: a late
//! response for an earlier tick overwrites a newer one (last write wins).

use crate::domain::{Camera, Lane, Side, Transaction};
use crate::infra::Metrics;
use crate::io::{ApiError, GateApi};
use crate::services::backfill::backfill_from_api;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Log a failed poll (cold path)
#[cold]
fn log_fetch_failed(lane: &str, e: &ApiError) {
    warn!(lane = %lane, error = %e, "gate_fetch_failed");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Created, never started
    Idle,
    Polling,
    /// Started with auto-refresh off, or switched off
    Suspended,
    /// Terminal
    Disposed,
}

impl PollerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Suspended => "suspended",
            Self::Disposed => "disposed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// First fetch after (re)enabling
    Initial,
    /// Timer tick
    Refresh,
    /// Out-of-band `refresh_now`
    Manual,
}

impl FetchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Refresh => "refresh",
            Self::Manual => "manual",
        }
    }
}

/// What a gate card shows
#[derive(Debug, Clone, PartialEq)]
pub struct GateSnapshot {
    pub lane_name: String,
    /// Leg the card watches
    pub side: Side,
    pub state: PollerState,
    pub auto_refresh: bool,
    pub interval_secs: u64,
    /// Seconds until the next tick; 0 while not polling
    pub countdown_secs: u64,
    pub transaction: Option<Transaction>,
    /// At least one fetch has been applied
    pub loaded: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub needs_attention: bool,
}

/// Collaborators shared by a poller's tasks
pub struct PollerContext {
    pub api: Arc<dyn GateApi>,
    pub metrics: Arc<Metrics>,
    /// Cameras mounted on this lane (auto-capture targets)
    pub cameras: Vec<Camera>,
    pub rows_per_page: u32,
    pub auto_capture: bool,
}

struct Control {
    state: PollerState,
    auto_refresh: bool,
    interval_secs: u64,
    epoch: u64,
    /// Fetch ticker and countdown, one task
    timer: Option<JoinHandle<()>>,
}

struct Shared {
    lane: Lane,
    lane_name: String,
    ctx: PollerContext,
    control: Mutex<Control>,
    snapshot: watch::Sender<GateSnapshot>,
}

impl Shared {
    fn publish_control(&self, control: &Control) {
        self.snapshot.send_modify(|s| {
            s.state = control.state;
            s.auto_refresh = control.auto_refresh;
            s.interval_secs = control.interval_secs;
            if control.state != PollerState::Polling {
                s.countdown_secs = 0;
            }
        });
    }

    fn begin_polling(self: &Arc<Self>, control: &mut Control) {
        if let Some(timer) = control.timer.take() {
            timer.abort();
        }
        control.epoch += 1;
        control.state = PollerState::Polling;
        let epoch = control.epoch;
        let period = Duration::from_secs(control.interval_secs);

        let shared = Arc::clone(self);
        let timer = tokio::spawn(async move {
            let second = Duration::from_secs(1);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut countdown = tokio::time::interval_at(tokio::time::Instant::now() + second, second);
            let mut kind = FetchKind::Initial;
            loop {
                tokio::select! {
                    // A fetch tick wins over a countdown tick due at the same instant
                    biased;
                    _ = ticker.tick() => {
                        if !shared.issue(epoch, kind) {
                            return;
                        }
                        kind = FetchKind::Refresh;
                        countdown.reset();
                    }
                    _ = countdown.tick() => {
                        shared.snapshot.send_modify(|s| s.countdown_secs = s.countdown_secs.saturating_sub(1));
                    }
                }
            }
        });

        control.timer = Some(timer);
        self.publish_control(control);
        info!(lane = %self.lane_name, interval_secs = %control.interval_secs, "gate_polling_started");
    }

    fn halt(&self, control: &mut Control, next: PollerState) {
        if let Some(timer) = control.timer.take() {
            timer.abort();
        }
        control.epoch += 1;
        let was = control.state;
        control.state = next;
        self.publish_control(control);
        if was == PollerState::Polling {
            info!(lane = %self.lane_name, state = %next.as_str(), "gate_polling_stopped");
        }
    }

    /// Called on each tick; false once the epoch is stale
    fn issue(self: &Arc<Self>, epoch: u64, kind: FetchKind) -> bool {
        {
            let control = self.control.lock();
            if control.epoch != epoch || control.state != PollerState::Polling {
                return false;
            }
            let interval = control.interval_secs;
            self.snapshot.send_modify(|s| s.countdown_secs = interval);
        }
        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.fetch(epoch, kind).await });
        true
    }

    async fn fetch(self: Arc<Self>, epoch: u64, kind: FetchKind) {
        let metrics = &self.ctx.metrics;
        metrics.record_poll_issued();
        debug!(lane = %self.lane_name, kind = %kind.as_str(), "gate_fetch_issued");

        let started = Instant::now();
        let latest = match self.ctx.api.latest_transaction(&self.lane_name).await {
            Ok(latest) => {
                metrics.record_poll_ok(started.elapsed().as_millis() as u64);
                latest
            }
            Err(e) => {
                // Keep showing the previous transaction
                metrics.record_poll_failed();
                log_fetch_failed(&self.lane_name, &e);
                return;
            }
        };

        let latest = match latest {
            Some(tx) => {
                Some(backfill_from_api(self.ctx.api.as_ref(), tx, self.ctx.rows_per_page, metrics).await)
            }
            None => None,
        };
        self.apply(epoch, latest);
    }

    fn apply(self: &Arc<Self>, epoch: u64, latest: Option<Transaction>) {
        let capture = {
            let control = self.control.lock();
            if control.epoch != epoch || control.state == PollerState::Disposed {
                self.ctx.metrics.record_stale_discarded();
                debug!(lane = %self.lane_name, "gate_fetch_discarded");
                return;
            }

            let previous = self.snapshot.borrow().transaction.as_ref().map(|t| t.id);
            let current = latest.as_ref().map(|t| t.id);
            if previous != current {
                debug!(lane = %self.lane_name, transaction = ?current.map(|id| id.0), "gate_transaction_changed");
            }
            let capture = self.ctx.auto_capture
                && latest.as_ref().is_some_and(|t| t.pictures.is_empty() && previous != Some(t.id));

            let side = self.lane.side();
            self.snapshot.send_modify(|s| {
                s.needs_attention = latest.as_ref().is_some_and(|t| t.needs_attention(side));
                s.transaction = latest;
                s.loaded = true;
                s.updated_at = Some(Utc::now());
            });
            capture
        };

        if capture {
            self.auto_capture();
        }
    }

    /// Ask every lane camera for a still; failures never reach the operator
    fn auto_capture(&self) {
        for camera in &self.ctx.cameras {
            let api = Arc::clone(&self.ctx.api);
            let metrics = Arc::clone(&self.ctx.metrics);
            let camera_id = camera.id;
            let lane = self.lane_name.clone();
            tokio::spawn(async move {
                match api.capture(camera_id).await {
                    Ok(_) => metrics.record_capture(true),
                    Err(e) => {
                        metrics.record_capture(false);
                        warn!(lane = %lane, camera = %camera_id, error = %e, "auto_capture_failed");
                    }
                }
            });
        }
    }
}

/// Independent polling loop for one gate
pub struct GatePoller {
    shared: Arc<Shared>,
}

impl GatePoller {
    /// Create an idle poller; nothing runs until `start`
    pub fn create(lane: Lane, interval_secs: u64, auto_refresh: bool, ctx: PollerContext) -> Self {
        let lane_name = lane.display_name();
        let interval_secs = interval_secs.max(1);
        let (snapshot, _) = watch::channel(GateSnapshot {
            lane_name: lane_name.clone(),
            side: lane.side(),
            state: PollerState::Idle,
            auto_refresh,
            interval_secs,
            countdown_secs: 0,
            transaction: None,
            loaded: false,
            updated_at: None,
            needs_attention: false,
        });
        let control = Control {
            state: PollerState::Idle,
            auto_refresh,
            interval_secs,
            epoch: 0,
            timer: None,
        };
        Self {
            shared: Arc::new(Shared { lane, lane_name, ctx, control: Mutex::new(control), snapshot }),
        }
    }

    pub fn lane(&self) -> &Lane {
        &self.shared.lane
    }

    pub fn lane_name(&self) -> &str {
        &self.shared.lane_name
    }

    pub fn side(&self) -> Side {
        self.shared.lane.side()
    }

    pub fn state(&self) -> PollerState {
        self.shared.control.lock().state
    }

    pub fn auto_refresh(&self) -> bool {
        self.shared.control.lock().auto_refresh
    }

    pub fn interval_secs(&self) -> u64 {
        self.shared.control.lock().interval_secs
    }

    pub fn subscribe(&self) -> watch::Receiver<GateSnapshot> {
        self.shared.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> GateSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Activate: poll when auto-refresh is on, otherwise load once if empty
    pub fn start(&self) {
        let mut control = self.shared.control.lock();
        let state = control.state;
        match state {
            PollerState::Disposed | PollerState::Polling => {}
            _ if control.auto_refresh => self.shared.begin_polling(&mut control),
            _ => {
                control.state = PollerState::Suspended;
                self.shared.publish_control(&control);
                if !self.shared.snapshot.borrow().loaded {
                    let epoch = control.epoch;
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move { shared.fetch(epoch, FetchKind::Initial).await });
                }
            }
        }
    }

    /// Suspend polling; in-flight responses are discarded
    pub fn stop(&self) {
        self.set_auto_refresh(false);
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        let mut control = self.shared.control.lock();
        if control.state == PollerState::Disposed {
            return;
        }
        control.auto_refresh = enabled;
        let state = control.state;
        match (enabled, state) {
            (true, PollerState::Suspended) => self.shared.begin_polling(&mut control),
            (false, PollerState::Polling) => self.shared.halt(&mut control, PollerState::Suspended),
            _ => self.shared.publish_control(&control),
        }
    }

    /// Flip auto-refresh; returns the new value
    pub fn toggle(&self) -> bool {
        let enabled = !self.auto_refresh();
        self.set_auto_refresh(enabled);
        enabled
    }

    /// Change the interval; a polling gate restarts with an immediate fetch
    pub fn set_interval(&self, interval_secs: u64) {
        let interval_secs = interval_secs.max(1);
        let mut control = self.shared.control.lock();
        if control.state == PollerState::Disposed || control.interval_secs == interval_secs {
            return;
        }
        control.interval_secs = interval_secs;
        if control.state == PollerState::Polling {
            self.shared.begin_polling(&mut control);
        } else {
            self.shared.publish_control(&control);
        }
    }

    /// One fetch now, regardless of auto-refresh
    pub async fn refresh_now(&self) {
        let epoch = {
            let control = self.shared.control.lock();
            if control.state == PollerState::Disposed {
                return;
            }
            control.epoch
        };
        Arc::clone(&self.shared).fetch(epoch, FetchKind::Manual).await;
    }

    /// Like `refresh_now`, but in the background; false once disposed
    pub fn request_refresh(&self) -> bool {
        let epoch = {
            let control = self.shared.control.lock();
            if control.state == PollerState::Disposed {
                return false;
            }
            control.epoch
        };
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.fetch(epoch, FetchKind::Manual).await });
        true
    }

    /// Cancel both timers for good; late responses are discarded
    pub fn dispose(&self) {
        let mut control = self.shared.control.lock();
        if control.state != PollerState::Disposed {
            self.shared.halt(&mut control, PollerState::Disposed);
        }
    }
}

impl Drop for GatePoller {
    fn drop(&mut self) {
        self.dispose();
    }
}
