//! Gate dashboard: one poller per lane plus the master refresh switch

use crate::domain::types::cameras_for_lane;
use crate::domain::{Camera, Lane, LaneId};
use crate::infra::{Config, Metrics};
use crate::io::{ApiError, GateApi};
use crate::services::poller::{GatePoller, GateSnapshot, PollerContext};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Per-gate operator settings; client-side only, gone with the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRuntimeConfig {
    pub name: String,
    pub type_name: String,
    pub auto_refresh: bool,
    pub interval_secs: u64,
}

/// Settings applied to gates as they are created
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub default_interval_secs: u64,
    pub auto_refresh: bool,
    pub rows_per_page: u32,
    pub auto_capture: bool,
}

impl From<&Config> for CoordinatorOptions {
    fn from(config: &Config) -> Self {
        Self {
            default_interval_secs: config.default_interval_secs(),
            auto_refresh: config.auto_refresh(),
            rows_per_page: config.rows_per_page(),
            auto_capture: config.auto_capture(),
        }
    }
}

/// "GATE IN" lanes first, backend order otherwise
pub fn sort_lanes(lanes: &mut [Lane]) {
    lanes.sort_by_key(|lane| !lane.is_gate_in());
}

struct Gate {
    config: GateRuntimeConfig,
    poller: GatePoller,
}

pub struct GateDashboardCoordinator {
    gates: Vec<Gate>,
    cameras: Vec<Camera>,
    refresh_all: bool,
}

impl GateDashboardCoordinator {
    /// Load lanes and cameras, then create one idle poller per lane
    pub async fn load(
        api: Arc<dyn GateApi>,
        metrics: Arc<Metrics>,
        options: CoordinatorOptions,
    ) -> Result<Self, ApiError> {
        let lanes = api.lanes().await?;
        let cameras = api.cameras().await?;
        info!(lanes = %lanes.len(), cameras = %cameras.len(), "dashboard_loaded");
        Ok(Self::from_lanes(lanes, cameras, api, metrics, &options))
    }

    pub fn from_lanes(
        mut lanes: Vec<Lane>,
        cameras: Vec<Camera>,
        api: Arc<dyn GateApi>,
        metrics: Arc<Metrics>,
        options: &CoordinatorOptions,
    ) -> Self {
        sort_lanes(&mut lanes);
        let gates: Vec<Gate> = lanes
            .into_iter()
            .map(|lane| {
                let config = GateRuntimeConfig {
                    name: lane.display_name(),
                    type_name: lane.type_label(),
                    auto_refresh: options.auto_refresh,
                    interval_secs: options.default_interval_secs,
                };
                let ctx = PollerContext {
                    api: Arc::clone(&api),
                    metrics: Arc::clone(&metrics),
                    cameras: cameras_for_lane(&cameras, lane.id),
                    rows_per_page: options.rows_per_page,
                    auto_capture: options.auto_capture,
                };
                let poller = GatePoller::create(lane, config.interval_secs, config.auto_refresh, ctx);
                Gate { config, poller }
            })
            .collect();

        let mut coordinator = Self { gates, cameras, refresh_all: true };
        coordinator.sync_master();
        coordinator
    }

    /// Activate every gate
    pub fn start(&self) {
        for gate in &self.gates {
            gate.poller.start();
        }
    }

    pub fn refresh_all(&self) -> bool {
        self.refresh_all
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    pub fn configs(&self) -> Vec<GateRuntimeConfig> {
        self.gates.iter().map(|g| g.config.clone()).collect()
    }

    pub fn pollers(&self) -> impl Iterator<Item = &GatePoller> {
        self.gates.iter().map(|g| &g.poller)
    }

    pub fn poller(&self, name: &str) -> Option<&GatePoller> {
        self.gates.iter().find(|g| g.config.name == name).map(|g| &g.poller)
    }

    pub fn poller_for_lane(&self, lane: LaneId) -> Option<&GatePoller> {
        self.pollers().find(|p| p.lane().id == lane)
    }

    pub fn subscribe_all(&self) -> Vec<(String, watch::Receiver<GateSnapshot>)> {
        self.gates.iter().map(|g| (g.config.name.clone(), g.poller.subscribe())).collect()
    }

    /// Master switch reads "on" iff every gate is on
    fn sync_master(&mut self) {
        if !self.gates.is_empty() {
            self.refresh_all = self.gates.iter().all(|g| g.config.auto_refresh);
        }
    }

    /// Flip one gate; returns its new state, `None` for an unknown name
    pub fn toggle_gate(&mut self, name: &str) -> Option<bool> {
        let gate = self.gates.iter_mut().find(|g| g.config.name == name)?;
        gate.config.auto_refresh = !gate.config.auto_refresh;
        gate.poller.set_auto_refresh(gate.config.auto_refresh);
        let enabled = gate.config.auto_refresh;
        self.sync_master();
        info!(gate = %name, enabled = %enabled, "gate_toggled");
        Some(enabled)
    }

    /// Set every gate to the opposite of the current master state
    pub fn toggle_all(&mut self) -> bool {
        let enabled = !self.refresh_all;
        for gate in &mut self.gates {
            gate.config.auto_refresh = enabled;
            gate.poller.set_auto_refresh(enabled);
        }
        self.refresh_all = enabled;
        self.sync_master();
        info!(enabled = %enabled, "all_gates_toggled");
        enabled
    }

    /// Replace the runtime configuration (configure dialog).
    ///
    /// Entries are matched by gate name; gates without an entry keep theirs.
    pub fn apply_config(&mut self, configs: Vec<GateRuntimeConfig>) {
        for update in configs {
            let Some(gate) = self.gates.iter_mut().find(|g| g.config.name == update.name) else {
                continue;
            };
            let interval_secs = update.interval_secs.max(1);
            if interval_secs != gate.config.interval_secs {
                gate.poller.set_interval(interval_secs);
            }
            if update.auto_refresh != gate.config.auto_refresh {
                gate.poller.set_auto_refresh(update.auto_refresh);
            }
            gate.config = GateRuntimeConfig { interval_secs, ..update };
        }
        self.sync_master();
        info!(refresh_all = %self.refresh_all, "gate_config_applied");
    }

    /// Immediate out-of-band fetch for one gate
    pub async fn refresh_gate(&self, name: &str) -> bool {
        match self.poller(name) {
            Some(poller) => {
                poller.refresh_now().await;
                true
            }
            None => false,
        }
    }

    /// Background variant of `refresh_gate` for callers that cannot await
    pub fn request_refresh(&self, name: &str) -> bool {
        self.poller(name).is_some_and(|poller| poller.request_refresh())
    }

    /// Tear down every poller
    pub fn dispose(&mut self) {
        for gate in &self.gates {
            gate.poller.dispose();
        }
        info!(gates = %self.gates.len(), "dashboard_disposed");
    }
}
