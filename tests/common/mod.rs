//! Scriptable in-memory `GateApi` shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use gate_dashboard::domain::{
    Camera, CameraId, Lane, LaneId, LaneLookup, Status, Transaction, TransactionId,
};
use gate_dashboard::io::{
    ApiError, GateApi, GateEventRequest, ManualDataRequest, TransactionPage, TransactionQuery,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Latest(String),
    List(TransactionQuery),
    Detail(TransactionId),
    ManualData(TransactionId, ManualDataRequest),
    GateEvent(GateEventRequest),
    Portal(LaneId),
    Buzzer(LaneId),
    Capture(CameraId),
}

type LatestReply = Result<Option<Transaction>, ApiError>;

pub struct FakeApi {
    calls: Mutex<Vec<Call>>,
    /// Per-lane replies consumed in order, each after its delay
    latest_script: Mutex<HashMap<String, VecDeque<(Duration, LatestReply)>>>,
    /// Reply once a lane's script is exhausted
    latest: Mutex<HashMap<String, LatestReply>>,
    listing: Mutex<Result<Vec<Transaction>, ApiError>>,
    details: Mutex<HashMap<TransactionId, Transaction>>,
    submit: Mutex<Result<Value, ApiError>>,
    portal: Mutex<Result<(), ApiError>>,
    buzzer: Mutex<Result<(), ApiError>>,
    capture: Mutex<Result<Option<String>, ApiError>>,
    lanes: Vec<Lane>,
    cameras: Vec<Camera>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self::new(vec![], vec![])
    }
}

impl FakeApi {
    pub fn new(lanes: Vec<Lane>, cameras: Vec<Camera>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            latest_script: Mutex::new(HashMap::new()),
            latest: Mutex::new(HashMap::new()),
            listing: Mutex::new(Ok(Vec::new())),
            details: Mutex::new(HashMap::new()),
            submit: Mutex::new(Ok(json!({ "id": 1 }))),
            portal: Mutex::new(Ok(())),
            buzzer: Mutex::new(Ok(())),
            capture: Mutex::new(Ok(None)),
            lanes,
            cameras,
        }
    }

    pub fn set_latest(&self, lane: &str, reply: LatestReply) {
        self.latest.lock().insert(lane.to_string(), reply);
    }

    pub fn script_latest(&self, lane: &str, delay: Duration, reply: LatestReply) {
        self.latest_script.lock().entry(lane.to_string()).or_default().push_back((delay, reply));
    }

    pub fn set_listing(&self, listing: Result<Vec<Transaction>, ApiError>) {
        *self.listing.lock() = listing;
    }

    pub fn add_detail(&self, tx: Transaction) {
        self.details.lock().insert(tx.id, tx);
    }

    pub fn set_submit(&self, reply: Result<Value, ApiError>) {
        *self.submit.lock() = reply;
    }

    pub fn set_portal(&self, reply: Result<(), ApiError>) {
        *self.portal.lock() = reply;
    }

    pub fn set_buzzer(&self, reply: Result<(), ApiError>) {
        *self.buzzer.lock() = reply;
    }

    pub fn set_capture(&self, reply: Result<Option<String>, ApiError>) {
        *self.capture.lock() = reply;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn latest_calls(&self, lane: &str) -> usize {
        self.count(|c| matches!(c, Call::Latest(name) if name == lane))
    }

    pub fn portal_calls(&self) -> Vec<LaneId> {
        self.calls().into_iter().filter_map(|c| if let Call::Portal(l) = c { Some(l) } else { None }).collect()
    }

    pub fn buzzer_calls(&self) -> Vec<LaneId> {
        self.calls().into_iter().filter_map(|c| if let Call::Buzzer(l) = c { Some(l) } else { None }).collect()
    }

    pub fn submissions(&self) -> usize {
        self.count(|c| matches!(c, Call::ManualData(..) | Call::GateEvent(_)))
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl GateApi for FakeApi {
    async fn latest_transaction(&self, lane_name: &str) -> Result<Option<Transaction>, ApiError> {
        self.record(Call::Latest(lane_name.to_string()));
        let scripted = self.latest_script.lock().get_mut(lane_name).and_then(VecDeque::pop_front);
        match scripted {
            Some((delay, reply)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                reply
            }
            None => self.latest.lock().get(lane_name).cloned().unwrap_or(Ok(None)),
        }
    }

    async fn list_transactions(&self, query: &TransactionQuery) -> Result<TransactionPage, ApiError> {
        self.record(Call::List(query.clone()));
        let items = self.listing.lock().clone()?;
        let total_pages = u32::from(!items.is_empty());
        Ok(TransactionPage { items, total_pages })
    }

    async fn transaction_detail(&self, id: TransactionId) -> Result<Transaction, ApiError> {
        self.record(Call::Detail(id));
        self.details
            .lock()
            .get(&id)
            .cloned()
            .ok_or(ApiError::Status { status: 404, message: Some("Transaction not found".into()) })
    }

    async fn submit_manual_data(&self, id: TransactionId, request: &ManualDataRequest) -> Result<Value, ApiError> {
        self.record(Call::ManualData(id, request.clone()));
        self.submit.lock().clone()
    }

    async fn submit_gate_event(&self, request: &GateEventRequest) -> Result<Value, ApiError> {
        self.record(Call::GateEvent(request.clone()));
        self.submit.lock().clone()
    }

    async fn open_portal(&self, lane: LaneId) -> Result<(), ApiError> {
        self.record(Call::Portal(lane));
        self.portal.lock().clone()
    }

    async fn turn_on_red_buzzer(&self, lane: LaneId) -> Result<(), ApiError> {
        self.record(Call::Buzzer(lane));
        self.buzzer.lock().clone()
    }

    async fn capture(&self, camera: CameraId) -> Result<Option<String>, ApiError> {
        self.record(Call::Capture(camera));
        self.capture.lock().clone()
    }

    async fn cameras(&self) -> Result<Vec<Camera>, ApiError> {
        Ok(self.cameras.clone())
    }

    async fn camera(&self, id: CameraId) -> Result<Camera, ApiError> {
        self.cameras
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(ApiError::Status { status: 404, message: None })
    }

    async fn lanes(&self) -> Result<Vec<Lane>, ApiError> {
        Ok(self.lanes.clone())
    }

    async fn lane_lookup(&self) -> Result<Vec<LaneLookup>, ApiError> {
        Ok(self.lanes.iter().map(|l| LaneLookup { id: l.id, name: l.name.clone() }).collect())
    }
}

pub fn lane(id: i64, name: &str, type_name: &str) -> Lane {
    Lane {
        id: LaneId(id),
        name: Some(name.to_string()),
        type_name: Some(type_name.to_string()),
        ..Default::default()
    }
}

pub fn camera(id: i64, lane: i64) -> Camera {
    Camera { id: CameraId(id), lane_id: Some(LaneId(lane)), ..Default::default() }
}

/// Entry-side transaction with the given status
pub fn entry_tx(id: i64, lane: i64, status: Status) -> Transaction {
    Transaction {
        id: TransactionId(id),
        entry_lane_id: Some(LaneId(lane)),
        entry_status: Some(status),
        ..Default::default()
    }
}

pub fn transport_error() -> ApiError {
    ApiError::Transport("connection refused".into())
}

/// Let spawned tasks run to their next await point
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
