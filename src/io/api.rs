//! Backend REST surface consumed by the dashboard
//!
//! Every response is wrapped in `{ success, data, error?, message?, totalPages? }`.
//! `decode_envelope` is the single place that turns a status code and body
//! into data or an `ApiError`; both the HTTP client and the tests go through it.

use crate::domain::{Camera, CameraId, Lane, LaneId, LaneLookup, Transaction, TransactionId};
use crate::io::error::ApiError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /Transaction/{id}/manualdata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualDataRequest {
    #[serde(rename = "dispatchId")]
    pub dispatch_id: String,
    #[serde(rename = "plateNumber")]
    pub plate_number: String,
    #[serde(rename = "tagid")]
    pub tag_id: String,
    #[serde(rename = "newStatus")]
    pub new_status: String,
    pub reason: String,
}

/// Body of `POST /Transaction/gateevent`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEventRequest {
    #[serde(rename = "dispatchid")]
    pub dispatch_id: String,
    #[serde(rename = "tagid")]
    pub tag_id: String,
    /// Lane name the event is registered on
    pub name: String,
    #[serde(rename = "isManual")]
    pub is_manual: bool,
    #[serde(rename = "plateNumber")]
    pub plate_number: String,
    pub reason: String,
}

/// Body of `POST /Lane/OpenPortal` and `POST /Lane/TurnOnRedBuzzer`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaneActuation {
    #[serde(rename = "laneid")]
    pub lane_id: LaneId,
}

/// Body of `POST /Camera/Capture`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    #[serde(rename = "cameraid")]
    pub camera_id: CameraId,
}

/// Query parameters for `GET /Transaction`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionQuery {
    pub page: Option<u32>,
    pub rows_per_page: Option<u32>,
    /// `yyyy-mm-dd`
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub plate_number: Option<String>,
    pub lane_id: Option<LaneId>,
}

impl TransactionQuery {
    /// One page of `rows` records, no filters
    pub fn bulk(rows: u32) -> Self {
        Self { rows_per_page: Some(rows), ..Default::default() }
    }

    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(rows) = self.rows_per_page {
            pairs.push(("rowsPerPage", rows.to_string()));
        }
        if let Some(from) = &self.date_from {
            pairs.push(("dateFrom", from.clone()));
        }
        if let Some(to) = &self.date_to {
            pairs.push(("dateTo", to.clone()));
        }
        if let Some(plate) = self.plate_number.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            pairs.push(("plateNumber", plate.to_string()));
        }
        if let Some(lane) = self.lane_id {
            pairs.push(("laneId", lane.to_string()));
        }
        pairs
    }
}

/// One page of the transaction listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPage {
    pub items: Vec<Transaction>,
    pub total_pages: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    total_pages: Option<u32>,
}

/// A successfully decoded envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub data: T,
    pub total_pages: Option<u32>,
}

/// `error` wins over `message`; non-string values and empty strings are ignored
fn failure_text(error: Option<&Value>, message: Option<&Value>) -> Option<String> {
    [error, message]
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Decode a response body according to the envelope convention
pub fn decode_envelope<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<Envelope<T>, ApiError> {
    if !(200..300).contains(&status) {
        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        let message = parsed.as_ref().and_then(|v| failure_text(v.get("error"), v.get("message")));
        return Err(ApiError::Status { status, message });
    }

    let raw: RawEnvelope = serde_json::from_slice(body)?;
    if !raw.success {
        return Err(ApiError::Rejected {
            status,
            message: failure_text(raw.error.as_ref(), raw.message.as_ref()),
        });
    }

    let data = serde_json::from_value(raw.data)?;
    Ok(Envelope { data, total_pages: raw.total_pages })
}

impl From<Envelope<Option<Vec<Transaction>>>> for TransactionPage {
    fn from(envelope: Envelope<Option<Vec<Transaction>>>) -> Self {
        let items = envelope.data.unwrap_or_default();
        let total_pages = envelope.total_pages.unwrap_or(if items.is_empty() { 0 } else { 1 });
        Self { items, total_pages }
    }
}

/// Backend operations the dashboard depends on
#[async_trait]
pub trait GateApi: Send + Sync {
    /// `GET /Transaction/gate/{laneName}/last`
    async fn latest_transaction(&self, lane_name: &str) -> Result<Option<Transaction>, ApiError>;

    /// `GET /Transaction` with query parameters
    async fn list_transactions(&self, query: &TransactionQuery) -> Result<TransactionPage, ApiError>;

    /// `GET /Transaction/{id}`
    async fn transaction_detail(&self, id: TransactionId) -> Result<Transaction, ApiError>;

    /// `POST /Transaction/{id}/manualdata`; returns the server's `data` untouched
    async fn submit_manual_data(
        &self,
        id: TransactionId,
        request: &ManualDataRequest,
    ) -> Result<Value, ApiError>;

    /// `POST /Transaction/gateevent`
    async fn submit_gate_event(&self, request: &GateEventRequest) -> Result<Value, ApiError>;

    /// `POST /Lane/OpenPortal`
    async fn open_portal(&self, lane: LaneId) -> Result<(), ApiError>;

    /// `POST /Lane/TurnOnRedBuzzer`
    async fn turn_on_red_buzzer(&self, lane: LaneId) -> Result<(), ApiError>;

    /// `POST /Camera/Capture`; the still as base64 when the backend returns one
    async fn capture(&self, camera: CameraId) -> Result<Option<String>, ApiError>;

    /// `GET /Camera/GetCameraList`
    async fn cameras(&self) -> Result<Vec<Camera>, ApiError>;

    /// `GET /Camera/{id}`
    async fn camera(&self, id: CameraId) -> Result<Camera, ApiError>;

    /// `GET /Lane`
    async fn lanes(&self) -> Result<Vec<Lane>, ApiError>;

    /// `GET /Lane/lookup`
    async fn lane_lookup(&self) -> Result<Vec<LaneLookup>, ApiError>;
}
