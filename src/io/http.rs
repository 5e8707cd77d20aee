//! reqwest implementation of `GateApi`

use crate::domain::{Camera, CameraId, Lane, LaneId, LaneLookup, Transaction, TransactionId};
use crate::infra::{Config, SessionContext};
use crate::io::api::{
    decode_envelope, CaptureRequest, Envelope, GateApi, GateEventRequest, LaneActuation,
    ManualDataRequest, TransactionPage, TransactionQuery,
};
use crate::io::error::ApiError;
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Log a failed request (cold path)
#[cold]
fn log_request_failed(method: &str, path: &str, e: &ApiError) {
    debug!(method = %method, path = %path, error = %e, "api_request_failed");
}

pub struct HttpGateApi {
    base_url: String,
    http: reqwest::Client,
    session: Arc<SessionContext>,
}

impl HttpGateApi {
    pub fn new(base_url: &str, timeout: Duration, session: Arc<SessionContext>) -> Result<Self, ApiError> {
        // Create HTTP client once for reuse (connection pooling)
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), http, session })
    }

    pub fn from_config(config: &Config, session: Arc<SessionContext>) -> Result<Self, ApiError> {
        Self::new(config.api_base_url(), Duration::from_millis(config.api_timeout_ms()), session)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &'static str,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Envelope<T>, ApiError> {
        let result = async {
            let response = self.authorize(request).send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?;
            decode_envelope(status, &body)
        }
        .await;

        if let Err(e) = &result {
            log_request_failed(method, path, e);
        }
        result
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ApiError> {
        self.send("GET", path, self.http.get(self.url(path))).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, ApiError> {
        self.send("POST", path, self.http.post(self.url(path)).json(body)).await
    }
}

#[async_trait]
impl GateApi for HttpGateApi {
    async fn latest_transaction(&self, lane_name: &str) -> Result<Option<Transaction>, ApiError> {
        let url = segment_url(&self.base_url, &["Transaction", "gate", lane_name, "last"])?;
        let path = url.path().to_string();
        Ok(self.send::<Option<Transaction>>("GET", &path, self.http.get(url)).await?.data)
    }

    async fn list_transactions(&self, query: &TransactionQuery) -> Result<TransactionPage, ApiError> {
        let path = "/Transaction";
        let request = self.http.get(self.url(path)).query(&query.to_pairs());
        let envelope = self.send::<Option<Vec<Transaction>>>("GET", path, request).await?;
        Ok(TransactionPage::from(envelope))
    }

    async fn transaction_detail(&self, id: TransactionId) -> Result<Transaction, ApiError> {
        let path = format!("/Transaction/{id}");
        self.get::<Option<Transaction>>(&path)
            .await?
            .data
            .ok_or_else(|| ApiError::Decode(format!("transaction {id} has no data")))
    }

    async fn submit_manual_data(
        &self,
        id: TransactionId,
        request: &ManualDataRequest,
    ) -> Result<Value, ApiError> {
        Ok(self.post::<Value, _>(&format!("/Transaction/{id}/manualdata"), request).await?.data)
    }

    async fn submit_gate_event(&self, request: &GateEventRequest) -> Result<Value, ApiError> {
        Ok(self.post::<Value, _>("/Transaction/gateevent", request).await?.data)
    }

    async fn open_portal(&self, lane: LaneId) -> Result<(), ApiError> {
        self.post::<Value, _>("/Lane/OpenPortal", &LaneActuation { lane_id: lane }).await?;
        Ok(())
    }

    async fn turn_on_red_buzzer(&self, lane: LaneId) -> Result<(), ApiError> {
        self.post::<Value, _>("/Lane/TurnOnRedBuzzer", &LaneActuation { lane_id: lane }).await?;
        Ok(())
    }

    async fn capture(&self, camera: CameraId) -> Result<Option<String>, ApiError> {
        let envelope = self.post::<Value, _>("/Camera/Capture", &CaptureRequest { camera_id: camera }).await?;
        Ok(envelope.data.as_str().filter(|s| !s.is_empty()).map(str::to_string))
    }

    async fn cameras(&self) -> Result<Vec<Camera>, ApiError> {
        Ok(self.get::<Option<Vec<Camera>>>("/Camera/GetCameraList").await?.data.unwrap_or_default())
    }

    async fn camera(&self, id: CameraId) -> Result<Camera, ApiError> {
        self.get::<Option<Camera>>(&format!("/Camera/{id}"))
            .await?
            .data
            .ok_or_else(|| ApiError::Decode(format!("camera {id} has no data")))
    }

    async fn lanes(&self) -> Result<Vec<Lane>, ApiError> {
        Ok(self.get::<Option<Vec<Lane>>>("/Lane").await?.data.unwrap_or_default())
    }

    async fn lane_lookup(&self) -> Result<Vec<LaneLookup>, ApiError> {
        Ok(self.get::<Option<Vec<LaneLookup>>>("/Lane/lookup").await?.data.unwrap_or_default())
    }
}

/// `base` with each of `segments` appended as one percent-encoded path segment
pub fn segment_url(base: &str, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = Url::parse(base).map_err(|e| ApiError::Transport(format!("invalid base url {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| ApiError::Transport(format!("base url {base} cannot take a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
