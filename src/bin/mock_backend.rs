//! Mock gate backend
//!
//! In-memory stand-in for the facility REST backend, for running the
//! dashboard without a site connection.
//!
//! Behavior:
//! 1. Serves the lane, camera and transaction endpoints the dashboard uses,
//!    every response wrapped in the `{ success, data, message }` envelope
//! 2. Seeds two lanes with one finished entry and one incomplete exit capture
//!    (RFID tag only, so the dashboard has something to backfill)
//! 3. Optionally registers a new entry capture every `--arrival-secs`
//! 4. Logs portal and buzzer actuations instead of driving hardware
//!
//! Usage:
//!   cargo run --bin mock-backend -- --port 5000 --arrival-secs 30

use bytes::Bytes;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use clap::Parser;
use gate_dashboard::domain::{Camera, CameraId, Lane, LaneId, LaneLookup, Picture, Status, Transaction, TransactionId};
use gate_dashboard::io::api::{CaptureRequest, LaneActuation};
use gate_dashboard::io::http::segment_url;
use gate_dashboard::io::{GateEventRequest, ManualDataRequest};
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

const ENTRY_LANE: LaneId = LaneId(1);
const EXIT_LANE: LaneId = LaneId(2);

#[derive(Parser, Debug)]
#[command(name = "mock-backend")]
#[command(about = "Mock gate backend for local dashboard runs")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Require this bearer token on every request
    #[arg(long)]
    token: Option<String>,

    /// Register a new entry capture this often (0 = never)
    #[arg(long, default_value = "0")]
    arrival_secs: u64,
}

/// Backend state
struct Store {
    lanes: Vec<Lane>,
    cameras: Vec<Camera>,
    /// Ascending id
    transactions: Vec<Transaction>,
    next_id: i64,
    next_picture: i64,
}

impl Store {
    fn seeded() -> Self {
        let lane = |id: LaneId, name: &str, type_name: &str, ip: &str| Lane {
            id,
            name: Some(name.to_string()),
            type_name: Some(type_name.to_string()),
            ip_address: Some(ip.to_string()),
            hardware: HashMap::new(),
        };
        let camera = |id: i64, lane: LaneId, ip: &str| Camera {
            id: CameraId(id),
            lane_id: Some(lane),
            ip_address: Some(ip.to_string()),
            model: Some("MOCK-CAM".to_string()),
            parameter: Some("rtsp://{0}:554/stream1;viewer;viewer".to_string()),
        };

        let now = Utc::now();
        let entered = now - ChronoDuration::minutes(40);
        let finished = Transaction {
            id: TransactionId(1),
            tag_id: Some("TAG-0001".into()),
            dispatch_id: Some("DSP-1001".into()),
            plate_number: Some("B 1234 XY".into()),
            date_time: Some(entered),
            entry_lane_id: Some(ENTRY_LANE),
            start_entry_time: Some(entered),
            finish_entry_time: Some(entered + ChronoDuration::seconds(20)),
            entry_status: Some(Status::Success),
            ..Default::default()
        };
        // Exit read only the tag; dispatch and plate come from the entry record
        let exit_capture = Transaction {
            id: TransactionId(2),
            tag_id: Some("TAG-0001".into()),
            date_time: Some(now - ChronoDuration::minutes(2)),
            exit_lane_id: Some(EXIT_LANE),
            start_exit_time: Some(now - ChronoDuration::minutes(2)),
            entry_status: Some(Status::Success),
            exit_status: Some(Status::CapturedAwaitingManualData),
            ..Default::default()
        };

        Self {
            lanes: vec![
                lane(EXIT_LANE, "GATE OUT 1", "GATE OUT", "10.0.0.12"),
                lane(ENTRY_LANE, "GATE IN 1", "GATE IN", "10.0.0.11"),
            ],
            cameras: vec![camera(1, ENTRY_LANE, "10.0.1.11"), camera(2, EXIT_LANE, "10.0.1.12")],
            transactions: vec![finished, exit_capture],
            next_id: 3,
            next_picture: 1,
        }
    }

    fn lane(&self, id: LaneId) -> Option<&Lane> {
        self.lanes.iter().find(|l| l.id == id)
    }

    /// Lane whose encoded name makes up a latest-transaction request path
    fn lane_by_path(&self, path: &str) -> Option<&Lane> {
        self.lanes.iter().find(|l| {
            let name = l.name.as_deref().unwrap_or_default();
            segment_url("http://mock", &["Transaction", "gate", name, "last"]).is_ok_and(|url| url.path() == path)
        })
    }

    fn lane_by_name(&self, name: &str) -> Option<&Lane> {
        self.lanes.iter().find(|l| l.name.as_deref() == Some(name))
    }

    fn next_transaction_id(&mut self) -> TransactionId {
        let id = TransactionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Most recent transaction seen on the lane's own leg
    fn latest_on(&self, lane: &Lane) -> Option<&Transaction> {
        let exit = lane.is_exit();
        self.transactions
            .iter()
            .rev()
            .find(|t| if exit { t.exit_lane_id == Some(lane.id) } else { t.entry_lane_id == Some(lane.id) })
    }

    fn transaction_mut(&mut self, id: TransactionId) -> Option<&mut Transaction> {
        self.transactions.iter_mut().find(|t| t.id == id)
    }

    /// New vehicle at the entry gate, read by RFID only
    fn arrive(&mut self) -> TransactionId {
        let id = self.next_transaction_id();
        let now = Utc::now();
        self.transactions.push(Transaction {
            id,
            tag_id: Some(format!("TAG-{:04}", id.0)),
            date_time: Some(now),
            entry_lane_id: Some(ENTRY_LANE),
            start_entry_time: Some(now),
            entry_status: Some(Status::CapturedAwaitingManualData),
            ..Default::default()
        });
        id
    }

    fn apply_manual_data(&mut self, id: TransactionId, request: ManualDataRequest) -> Option<Transaction> {
        let tx = self.transaction_mut(id)?;
        let status: Status = request.new_status.parse().unwrap_or_else(|never| match never {});
        let set = |value: String| Some(value).filter(|v| !v.trim().is_empty());
        tx.dispatch_id = set(request.dispatch_id).or(tx.dispatch_id.take());
        tx.plate_number = set(request.plate_number).or(tx.plate_number.take());
        tx.tag_id = set(request.tag_id).or(tx.tag_id.take());
        tx.reason = set(request.reason);
        let now = Utc::now();
        if status == Status::ExitCompletedAwaitingManualData {
            tx.exit_status = Some(status);
            tx.finish_exit_time = Some(now);
        } else {
            tx.entry_status = Some(status);
            tx.finish_entry_time = Some(now);
        }
        Some(tx.clone())
    }

    fn apply_gate_event(&mut self, request: GateEventRequest) -> Result<Transaction, (StatusCode, String)> {
        let lane = self
            .lane_by_name(&request.name)
            .cloned()
            .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Lane '{}' not found", request.name)))?;
        let now = Utc::now();
        let set = |value: &str| Some(value.to_string()).filter(|v| !v.trim().is_empty());

        if lane.is_exit() {
            // Manual exit closes the open exit with the same dispatch, else the same tag
            let dispatch = set(&request.dispatch_id);
            let tag = set(&request.tag_id);
            let tx = self
                .transactions
                .iter_mut()
                .rev()
                .filter(|t| !t.is_exit_complete())
                .find(|t| {
                    (dispatch.is_some() && t.dispatch_id == dispatch) || (tag.is_some() && t.tag_id == tag)
                })
                .ok_or_else(|| (StatusCode::BAD_REQUEST, "No open transaction for this dispatch".to_string()))?;
            tx.exit_lane_id = Some(lane.id);
            tx.start_exit_time = tx.start_exit_time.or(Some(now));
            tx.finish_exit_time = Some(now);
            tx.exit_status = Some(Status::ManuallyVerified);
            tx.reason = set(&request.reason);
            return Ok(tx.clone());
        }

        if set(&request.dispatch_id).is_none() || set(&request.plate_number).is_none() {
            return Err((StatusCode::BAD_REQUEST, "Dispatch ID and plate number are required".to_string()));
        }
        let id = self.next_transaction_id();
        let tx = Transaction {
            id,
            tag_id: set(&request.tag_id),
            dispatch_id: set(&request.dispatch_id),
            plate_number: set(&request.plate_number),
            date_time: Some(now),
            entry_lane_id: Some(lane.id),
            start_entry_time: Some(now),
            finish_entry_time: Some(now),
            entry_status: Some(Status::ManuallyVerified),
            reason: set(&request.reason),
            ..Default::default()
        };
        self.transactions.push(tx.clone());
        Ok(tx)
    }

    /// Attach a still to the latest transaction on the camera's lane
    fn capture(&mut self, camera: CameraId) -> Option<String> {
        let lane_id = self.cameras.iter().find(|c| c.id == camera)?.lane_id?;
        let lane = self.lane(lane_id)?.clone();
        let picture_id = self.next_picture;
        let latest_id = self.latest_on(&lane)?.id;
        let tx = self.transaction_mut(latest_id)?;
        tx.pictures.push(Picture { id: picture_id, lane_id: Some(lane_id), date_time: Some(Utc::now()) });
        self.next_picture += 1;
        Some(format!("capture-{camera}-{picture_id}.jpg"))
    }
}

type SharedStore = Arc<Mutex<Store>>;

fn respond(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response should not fail")
}

fn ok<T: Serialize>(data: T) -> Response<Full<Bytes>> {
    respond(StatusCode::OK, json!({ "success": true, "data": data }))
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    respond(status, json!({ "success": false, "data": null, "message": message.into() }))
}

async fn read_json<T: DeserializeOwned>(req: Request<hyper::body::Incoming>) -> Result<T, Response<Full<Bytes>>> {
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| fail(StatusCode::BAD_REQUEST, format!("Unreadable body: {e}")))?
        .to_bytes();
    serde_json::from_slice(&body).map_err(|e| fail(StatusCode::BAD_REQUEST, format!("Invalid JSON: {e}")))
}

fn query_params(req: &Request<hyper::body::Incoming>) -> HashMap<String, String> {
    let query = req.uri().query().unwrap_or_default();
    Url::parse(&format!("http://mock/?{query}"))
        .map(|url| url.query_pairs().into_owned().collect())
        .unwrap_or_default()
}

fn day_param(params: &HashMap<String, String>, key: &str) -> Option<NaiveDate> {
    params.get(key).and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
}

fn list_transactions(store: &Store, params: &HashMap<String, String>) -> Response<Full<Bytes>> {
    let rows = params.get("rowsPerPage").and_then(|v| v.parse::<usize>().ok()).unwrap_or(10).max(1);
    let page = params.get("page").and_then(|v| v.parse::<usize>().ok()).unwrap_or(1).max(1);
    let plate = params.get("plateNumber").map(|p| p.to_lowercase());
    let lane = params.get("laneId").and_then(|v| v.parse::<i64>().ok()).map(LaneId);
    let from = day_param(params, "dateFrom");
    let to = day_param(params, "dateTo");

    let matching: Vec<&Transaction> = store
        .transactions
        .iter()
        .rev()
        .filter(|t| {
            plate.as_deref().map_or(true, |p| {
                t.plate_number.as_deref().is_some_and(|n| n.to_lowercase().contains(p))
            })
        })
        .filter(|t| lane.map_or(true, |l| t.entry_lane_id == Some(l) || t.exit_lane_id == Some(l)))
        .filter(|t| {
            let day = t.date_time.map(|ts| ts.date_naive());
            from.map_or(true, |f| day.is_some_and(|d| d >= f)) && to.map_or(true, |e| day.is_some_and(|d| d <= e))
        })
        .collect();
    let total_pages = matching.len().div_ceil(rows);
    let items: Vec<&Transaction> = matching.into_iter().skip((page - 1) * rows).take(rows).collect();
    respond(StatusCode::OK, json!({ "success": true, "data": items, "totalPages": total_pages }))
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    store: SharedStore,
    token: Option<Arc<String>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if let Some(token) = &token {
        let expected = format!("Bearer {token}");
        let presented = req.headers().get("Authorization").and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            warn!(path = %req.uri().path(), "mock_unauthorized");
            return Ok(fail(StatusCode::UNAUTHORIZED, "Unauthorized"));
        }
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let response = match (&method, segments.as_slice()) {
        (&Method::GET, ["Lane"]) => ok(&store.lock().lanes),
        (&Method::GET, ["Lane", "lookup"]) => {
            let lookup: Vec<LaneLookup> =
                store.lock().lanes.iter().map(|l| LaneLookup { id: l.id, name: l.name.clone() }).collect();
            ok(lookup)
        }
        (&Method::POST, ["Lane", action @ ("OpenPortal" | "TurnOnRedBuzzer")]) => {
            let action = *action;
            match read_json::<LaneActuation>(req).await {
                Ok(body) => match store.lock().lane(body.lane_id) {
                    Some(lane) => {
                        info!(action = %action, lane = %lane.display_name(), "mock_lane_actuated");
                        ok(Value::Null)
                    }
                    None => fail(StatusCode::NOT_FOUND, "Lane not found"),
                },
                Err(response) => response,
            }
        }
        (&Method::GET, ["Camera", "GetCameraList"]) => ok(&store.lock().cameras),
        (&Method::POST, ["Camera", "Capture"]) => match read_json::<CaptureRequest>(req).await {
            Ok(body) => {
                let file = store.lock().capture(body.camera_id);
                info!(camera = %body.camera_id, file = ?file, "mock_capture");
                ok(file.unwrap_or_default())
            }
            Err(response) => response,
        },
        (&Method::GET, ["Camera", id]) => {
            let id = id.parse::<i64>().map(CameraId);
            match id.ok().and_then(|id| store.lock().cameras.iter().find(|c| c.id == id).cloned()) {
                Some(camera) => ok(camera),
                None => fail(StatusCode::NOT_FOUND, "Camera not found"),
            }
        }
        (&Method::GET, ["Transaction"]) => {
            let params = query_params(&req);
            list_transactions(&store.lock(), &params)
        }
        (&Method::GET, ["Transaction", "gate", name, "last"]) => {
            let store = store.lock();
            match store.lane_by_path(&path) {
                Some(lane) => ok(store.latest_on(lane)),
                None => fail(StatusCode::NOT_FOUND, format!("Lane '{name}' not found")),
            }
        }
        (&Method::POST, ["Transaction", "gateevent"]) => match read_json::<GateEventRequest>(req).await {
            Ok(body) => {
                let result = store.lock().apply_gate_event(body);
                match result {
                    Ok(tx) => {
                        info!(transaction = %tx.id, "mock_gate_event");
                        ok(tx)
                    }
                    Err((status, message)) => fail(status, message),
                }
            }
            Err(response) => response,
        },
        (&Method::GET, ["Transaction", id]) => {
            let id = id.parse::<i64>().map(TransactionId);
            match id.ok().and_then(|id| store.lock().transactions.iter().find(|t| t.id == id).cloned()) {
                Some(tx) => ok(tx),
                None => fail(StatusCode::NOT_FOUND, "Transaction not found"),
            }
        }
        (&Method::POST, ["Transaction", id, "manualdata"]) => {
            let Ok(id) = id.parse::<i64>().map(TransactionId) else {
                return Ok(fail(StatusCode::BAD_REQUEST, "Invalid transaction id"));
            };
            match read_json::<ManualDataRequest>(req).await {
                Ok(body) => match store.lock().apply_manual_data(id, body) {
                    Some(tx) => {
                        info!(transaction = %tx.id, "mock_manual_data");
                        ok(tx)
                    }
                    None => fail(StatusCode::NOT_FOUND, "Transaction not found"),
                },
                Err(response) => response,
            }
        }
        (&Method::GET, ["health"]) => ok("ok"),
        _ => fail(StatusCode::NOT_FOUND, "Not Found"),
    };

    info!(method = %method, path = %path, status = %response.status().as_u16(), "mock_request");
    Ok(response)
}

async fn serve(
    port: u16,
    store: SharedStore,
    token: Option<Arc<String>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %port, auth = %token.is_some(), "mock_backend_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let store = store.clone();
                        let token = token.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let store = store.clone();
                                let token = token.clone();
                                async move { handle_request(req, store, token).await }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "mock_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "mock_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mock_backend_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_timer(UtcTime::rfc_3339()).with_target(false).init();

    let args = Args::parse();
    let store: SharedStore = Arc::new(Mutex::new(Store::seeded()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if args.arrival_secs > 0 {
        let store = store.clone();
        let period = Duration::from_secs(args.arrival_secs);
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let id = store.lock().arrive();
                        info!(transaction = %id, "mock_vehicle_arrived");
                    }
                    _ = shutdown.changed() => return,
                }
            }
        });
    }

    let server = tokio::spawn(serve(args.port, store, args.token.map(Arc::new), shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);
    server.await??;
    Ok(())
}
