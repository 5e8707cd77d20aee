//! `HttpGateApi` against an in-process hyper server

use bytes::Bytes;
use gate_dashboard::domain::{CameraId, LaneId, Status, TransactionId};
use gate_dashboard::infra::SessionContext;
use gate_dashboard::io::{
    ApiError, FailureCategory, GateApi, HttpGateApi, ManualDataRequest, OperatorError, TransactionQuery,
};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// What the server saw
#[derive(Debug, Clone)]
struct Seen {
    method: String,
    path: String,
    query: Option<String>,
    auth: Option<String>,
    body: Value,
}

type Handler = Arc<dyn Fn(&Seen) -> (u16, String) + Send + Sync>;

struct TestServer {
    base_url: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl TestServer {
    async fn start(delay: Duration, handler: impl Fn(&Seen) -> (u16, String) + Send + Sync + 'static) -> Self {
        let handler: Handler = Arc::new(handler);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let handler = Arc::clone(&handler);
                        let log = Arc::clone(&log);
                        async move {
                            let (parts, body) = req.into_parts();
                            let bytes = body.collect().await.map(|b| b.to_bytes()).unwrap_or_default();
                            let seen = Seen {
                                method: parts.method.as_str().to_string(),
                                path: parts.uri.path().to_string(),
                                query: parts.uri.query().map(str::to_string),
                                auth: parts
                                    .headers
                                    .get("authorization")
                                    .and_then(|v| v.to_str().ok())
                                    .map(str::to_string),
                                body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
                            };
                            let (status, body) = handler(&seen);
                            log.lock().push(seen);
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                            Ok::<_, Infallible>(
                                Response::builder()
                                    .status(status)
                                    .header("Content-Type", "application/json")
                                    .body(Full::new(Bytes::from(body)))
                                    .unwrap(),
                            )
                        }
                    });
                    let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
                });
            }
        });

        Self { base_url: format!("http://{addr}"), seen }
    }

    async fn replying(status: u16, body: Value) -> Self {
        let body = body.to_string();
        Self::start(Duration::ZERO, move |_| (status, body.clone())).await
    }

    fn client(&self, token: Option<&str>) -> HttpGateApi {
        let session = match token {
            Some(token) => SessionContext::with_token(token),
            None => SessionContext::new(),
        };
        HttpGateApi::new(&self.base_url, Duration::from_secs(5), Arc::new(session)).unwrap()
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }
}

#[tokio::test]
async fn test_latest_transaction_decodes_and_sends_bearer() {
    let server = TestServer::replying(
        200,
        json!({
            "success": true,
            "data": {
                "id": 5,
                "tagId": "TAG-5",
                "dispatchId": "",
                "plateNumber": "B 5 EE",
                "exitStartTime": "2024-01-02T03:04:05",
                "entryStatus": "SUCCESS",
                "exitStatus": "SOMETHING_NEW",
                "pictures": null
            }
        }),
    )
    .await;

    let tx = server.client(Some("tok-1")).latest_transaction("GATE IN 1").await.unwrap().unwrap();
    assert_eq!(tx.id, TransactionId(5));
    assert_eq!(tx.dispatch_id, None);
    assert_eq!(tx.plate_number.as_deref(), Some("B 5 EE"));
    assert!(tx.start_exit_time.is_some());
    assert_eq!(tx.entry_status, Some(Status::Success));
    assert_eq!(tx.exit_status, Some(Status::Unknown("SOMETHING_NEW".into())));
    assert!(tx.pictures.is_empty());

    let seen = server.seen();
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].path, "/Transaction/gate/GATE%20IN%201/last");
    assert_eq!(seen[0].auth.as_deref(), Some("Bearer tok-1"));
}

#[tokio::test]
async fn test_null_data_is_an_empty_gate() {
    let server = TestServer::replying(200, json!({ "success": true, "data": null })).await;
    let api = server.client(None);

    assert_eq!(api.latest_transaction("GATE OUT 1").await.unwrap(), None);
    assert_eq!(api.lanes().await.unwrap(), vec![]);
    assert_eq!(server.seen()[0].auth, None);
}

#[tokio::test]
async fn test_list_transactions_sends_query_and_reads_pages() {
    let server = TestServer::replying(
        200,
        json!({ "success": true, "data": [{ "id": 1 }, { "id": 2 }], "totalPages": 4 }),
    )
    .await;

    let query = TransactionQuery {
        page: Some(2),
        rows_per_page: Some(50),
        plate_number: Some("  B 1  ".into()),
        lane_id: Some(LaneId(3)),
        ..Default::default()
    };
    let page = server.client(None).list_transactions(&query).await.unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_pages, 4);

    let seen = server.seen();
    assert_eq!(seen[0].path, "/Transaction");
    let query = seen[0].query.clone().unwrap();
    assert!(query.contains("page=2"));
    assert!(query.contains("rowsPerPage=50"));
    assert!(query.contains("plateNumber=B+1") || query.contains("plateNumber=B%201"));
    assert!(query.contains("laneId=3"));
}

#[tokio::test]
async fn test_history_query_and_camera_lookup() {
    let server = TestServer::start(Duration::ZERO, |seen| match seen.path.as_str() {
        "/Transaction" => (
            200,
            json!({
                "success": true,
                "data": [{
                    "id": 11,
                    "startExitTime": "2024-01-03T08:00:00",
                    "exitStartTime": "2024-01-03T08:00:00"
                }]
            })
            .to_string(),
        ),
        "/Camera/6" => (
            200,
            json!({
                "success": true,
                "data": { "id": 6, "laneId": 2, "ipAddress": "10.0.0.6", "parameter": "rtsp://{0}/live;u;p" }
            })
            .to_string(),
        ),
        _ => (404, json!({ "success": false }).to_string()),
    })
    .await;
    let api = server.client(None);

    let query = TransactionQuery {
        page: Some(3),
        rows_per_page: Some(20),
        date_from: Some("2024-01-01".into()),
        date_to: Some("2024-01-31".into()),
        ..Default::default()
    };
    let page = api.list_transactions(&query).await.unwrap();
    assert_eq!(page.items[0].id, TransactionId(11));
    // No totalPages in the body: one page because items exist
    assert_eq!(page.total_pages, 1);

    let camera = api.camera(CameraId(6)).await.unwrap();
    assert_eq!(camera.lane_id, Some(LaneId(2)));
    assert_eq!(camera.stream_endpoint().map(|s| s.url).as_deref(), Some("rtsp://10.0.0.6/live"));

    let seen = server.seen();
    let query = seen[0].query.clone().unwrap();
    assert!(query.contains("page=3"));
    assert!(query.contains("dateFrom=2024-01-01"));
    assert!(query.contains("dateTo=2024-01-31"));
    assert_eq!(seen[1].path, "/Camera/6");
}

#[tokio::test]
async fn test_error_status_maps_to_operator_error() {
    let server = TestServer::replying(400, json!({ "success": false, "message": "Plate number already in use" })).await;
    let request = ManualDataRequest {
        dispatch_id: "DSP-1".into(),
        plate_number: "B 1 AA".into(),
        tag_id: "TAG-1".into(),
        new_status: Status::EntryCompletedAwaitingManualData.to_string(),
        reason: String::new(),
    };

    let err = server.client(None).submit_manual_data(TransactionId(9), &request).await.unwrap_err();
    assert_eq!(err, ApiError::Status { status: 400, message: Some("Plate number already in use".into()) });
    let operator = OperatorError::from(&err);
    assert_eq!(operator.category, FailureCategory::Validation);
    assert_eq!(operator.message, "Plate number already in use");

    let seen = server.seen();
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].path, "/Transaction/9/manualdata");
    assert_eq!(seen[0].body["dispatchId"], "DSP-1");
    assert_eq!(seen[0].body["tagid"], "TAG-1");
    assert_eq!(seen[0].body["newStatus"], "ENTRY_COMPLETED_AWAITING_MANUAL_DATA");
}

#[tokio::test]
async fn test_not_found_uses_fixed_message() {
    let server = TestServer::replying(404, json!({ "error": "no row 77" })).await;
    let err = server.client(None).transaction_detail(TransactionId(77)).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    let operator = OperatorError::from(err);
    assert_eq!(operator.category, FailureCategory::NotFound);
    assert_eq!(operator.message, "The requested resource was not found.");
}

#[tokio::test]
async fn test_rejected_envelope_on_success_status() {
    let server = TestServer::replying(200, json!({ "success": false, "message": "Lane offline" })).await;
    let err = server.client(None).open_portal(LaneId(2)).await.unwrap_err();
    assert_eq!(err, ApiError::Rejected { status: 200, message: Some("Lane offline".into()) });
    assert_eq!(OperatorError::from(&err).category, FailureCategory::Generic);

    let seen = server.seen();
    assert_eq!(seen[0].path, "/Lane/OpenPortal");
    assert_eq!(seen[0].body, json!({ "laneid": 2 }));
}

#[tokio::test]
async fn test_actuation_and_capture_bodies() {
    let server = TestServer::start(Duration::ZERO, |seen| match seen.path.as_str() {
        "/Camera/Capture" => (200, json!({ "success": true, "data": "aGVsbG8=" }).to_string()),
        _ => (200, json!({ "success": true, "data": null }).to_string()),
    })
    .await;
    let api = server.client(Some("tok"));

    api.turn_on_red_buzzer(LaneId(4)).await.unwrap();
    assert_eq!(api.capture(CameraId(6)).await.unwrap().as_deref(), Some("aGVsbG8="));

    let seen = server.seen();
    assert_eq!(seen[0].path, "/Lane/TurnOnRedBuzzer");
    assert_eq!(seen[0].body, json!({ "laneid": 4 }));
    assert_eq!(seen[1].path, "/Camera/Capture");
    assert_eq!(seen[1].body, json!({ "cameraid": 6 }));
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = TestServer::start(Duration::ZERO, |_| (200, "<html>gateway</html>".to_string())).await;
    let err = server.client(None).lanes().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
    assert_eq!(OperatorError::from(&err).category, FailureCategory::Generic);
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let server = TestServer::start(Duration::from_secs(5), |_| (200, json!({ "success": true }).to_string())).await;
    let api = HttpGateApi::new(&server.base_url, Duration::from_millis(200), Arc::new(SessionContext::new())).unwrap();
    let err = api.cameras().await.unwrap_err();
    assert_eq!(err, ApiError::Timeout);
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = HttpGateApi::new(&format!("http://{addr}"), Duration::from_secs(2), Arc::new(SessionContext::new())).unwrap();
    let err = api.lane_lookup().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)), "got {err:?}");
}
