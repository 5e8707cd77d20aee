//! Manual completion: validation, submission and the actuation sequence

mod common;

use common::{entry_tx, lane, settle, transport_error, Call, FakeApi};
use gate_dashboard::domain::{Lane, LaneId, Status, Transaction, TransactionId};
use gate_dashboard::infra::Metrics;
use gate_dashboard::io::{ApiError, FailureCategory, GateApi};
use gate_dashboard::services::{
    DetailCompletion, ManualCompletionWorkflow, ManualEntryForm, ValidationError, WorkflowError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::advance;

fn workflow(api: &Arc<FakeApi>) -> (ManualCompletionWorkflow, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new());
    let workflow = ManualCompletionWorkflow::new(Arc::clone(api) as Arc<dyn GateApi>, Arc::clone(&metrics));
    (workflow, metrics)
}

fn gate_in() -> Lane {
    lane(1, "GATE IN 1", "GATE IN")
}

fn gate_out() -> Lane {
    lane(2, "GATE OUT 1", "GATE OUT")
}

fn open_exit() -> Transaction {
    Transaction {
        id: TransactionId(30),
        tag_id: Some("TAG-3".into()),
        dispatch_id: Some("DSP-3".into()),
        plate_number: Some("B 3 CC".into()),
        entry_lane_id: Some(LaneId(1)),
        exit_lane_id: Some(LaneId(2)),
        entry_status: Some(Status::Success),
        exit_status: Some(Status::CapturedAwaitingManualData),
        ..Default::default()
    }
}

fn form(dispatch: &str) -> DetailCompletion {
    DetailCompletion {
        dispatch_id: dispatch.into(),
        plate_number: "B 1 AA".into(),
        tag_id: "TAG-1".into(),
        reason: "plate unreadable".into(),
    }
}

#[tokio::test]
async fn test_entry_completion_requires_dispatch_without_network_call() {
    let api = Arc::new(FakeApi::default());
    let (workflow, _) = workflow(&api);
    let tx = entry_tx(10, 1, Status::CapturedAwaitingManualData);

    for blank in ["", "   "] {
        let err = workflow.complete_details(&gate_in(), &tx, &form(blank)).await.unwrap_err();
        assert_eq!(err, WorkflowError::Validation(ValidationError::DispatchRequired));
    }
    assert!(api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exit_completion_accepts_empty_dispatch() {
    let api = Arc::new(FakeApi::default());
    let (workflow, _) = workflow(&api);

    let outcome = workflow.complete_details(&gate_out(), &open_exit(), &form("")).await.unwrap();
    assert_eq!(outcome.message, "Manual data saved successfully.");
    assert_eq!(outcome.lane_id, Some(LaneId(2)));

    match &api.calls()[0] {
        Call::ManualData(id, request) => {
            assert_eq!(*id, TransactionId(30));
            assert_eq!(request.dispatch_id, "");
            assert_eq!(request.new_status, "EXIT_COMPLETED_AWAITING_MANUAL_DATA");
            assert_eq!(request.reason, "plate unreadable");
        }
        other => panic!("expected manual data submission, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_success_opens_portal_then_buzzer_after_delay() {
    let api = Arc::new(FakeApi::default());
    let (workflow, metrics) = workflow(&api);
    let tx = entry_tx(10, 1, Status::CapturedAwaitingManualData);

    let outcome = workflow.complete_details(&gate_in(), &tx, &form("DSP-10")).await.unwrap();
    assert_eq!(outcome.response["id"], 1);
    settle().await;
    assert_eq!(api.portal_calls(), vec![LaneId(1)]);
    assert!(api.buzzer_calls().is_empty());

    advance(Duration::from_secs(4)).await;
    settle().await;
    assert!(api.buzzer_calls().is_empty());

    advance(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(api.buzzer_calls(), vec![LaneId(1)]);

    let summary = metrics.report();
    assert_eq!(summary.submissions_ok, 1);
    assert_eq!(summary.portal_ok, 1);
    assert_eq!(summary.buzzer_ok, 1);
    assert_eq!(api.submissions(), 1);

    match &api.calls()[0] {
        Call::ManualData(_, request) => {
            assert_eq!(request.new_status, "ENTRY_COMPLETED_AWAITING_MANUAL_DATA")
        }
        other => panic!("expected manual data submission, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_portal_failure_keeps_success_and_still_buzzes() {
    let api = Arc::new(FakeApi::default());
    api.set_portal(Err(ApiError::Status { status: 500, message: None }));
    let (workflow, metrics) = workflow(&api);
    let tx = entry_tx(10, 1, Status::CapturedAwaitingManualData);

    let mut outcome = workflow.complete_details(&gate_in(), &tx, &form("DSP-10")).await.unwrap();
    settle().await;
    let portal = outcome.portal.take().unwrap();
    assert!(!portal.await.unwrap());

    advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(api.buzzer_calls(), vec![LaneId(1)]);
    assert_eq!(api.submissions(), 1);
    assert_eq!(metrics.report().portal_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_buzzer_failure_is_only_logged() {
    let api = Arc::new(FakeApi::default());
    api.set_buzzer(Err(transport_error()));
    let (workflow, metrics) = workflow(&api);

    let outcome = workflow.complete_details(&gate_out(), &open_exit(), &form("")).await.unwrap();
    advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(api.buzzer_calls(), vec![LaneId(2)]);
    assert!(outcome.buzzer.as_ref().is_some_and(|b| b.is_finished()));
    assert_eq!(metrics.report().buzzer_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_submit_failure_maps_to_operator_error_and_skips_actuation() {
    let api = Arc::new(FakeApi::default());
    api.set_submit(Err(ApiError::Status { status: 400, message: Some("Dispatch already closed".into()) }));
    let (workflow, metrics) = workflow(&api);
    let tx = entry_tx(10, 1, Status::CapturedAwaitingManualData);

    let err = workflow.complete_details(&gate_in(), &tx, &form("DSP-10")).await.unwrap_err();
    let WorkflowError::Submit(operator) = err else {
        panic!("expected submit failure");
    };
    assert_eq!(operator.category, FailureCategory::Validation);
    assert_eq!(operator.title, "Validation Error!");
    assert_eq!(operator.message, "Dispatch already closed");

    api.set_submit(Err(ApiError::Status { status: 500, message: Some("stack trace".into()) }));
    let err = workflow.complete_details(&gate_in(), &tx, &form("DSP-10")).await.unwrap_err();
    assert_eq!(err.to_string(), "Server Error! Internal server error. Please try again later.");

    api.set_submit(Err(transport_error()));
    let WorkflowError::Submit(operator) = workflow.complete_details(&gate_in(), &tx, &form("DSP-10")).await.unwrap_err()
    else {
        panic!("expected submit failure");
    };
    assert_eq!(operator.category, FailureCategory::Generic);

    advance(Duration::from_secs(10)).await;
    settle().await;
    assert!(api.portal_calls().is_empty());
    assert!(api.buzzer_calls().is_empty());
    assert_eq!(metrics.report().submissions_failed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_buzzer_never_fires() {
    let api = Arc::new(FakeApi::default());
    let (workflow, _) = workflow(&api);
    let tx = entry_tx(10, 1, Status::CapturedAwaitingManualData);

    let outcome = workflow.complete_details(&gate_in(), &tx, &form("DSP-10")).await.unwrap();
    let buzzer = outcome.buzzer.unwrap();
    assert_eq!(buzzer.label(), "red_buzzer");
    buzzer.cancel();

    advance(Duration::from_secs(10)).await;
    settle().await;
    assert!(api.buzzer_calls().is_empty());
    assert!(!buzzer.wait().await);
}

#[tokio::test(start_paused = true)]
async fn test_custom_buzzer_delay() {
    let api = Arc::new(FakeApi::default());
    let (workflow, _) = workflow(&api);
    let workflow = workflow.with_buzzer_delay(Duration::from_secs(2));
    let tx = entry_tx(10, 1, Status::CapturedAwaitingManualData);

    let _outcome = workflow.complete_details(&gate_in(), &tx, &form("DSP-10")).await.unwrap();
    advance(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(api.buzzer_calls(), vec![LaneId(1)]);
}

#[tokio::test]
async fn test_completion_without_lane_skips_actuation() {
    let api = Arc::new(FakeApi::default());
    let (workflow, _) = workflow(&api);
    let tx = Transaction {
        id: TransactionId(11),
        entry_status: Some(Status::CapturedAwaitingManualData),
        ..Default::default()
    };

    let outcome = workflow.complete_details(&gate_in(), &tx, &form("DSP-11")).await.unwrap();
    assert_eq!(outcome.lane_id, None);
    assert!(outcome.portal.is_none());
    assert!(outcome.buzzer.is_none());
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test]
async fn test_manual_entry_requires_fields_without_network_call() {
    let api = Arc::new(FakeApi::default());
    let (workflow, _) = workflow(&api);

    let missing_plate = ManualEntryForm {
        dispatch_id: "DSP-1".into(),
        name: "GATE IN 1".into(),
        ..Default::default()
    };
    let err = workflow.register_manual_event(&gate_in(), &missing_plate, None).await.unwrap_err();
    assert_eq!(err, WorkflowError::Validation(ValidationError::MissingEntryFields));
    assert_eq!(err.to_string(), "Please fill in Dispatch ID, Gate Name, and Plate Number.");
    assert!(api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_entry_registers_on_lane_name() {
    let api = Arc::new(FakeApi::default());
    let (workflow, _) = workflow(&api);
    let form = ManualEntryForm {
        dispatch_id: "DSP-5".into(),
        tag_id: "TAG-5".into(),
        name: "typed by operator".into(),
        plate_number: "B 5 EE".into(),
        reason: "RFID reader down".into(),
    };

    let outcome = workflow.register_manual_event(&gate_in(), &form, None).await.unwrap();
    assert_eq!(outcome.message, "Manual entry saved successfully.");
    settle().await;

    let Call::GateEvent(request) = &api.calls()[0] else {
        panic!("expected gate event");
    };
    assert_eq!(request.name, "GATE IN 1");
    assert_eq!(request.dispatch_id, "DSP-5");
    assert_eq!(request.plate_number, "B 5 EE");
    assert!(request.is_manual);
    assert_eq!(api.portal_calls(), vec![LaneId(1)]);
}

#[tokio::test]
async fn test_manual_exit_requires_selection() {
    let api = Arc::new(FakeApi::default());
    let (workflow, _) = workflow(&api);

    let err = workflow
        .register_manual_event(&gate_out(), &ManualEntryForm::default(), None)
        .await
        .unwrap_err();
    assert_eq!(err, WorkflowError::Validation(ValidationError::NoTransactionSelected));
    assert!(api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_exit_takes_identity_from_selection() {
    let api = Arc::new(FakeApi::default());
    let (workflow, _) = workflow(&api);
    let form = ManualEntryForm {
        dispatch_id: "ignored".into(),
        plate_number: "ignored".into(),
        reason: "barrier stuck".into(),
        ..Default::default()
    };
    let selected = open_exit();

    let outcome = workflow.register_manual_event(&gate_out(), &form, Some(&selected)).await.unwrap();
    assert_eq!(outcome.message, "Manual exit processed successfully.");
    assert_eq!(outcome.lane_id, Some(LaneId(2)));

    let Call::GateEvent(request) = &api.calls()[0] else {
        panic!("expected gate event");
    };
    assert_eq!(request.dispatch_id, "DSP-3");
    assert_eq!(request.tag_id, "TAG-3");
    assert_eq!(request.plate_number, "B 3 CC");
    assert_eq!(request.name, "GATE OUT 1");
    assert_eq!(request.reason, "barrier stuck");

    outcome.settle().await;
    assert_eq!(api.portal_calls(), vec![LaneId(2)]);
    assert_eq!(api.buzzer_calls(), vec![LaneId(2)]);
}
