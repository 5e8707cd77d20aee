//! Manual completion: commit operator data, then actuate the lane
//!
//! Two protocols share one side-effect sequence:
//! 1. Detail completion fills in the missing data of an existing transaction.
//! 2. A manual event registers an entry or exit the cameras never saw.
//!
//! Only the primary submission can fail the operation. Once it succeeds the
//! portal is opened in the background and the red buzzer is scheduled after
//! a delay; both are logged on failure and never retried or rolled back.

use crate::domain::{Lane, LaneId, Status, Transaction};
use crate::infra::Metrics;
use crate::io::{GateApi, GateEventRequest, ManualDataRequest, OperatorError};
use crate::services::deferred::DeferredTask;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub const DEFAULT_BUZZER_DELAY: Duration = Duration::from_secs(5);

/// Rejected before any request is sent
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Dispatch ID is required")]
    DispatchRequired,
    #[error("Please fill in Dispatch ID, Gate Name, and Plate Number.")]
    MissingEntryFields,
    #[error("Please select a transaction to complete the exit.")]
    NoTransactionSelected,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Submit(#[from] OperatorError),
}

/// Operator input for completing an existing transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailCompletion {
    pub dispatch_id: String,
    pub plate_number: String,
    pub tag_id: String,
    pub reason: String,
}

impl DetailCompletion {
    /// Form prefilled from a (backfilled) transaction
    pub fn prefilled(tx: &Transaction) -> Self {
        Self {
            dispatch_id: tx.dispatch_id.clone().unwrap_or_default(),
            plate_number: tx.plate_number.clone().unwrap_or_default(),
            tag_id: tx.tag_id.clone().unwrap_or_default(),
            reason: tx.reason.clone().unwrap_or_default(),
        }
    }
}

/// Operator input for a manual entry; on exit lanes only `reason` is used
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualEntryForm {
    pub dispatch_id: String,
    pub tag_id: String,
    /// Gate name; the lane's own name takes precedence
    pub name: String,
    pub plate_number: String,
    pub reason: String,
}

/// Status submitted with manual data: the open leg moves to "completed, awaiting data"
pub fn new_status_for(tx: &Transaction) -> Status {
    if tx.has_open_exit() {
        Status::ExitCompletedAwaitingManualData
    } else {
        Status::EntryCompletedAwaitingManualData
    }
}

/// Lane to actuate after completing `tx`
pub fn completion_lane(tx: &Transaction) -> Option<LaneId> {
    if tx.has_open_exit() {
        tx.exit_lane_id
    } else {
        tx.entry_lane_id
    }
}

/// Result of a committed submission.
///
/// The actuation handles are exposed so callers (and tests) can wait for or
/// cancel them; the submission itself is already final.
#[derive(Debug)]
pub struct CompletionOutcome {
    pub message: &'static str,
    /// The backend's `data` for the primary submission
    pub response: Value,
    pub lane_id: Option<LaneId>,
    /// Resolves to whether the portal opened
    pub portal: Option<JoinHandle<bool>>,
    pub buzzer: Option<DeferredTask>,
}

impl CompletionOutcome {
    /// Wait for both actuations (CLI exit path)
    pub async fn settle(self) {
        if let Some(portal) = self.portal {
            let _ = portal.await;
        }
        if let Some(buzzer) = self.buzzer {
            buzzer.wait().await;
        }
    }
}

pub struct ManualCompletionWorkflow {
    api: Arc<dyn GateApi>,
    metrics: Arc<Metrics>,
    buzzer_delay: Duration,
}

impl ManualCompletionWorkflow {
    pub fn new(api: Arc<dyn GateApi>, metrics: Arc<Metrics>) -> Self {
        Self { api, metrics, buzzer_delay: DEFAULT_BUZZER_DELAY }
    }

    pub fn with_buzzer_delay(mut self, delay: Duration) -> Self {
        self.buzzer_delay = delay;
        self
    }

    /// Commit manual data for an existing transaction shown on `lane`.
    ///
    /// Entry lanes require a dispatch id; exit lanes accept an empty one.
    pub async fn complete_details(
        &self,
        lane: &Lane,
        tx: &Transaction,
        form: &DetailCompletion,
    ) -> Result<CompletionOutcome, WorkflowError> {
        if !lane.is_exit() && form.dispatch_id.trim().is_empty() {
            return Err(ValidationError::DispatchRequired.into());
        }

        let new_status = new_status_for(tx);
        let request = ManualDataRequest {
            dispatch_id: form.dispatch_id.clone(),
            plate_number: form.plate_number.clone(),
            tag_id: form.tag_id.clone(),
            new_status: new_status.as_str().to_string(),
            reason: form.reason.clone(),
        };

        let response = match self.api.submit_manual_data(tx.id, &request).await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_submission(false);
                warn!(transaction = %tx.id, lane = %lane.display_name(), error = %e, "manual_data_failed");
                return Err(OperatorError::from(&e).into());
            }
        };
        self.metrics.record_submission(true);
        info!(transaction = %tx.id, new_status = %new_status, "manual_data_saved");

        let lane_id = completion_lane(tx);
        Ok(self.actuate("Manual data saved successfully.", response, lane_id))
    }

    /// Register a manual entry (entry lane) or manual exit (exit lane).
    ///
    /// Exit lanes take identity fields from the selected pending transaction.
    pub async fn register_manual_event(
        &self,
        lane: &Lane,
        form: &ManualEntryForm,
        selected: Option<&Transaction>,
    ) -> Result<CompletionOutcome, WorkflowError> {
        let (request, message) = if lane.is_exit() {
            let tx = selected.ok_or(ValidationError::NoTransactionSelected)?;
            let request = GateEventRequest {
                dispatch_id: tx.dispatch_id.clone().unwrap_or_default(),
                tag_id: tx.tag_id.clone().unwrap_or_default(),
                name: lane.display_name(),
                is_manual: true,
                plate_number: tx.plate_number.clone().unwrap_or_default(),
                reason: form.reason.clone(),
            };
            (request, "Manual exit processed successfully.")
        } else {
            let blank = |s: &str| s.trim().is_empty();
            if blank(&form.dispatch_id) || blank(&form.name) || blank(&form.plate_number) {
                return Err(ValidationError::MissingEntryFields.into());
            }
            let request = GateEventRequest {
                dispatch_id: form.dispatch_id.clone(),
                tag_id: form.tag_id.clone(),
                name: lane.name.clone().unwrap_or_else(|| form.name.clone()),
                is_manual: true,
                plate_number: form.plate_number.clone(),
                reason: form.reason.clone(),
            };
            (request, "Manual entry saved successfully.")
        };

        let response = match self.api.submit_gate_event(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_submission(false);
                warn!(lane = %request.name, error = %e, "manual_event_failed");
                return Err(OperatorError::from(&e).into());
            }
        };
        self.metrics.record_submission(true);
        info!(lane = %request.name, dispatch = %request.dispatch_id, exit = %lane.is_exit(), "manual_event_saved");

        Ok(self.actuate(message, response, Some(lane.id)))
    }

    /// Fire the portal request and schedule the buzzer
    fn actuate(&self, message: &'static str, response: Value, lane_id: Option<LaneId>) -> CompletionOutcome {
        let Some(lane) = lane_id else {
            warn!("completion_without_lane");
            return CompletionOutcome { message, response, lane_id, portal: None, buzzer: None };
        };

        let api = Arc::clone(&self.api);
        let metrics = Arc::clone(&self.metrics);
        let portal = tokio::spawn(async move {
            match api.open_portal(lane).await {
                Ok(()) => {
                    metrics.record_portal(true);
                    info!(lane = %lane, "portal_opened");
                    true
                }
                Err(e) => {
                    metrics.record_portal(false);
                    warn!(lane = %lane, error = %e, "portal_open_failed");
                    false
                }
            }
        });

        let api = Arc::clone(&self.api);
        let metrics = Arc::clone(&self.metrics);
        let buzzer = DeferredTask::schedule("red_buzzer", self.buzzer_delay, async move {
            match api.turn_on_red_buzzer(lane).await {
                Ok(()) => {
                    metrics.record_buzzer(true);
                    info!(lane = %lane, "red_buzzer_on");
                }
                Err(e) => {
                    metrics.record_buzzer(false);
                    warn!(lane = %lane, error = %e, "red_buzzer_failed");
                }
            }
        });

        CompletionOutcome { message, response, lane_id, portal: Some(portal), buzzer: Some(buzzer) }
    }
}
