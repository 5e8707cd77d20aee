//! Pending-exit candidates for manual exit completion
//!
//! An exit gate operator completes an exit by picking the transaction the
//! truck belongs to. Candidates are every transaction whose exit has not
//! succeeded, most recent exit start first; the selector pre-picks the best
//! one so the common case is a single confirmation.

use crate::domain::{LaneId, Transaction, TransactionId};
use crate::io::{ApiError, GateApi, TransactionQuery};
use std::cmp::Ordering;

/// Ranked candidates and the automatic pick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingExits {
    pub candidates: Vec<Transaction>,
    pub auto_selected: Option<TransactionId>,
}

/// Descending by exit start; records without one go last in listing order
fn by_exit_start_desc(a: &Transaction, b: &Transaction) -> Ordering {
    match (a.start_exit_time, b.start_exit_time) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn auto_select(candidates: &[Transaction], lane: Option<LaneId>) -> Option<TransactionId> {
    let started = || candidates.iter().filter(|t| t.start_exit_time.is_some());
    lane.and_then(|lane| started().find(|t| t.exit_lane_id == Some(lane)))
        .or_else(|| started().next())
        .map(|t| t.id)
}

/// Filter, rank and auto-select.
///
/// Same-lane candidates with an exit start win over more recent ones on
/// other lanes. Without any exit start there is no automatic pick.
pub fn list_pending_exits(all: &[Transaction], current_lane: Option<LaneId>) -> PendingExits {
    let mut candidates: Vec<Transaction> =
        all.iter().filter(|t| !t.is_exit_complete()).cloned().collect();
    candidates.sort_by(by_exit_start_desc);
    let auto_selected = auto_select(&candidates, current_lane);
    PendingExits { candidates, auto_selected }
}

/// Load the bulk listing and rank it for `current_lane`
pub async fn fetch_pending_exits(
    api: &dyn GateApi,
    rows_per_page: u32,
    current_lane: Option<LaneId>,
) -> Result<PendingExits, ApiError> {
    let page = api.list_transactions(&TransactionQuery::bulk(rows_per_page)).await?;
    Ok(list_pending_exits(&page.items, current_lane))
}

/// Selection state behind the manual-exit form.
///
/// A (re)load or a lane change replaces the selection with the automatic
/// pick; in between, the operator's choice stands.
#[derive(Debug, Clone, Default)]
pub struct PendingExitSelection {
    lane: Option<LaneId>,
    pending: PendingExits,
    selected: Option<TransactionId>,
}

impl PendingExitSelection {
    pub fn new(lane: Option<LaneId>) -> Self {
        Self { lane, ..Default::default() }
    }

    pub fn reload(&mut self, all: &[Transaction]) {
        self.pending = list_pending_exits(all, self.lane);
        self.selected = self.pending.auto_selected;
    }

    pub fn set_lane(&mut self, lane: Option<LaneId>) {
        if self.lane == lane {
            return;
        }
        self.lane = lane;
        self.pending.auto_selected = auto_select(&self.pending.candidates, lane);
        self.selected = self.pending.auto_selected;
    }

    /// Operator pick; ignored unless `id` is a candidate
    pub fn select(&mut self, id: TransactionId) -> bool {
        if self.pending.candidates.iter().any(|t| t.id == id) {
            self.selected = Some(id);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }

    pub fn candidates(&self) -> &[Transaction] {
        &self.pending.candidates
    }

    pub fn auto_selected(&self) -> Option<TransactionId> {
        self.pending.auto_selected
    }

    pub fn selected(&self) -> Option<&Transaction> {
        let id = self.selected?;
        self.pending.candidates.iter().find(|t| t.id == id)
    }
}
