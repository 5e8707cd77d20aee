//! Transaction backfill from historical records sharing an RFID tag
//!
//! An exit captured without manual data arrives with `dispatchId` or
//! `plateNumber` missing. The entry leg of the same tag usually has both, so
//! the dashboard copies them over for display and for prefilling the
//! completion form. Nothing is written back to the backend.

use crate::domain::Transaction;
use crate::infra::Metrics;
use crate::io::{GateApi, TransactionQuery};
use tracing::debug;

/// First record in `all` (listing order) that can supply the missing fields.
///
/// A transaction without a tag never matches.
pub fn find_reference<'a>(tx: &Transaction, all: &'a [Transaction]) -> Option<&'a Transaction> {
    let tag = tx.tag_id.as_deref()?;
    all.iter().find(|r| {
        r.tag_id.as_deref() == Some(tag)
            && r.dispatch_id.is_some()
            && r.plate_number.is_some()
            && r.is_entry_complete()
    })
}

/// Fill `dispatch_id` and `plate_number` from the reference record, if any.
///
/// Both fields are copied together from the same record. Tag, statuses and
/// pictures are never touched.
pub fn backfill(mut tx: Transaction, all: &[Transaction]) -> Transaction {
    if !tx.needs_backfill() {
        return tx;
    }
    if let Some(reference) = find_reference(&tx, all) {
        tx.dispatch_id = reference.dispatch_id.clone();
        tx.plate_number = reference.plate_number.clone();
    }
    tx
}

/// Fetch the bulk listing and backfill; any listing failure yields `tx` as is
pub async fn backfill_from_api(
    api: &dyn GateApi,
    tx: Transaction,
    rows_per_page: u32,
    metrics: &Metrics,
) -> Transaction {
    if !tx.needs_backfill() {
        return tx;
    }
    match api.list_transactions(&TransactionQuery::bulk(rows_per_page)).await {
        Ok(page) => {
            let merged = backfill(tx.clone(), &page.items);
            if merged != tx {
                metrics.record_backfill();
                debug!(transaction = %tx.id, tag = ?tx.tag_id, "backfill_applied");
            }
            merged
        }
        Err(e) => {
            debug!(transaction = %tx.id, error = %e, "backfill_listing_failed");
            tx
        }
    }
}

/// Merge a freshly fetched detail record with the copy a gate card shows.
///
/// The detail may omit pictures, so the card's are kept. When the detail is
/// still missing manual data, the card's (already backfilled) identity fields
/// win where present.
pub fn prepare_detail(shown: &Transaction, mut detail: Transaction) -> Transaction {
    detail.pictures = shown.pictures.clone();
    if detail.needs_backfill() {
        detail.dispatch_id = shown.dispatch_id.clone().or(detail.dispatch_id);
        detail.plate_number = shown.plate_number.clone().or(detail.plate_number);
        detail.tag_id = shown.tag_id.clone().or(detail.tag_id);
    }
    detail
}

/// RFID tags offered by the completion form.
///
/// Tags of transactions that have not started an exit, unique, in listing
/// order. The edited transaction's own tag is prepended when it is mid-exit.
pub fn available_rfid_tags(all: &[Transaction], editing: Option<&Transaction>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in all.iter().filter(|t| t.exit_status.is_none()).filter_map(|t| t.tag_id.as_ref()) {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }

    if let Some(tag) = editing.filter(|t| t.has_open_exit()).and_then(|t| t.tag_id.as_ref()) {
        if !tags.contains(tag) {
            tags.insert(0, tag.clone());
        }
    }
    tags
}
