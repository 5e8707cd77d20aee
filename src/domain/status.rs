//! Transaction status codes and their operator-facing translation
//!
//! Every function here is total: codes outside the known set map to a
//! documented fallback instead of failing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Status of one leg (entry or exit) of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    CapturedAwaitingManualData,
    EntryCompletedAwaitingManualData,
    ExitCompletedAwaitingManualData,
    ManuallyVerified,
    /// Any code the backend sends that this client does not know
    Unknown(String),
}

impl std::str::FromStr for Status {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "SUCCESS" => Status::Success,
            "CAPTURED_AWAITING_MANUAL_DATA" => Status::CapturedAwaitingManualData,
            "ENTRY_COMPLETED_AWAITING_MANUAL_DATA" => Status::EntryCompletedAwaitingManualData,
            "EXIT_COMPLETED_AWAITING_MANUAL_DATA" => Status::ExitCompletedAwaitingManualData,
            "MANUALLY_VERIFIED" => Status::ManuallyVerified,
            other => Status::Unknown(other.to_string()),
        })
    }
}

impl Status {
    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            Status::Success => "SUCCESS",
            Status::CapturedAwaitingManualData => "CAPTURED_AWAITING_MANUAL_DATA",
            Status::EntryCompletedAwaitingManualData => "ENTRY_COMPLETED_AWAITING_MANUAL_DATA",
            Status::ExitCompletedAwaitingManualData => "EXIT_COMPLETED_AWAITING_MANUAL_DATA",
            Status::ManuallyVerified => "MANUALLY_VERIFIED",
            Status::Unknown(s) => s,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        *self == Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse::<Status>().unwrap_or_else(|never| match never {}))
    }
}

/// Which leg of a transaction a status belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Entry,
    Exit,
}

/// Severity color of a status badge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    Green,
    Yellow,
    Orange,
    Blue,
    /// Neutral fallback for unknown codes
    Gray,
}

impl Badge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::Green => "green",
            Badge::Yellow => "yellow",
            Badge::Orange => "orange",
            Badge::Blue => "blue",
            Badge::Gray => "gray",
        }
    }
}

/// Short label for an entry status; unknown codes come back unchanged
pub fn translate_entry(status: &Status) -> &str {
    match status {
        Status::Success => "SUCCESS",
        Status::CapturedAwaitingManualData => "PENDING DATA",
        Status::EntryCompletedAwaitingManualData => "WAIT ENTRYDATA",
        Status::ManuallyVerified => "VERIFIED",
        other => other.as_str(),
    }
}

/// Short label for an exit status; unknown codes come back unchanged
pub fn translate_exit(status: &Status) -> &str {
    match status {
        Status::Success => "SUCCESS",
        Status::CapturedAwaitingManualData => "PENDING DATA",
        Status::ExitCompletedAwaitingManualData => "WAIT EXITDATA",
        Status::ManuallyVerified => "VERIFIED",
        other => other.as_str(),
    }
}

/// Label for the given side
pub fn translate(status: &Status, side: Side) -> &str {
    match side {
        Side::Entry => translate_entry(status),
        Side::Exit => translate_exit(status),
    }
}

/// Badge color for a status on one side.
///
/// The "completed, awaiting data" code only has a color on its own side;
/// on the opposite side it is as unknown as any foreign code.
pub fn badge_class(status: &Status, side: Side) -> Badge {
    match (status, side) {
        (Status::Success, _) => Badge::Green,
        (Status::CapturedAwaitingManualData, _) => Badge::Yellow,
        (Status::EntryCompletedAwaitingManualData, Side::Entry) => Badge::Orange,
        (Status::ExitCompletedAwaitingManualData, Side::Exit) => Badge::Orange,
        (Status::ManuallyVerified, _) => Badge::Blue,
        _ => Badge::Gray,
    }
}

/// Operator attention rank, lower is more urgent
pub fn priority(status: &Status) -> u8 {
    match status {
        Status::CapturedAwaitingManualData => 1,
        Status::EntryCompletedAwaitingManualData | Status::ExitCompletedAwaitingManualData => 2,
        Status::ManuallyVerified => 3,
        Status::Success => 4,
        Status::Unknown(_) => 5,
    }
}

pub fn requires_manual_intervention(status: &Status) -> bool {
    matches!(
        status,
        Status::CapturedAwaitingManualData
            | Status::EntryCompletedAwaitingManualData
            | Status::ExitCompletedAwaitingManualData
    )
}

pub fn description(status: &Status) -> &'static str {
    match status {
        Status::Success => "Transaction completed successfully",
        Status::CapturedAwaitingManualData => "Vehicle captured, waiting for manual data entry",
        Status::EntryCompletedAwaitingManualData => "Entry completed, awaiting manual verification",
        Status::ExitCompletedAwaitingManualData => "Exit completed, awaiting manual verification",
        Status::ManuallyVerified => "Transaction has been manually verified",
        Status::Unknown(_) => "Unknown status",
    }
}
