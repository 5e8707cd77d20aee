//! Backend entities consumed by the dashboard
//!
//! Wire names follow the REST backend (camelCase). Optional text fields pass
//! through `empty_as_none`, so an empty string and a missing field are the same
//! absent value everywhere past the deserializer.

use crate::domain::status::{Side, Status};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Newtype wrapper for transaction IDs to provide type safety
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub i64);

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for lane (gate) IDs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneId(pub i64);

impl std::fmt::Display for LaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for camera IDs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub i64);

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Treat "" (and whitespace-only) the same as a missing value
pub fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn status_or_none<'de, D>(deserializer: D) -> Result<Option<Status>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = empty_as_none(deserializer)?;
    Ok(value.map(|raw| raw.parse::<Status>().unwrap_or_else(|never| match never {})))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(parse_timestamp))
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse a backend timestamp.
///
/// Accepts RFC 3339, naive date-times (`T` or space separated, any fraction
/// length) which are taken as UTC, and bare dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let normalized = raw.replacen(' ', "T", 1);
    if let Ok(ts) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// A captured still belonging to a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Picture {
    pub id: i64,
    #[serde(default)]
    pub lane_id: Option<LaneId>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub date_time: Option<DateTime<Utc>>,
}

/// One vehicle's pass through the facility
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireTransaction")]
pub struct Transaction {
    pub id: TransactionId,
    /// Physical RFID identifier linking entry and exit records
    pub tag_id: Option<String>,
    pub dispatch_id: Option<String>,
    pub plate_number: Option<String>,
    pub date_time: Option<DateTime<Utc>>,
    pub entry_lane_id: Option<LaneId>,
    pub exit_lane_id: Option<LaneId>,
    pub start_entry_time: Option<DateTime<Utc>>,
    pub finish_entry_time: Option<DateTime<Utc>>,
    pub start_exit_time: Option<DateTime<Utc>>,
    pub finish_exit_time: Option<DateTime<Utc>>,
    pub entry_status: Option<Status>,
    pub exit_status: Option<Status>,
    /// Capture order
    pub pictures: Vec<Picture>,
    pub reason: Option<String>,
}

/// `Transaction` as the backend sends it.
///
/// Listings may carry each leg timestamp under two keys (`startExitTime` and
/// `exitStartTime`). They are distinct fields here; the `exit...` spelling wins
/// when both are present.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTransaction {
    id: TransactionId,
    #[serde(default, deserialize_with = "empty_as_none")]
    tag_id: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    dispatch_id: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    plate_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    entry_lane_id: Option<LaneId>,
    #[serde(default)]
    exit_lane_id: Option<LaneId>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    start_entry_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    entry_start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    finish_entry_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    entry_finish_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    start_exit_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    exit_start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    finish_exit_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    exit_finish_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "status_or_none")]
    entry_status: Option<Status>,
    #[serde(default, deserialize_with = "status_or_none")]
    exit_status: Option<Status>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pictures: Vec<Picture>,
    #[serde(default, deserialize_with = "empty_as_none")]
    reason: Option<String>,
}

impl From<WireTransaction> for Transaction {
    fn from(wire: WireTransaction) -> Self {
        Self {
            id: wire.id,
            tag_id: wire.tag_id,
            dispatch_id: wire.dispatch_id,
            plate_number: wire.plate_number,
            date_time: wire.date_time,
            entry_lane_id: wire.entry_lane_id,
            exit_lane_id: wire.exit_lane_id,
            start_entry_time: wire.entry_start_time.or(wire.start_entry_time),
            finish_entry_time: wire.entry_finish_time.or(wire.finish_entry_time),
            start_exit_time: wire.exit_start_time.or(wire.start_exit_time),
            finish_exit_time: wire.exit_finish_time.or(wire.finish_exit_time),
            entry_status: wire.entry_status,
            exit_status: wire.exit_status,
            pictures: wire.pictures,
            reason: wire.reason,
        }
    }
}

impl Transaction {
    #[inline]
    pub fn is_entry_complete(&self) -> bool {
        self.entry_status.as_ref().is_some_and(Status::is_success)
    }

    #[inline]
    pub fn is_exit_complete(&self) -> bool {
        self.exit_status.as_ref().is_some_and(Status::is_success)
    }

    /// Exit leg has started but not succeeded
    #[inline]
    pub fn has_open_exit(&self) -> bool {
        self.exit_status.as_ref().is_some_and(|s| !s.is_success())
    }

    /// Incomplete-backfill state: open exit with dispatch or plate missing
    pub fn needs_backfill(&self) -> bool {
        self.has_open_exit() && (self.dispatch_id.is_none() || self.plate_number.is_none())
    }

    pub fn status(&self, side: Side) -> Option<&Status> {
        match side {
            Side::Entry => self.entry_status.as_ref(),
            Side::Exit => self.exit_status.as_ref(),
        }
    }

    /// The leg a gate card watches is not yet successful
    pub fn needs_attention(&self, side: Side) -> bool {
        !self.status(side).is_some_and(Status::is_success)
    }

    pub fn first_picture(&self) -> Option<&Picture> {
        self.pictures.first()
    }
}

/// A physical entry or exit gate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lane {
    pub id: LaneId,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub type_name: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub ip_address: Option<String>,
    /// Hardware parameters the dashboard does not interpret
    #[serde(flatten)]
    pub hardware: HashMap<String, serde_json::Value>,
}

impl Lane {
    /// Exit gates carry "OUT" in their type name; everything else is an entry gate
    pub fn is_exit(&self) -> bool {
        self.type_name.as_deref().is_some_and(|t| t.contains("OUT"))
    }

    pub fn side(&self) -> Side {
        if self.is_exit() {
            Side::Exit
        } else {
            Side::Entry
        }
    }

    /// Name used in `/Transaction/gate/{name}/last`
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("GATE {}", self.id))
    }

    pub fn type_label(&self) -> String {
        self.type_name.clone().unwrap_or_else(|| format!("GATE {}", self.id))
    }

    pub fn is_gate_in(&self) -> bool {
        self.type_name.as_deref() == Some("GATE IN")
    }
}

/// Entry from `GET /Lane/lookup`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneLookup {
    pub id: LaneId,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub name: Option<String>,
}

/// Resolved live stream location for a camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// A camera mounted on one lane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
    pub id: CameraId,
    #[serde(default)]
    pub lane_id: Option<LaneId>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub ip_address: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub model: Option<String>,
    /// `url-template;username;password`, template uses `{0}` for the IP
    #[serde(default, deserialize_with = "empty_as_none")]
    pub parameter: Option<String>,
}

impl Camera {
    pub fn stream_endpoint(&self) -> Option<StreamEndpoint> {
        let parameter = self.parameter.as_deref()?;
        let parts: Vec<&str> = parameter.split(';').collect();
        if parts.len() < 3 {
            return None;
        }
        let ip = self.ip_address.as_deref().unwrap_or_default();
        Some(StreamEndpoint {
            url: parts[0].replace("{0}", ip),
            username: parts[1].to_string(),
            password: parts[2].to_string(),
        })
    }
}

/// Cameras mounted on `lane`, in listing order
pub fn cameras_for_lane(cameras: &[Camera], lane: LaneId) -> Vec<Camera> {
    cameras.iter().filter(|c| c.lane_id == Some(lane)).cloned().collect()
}

/// Camera for a transaction's live view: the one on its entry lane, else the first
pub fn camera_for_transaction<'a>(cameras: &'a [Camera], tx: &Transaction) -> Option<&'a Camera> {
    tx.entry_lane_id
        .and_then(|lane| cameras.iter().find(|c| c.lane_id == Some(lane)))
        .or_else(|| cameras.first())
}
