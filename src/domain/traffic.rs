// Traffic API domain models
use serde::{Deserialize, Serialize};

/// A single raw record as stored by the camera backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub traffic_cam_id: Option<i64>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub vehicle_count: Option<f64>,
    /// km/h
    #[serde(default)]
    pub average_speed: Option<f64>,
}

/// Aggregate statistics for a range. Both values are null when there is no data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficStats {
    #[serde(default)]
    pub average_speed: Option<f64>,
    #[serde(default)]
    pub total_vehicle_count: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakHour {
    /// e.g. "08:00 - 09:00"
    pub hour: String,
    pub vehicle_count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakHours {
    pub peak_hours: Vec<PeakHour>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Congestion {
    pub congestion_percentage: f64,
    /// Free text from the backend, e.g. "congestionado", "fluido", "sin datos"
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficJam {
    pub traffic_cam_id: i64,
    pub event_time: String,
}

/// `/traffic_records` answers either with records or with a "no data" message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordsPayload {
    Records { traffic_records: Vec<TrafficRecord> },
    Message { message: String },
}

/// `/traffic_jams` answers either with jam alerts or with a "no data" message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JamsPayload {
    Jams { traffic_jams: Vec<TrafficJam> },
    Message { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CongestionQuery {
    pub traffic_cam_id: i64,
    pub speed_threshold: Option<f64>,
}
