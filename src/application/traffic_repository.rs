// Repository trait for traffic API access
use crate::domain::time_range::TimeRange;
use crate::domain::traffic::{
    Congestion, CongestionQuery, JamsPayload, PeakHours, RecordsPayload, TrafficStats,
};
use async_trait::async_trait;

/// Every way a fetch can fail. `Display` is the message shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("API Base URL is not configured.")]
    MissingBaseUrl,

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{}", api_error_message(.status, .message))]
    Api { status: Option<u16>, message: String },

    #[error("HTTP Error: {status} {reason}")]
    Http { status: u16, reason: String },

    #[error("Unexpected response from {endpoint}: {detail}")]
    UnexpectedPayload { endpoint: String, detail: String },
}

fn api_error_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("API Error ({}): {}", status, message),
        None => format!("API Error: {}", message),
    }
}

#[async_trait]
pub trait TrafficRepository: Send + Sync {
    /// Average speed and total vehicle count
    async fn traffic_stats(&self, range: &TimeRange) -> Result<TrafficStats, FetchError>;

    async fn peak_hours(&self, range: &TimeRange) -> Result<PeakHours, FetchError>;

    /// Congestion percentage for a single camera
    async fn congestion(
        &self,
        range: &TimeRange,
        query: &CongestionQuery,
    ) -> Result<Congestion, FetchError>;

    /// Raw records, or a "no data" message
    async fn traffic_records(&self, range: &TimeRange) -> Result<RecordsPayload, FetchError>;

    async fn traffic_jams(
        &self,
        range: &TimeRange,
        speed_threshold: Option<f64>,
    ) -> Result<JamsPayload, FetchError>;
}
