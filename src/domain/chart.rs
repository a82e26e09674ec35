// Chart series domain model
use serde::Serialize;

/// One point of the volume/speed chart, derived from a raw traffic record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub volume: Option<f64>,
    pub speed: Option<f64>,
    /// Epoch milliseconds of the record start, 0 when unknown
    pub sort_key: i64,
}

impl ChartPoint {
    pub fn new(label: String, volume: Option<f64>, speed: Option<f64>, sort_key: i64) -> Self {
        Self {
            label,
            volume,
            speed,
            sort_key,
        }
    }
}
