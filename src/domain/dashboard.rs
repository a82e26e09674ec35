// Dashboard domain model
use super::chart::ChartPoint;
use super::time_range::{FilterState, TimeRange};
use super::traffic::{Congestion, PeakHours, RecordsPayload, TrafficStats};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const NO_RECORDS_NOTICE: &str = "No traffic records found.";

/// Immutable view of the dashboard. A new snapshot replaces the old one on
/// every change, so readers never observe a half-updated state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub cycle: u64,
    pub filter: FilterState,
    pub range: Option<TimeRange>,
    pub loading: bool,
    pub stats: Option<TrafficStats>,
    pub peak_hours: Option<PeakHours>,
    pub congestion: Option<Congestion>,
    pub records: Option<RecordsPayload>,
    pub chart: Vec<ChartPoint>,
    pub notice: Option<String>,
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Results of one successful fetch cycle
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardData {
    pub stats: TrafficStats,
    pub peak_hours: PeakHours,
    pub congestion: Congestion,
    pub records: RecordsPayload,
    pub chart: Vec<ChartPoint>,
}

impl DashboardSnapshot {
    pub fn empty(filter: FilterState) -> Self {
        Self {
            cycle: 0,
            filter,
            range: None,
            loading: false,
            stats: None,
            peak_hours: None,
            congestion: None,
            records: None,
            chart: Vec::new(),
            notice: None,
            error: None,
            updated_at: None,
        }
    }

    /// Same results, new filter. Used while a custom selection is incomplete.
    pub fn with_filter(&self, filter: FilterState) -> Self {
        Self {
            filter,
            ..self.clone()
        }
    }

    /// Marks a new cycle as in flight; previous results stay visible meanwhile.
    pub fn loading(&self, cycle: u64, filter: FilterState, range: TimeRange) -> Self {
        Self {
            cycle,
            filter,
            range: Some(range),
            loading: true,
            error: None,
            ..self.clone()
        }
    }

    pub fn loaded(&self, data: DashboardData, now: DateTime<Utc>) -> Self {
        let notice = match &data.records {
            RecordsPayload::Message { .. } => Some(NO_RECORDS_NOTICE.to_string()),
            RecordsPayload::Records { .. } => None,
        };

        Self {
            cycle: self.cycle,
            filter: self.filter,
            range: self.range,
            loading: false,
            stats: Some(data.stats),
            peak_hours: Some(data.peak_hours),
            congestion: Some(data.congestion),
            records: Some(data.records),
            chart: data.chart,
            notice,
            error: None,
            updated_at: Some(now),
        }
    }

    /// A failed cycle clears every result slot.
    pub fn failed(&self, message: String, now: DateTime<Utc>) -> Self {
        Self {
            cycle: self.cycle,
            filter: self.filter,
            range: self.range,
            loading: false,
            stats: None,
            peak_hours: None,
            congestion: None,
            records: None,
            chart: Vec::new(),
            notice: None,
            error: Some(message),
            updated_at: Some(now),
        }
    }
}
