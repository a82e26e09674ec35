// Data shaper - Converts raw traffic records into chart points
use crate::domain::chart::ChartPoint;
use crate::domain::traffic::{RecordsPayload, TrafficRecord};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Label used when a record has no timestamp at all
pub const MISSING_LABEL: &str = "N/A";

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Shape a records payload into chart points, labelled in UTC.
pub fn shape(payload: &RecordsPayload) -> Vec<ChartPoint> {
    shape_in(payload, &Utc)
}

/// Shape a records payload, rendering labels in `tz`.
///
/// A message payload is the backend's "no data" answer and yields no points.
/// Records come back sorted by start time; records without a usable start
/// time sort first and keep their input order.
pub fn shape_in<Tz: TimeZone>(payload: &RecordsPayload, tz: &Tz) -> Vec<ChartPoint>
where
    Tz::Offset: std::fmt::Display,
{
    let records = match payload {
        RecordsPayload::Records { traffic_records } => traffic_records,
        RecordsPayload::Message { .. } => return Vec::new(),
    };

    let mut points: Vec<ChartPoint> = records.iter().map(|r| to_point(r, tz)).collect();
    // sort_by_key is stable, ties keep input order
    points.sort_by_key(|p| p.sort_key);
    points
}

fn to_point<Tz: TimeZone>(record: &TrafficRecord, tz: &Tz) -> ChartPoint
where
    Tz::Offset: std::fmt::Display,
{
    let start = record.start_time.as_deref().and_then(parse_timestamp);

    ChartPoint::new(
        format_label(record.start_time.as_deref(), tz),
        record.vehicle_count,
        record.average_speed,
        start.map(|t| t.timestamp_millis()).unwrap_or(0),
    )
}

/// Render a timestamp as e.g. "Mar 24, 10:00". Unparseable input is echoed back.
pub fn format_label<Tz: TimeZone>(raw: Option<&str>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match raw {
        None => MISSING_LABEL.to_string(),
        Some(s) if s.trim().is_empty() => MISSING_LABEL.to_string(),
        Some(s) => match parse_timestamp(s) {
            Some(t) => t.with_timezone(tz).format("%b %-d, %H:%M").to_string(),
            None => s.to_string(),
        },
    }
}

/// Parse the timestamp forms the traffic API is known to emit. Naive
/// timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    // Flask's JSON encoder emits HTTP dates: "Sun, 24 Mar 2024 10:00:00 GMT"
    if let Ok(t) = DateTime::parse_from_rfc2822(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
