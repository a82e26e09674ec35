// View models and HTML rendering for the dashboard page
use crate::application::data_shaper::{format_label, parse_timestamp};
use crate::domain::chart::ChartPoint;
use crate::domain::dashboard::DashboardSnapshot;
use crate::domain::time_range::Preset;
use crate::domain::traffic::{RecordsPayload, TrafficRecord};
use askama::Template;
use chrono::Utc;

const PLACEHOLDER: &str = "—";

// Plot area inside the 800x300 SVG viewBox; the margins hold the two Y axes
const PLOT_LEFT: f64 = 60.0;
const PLOT_RIGHT: f64 = 740.0;
const PLOT_TOP: f64 = 20.0;
const PLOT_BOTTOM: f64 = 280.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub title: &'static str,
    pub value: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub period: String,
    pub cars_detected: String,
    pub average_speed: String,
}

/// Summary cards: volume, speed, peak hours, congestion
pub fn cards(snapshot: &DashboardSnapshot) -> Vec<Card> {
    let stats = snapshot.stats.as_ref();
    let peaks = snapshot
        .peak_hours
        .as_ref()
        .map(|p| p.peak_hours.as_slice())
        .unwrap_or_default();
    let congestion = snapshot.congestion.as_ref();

    vec![
        Card {
            title: "Total Traffic Volume",
            value: stats
                .and_then(|s| s.total_vehicle_count)
                .map(format_count)
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            detail: None,
        },
        Card {
            title: "Average Speed",
            value: stats
                .and_then(|s| s.average_speed)
                .map(format_speed)
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            detail: None,
        },
        Card {
            title: "Peak Hours",
            value: if peaks.is_empty() {
                PLACEHOLDER.to_string()
            } else {
                peaks
                    .iter()
                    .map(|p| p.hour.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            },
            detail: peaks
                .first()
                .map(|p| format!("{} vehicles at peak", format_count(p.vehicle_count))),
        },
        Card {
            title: "Congestion Index",
            value: congestion
                .map(|c| format!("{}%", format_decimal(c.congestion_percentage)))
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            detail: congestion.map(|c| c.status.clone()),
        },
    ]
}

/// One row per raw record, ordered by start time like the chart
pub fn table_rows(snapshot: &DashboardSnapshot) -> Vec<TableRow> {
    let records = match &snapshot.records {
        Some(RecordsPayload::Records { traffic_records }) => traffic_records,
        _ => return Vec::new(),
    };

    let mut ordered: Vec<&TrafficRecord> = records.iter().collect();
    ordered.sort_by_key(|r| {
        r.start_time
            .as_deref()
            .and_then(parse_timestamp)
            .map(|t| t.timestamp_millis())
            .unwrap_or(0)
    });

    ordered
        .into_iter()
        .map(|r| TableRow {
            period: format!(
                "{} - {}",
                format_label(r.start_time.as_deref(), &Utc),
                format_label(r.end_time.as_deref(), &Utc)
            ),
            cars_detected: r
                .vehicle_count
                .map(format_count)
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            average_speed: r
                .average_speed
                .map(format_speed)
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
        })
        .collect()
}

/// 24685 -> "24,685"
pub fn format_count(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{}", rounded.abs() as u64);
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

pub fn format_speed(value: f64) -> String {
    format!("{} km/h", format_decimal(value))
}

/// At most one decimal, dropped when it is zero
fn format_decimal(value: f64) -> String {
    let tenths = (value * 10.0).round() / 10.0;
    if tenths.fract() == 0.0 {
        format!("{:.0}", tenths)
    } else {
        format!("{:.1}", tenths)
    }
}

/// Volume and speed series with the value range of each, for a chart with a
/// vehicle-count axis on the left and a speed axis on the right.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartView {
    pub points: Vec<ChartPoint>,
    /// `(min, max)` of the present volumes, `None` when there are none
    pub volume: Option<(f64, f64)>,
    pub speed: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisTick {
    pub y: f64,
    pub label: String,
}

impl ChartView {
    pub fn new(points: &[ChartPoint]) -> Self {
        Self {
            points: points.to_vec(),
            volume: bounds(points.iter().filter_map(|p| p.volume)),
            speed: bounds(points.iter().filter_map(|p| p.speed)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn volume_line(&self) -> String {
        self.polyline(self.volume, |p| p.volume)
    }

    pub fn speed_line(&self) -> String {
        self.polyline(self.speed, |p| p.speed)
    }

    pub fn volume_ticks(&self) -> Vec<AxisTick> {
        ticks(self.volume, format_count)
    }

    pub fn speed_ticks(&self) -> Vec<AxisTick> {
        ticks(self.speed, format_decimal)
    }

    pub fn first_label(&self) -> &str {
        self.points.first().map(|p| p.label.as_str()).unwrap_or_default()
    }

    pub fn last_label(&self) -> &str {
        self.points.last().map(|p| p.label.as_str()).unwrap_or_default()
    }

    /// SVG polyline coordinates for one series. Missing values are skipped.
    fn polyline(
        &self,
        bounds: Option<(f64, f64)>,
        value: impl Fn(&ChartPoint) -> Option<f64>,
    ) -> String {
        let Some((min, max)) = bounds else {
            return String::new();
        };
        let step = if self.points.len() > 1 {
            (PLOT_RIGHT - PLOT_LEFT) / (self.points.len() - 1) as f64
        } else {
            0.0
        };

        self.points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                value(p).map(|v| format!("{:.1},{:.1}", PLOT_LEFT + i as f64 * step, scale(v, min, max)))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((min, max)) => Some((min.min(v), max.max(v))),
    })
}

/// Y coordinate of `value`; a flat series sits on the middle line
fn scale(value: f64, min: f64, max: f64) -> f64 {
    if max > min {
        PLOT_BOTTOM - (value - min) / (max - min) * (PLOT_BOTTOM - PLOT_TOP)
    } else {
        (PLOT_TOP + PLOT_BOTTOM) / 2.0
    }
}

/// Max, midpoint and min labels, top to bottom
fn ticks(bounds: Option<(f64, f64)>, label: fn(f64) -> String) -> Vec<AxisTick> {
    match bounds {
        None => Vec::new(),
        Some((min, max)) if max <= min => vec![AxisTick {
            y: scale(min, min, max),
            label: label(min),
        }],
        Some((min, max)) => [max, (min + max) / 2.0, min]
            .into_iter()
            .map(|v| AxisTick {
                y: scale(v, min, max),
                label: label(v),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresetLink {
    pub value: &'static str,
    pub label: &'static str,
    pub active: bool,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardPage {
    presets: Vec<PresetLink>,
    range_text: String,
    custom_from: String,
    custom_to: String,
    /// Date picker for the day preset, `None` for the other presets
    day: Option<String>,
    error: Option<String>,
    notice: Option<String>,
    cards: Vec<Card>,
    chart: Option<ChartView>,
    rows: Vec<TableRow>,
}

fn range_text(snapshot: &DashboardSnapshot) -> String {
    match &snapshot.range {
        Some(range) => format!(
            "{} to {}{}",
            range.start().format("%Y-%m-%d %H:%M"),
            range.end().format("%Y-%m-%d %H:%M"),
            if snapshot.loading { " (loading…)" } else { "" }
        ),
        None if snapshot.filter.preset == Preset::Custom => {
            "Select both dates to load a custom range.".to_string()
        }
        None => "No data loaded yet.".to_string(),
    }
}

pub fn render_page(snapshot: &DashboardSnapshot) -> Result<String, askama::Error> {
    let filter = &snapshot.filter;
    let day = (filter.preset == Preset::Day).then(|| {
        filter
            .day
            .or_else(|| snapshot.range.map(|r| r.start().date_naive()))
            .map(|d| d.to_string())
            .unwrap_or_default()
    });
    let chart = ChartView::new(&snapshot.chart);

    DashboardPage {
        presets: Preset::ALL
            .into_iter()
            .map(|preset| PresetLink {
                value: preset.as_str(),
                label: preset.label(),
                active: preset == filter.preset,
            })
            .collect(),
        range_text: range_text(snapshot),
        custom_from: filter.custom.from().map(|d| d.to_string()).unwrap_or_default(),
        custom_to: filter.custom.to().map(|d| d.to_string()).unwrap_or_default(),
        day,
        error: snapshot.error.clone(),
        notice: snapshot.notice.clone(),
        cards: cards(snapshot),
        chart: (!chart.is_empty()).then_some(chart),
        rows: table_rows(snapshot),
    }
    .render()
}
