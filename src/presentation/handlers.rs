// HTTP request handlers
use crate::domain::dashboard::DashboardSnapshot;
use crate::domain::time_range::Preset;
use crate::domain::traffic::JamsPayload;
use crate::presentation::app_state::AppState;
use crate::presentation::error::ApiError;
use crate::presentation::view::render_page;
use axum::{
    extract::{Query, State},
    response::Html,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

/// Filter change, as JSON body or page query string. Dates are `YYYY-MM-DD`;
/// blank values count as unset since HTML forms submit empty inputs.
#[derive(Debug, Default, Deserialize)]
pub struct FilterRequest {
    pub preset: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(flatten)]
    pub filter: FilterRequest,
    pub refresh: Option<String>,
}

fn parse_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("invalid {}: {}", field, v))),
    }
}

impl FilterRequest {
    fn is_empty(&self) -> bool {
        [&self.preset, &self.from, &self.to, &self.date]
            .iter()
            .all(|v| v.as_deref().map(str::trim).unwrap_or_default().is_empty())
    }
}

/// Apply a filter change. Returns `None` when the request changes nothing.
async fn apply_filter(
    state: &AppState,
    request: &FilterRequest,
) -> Result<Option<Arc<DashboardSnapshot>>, ApiError> {
    if request.is_empty() {
        return Ok(None);
    }

    let preset = request
        .preset
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(str::parse::<Preset>)
        .transpose()?;
    let from = parse_date("from", request.from.as_deref())?;
    let to = parse_date("to", request.to.as_deref())?;
    let day = parse_date("date", request.date.as_deref())?;

    let dashboard = &state.dashboard;
    let snapshot = match (preset, day) {
        (Some(Preset::Day) | None, Some(day)) => dashboard.select_day(day).await,
        (Some(Preset::Custom) | None, _) if from.is_some() || to.is_some() => {
            dashboard.select_custom(from, to).await
        }
        (Some(preset), _) => dashboard.select_preset(preset).await,
        (None, None) => return Ok(None),
    };
    Ok(Some(snapshot))
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Server-rendered dashboard; the query string may change the filter or refresh first
pub async fn dashboard_page(
    Query(query): Query<PageQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, ApiError> {
    let snapshot = match apply_filter(&state, &query.filter).await? {
        Some(snapshot) => snapshot,
        None if query.refresh.is_some() => state.dashboard.refresh().await,
        None => state.dashboard.snapshot(),
    };

    Ok(Html(render_page(&snapshot)?))
}

/// Current dashboard snapshot
pub async fn get_dashboard(State(state): State<Arc<AppState>>) -> Json<DashboardSnapshot> {
    Json(DashboardSnapshot::clone(&state.dashboard.snapshot()))
}

/// Change the time filter and return the resulting snapshot
pub async fn update_filter(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FilterRequest>,
) -> Result<Json<DashboardSnapshot>, ApiError> {
    let snapshot = match apply_filter(&state, &request).await? {
        Some(snapshot) => snapshot,
        None => return Err(ApiError::BadRequest("empty filter".to_string())),
    };
    Ok(Json(DashboardSnapshot::clone(&snapshot)))
}

/// Re-run the fetch cycle for the current range
pub async fn refresh(State(state): State<Arc<AppState>>) -> Json<DashboardSnapshot> {
    let snapshot = state.dashboard.refresh().await;
    Json(DashboardSnapshot::clone(&snapshot))
}

/// Jam alerts for the current range
pub async fn traffic_jams(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JamsPayload>, ApiError> {
    match state.dashboard.traffic_jams().await {
        Ok(Some(jams)) => Ok(Json(jams)),
        Ok(None) => Err(ApiError::Conflict(
            "Select both dates of the custom range first".to_string(),
        )),
        Err(e) => {
            tracing::error!("Error fetching traffic jams: {}", e);
            Err(e.into())
        }
    }
}
