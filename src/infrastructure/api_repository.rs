// Traffic API repository implementation
use crate::application::traffic_repository::{FetchError, TrafficRepository};
use crate::domain::time_range::TimeRange;
use crate::domain::traffic::{
    Congestion, CongestionQuery, JamsPayload, PeakHours, RecordsPayload, TrafficStats,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

type Params<'a> = [(&'a str, Option<String>)];

#[derive(Debug, Clone)]
pub struct ApiRepository {
    base_url: Option<String>,
    client: reqwest::Client,
}

impl ApiRepository {
    /// A missing base URL is not fatal here: every request fails with
    /// [`FetchError::MissingBaseUrl`] instead.
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            client,
        })
    }

    fn build_url(&self, endpoint: &str, params: &Params<'_>) -> Result<String, FetchError> {
        let base = self.base_url.as_deref().ok_or(FetchError::MissingBaseUrl)?;

        let query = params
            .iter()
            .filter_map(|(key, value)| {
                value
                    .as_ref()
                    .map(|v| format!("{}={}", key, urlencoding::encode(v)))
            })
            .collect::<Vec<_>>()
            .join("&");

        if query.is_empty() {
            Ok(format!("{}{}", base, endpoint))
        } else {
            Ok(format!("{}{}?{}", base, endpoint, query))
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &Params<'_>,
    ) -> Result<T, FetchError> {
        let result = match self.build_url(endpoint, params) {
            Ok(url) => self.execute(endpoint, &url).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::error!(endpoint, error = %e, "Traffic API request failed");
        }
        result
    }

    async fn execute<T: DeserializeOwned>(&self, endpoint: &str, url: &str) -> Result<T, FetchError> {
        tracing::debug!("Requesting {}", url);

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        decode_response(endpoint, status, &body)
    }
}

/// Apply the API's error convention: an `error` field means failure at any
/// status, any other non-2xx answer is a plain HTTP failure.
fn decode_response<T: DeserializeOwned>(
    endpoint: &str,
    status: StatusCode,
    body: &str,
) -> Result<T, FetchError> {
    let value = serde_json::from_str::<serde_json::Value>(body).ok();

    if let Some(message) = value
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.as_str())
    {
        return Err(FetchError::Api {
            status: (!status.is_success()).then(|| status.as_u16()),
            message: message.to_string(),
        });
    }

    if !status.is_success() {
        return Err(FetchError::Http {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        });
    }

    let value = value.ok_or_else(|| FetchError::UnexpectedPayload {
        endpoint: endpoint.to_string(),
        detail: "response body is not JSON".to_string(),
    })?;

    serde_json::from_value(value).map_err(|e| FetchError::UnexpectedPayload {
        endpoint: endpoint.to_string(),
        detail: e.to_string(),
    })
}

/// ISO-8601 with millisecond precision, e.g. 2024-03-24T14:00:00.000Z
fn iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `/traffic_records` only accepts "YYYY-MM-DD HH:MM:SS"
fn sql(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[async_trait]
impl TrafficRepository for ApiRepository {
    async fn traffic_stats(&self, range: &TimeRange) -> Result<TrafficStats, FetchError> {
        self.request(
            "/stats",
            &[
                ("start_datetime", Some(iso(range.start()))),
                ("end_datetime", Some(iso(range.end()))),
            ],
        )
        .await
    }

    async fn peak_hours(&self, range: &TimeRange) -> Result<PeakHours, FetchError> {
        self.request(
            "/peak_hours",
            &[
                ("start", Some(iso(range.start()))),
                ("end", Some(iso(range.end()))),
            ],
        )
        .await
    }

    async fn congestion(
        &self,
        range: &TimeRange,
        query: &CongestionQuery,
    ) -> Result<Congestion, FetchError> {
        self.request(
            "/congestion",
            &[
                ("traffic_cam_id", Some(query.traffic_cam_id.to_string())),
                ("start_datetime", Some(iso(range.start()))),
                ("end_datetime", Some(iso(range.end()))),
                ("speed_threshold", query.speed_threshold.map(|s| s.to_string())),
            ],
        )
        .await
    }

    async fn traffic_records(&self, range: &TimeRange) -> Result<RecordsPayload, FetchError> {
        self.request(
            "/traffic_records",
            &[
                ("start_datetime", Some(sql(range.start()))),
                ("end_datetime", Some(sql(range.end()))),
            ],
        )
        .await
    }

    async fn traffic_jams(
        &self,
        range: &TimeRange,
        speed_threshold: Option<f64>,
    ) -> Result<JamsPayload, FetchError> {
        self.request(
            "/traffic_jams",
            &[
                ("start_datetime", Some(iso(range.start()))),
                ("end_datetime", Some(iso(range.end()))),
                ("speed_threshold", speed_threshold.map(|s| s.to_string())),
            ],
        )
        .await
    }
}
