use crate::domain::time_range::Preset;
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    /// Host of the traffic API, e.g. http://127.0.0.1:5000
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    /// Camera whose congestion is shown on the dashboard
    #[serde(default = "default_traffic_cam_id")]
    pub traffic_cam_id: i64,
    /// km/h below which traffic counts as congested; the API default applies when unset
    pub speed_threshold: Option<f64>,
    #[serde(default = "default_preset")]
    pub default_preset: Preset,
}

impl ApiSettings {
    /// Configured base URL, ignoring blank values
    pub fn base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            traffic_cam_id: default_traffic_cam_id(),
            speed_threshold: None,
            default_preset: default_preset(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_traffic_cam_id() -> i64 {
    1
}

fn default_preset() -> Preset {
    Preset::Day
}

/// Load `config/dashboard.{toml,yaml,json}` if present, overridden by
/// `TRAFFIC__<SECTION>__<KEY>` environment variables.
pub fn load_config() -> anyhow::Result<AppConfig> {
    let builder = config::Config::builder()
        .add_source(File::with_name("config/dashboard").required(false))
        .add_source(
            Environment::with_prefix("TRAFFIC")
                .separator("__")
                .try_parsing(true),
        );

    build(builder)
}

/// Parse a TOML document, used for inline configuration and tests
pub fn config_from_toml(toml: &str) -> anyhow::Result<AppConfig> {
    build(config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
}

fn build(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<AppConfig> {
    let settings = builder.build()?;
    Ok(settings.try_deserialize()?)
}
