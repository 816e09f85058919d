use crate::application::time_series_store::RetentionPolicy;
use crate::domain::telemetry::TimeWindow;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub driver: DriverSettings,
    #[serde(default)]
    pub chart: ChartSettings,
    #[serde(default)]
    pub feed: FeedSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DriverSettings {
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
    /// Backfill a day of demo history at startup
    #[serde(default)]
    pub seed_demo_history: bool,
    #[serde(default = "default_scheduler_resolution_ms")]
    pub scheduler_resolution_ms: u64,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval_secs(),
            seed_demo_history: false,
            scheduler_resolution_ms: default_scheduler_resolution_ms(),
        }
    }
}

impl DriverSettings {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn scheduler_resolution(&self) -> Duration {
        Duration::from_millis(self.scheduler_resolution_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChartSettings {
    /// Falls back to the driver's update interval when unset
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
    #[serde(default = "default_max_points")]
    pub max_points: usize,
    #[serde(default = "default_window_minutes")]
    pub default_window_minutes: u32,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: None,
            max_points: default_max_points(),
            default_window_minutes: default_window_minutes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FeedSettings {
    #[serde(default)]
    pub influx: Option<InfluxSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub database: String,
    pub retention_policy: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// InfluxQL returning the latest value; `${channel}` is replaced per channel
    #[serde(default = "default_latest_query")]
    pub query: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_update_interval_secs() -> u64 {
    10
}

fn default_scheduler_resolution_ms() -> u64 {
    250
}

fn default_max_points() -> usize {
    500
}

fn default_window_minutes() -> u32 {
    TimeWindow::default().minutes()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_latest_query() -> String {
    "SELECT last(\"value\") FROM \"sensor_data\" WHERE \"channel\"='${channel}'".to_string()
}

impl DashboardConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.retention.validate()?;
        if self.driver.update_interval_secs == 0 || self.driver.scheduler_resolution_ms == 0 {
            anyhow::bail!("driver intervals must be non-zero");
        }
        if self.chart.refresh_interval_secs == Some(0) {
            anyhow::bail!("chart.refresh_interval_secs must be non-zero");
        }
        if TimeWindow::from_minutes(self.chart.default_window_minutes).is_none() {
            anyhow::bail!(
                "chart.default_window_minutes must be one of 1, 10, 60, 1440 (got {})",
                self.chart.default_window_minutes
            );
        }
        if let Some(influx) = &self.feed.influx {
            if influx.poll_interval_secs == 0 {
                anyhow::bail!("feed.influx.poll_interval_secs must be non-zero");
            }
        }
        Ok(())
    }

    pub fn chart_refresh_interval(&self) -> Duration {
        self.chart
            .refresh_interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.driver.update_interval())
    }

    pub fn default_window(&self) -> TimeWindow {
        TimeWindow::from_minutes(self.chart.default_window_minutes).unwrap_or_default()
    }
}

/// Load `config/dashboard.*` (optional) with `DASHBOARD__SECTION__KEY`
/// environment overrides
pub fn load_config() -> anyhow::Result<DashboardConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard").required(false))
        .add_source(
            config::Environment::with_prefix("DASHBOARD")
                .separator("__")
                .try_parsing(true),
        );
    build_config(builder)
}

fn build_config(builder: config::ConfigBuilder<config::builder::DefaultState>) -> anyhow::Result<DashboardConfig> {
    let settings: DashboardConfig = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

/// Replace template variables in a query string
pub fn prepare_query(query: &str, vars: &HashMap<String, String>) -> String {
    let mut result = query.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(source: &str) -> anyhow::Result<DashboardConfig> {
        build_config(
            config::Config::builder().add_source(config::File::from_str(source, config::FileFormat::Toml)),
        )
    }

    #[test]
    fn test_prepare_query() {
        let mut vars = HashMap::new();
        vars.insert("channel".to_string(), "humidity".to_string());

        let query = "SELECT last(value) FROM sensor_data WHERE channel='${channel}'";
        let result = prepare_query(query, &vars);

        assert_eq!(result, "SELECT last(value) FROM sensor_data WHERE channel='humidity'");
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = from_toml("").unwrap();
        assert_eq!(config.retention, RetentionPolicy::default());
        assert_eq!(config.driver.update_interval(), Duration::from_secs(10));
        assert_eq!(config.chart_refresh_interval(), Duration::from_secs(10));
        assert_eq!(config.default_window(), TimeWindow::TenMinutes);
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert!(config.feed.influx.is_none());
    }

    #[test]
    fn test_overrides_and_influx_section() {
        let config = from_toml(
            r#"
            [retention]
            max_samples = 500
            truncate_to = 400

            [chart]
            refresh_interval_secs = 5
            default_window_minutes = 60

            [feed.influx]
            host = "http://influx:8086/"
            token = "secret"
            database = "sensors"
            retention_policy = "autogen"
            "#,
        )
        .unwrap();

        assert_eq!(config.retention.max_samples, 500);
        assert_eq!(config.retention.max_age_minutes, 1440);
        assert_eq!(config.chart_refresh_interval(), Duration::from_secs(5));
        assert_eq!(config.default_window(), TimeWindow::OneHour);
        let influx = config.feed.influx.unwrap();
        assert_eq!(influx.poll_interval_secs, 10);
        assert!(influx.query.contains("${channel}"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(from_toml("[retention]\ntruncate_to = 20000").is_err());
        assert!(from_toml("[chart]\ndefault_window_minutes = 5").is_err());
        assert!(from_toml("[driver]\nupdate_interval_secs = 0").is_err());
    }
}
