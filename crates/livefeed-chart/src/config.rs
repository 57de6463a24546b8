/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed chart runner configuration
[POS]:    Configuration layer - endpoints and series setup
[UPDATE]: When adding new configuration options
*/

use std::time::Duration;

use livefeed_adapter::{ClientConfig, DEFAULT_API_BASE_URL, DEFAULT_STREAM_URL, Interval};
use serde::{Deserialize, Serialize};

use crate::error::ChartError;

/// Top-level configuration for the chart runner
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChartConfig {
    /// Streaming endpoint (`ws://` or `wss://`)
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    /// Snapshot API root, including any path prefix
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub http: HttpConfig,
    /// Delay between kline polls for each active series
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Series to chart
    #[serde(default)]
    pub series: Vec<SeriesConfig>,
}

/// HTTP timeouts for snapshot calls
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// One (market, interval) pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SeriesConfig {
    /// Market identifier (e.g., "SOL_USDC")
    pub market: String,
    #[serde(default = "default_interval")]
    pub interval: Interval,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            stream_url: default_stream_url(),
            api_base_url: default_api_base_url(),
            http: HttpConfig::default(),
            poll_interval_ms: default_poll_interval_ms(),
            series: Vec::new(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_stream_url() -> String {
    DEFAULT_STREAM_URL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_interval() -> Interval {
    Interval::OneMinute
}

impl ChartConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.http.timeout_secs),
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
        }
    }

    /// Distinct markets across all series, in first-seen order.
    pub fn markets(&self) -> Vec<String> {
        let mut markets: Vec<String> = Vec::new();
        for series in &self.series {
            if !markets.contains(&series.market) {
                markets.push(series.market.clone());
            }
        }
        markets
    }

    pub fn validate(&self) -> Result<(), ChartError> {
        if self.series.is_empty() {
            return Err(ChartError::Config("at least one series is required".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ChartError::Config("poll_interval_ms must be positive".to_string()));
        }
        if let Some(series) = self.series.iter().find(|series| series.market.trim().is_empty()) {
            return Err(ChartError::Config(format!(
                "series with interval {} has an empty market",
                series.interval
            )));
        }
        if !(self.stream_url.starts_with("ws://") || self.stream_url.starts_with("wss://")) {
            return Err(ChartError::Config(format!(
                "stream_url must be ws:// or wss://, got `{}`",
                self.stream_url
            )));
        }
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(ChartError::Config(format!(
                "api_base_url must be http:// or https://, got `{}`",
                self.api_base_url
            )));
        }
        Ok(())
    }
}
