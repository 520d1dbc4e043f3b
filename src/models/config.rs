//! Configuration data model and validation

use crate::logging::{LogFormat, LogLevel};
use crate::types::{AppError, MetricKind, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Per-metric settings: enable flag, cadence and destination file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSettings {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub output: PathBuf,
}

impl MetricSettings {
    /// Default settings for a metric
    pub fn default_for(kind: MetricKind) -> Self {
        let (interval_seconds, output) = match kind {
            MetricKind::Ping => (crate::defaults::PING_INTERVAL_SECS, crate::defaults::PING_OUTPUT),
            MetricKind::Download => (crate::defaults::DOWNLOAD_INTERVAL_SECS, crate::defaults::DOWNLOAD_OUTPUT),
            MetricKind::Upload => (crate::defaults::UPLOAD_INTERVAL_SECS, crate::defaults::UPLOAD_OUTPUT),
        };
        Self {
            enabled: true,
            interval_seconds,
            output: PathBuf::from(output),
        }
    }

    /// Tick period as Duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ping: MetricSettings,
    pub download: MetricSettings,
    pub upload: MetricSettings,

    /// Hosts pinged in addition to the reference endpoint
    #[serde(default)]
    pub additional_ping_hosts: Vec<String>,

    /// Seconds between reference endpoint refreshes, 0 disables
    pub refresh_interval_seconds: u64,

    /// Speed test server list (JSON)
    pub servers_url: String,

    /// Timeout for each HTTP request of the speed test provider
    pub http_timeout_seconds: u64,

    /// Timeout for a single ICMP echo
    pub ping_timeout_ms: u64,

    pub log_level: LogLevel,
    pub log_format: LogFormat,
    pub enable_color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ping: MetricSettings::default_for(MetricKind::Ping),
            download: MetricSettings::default_for(MetricKind::Download),
            upload: MetricSettings::default_for(MetricKind::Upload),
            additional_ping_hosts: Vec::new(),
            refresh_interval_seconds: crate::defaults::REFRESH_INTERVAL_SECS,
            servers_url: crate::defaults::SERVERS_URL.to_string(),
            http_timeout_seconds: crate::defaults::HTTP_TIMEOUT.as_secs(),
            ping_timeout_ms: crate::defaults::PING_TIMEOUT.as_millis() as u64,
            log_level: LogLevel::Info,
            log_format: LogFormat::Console,
            enable_color: true,
        }
    }
}

impl Config {
    /// Settings of one metric
    pub fn metric(&self, kind: MetricKind) -> &MetricSettings {
        match kind {
            MetricKind::Ping => &self.ping,
            MetricKind::Download => &self.download,
            MetricKind::Upload => &self.upload,
        }
    }

    /// Mutable settings of one metric
    pub fn metric_mut(&mut self, kind: MetricKind) -> &mut MetricSettings {
        match kind {
            MetricKind::Ping => &mut self.ping,
            MetricKind::Download => &mut self.download,
            MetricKind::Upload => &mut self.upload,
        }
    }

    /// Metrics that are switched on, in startup order
    pub fn enabled_metrics(&self) -> Vec<MetricKind> {
        MetricKind::ALL
            .into_iter()
            .filter(|kind| self.metric(*kind).enabled)
            .collect()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Refresh period, `None` when periodic refresh is disabled
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_seconds > 0).then(|| Duration::from_secs(self.refresh_interval_seconds))
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        if self.enabled_metrics().is_empty() {
            return Err(AppError::config("All metrics are disabled, nothing to measure"));
        }

        for kind in MetricKind::ALL {
            let settings = self.metric(kind);
            if !settings.enabled {
                continue;
            }
            if settings.interval_seconds == 0 {
                return Err(AppError::config(format!("{} interval must be greater than 0", kind)));
            }
            if settings.interval_seconds > crate::defaults::MAX_INTERVAL_SECS {
                return Err(AppError::config(format!(
                    "{} interval cannot exceed {} seconds",
                    kind,
                    crate::defaults::MAX_INTERVAL_SECS
                )));
            }
            if settings.output.as_os_str().is_empty() {
                return Err(AppError::config(format!("{} output path cannot be empty", kind)));
            }
        }

        for host in &self.additional_ping_hosts {
            if host.trim().is_empty() {
                return Err(AppError::config("Additional ping host cannot be empty"));
            }
        }

        match url::Url::parse(&self.servers_url) {
            Ok(parsed) => {
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(AppError::config(format!(
                        "Server list URL must use http or https: {}",
                        self.servers_url
                    )));
                }
            }
            Err(e) => {
                return Err(AppError::config(format!("Invalid server list URL '{}': {}", self.servers_url, e)));
            }
        }

        if self.http_timeout_seconds == 0 || self.http_timeout_seconds > 300 {
            return Err(AppError::config("HTTP timeout must be between 1 and 300 seconds"));
        }

        if self.refresh_interval_seconds > crate::defaults::MAX_INTERVAL_SECS {
            return Err(AppError::config(format!(
                "Refresh interval cannot exceed {} seconds",
                crate::defaults::MAX_INTERVAL_SECS
            )));
        }

        if self.ping_timeout_ms == 0 {
            return Err(AppError::config("Ping timeout must be greater than 0"));
        }
        // a reply that outlives its cycle would otherwise race the next burst
        if self.ping.enabled && self.ping_timeout_ms >= self.ping.interval_seconds.saturating_mul(1000) {
            return Err(AppError::config(format!(
                "Ping timeout ({} ms) must be shorter than the ping interval ({} s)",
                self.ping_timeout_ms, self.ping.interval_seconds
            )));
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        for kind in MetricKind::ALL {
            let prefix = kind.as_str().to_uppercase();

            if let Some(interval) = env_parse::<u64>(&format!("{}_INTERVAL", prefix))? {
                self.metric_mut(kind).interval_seconds = interval;
            }
            if let Some(disabled) = env_parse::<bool>(&format!("{}_DISABLE", prefix))? {
                self.metric_mut(kind).enabled = !disabled;
            }
            if let Ok(output) = std::env::var(format!("{}_OUTPUT", prefix)) {
                self.metric_mut(kind).output = PathBuf::from(output);
            }
        }

        if let Ok(hosts) = std::env::var("PING_ADDRESS") {
            self.additional_ping_hosts = split_list(&hosts);
        }

        if let Some(refresh) = env_parse::<u64>("REFRESH_INTERVAL")? {
            self.refresh_interval_seconds = refresh;
        }

        if let Ok(servers_url) = std::env::var("SPEEDTEST_SERVERS_URL") {
            self.servers_url = servers_url;
        }

        if let Some(timeout) = env_parse::<u64>("HTTP_TIMEOUT")? {
            self.http_timeout_seconds = timeout;
        }

        if let Some(timeout) = env_parse::<u64>("PING_TIMEOUT")? {
            self.ping_timeout_ms = timeout;
        }

        if let Ok(level) = std::env::var("LOGGING_LEVEL") {
            self.log_level = level.parse()?;
        }

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.log_format = format.parse()?;
        }

        if std::env::var_os("NO_COLOR").is_some() {
            self.enable_color = false;
        }

        Ok(())
    }
}

/// Split a comma separated list, dropping blanks
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ping.interval_seconds, 2);
        assert_eq!(config.download.interval_seconds, 900);
        assert_eq!(config.upload.interval_seconds, 900);
        assert_eq!(config.ping.output, PathBuf::from("ping.csv"));
    }

    #[test]
    fn test_all_disabled_is_invalid() {
        let mut config = Config::default();
        for kind in MetricKind::ALL {
            config.metric_mut(kind).enabled = false;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_only_matters_when_enabled() {
        let mut config = Config::default();
        config.download.interval_seconds = 0;
        assert!(config.validate().is_err());

        config.download.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_enabled_metrics_order() {
        let mut config = Config::default();
        config.download.enabled = false;
        assert_eq!(config.enabled_metrics(), vec![MetricKind::Ping, MetricKind::Upload]);
    }

    #[test]
    fn test_interval_upper_bound() {
        let max = crate::defaults::MAX_INTERVAL_SECS;
        let mut config = Config::default();
        config.download.interval_seconds = max;
        assert!(config.validate().is_ok());

        config.download.interval_seconds = u64::MAX;
        let err = config.validate().unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("download interval"));

        config.download.interval_seconds = 900;
        config.refresh_interval_seconds = max + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ping_timeout_must_be_shorter_than_interval() {
        let mut config = Config::default();
        config.ping.interval_seconds = 1;
        config.ping_timeout_ms = 1000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("shorter than the ping interval"));

        config.ping_timeout_ms = 999;
        assert!(config.validate().is_ok());

        // irrelevant once ping is off
        config.ping_timeout_ms = 5000;
        config.ping.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_servers_url() {
        let mut config = Config::default();
        config.servers_url = "ftp://example.com/list".to_string();
        assert!(config.validate().is_err());
        config.servers_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_http_timeout_bounds() {
        let mut config = Config::default();
        config.http_timeout_seconds = 0;
        assert!(config.validate().is_err());
        config.http_timeout_seconds = 301;
        assert!(config.validate().is_err());
        config.http_timeout_seconds = 300;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_refresh_interval_zero_disables() {
        let mut config = Config::default();
        config.refresh_interval_seconds = 0;
        assert_eq!(config.refresh_interval(), None);
        config.refresh_interval_seconds = 60;
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("8.8.8.8, 1.1.1.1,,"), vec!["8.8.8.8", "1.1.1.1"]);
        assert!(split_list("").is_empty());
    }
}
