//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::Cli,
    config::env::EnvManager,
    error::{AppError, Result},
    models::Config,
    types::MetricKind,
};
use std::path::PathBuf;

/// Configuration parser: defaults, then `.env`, then environment, then CLI
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        EnvManager::load_env_file()?;
        self.parse_without_env_file()
    }

    /// Same as [`parse`](Self::parse) but ignores any `.env` file
    pub fn parse_without_env_file(&self) -> Result<Config> {
        self.cli.validate().map_err(AppError::config)?;

        let mut config = Config::default();
        config.merge_from_env()?;
        self.apply_cli_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut Config) -> Result<()> {
        let cli = &self.cli;

        if let Some(ref level) = cli.logging_level {
            config.log_level = level.parse()?;
        }
        if let Some(ref format) = cli.log_format {
            config.log_format = format.parse()?;
        }
        if cli.no_color {
            config.enable_color = false;
        }

        let per_metric = [
            (MetricKind::Ping, cli.ping_interval, cli.ping_disable, &cli.ping_output),
            (MetricKind::Download, cli.download_interval, cli.download_disable, &cli.download_output),
            (MetricKind::Upload, cli.upload_interval, cli.upload_disable, &cli.upload_output),
        ];
        for (kind, interval, disable, output) in per_metric {
            let settings = config.metric_mut(kind);
            if let Some(interval) = interval {
                settings.interval_seconds = interval;
            }
            if disable {
                settings.enabled = false;
            }
            if let Some(output) = output {
                settings.output = PathBuf::from(output);
            }
        }

        let hosts = cli.ping_hosts();
        if !hosts.is_empty() {
            config.additional_ping_hosts = hosts;
        }

        if let Some(refresh) = cli.refresh_interval {
            config.refresh_interval_seconds = refresh;
        }
        if let Some(ref servers_url) = cli.servers_url {
            config.servers_url = servers_url.clone();
        }
        if let Some(timeout) = cli.http_timeout {
            config.http_timeout_seconds = timeout;
        }
        if let Some(timeout) = cli.ping_timeout {
            config.ping_timeout_ms = timeout;
        }

        Ok(())
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Configuration summary, one setting per line
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    for kind in MetricKind::ALL {
        let settings = config.metric(kind);
        if settings.enabled {
            summary.push(format!(
                "{}: every {}s -> {}",
                kind,
                settings.interval_seconds,
                settings.output.display()
            ));
        } else {
            summary.push(format!("{}: disabled", kind));
        }
    }
    if !config.additional_ping_hosts.is_empty() {
        summary.push(format!("Additional ping hosts: {}", config.additional_ping_hosts.join(", ")));
    }
    match config.refresh_interval() {
        Some(period) => summary.push(format!("Endpoint refresh: every {}s", period.as_secs())),
        None => summary.push("Endpoint refresh: disabled".to_string()),
    }
    summary.push(format!("Server list: {}", config.servers_url));
    summary.push(format!("Log level: {}", config.log_level.as_str()));

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::env;
    use std::sync::Mutex;

    // Tests below touch process-wide environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "PING_INTERVAL",
        "DOWNLOAD_INTERVAL",
        "UPLOAD_INTERVAL",
        "PING_DISABLE",
        "DOWNLOAD_DISABLE",
        "UPLOAD_DISABLE",
        "PING_OUTPUT",
        "DOWNLOAD_OUTPUT",
        "UPLOAD_OUTPUT",
        "PING_ADDRESS",
        "REFRESH_INTERVAL",
        "LOGGING_LEVEL",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_cli_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let cli = Cli::parse_from([
            "test",
            "--ping-interval",
            "10",
            "--download-disable",
            "--upload-output",
            "/tmp/up.csv",
            "--aph",
            "8.8.8.8",
            "--log",
            "debug",
        ]);
        let config = ConfigParser::new(cli).parse_without_env_file().unwrap();

        assert_eq!(config.ping.interval_seconds, 10);
        assert!(!config.download.enabled);
        assert_eq!(config.upload.output, PathBuf::from("/tmp/up.csv"));
        assert_eq!(config.additional_ping_hosts, vec!["8.8.8.8"]);
        assert_eq!(config.log_level, crate::logging::LogLevel::Debug);
    }

    #[test]
    fn test_env_then_cli_precedence() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("PING_INTERVAL", "7");
        env::set_var("UPLOAD_INTERVAL", "120");
        env::set_var("PING_ADDRESS", "1.1.1.1, 9.9.9.9");

        let cli = Cli::parse_from(["test", "--ping-interval", "3"]);
        let config = ConfigParser::new(cli).parse_without_env_file().unwrap();
        clear_env();

        assert_eq!(config.ping.interval_seconds, 3);
        assert_eq!(config.upload.interval_seconds, 120);
        assert_eq!(config.additional_ping_hosts, vec!["1.1.1.1", "9.9.9.9"]);
    }

    #[test]
    fn test_invalid_env_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("DOWNLOAD_INTERVAL", "soon");

        let result = ConfigParser::new(Cli::parse_from(["test"])).parse_without_env_file();
        clear_env();

        let err = result.unwrap_err();
        assert_eq!(err.category(), "CONFIG");
        assert!(err.to_string().contains("DOWNLOAD_INTERVAL"));
    }

    #[test]
    fn test_env_disable_flag() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("UPLOAD_DISABLE", "true");

        let config = ConfigParser::new(Cli::parse_from(["test"])).parse_without_env_file().unwrap();
        clear_env();

        assert!(!config.upload.enabled);
        assert!(config.download.enabled);
    }

    #[test]
    fn test_display_config_summary() {
        let mut config = Config::default();
        config.download.enabled = false;
        config.additional_ping_hosts = vec!["8.8.8.8".to_string()];

        let summary = display_config_summary(&config);
        assert!(summary.contains("ping: every 2s -> ping.csv"));
        assert!(summary.contains("download: disabled"));
        assert!(summary.contains("Additional ping hosts: 8.8.8.8"));
    }
}
