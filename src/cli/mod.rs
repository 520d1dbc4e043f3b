//! Command-line interface

use clap::{ArgAction, Parser};

/// Net Monitor - periodic latency and throughput measurements persisted to CSV
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "net-monitor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Logging level (trace, debug, info, warn, error, fatal)
    #[arg(long = "logging-level", visible_alias = "log", value_name = "LEVEL")]
    pub logging_level: Option<String>,

    /// Log output format (console, json, compact)
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<String>,

    /// Disable colored log output
    #[arg(long)]
    pub no_color: bool,

    /// Interval between ping scans in seconds
    #[arg(long, visible_alias = "pi", value_name = "SECS")]
    pub ping_interval: Option<u64>,

    /// Interval between download scans in seconds
    #[arg(long, visible_alias = "di", value_name = "SECS")]
    pub download_interval: Option<u64>,

    /// Interval between upload scans in seconds
    #[arg(long, visible_alias = "ui", value_name = "SECS")]
    pub upload_interval: Option<u64>,

    /// Disable ping scans
    #[arg(long, visible_alias = "pd")]
    pub ping_disable: bool,

    /// Disable download scans
    #[arg(long, visible_alias = "dd")]
    pub download_disable: bool,

    /// Disable upload scans
    #[arg(long, visible_alias = "ud")]
    pub upload_disable: bool,

    /// Output file for ping measures
    #[arg(long, visible_alias = "po", value_name = "PATH")]
    pub ping_output: Option<String>,

    /// Output file for download measures
    #[arg(long = "download-output", visible_alias = "do", value_name = "PATH")]
    pub download_output: Option<String>,

    /// Output file for upload measures
    #[arg(long, visible_alias = "uo", value_name = "PATH")]
    pub upload_output: Option<String>,

    /// Additional address for the ping scan (repeatable or comma-separated)
    #[arg(long = "additional-ping-hosts", visible_alias = "aph", action = ArgAction::Append, value_name = "HOST")]
    pub additional_ping_hosts: Vec<String>,

    /// Seconds between reference endpoint refreshes (0 disables)
    #[arg(long, value_name = "SECS")]
    pub refresh_interval: Option<u64>,

    /// URL of the speed test server list (JSON)
    #[arg(long, value_name = "URL")]
    pub servers_url: Option<String>,

    /// Timeout for each speed test HTTP request in seconds
    #[arg(long, value_name = "SECS")]
    pub http_timeout: Option<u64>,

    /// Timeout for a single ICMP echo in milliseconds
    #[arg(long, value_name = "MS")]
    pub ping_timeout: Option<u64>,

    /// Print an example .env file and exit
    #[arg(long)]
    pub print_env_example: bool,
}

impl Cli {
    /// Validate CLI arguments for conflicts and requirements
    pub fn validate(&self) -> Result<(), String> {
        if self.ping_disable && self.download_disable && self.upload_disable {
            return Err("All metrics are disabled; enable at least one of ping, download, upload".to_string());
        }

        for (name, value) in [
            ("--ping-interval", self.ping_interval),
            ("--download-interval", self.download_interval),
            ("--upload-interval", self.upload_interval),
            ("--refresh-interval", self.refresh_interval.filter(|secs| *secs > 0)),
        ] {
            match value {
                Some(0) => return Err(format!("{} must be greater than 0", name)),
                Some(secs) if secs > crate::defaults::MAX_INTERVAL_SECS => {
                    return Err(format!(
                        "{} cannot exceed {} seconds",
                        name,
                        crate::defaults::MAX_INTERVAL_SECS
                    ))
                }
                _ => {}
            }
        }

        if let Some(ref level) = self.logging_level {
            if let Err(e) = level.parse::<crate::logging::LogLevel>() {
                return Err(format!("logging level: {} doesn't exist ({})", level, e));
            }
        }

        Ok(())
    }

    /// Additional ping hosts with comma lists expanded
    pub fn ping_hosts(&self) -> Vec<String> {
        self.additional_ping_hosts
            .iter()
            .flat_map(|entry| crate::models::config::split_list(entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_unset() {
        let cli = Cli::parse_from(["net-monitor"]);
        assert!(cli.ping_interval.is_none());
        assert!(!cli.ping_disable);
        assert!(cli.additional_ping_hosts.is_empty());
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_short_aliases() {
        let cli = Cli::parse_from(["net-monitor", "--pi", "5", "--dd", "--log", "debug"]);
        assert_eq!(cli.ping_interval, Some(5));
        assert!(cli.download_disable);
        assert_eq!(cli.logging_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_ping_hosts_repeat_and_comma() {
        let cli = Cli::parse_from([
            "net-monitor",
            "--additional-ping-hosts",
            "8.8.8.8,1.1.1.1",
            "--aph",
            "example.com",
        ]);
        assert_eq!(cli.ping_hosts(), vec!["8.8.8.8", "1.1.1.1", "example.com"]);
    }

    #[test]
    fn test_validate_rejects_all_disabled() {
        let cli = Cli::parse_from(["net-monitor", "--pd", "--dd", "--ud"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let cli = Cli::parse_from(["net-monitor", "--upload-interval", "0"]);
        assert!(cli.validate().unwrap_err().contains("--upload-interval"));
    }

    #[test]
    fn test_validate_rejects_huge_interval() {
        let cli = Cli::parse_from(["net-monitor", "--di", "18446744073709551615"]);
        assert!(cli.validate().unwrap_err().contains("--download-interval cannot exceed"));

        let cli = Cli::parse_from(["net-monitor", "--refresh-interval", "99999999999"]);
        assert!(cli.validate().unwrap_err().contains("--refresh-interval"));

        // refresh 0 means disabled, not invalid
        let cli = Cli::parse_from(["net-monitor", "--refresh-interval", "0"]);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_level() {
        let cli = Cli::parse_from(["net-monitor", "--logging-level", "LOUD"]);
        assert!(cli.validate().unwrap_err().contains("doesn't exist"));
    }
}
