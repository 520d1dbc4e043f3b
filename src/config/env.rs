//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file from the working directory if it exists
    ///
    /// Returns whether a file was loaded. Variables already present in the
    /// process environment win over the file.
    pub fn load_env_file() -> Result<bool> {
        Self::load_env_file_from(Path::new(".env"))
    }

    /// Load a specific env file if it exists
    pub fn load_env_file_from(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        dotenv::from_path(path)
            .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;
        Ok(true)
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        r#"# Net Monitor Configuration
#
# Values here are defaults; command-line flags override them.

# Logging: TRACE, DEBUG, INFO, WARN, ERROR, FATAL
# LOGGING_LEVEL=INFO
# LOG_FORMAT=console
# NO_COLOR=1

# Scan intervals in seconds
# PING_INTERVAL=2
# DOWNLOAD_INTERVAL=900
# UPLOAD_INTERVAL=900

# Disable individual metrics (true/false)
# PING_DISABLE=false
# DOWNLOAD_DISABLE=false
# UPLOAD_DISABLE=false

# Output files (opened in append mode)
# PING_OUTPUT=ping.csv
# DOWNLOAD_OUTPUT=download.csv
# UPLOAD_OUTPUT=upload.csv

# Extra hosts pinged alongside the speed test server (comma-separated)
# PING_ADDRESS=8.8.8.8,1.1.1.1

# Seconds between speed test server re-selection, 0 disables
# REFRESH_INTERVAL=3600

# Speed test server list and request timeout
# SPEEDTEST_SERVERS_URL=https://www.speedtest.net/api/js/servers?engine=js&limit=10
# HTTP_TIMEOUT=15

# ICMP echo timeout in milliseconds, shorter than the ping interval
# PING_TIMEOUT=1000
"#
        .to_string()
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        std::fs::write(path, Self::create_example_env_content())
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))
    }
}
