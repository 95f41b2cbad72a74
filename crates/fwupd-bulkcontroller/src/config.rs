//! Timeouts, buffer sizes and retry budgets of a device session.

use std::path::Path;
use std::time::Duration;

use fwupd_errors::{FwupdError, Result};
use serde::{Deserialize, Serialize};

/// Session tuning, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout of an ordinary bulk transfer in milliseconds.
    ///
    /// Default: 2500.
    pub transfer_timeout_ms: u64,

    /// Timeout of END_TRANSFER, while the device hashes the image.
    ///
    /// Default: 30000.
    pub hash_timeout_ms: u64,

    /// Timeout of the transfer-buffer negotiation.
    ///
    /// Default: 500.
    pub buffer_check_timeout_ms: u64,

    /// Transfer buffer size used until negotiation succeeds.
    ///
    /// Default: 8192.
    pub default_buffer_size: usize,

    /// Transfer buffer size once the device accepts CHECK_BUFFERSIZE.
    ///
    /// Default: 16384.
    pub negotiated_buffer_size: usize,

    /// Attempts of INIT while the device finishes a previous session.
    ///
    /// Default: 5.
    pub init_retries: u32,

    /// Delay between INIT attempts in milliseconds.
    ///
    /// Default: 1000.
    pub init_retry_delay_ms: u64,

    /// Status polls while waiting for the device to apply the image.
    ///
    /// Default: 500.
    pub verify_attempts: u32,

    /// Delay between status polls in milliseconds.
    ///
    /// Default: 2500.
    pub verify_delay_ms: u64,

    /// Attempts of the device-info query during setup.
    ///
    /// Default: 5.
    pub device_info_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transfer_timeout_ms: 2500,
            hash_timeout_ms: 30000,
            buffer_check_timeout_ms: 500,
            default_buffer_size: 8192,
            negotiated_buffer_size: 16384,
            init_retries: 5,
            init_retry_delay_ms: 1000,
            verify_attempts: 500,
            verify_delay_ms: 2500,
            device_info_retries: 5,
        }
    }
}

impl SessionConfig {
    /// See [`SessionConfig::transfer_timeout_ms`].
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    /// See [`SessionConfig::hash_timeout_ms`].
    pub fn hash_timeout(&self) -> Duration {
        Duration::from_millis(self.hash_timeout_ms)
    }

    /// See [`SessionConfig::buffer_check_timeout_ms`].
    pub fn buffer_check_timeout(&self) -> Duration {
        Duration::from_millis(self.buffer_check_timeout_ms)
    }

    /// See [`SessionConfig::init_retry_delay_ms`].
    pub fn init_retry_delay(&self) -> Duration {
        Duration::from_millis(self.init_retry_delay_ms)
    }

    /// See [`SessionConfig::verify_delay_ms`].
    pub fn verify_delay(&self) -> Duration {
        Duration::from_millis(self.verify_delay_ms)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error if a timeout or retry budget is zero, or
    /// a buffer cannot hold a protocol header.
    pub fn validate(&self) -> Result<()> {
        if self.transfer_timeout_ms == 0 || self.hash_timeout_ms == 0 || self.buffer_check_timeout_ms == 0 {
            return Err(FwupdError::invalid_data("timeouts must be non-zero"));
        }
        if self.init_retries == 0 || self.verify_attempts == 0 || self.device_info_retries == 0 {
            return Err(FwupdError::invalid_data("retry budgets must be non-zero"));
        }
        let min = crate::protocol::SYNC_HEADER_SIZE + 1;
        if self.default_buffer_size < min || self.negotiated_buffer_size < min {
            return Err(FwupdError::invalid_data(format!(
                "buffer sizes must be at least 0x{min:x}"
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error for malformed JSON or invalid settings.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| FwupdError::invalid_data(format!("invalid session config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an internal error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| FwupdError::internal(format!("failed to serialize session config: {e}")))
    }

    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, otherwise see
    /// [`SessionConfig::from_json`].
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config = SessionConfig::default();
        config.validate()?;
        assert_eq!(config.transfer_timeout(), Duration::from_millis(2500));
        assert_eq!(config.hash_timeout(), Duration::from_secs(30));
        assert_eq!(config.verify_attempts, 500);
        Ok(())
    }

    #[test]
    fn test_json_partial_document() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config = SessionConfig::from_json(r#"{ "verify_attempts": 3, "verify_delay_ms": 10 }"#)?;
        assert_eq!(config.verify_attempts, 3);
        assert_eq!(config.init_retries, 5);
        assert!(SessionConfig::from_json(r#"{ "init_retries": 0 }"#).is_err());
        assert!(SessionConfig::from_json(r#"{ "default_buffer_size": 12 }"#).is_err());
        assert_eq!(SessionConfig::from_json(&config.to_json()?)?, config);
        Ok(())
    }
}
