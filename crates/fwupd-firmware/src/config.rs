//! Resource limits applied while parsing.

use std::path::Path;

use fwupd_errors::{FwupdError, Result};
use serde::{Deserialize, Serialize};

use crate::flags::ParseFlags;

/// Environment variable set by fuzzing harnesses.
pub const ENV_FUZZER_RUNNING: &str = "FWUPD_FUZZER_RUNNING";
/// Environment variable enabling verbose struct dumps.
pub const ENV_VERBOSE: &str = "FWUPD_VERBOSE";

/// Limits bounding the memory and time spent on one parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    /// Maximum number of images in one container.
    ///
    /// Default: 10000.
    pub max_images: usize,

    /// Maximum number of images in one container while fuzzing.
    ///
    /// Default: 100.
    pub max_images_fuzzing: usize,

    /// Maximum nesting depth of containers.
    ///
    /// Default: 8.
    pub max_depth: usize,

    /// Largest image accepted, in bytes.
    ///
    /// Default: 1 GiB.
    pub max_size: u64,

    /// Apply the fuzzing limits to every parse.
    pub fuzzing: bool,

    /// Dump parsed structs at trace level.
    pub verbose: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            max_images: 10000,
            max_images_fuzzing: 100,
            max_depth: 8,
            max_size: 0x4000_0000,
            fuzzing: false,
            verbose: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|v| !v.is_empty() && v != "0")
}

impl ParseConfig {
    /// Default limits adjusted by `FWUPD_FUZZER_RUNNING` and `FWUPD_VERBOSE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            fuzzing: env_flag(ENV_FUZZER_RUNNING),
            verbose: env_flag(ENV_VERBOSE),
            ..Self::default()
        }
    }

    /// Image limit for a parse with `flags`.
    #[must_use]
    pub fn effective_max_images(&self, flags: ParseFlags) -> usize {
        if self.fuzzing || flags.contains(ParseFlags::FUZZING) {
            self.max_images_fuzzing.min(self.max_images)
        } else {
            self.max_images
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error if any limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_images == 0 || self.max_images_fuzzing == 0 {
            return Err(FwupdError::invalid_data("image limits must be non-zero"));
        }
        if self.max_depth == 0 {
            return Err(FwupdError::invalid_data("max_depth must be non-zero"));
        }
        if self.max_size == 0 {
            return Err(FwupdError::invalid_data("max_size must be non-zero"));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error for malformed JSON or invalid limits.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| FwupdError::invalid_data(format!("invalid parse config: {e}")))?;
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
            .map_err(|e| FwupdError::internal(format!("failed to serialize parse config: {e}")))
    }

    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, otherwise see
    /// [`ParseConfig::from_json`].
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save as a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
