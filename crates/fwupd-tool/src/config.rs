//! Tool configuration loaded from `--config`

use std::path::Path;

use anyhow::{Context, Result};
use fwupd_bulkcontroller::SessionConfig;
use fwupd_firmware::ParseConfig;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

/// Parse limits and device session tuning in one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub parse: ParseConfig,
    pub session: SessionConfig,
}

impl ToolConfig {
    /// Load `path`, or the defaults when no file is given.
    ///
    /// The `FWUPD_FUZZER_RUNNING` and `FWUPD_VERBOSE` flags are applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .map_err(CliError::from)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Self::from_json(&json).with_context(|| format!("failed to load {}", path.display()))?
            }
            None => Self::default(),
        };
        let env = ParseConfig::from_env();
        config.parse.fuzzing |= env.fuzzing;
        config.parse.verbose |= env.verbose;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(CliError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.parse
            .validate()
            .map_err(|e| CliError::InvalidConfiguration(format!("parse: {e}")))?;
        self.session
            .validate()
            .map_err(|e| CliError::InvalidConfiguration(format!("session: {e}")))?;
        Ok(())
    }
}
