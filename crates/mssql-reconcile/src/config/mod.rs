//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use crate::orchestrator::RunSettings;
use std::path::Path;

/// Application name the child connection reports when none is configured.
const CHILD_APP_NAME: &str = "Sync";

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(yaml)?;
        if config.child.app_name.is_none() {
            config.child.app_name = Some(CHILD_APP_NAME.to_string());
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Orchestrator settings derived from the reconcile section.
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            batch_size: self.reconcile.batch_size,
            max_iterations: self.reconcile.max_iterations,
            key_attempts: self.reconcile.key_attempts,
            allow_no_lock: self.reconcile.allow_no_lock,
        }
    }
}

impl EndpointConfig {
    /// `host:port/database`, for logs.
    pub fn display_name(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}
