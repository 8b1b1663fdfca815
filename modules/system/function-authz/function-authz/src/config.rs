use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_lock_sweep_interval_secs() -> u64 {
    60
}

/// How requirements without explicit schemes get their schemes assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptySchemeStrategy {
    /// Every registered scheme except the platform bootstrap schemes.
    #[default]
    UseAllSchemes,
    /// The host's default authentication scheme; it must exist.
    UseDefaultScheme,
}

/// Function authorization configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FunctionAuthzConfig {
    /// Skip authorization for every function. Each skipped request is logged
    /// as a warning. Intended for local development only.
    pub authorization_disabled: bool,

    /// Write a plain-text status body ("Unauthorized" / "Forbidden") on
    /// failure when the response has not started yet.
    pub write_http_status_to_response: bool,

    pub empty_scheme_strategy: EmptySchemeStrategy,

    /// Period of the background reaping of terminated keyed locks.
    pub lock_sweep_interval_secs: u64,
}

impl Default for FunctionAuthzConfig {
    fn default() -> Self {
        Self {
            authorization_disabled: false,
            write_http_status_to_response: false,
            empty_scheme_strategy: EmptySchemeStrategy::default(),
            lock_sweep_interval_secs: default_lock_sweep_interval_secs(),
        }
    }
}

impl FunctionAuthzConfig {
    /// Builds the configuration from a module config section.
    ///
    /// # Errors
    ///
    /// Returns an error on unknown fields or mistyped values.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
    }

    #[must_use]
    pub fn lock_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.lock_sweep_interval_secs.max(1))
    }
}
