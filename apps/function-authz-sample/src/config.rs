use std::net::SocketAddr;
use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use function_authz::FunctionAuthzConfig;
use serde::Deserialize;

/// Environment variables with this prefix override the `function_authz` section,
/// e.g. `FUNCTION_AUTHZ__AUTHORIZATION_DISABLED=true`.
pub const ENV_PREFIX: &str = "FUNCTION_AUTHZ__";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8087)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub function_authz: FunctionAuthzConfig,
}

impl AppConfig {
    /// Loads `path` (if it exists) and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or an override cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).map(|key| format!("function_authz.{key}").into()))
            .extract()
            .map_err(Box::new)
    }
}
