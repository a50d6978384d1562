//! Service configuration.
//!
//! Values come from the environment (a `.env` file is loaded by the CLI via
//! `dotenvy`); CLI flags override the port and database path.
//!
//! | Variable                                          | Default           |
//! |---------------------------------------------------|-------------------|
//! | `SWC_API_PORT`                                    | `5000`            |
//! | `SWC_DB_PATH`                                     | `.swcload/swc.db` |
//! | `TRANSFORM_API_HOST` / `CORE_SERVICES_HOST`       | `transform-api`   |
//! | `TRANSFORM_API_PORT`                              | `5000`            |
//! | `TRANSFORM_API_ENDPOINT` / `CORE_SERVICES_ENDPOINT` | `graphql`       |
//! | `SWC_TRANSFORM_DISABLED`                          | unset             |

use std::env;
use std::path::PathBuf;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default database location, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".swcload/swc.db";

/// Maximum accepted upload size (in bytes).
///
/// 100 MB limit.
pub const MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

/// Name written into the header of exported files.
pub const EXPORT_TOOL_NAME: &str = "MouseLight internal SWC manager";

/// Location of the remote transform service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformServiceConfig {
    pub host: String,
    pub port: u16,
    pub endpoint: String,
    /// When false, post-commit notifications are skipped.
    pub enabled: bool,
}

impl TransformServiceConfig {
    /// GraphQL URL of the service.
    pub fn url(&self) -> String {
        format!("http://{}:{}/{}", self.host, self.port, self.endpoint)
    }

    /// A configuration with notifications turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for TransformServiceConfig {
    fn default() -> Self {
        Self {
            host: "transform-api".to_string(),
            port: 5000,
            endpoint: "graphql".to_string(),
            enabled: true,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub transform: TransformServiceConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            transform: TransformServiceConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup.
    ///
    /// Unparseable numeric values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(*k).filter(|v| !v.is_empty()));

        let port = first(&["SWC_API_PORT"])
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);
        let db_path = first(&["SWC_DB_PATH"])
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let transform = TransformServiceConfig {
            host: first(&["TRANSFORM_API_HOST", "CORE_SERVICES_HOST"])
                .unwrap_or(defaults.transform.host),
            port: first(&["TRANSFORM_API_PORT"])
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.transform.port),
            endpoint: first(&["TRANSFORM_API_ENDPOINT", "CORE_SERVICES_ENDPOINT"])
                .unwrap_or(defaults.transform.endpoint),
            enabled: !first(&["SWC_TRANSFORM_DISABLED"])
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        Self {
            port,
            db_path,
            transform,
        }
    }

    /// Apply CLI overrides.
    pub fn with_overrides(mut self, port: Option<u16>, db_path: Option<PathBuf>) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(db_path) = db_path {
            self.db_path = db_path;
        }
        self
    }
}
