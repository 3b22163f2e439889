//! Service configuration read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `WARDEN_ADDR` | `0.0.0.0:3000` |
//! | `WARDEN_BUILD` | `develop` |
//! | `WARDEN_AUTH_ACTIVE_KID` | required |
//! | `WARDEN_AUTH_KEYS_DIR` | `fixtures/keys` |
//! | `WARDEN_AUTH_ISSUER` | `service project` |
//! | `WARDEN_AUTH_AUDIENCE` | unset (audience not checked) |
//! | `WARDEN_AUTH_KEY_LOOKUP_TIMEOUT_MS` | `2000` |
//! | `WARDEN_REQUEST_TIMEOUT_MS` | unset (no deadline) |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub build: String,

    pub auth_active_kid: String,
    pub auth_keys_dir: PathBuf,
    pub auth_issuer: String,
    pub auth_audience: Option<String>,
    pub auth_key_lookup_timeout: Duration,

    pub request_timeout: Option<Duration>,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_source(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let addr = parse_or(&get, "WARDEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;
        let build = get("WARDEN_BUILD").unwrap_or_else(|| "develop".to_string());

        let auth_active_kid = get("WARDEN_AUTH_ACTIVE_KID").ok_or(ConfigError::Missing("WARDEN_AUTH_ACTIVE_KID"))?;
        let auth_keys_dir = get("WARDEN_AUTH_KEYS_DIR").map_or_else(|| PathBuf::from("fixtures/keys"), PathBuf::from);
        let auth_issuer = get("WARDEN_AUTH_ISSUER").unwrap_or_else(|| "service project".to_string());
        let auth_audience = get("WARDEN_AUTH_AUDIENCE");
        let auth_key_lookup_timeout =
            Duration::from_millis(parse_or(&get, "WARDEN_AUTH_KEY_LOOKUP_TIMEOUT_MS", 2000)?);

        let request_timeout = match get("WARDEN_REQUEST_TIMEOUT_MS") {
            Some(v) => Some(Duration::from_millis(
                v.trim().parse().map_err(|_| ConfigError::Invalid("WARDEN_REQUEST_TIMEOUT_MS"))?,
            )),
            None => None,
        };

        Ok(Self {
            addr,
            build,
            auth_active_kid,
            auth_keys_dir,
            auth_issuer,
            auth_audience,
            auth_key_lookup_timeout,
            request_timeout,
        })
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}
