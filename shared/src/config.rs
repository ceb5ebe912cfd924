use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ServiceError, ServiceResult};

pub const DEFAULT_TABLE_NAME: &str = "hazard-reports";
pub const DEFAULT_PHOTO_BUCKET: &str = "hazard-report-photos";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Dynamo,
    Local,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dynamo" | "dynamodb" => Ok(StoreBackend::Dynamo),
            "local" => Ok(StoreBackend::Local),
            other => Err(format!("Unknown STORE_BACKEND: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CognitoSettings {
    pub client_id: String,
    pub client_secret: String,
    /// Set to auto-confirm new sign-ups
    pub user_pool_id: Option<String>,
}

/// Runtime settings read once at cold start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub table_name: String,
    pub store_backend: StoreBackend,
    pub local_store_path: Option<PathBuf>,
    pub photo_bucket: String,
    /// `None` disables the login and signup routes
    pub cognito: Option<CognitoSettings>,
    /// Trust an `X-User-Id` header when no JWT identity is present.
    /// Only the local backend turns this on unless set explicitly.
    pub allow_header_identity: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            store_backend: StoreBackend::default(),
            local_store_path: None,
            photo_bucket: DEFAULT_PHOTO_BUCKET.to_string(),
            cognito: None,
            allow_header_identity: false,
        }
    }
}

impl Config {
    pub fn from_env() -> ServiceResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ServiceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store_backend = match var("STORE_BACKEND") {
            Some(raw) => raw.parse().map_err(ServiceError::Config)?,
            None => StoreBackend::default(),
        };

        let cognito = match (var("COGNITO_CLIENT_ID"), var("COGNITO_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(CognitoSettings {
                client_id,
                client_secret,
                user_pool_id: var("COGNITO_USER_POOL_ID"),
            }),
            _ => {
                tracing::warn!("Cognito credentials not set, login and signup are disabled");
                None
            }
        };

        let allow_header_identity = match var("ALLOW_HEADER_IDENTITY") {
            Some(raw) => parse_flag(&raw).ok_or_else(|| {
                ServiceError::Config(format!("Invalid ALLOW_HEADER_IDENTITY: {}", raw))
            })?,
            None => store_backend == StoreBackend::Local,
        };
        if allow_header_identity && store_backend == StoreBackend::Dynamo {
            tracing::warn!("X-User-Id header identity is enabled on the DynamoDB backend");
        }

        Ok(Self {
            table_name: var("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            store_backend,
            local_store_path: var("LOCAL_STORE_PATH").map(PathBuf::from),
            photo_bucket: var("PHOTO_BUCKET").unwrap_or_else(|| DEFAULT_PHOTO_BUCKET.to_string()),
            cognito,
            allow_header_identity,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> ServiceResult<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.table_name, "hazard-reports");
        assert_eq!(cfg.store_backend, StoreBackend::Dynamo);
        assert!(!cfg.allow_header_identity);
    }

    #[test]
    fn header_identity_follows_backend_unless_set() {
        assert!(config(&[("STORE_BACKEND", "local")]).unwrap().allow_header_identity);
        assert!(
            !config(&[("STORE_BACKEND", "local"), ("ALLOW_HEADER_IDENTITY", "false")])
                .unwrap()
                .allow_header_identity
        );
        assert!(config(&[("ALLOW_HEADER_IDENTITY", "1")]).unwrap().allow_header_identity);
        assert!(matches!(
            config(&[("ALLOW_HEADER_IDENTITY", "maybe")]),
            Err(ServiceError::Config(_))
        ));
    }

    #[test]
    fn reads_local_backend_and_cognito() {
        let cfg = config(&[
            ("STORE_BACKEND", "Local"),
            ("LOCAL_STORE_PATH", "/tmp/hazards.json"),
            ("COGNITO_CLIENT_ID", "client"),
            ("COGNITO_CLIENT_SECRET", "secret"),
        ])
        .unwrap();
        assert_eq!(cfg.store_backend, StoreBackend::Local);
        assert_eq!(cfg.local_store_path, Some(PathBuf::from("/tmp/hazards.json")));
        let cognito = cfg.cognito.unwrap();
        assert_eq!(cognito.client_id, "client");
        assert_eq!(cognito.user_pool_id, None);
    }

    #[test]
    fn half_configured_cognito_is_disabled() {
        let cfg = config(&[("COGNITO_CLIENT_ID", "client")]).unwrap();
        assert!(cfg.cognito.is_none());
    }

    #[test]
    fn unknown_backend_is_a_config_error() {
        assert!(matches!(
            config(&[("STORE_BACKEND", "redis")]),
            Err(ServiceError::Config(_))
        ));
    }
}
