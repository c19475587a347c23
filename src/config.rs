use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::session::Credentials;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub network: NetworkConfig,
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Endpoints and the fixed identifiers the vendor's mobile client sends.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub auth_url: String,
    pub base_url: String,
    pub user_agent: String,
    pub brand: String,
    pub scope: String,
    pub client_id: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            auth_url: "https://auth.puregym.com/connect/token".to_string(),
            base_url: "https://capi.puregym.com/api/v2".to_string(),
            user_agent: "PureGym/7038 CFNetwork/3860.100.1 Darwin/25.0.0".to_string(),
            brand: "PGUK".to_string(),
            scope: "pgcapi offline_access".to_string(),
            client_id: "ro.client".to_string(),
        }
    }
}

impl ApiConfig {
    /// Point both endpoints at a single host, keeping the vendor identifiers.
    pub fn with_base(root: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            auth_url: format!("{root}/connect/token"),
            base_url: format!("{root}/api/v2"),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Gym name, or `home` for the member's home gym.
    pub gym: String,
    /// Poll interval in minutes; zero or negative means a single check.
    pub interval_minutes: i64,
    pub debug: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            gym: "home".to_string(),
            interval_minutes: 10,
            debug: false,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        crate::monitor::poll_interval(self.interval_minutes)
    }
}

#[derive(Deserialize, Clone, Default)]
pub struct CredentialsConfig {
    pub email: Option<String>,
    pub pin: Option<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("email", &self.email)
            .field("pin", &self.pin.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl CredentialsConfig {
    /// Build credentials, if both halves are present and non-empty.
    pub fn to_credentials(&self) -> Option<Credentials> {
        match (self.email.as_deref(), self.pin.as_deref()) {
            (Some(email), Some(pin)) if !email.is_empty() && !pin.is_empty() => {
                Some(Credentials::new(email, pin))
            }
            _ => None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Load configuration, optionally layering an explicit file above the
    /// default locations.
    pub fn load_with(extra: Option<&Path>) -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gym-attendance");

        let api = ApiConfig::default();
        let mut builder = Config::builder()
            // 1. Defaults
            // Api
            .set_default("api.auth_url", api.auth_url)?
            .set_default("api.base_url", api.base_url)?
            .set_default("api.user_agent", api.user_agent)?
            .set_default("api.brand", api.brand)?
            .set_default("api.scope", api.scope)?
            .set_default("api.client_id", api.client_id)?
            // Network
            .set_default("network.request_timeout_secs", 30)?
            .set_default("network.connect_timeout_secs", 10)?
            // Monitor
            .set_default("monitor.gym", "home")?
            .set_default("monitor.interval_minutes", 10)?
            .set_default("monitor.debug", false)?
            // Credentials (the vendor's own variable names)
            .set_default("credentials.email", std::env::var("PUREGYM_USER").ok())?
            .set_default("credentials.pin", std::env::var("PUREGYM_PASS").ok())?
            // 2. Local config file
            .add_source(File::from(PathBuf::from("config.toml")).required(false))
            // 3. User config directory
            .add_source(File::from(config_dir.join("config.toml")).required(false));

        // 4. Explicit file from the command line
        if let Some(path) = extra {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // 5. Environment variables (GYM__MONITOR__GYM=...)
        let builder = builder.add_source(Environment::with_prefix("GYM").separator("__"));

        let s = builder.build().context("Failed to build configuration")?;
        s.try_deserialize().context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // ==================== Default Value Tests ====================

    #[test]
    fn test_network_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn test_api_config_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.auth_url, "https://auth.puregym.com/connect/token");
        assert_eq!(config.base_url, "https://capi.puregym.com/api/v2");
        assert_eq!(config.brand, "PGUK");
        assert_eq!(config.scope, "pgcapi offline_access");
        assert_eq!(config.client_id, "ro.client");
        assert!(config.user_agent.starts_with("PureGym/"));
    }

    #[test]
    fn test_api_config_with_base() {
        let config = ApiConfig::with_base("http://127.0.0.1:9000/");
        assert_eq!(config.auth_url, "http://127.0.0.1:9000/connect/token");
        assert_eq!(config.base_url, "http://127.0.0.1:9000/api/v2");
        assert_eq!(config.brand, "PGUK");
    }

    #[test]
    fn test_monitor_config_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.gym, "home");
        assert_eq!(config.interval_minutes, 10);
        assert!(!config.debug);
        assert_eq!(config.poll_interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_non_positive_interval_is_single_shot() {
        for minutes in [0, -1, -30] {
            let config = MonitorConfig {
                interval_minutes: minutes,
                ..MonitorConfig::default()
            };
            assert!(config.poll_interval().is_zero());
        }
    }

    // ==================== Credentials Tests ====================

    #[test]
    fn test_credentials_require_both_halves() {
        let missing_pin = CredentialsConfig {
            email: Some("a@b.com".into()),
            pin: None,
        };
        assert!(missing_pin.to_credentials().is_none());

        let empty_email = CredentialsConfig {
            email: Some(String::new()),
            pin: Some("1234".into()),
        };
        assert!(empty_email.to_credentials().is_none());

        let full = CredentialsConfig {
            email: Some("a@b.com".into()),
            pin: Some("1234".into()),
        };
        let creds = full.to_credentials().expect("credentials");
        assert_eq!(creds.identity(), "a@b.com");
    }

    #[test]
    fn test_credentials_config_debug_redacts_pin() {
        let config = CredentialsConfig {
            email: Some("a@b.com".into()),
            pin: Some("90817263".into()),
        };
        let debug_str = format!("{:?}", config);
        assert!(debug_str.contains("a@b.com"));
        assert!(!debug_str.contains("90817263"));
    }

    // ==================== Config Loading Tests ====================

    #[test]
    fn test_config_load_with_defaults() {
        let config = AppConfig::load().expect("Config should load");
        assert!(!config.api.base_url.is_empty());
        assert!(config.network.request_timeout_secs > 0);
        assert!(!config.monitor.gym.is_empty());
    }

    #[test]
    fn test_config_load_from_explicit_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("monitor.toml");
        let mut file = std::fs::File::create(&path).expect("create file");
        writeln!(
            file,
            "[monitor]\ngym = \"Canterbury Wincheap\"\ninterval_minutes = 5\n\n[network]\nrequest_timeout_secs = 45"
        )
        .expect("write file");

        let config = AppConfig::load_with(Some(&path)).expect("Config should load");
        assert_eq!(config.monitor.gym, "Canterbury Wincheap");
        assert_eq!(config.monitor.interval_minutes, 5);
        assert_eq!(config.network.request_timeout_secs, 45);
        // untouched sections keep their defaults
        assert_eq!(config.api.brand, "PGUK");
    }

    #[test]
    fn test_config_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("absent.toml");
        assert!(AppConfig::load_with(Some(&path)).is_err());
    }
}
