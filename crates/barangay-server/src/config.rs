use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use barangay_core::derive::DerivationPolicy;
use barangay_core::policy::{AccessPolicy, DEFAULT_SELF_EDITABLE_FIELDS, RESIDENT_FIELDS};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub reference_data: ReferenceDataConfig,
    pub policy: PolicyConfig,
    pub derivation: DerivationPolicy,
    pub clock: ClockConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReferenceDataConfig {
    pub geography_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub self_editable_fields: Vec<String>,
    pub allow_subtree_scope: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost:5432/barangay".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            self_editable_fields: DEFAULT_SELF_EDITABLE_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            allow_subtree_scope: false,
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 8 * 60,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e.to_string()))?;
            toml::from_str::<AppConfig>(&contents)
                .map_err(|e| ConfigError::ParseToml(e.to_string()))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BARANGAY_HTTP_HOST") {
            self.http.host = v;
        }
        if let Ok(v) = std::env::var("BARANGAY_HTTP_PORT")
            && let Ok(port) = v.parse()
        {
            self.http.port = port;
        }
        if let Ok(v) = std::env::var("BARANGAY_DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("BARANGAY_DATABASE_MAX_CONNECTIONS")
            && let Ok(n) = v.parse()
        {
            self.database.max_connections = n;
        }
        if let Ok(v) = std::env::var("BARANGAY_STORAGE_BACKEND") {
            match v.as_str() {
                "memory" => self.storage.backend = StorageBackend::Memory,
                "postgres" => self.storage.backend = StorageBackend::Postgres,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("BARANGAY_GEOGRAPHY_PATH") {
            self.reference_data.geography_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("BARANGAY_POLICY_ALLOW_SUBTREE_SCOPE")
            && let Ok(flag) = v.parse()
        {
            self.policy.allow_subtree_scope = flag;
        }
        if let Ok(v) = std::env::var("BARANGAY_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("BARANGAY_LOG_FORMAT") {
            match v.as_str() {
                "json" => self.log.format = LogFormat::Json,
                "pretty" => self.log.format = LogFormat::Pretty,
                _ => {}
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == 0 {
            return Err(ConfigError::Validation(
                "http.port must be non-zero".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be non-zero".to_string(),
            ));
        }
        if let Some(field) = self
            .policy
            .self_editable_fields
            .iter()
            .find(|f| !RESIDENT_FIELDS.contains(&f.as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "policy.self_editable_fields: unknown resident field '{field}'"
            )));
        }
        let d = &self.derivation;
        if d.oosy_min_age > d.oosy_max_age {
            return Err(ConfigError::Validation(
                "derivation.oosy_min_age must not exceed derivation.oosy_max_age".to_string(),
            ));
        }
        if d.minor_age_below == 0 || d.senior_age_from <= d.minor_age_below {
            return Err(ConfigError::Validation(
                "derivation.senior_age_from must be greater than derivation.minor_age_below"
                    .to_string(),
            ));
        }
        if self.clock.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Validation(
                "clock.utc_offset_minutes must be within one day".to_string(),
            ));
        }
        Ok(())
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            self_editable_fields: self
                .policy
                .self_editable_fields
                .iter()
                .cloned()
                .collect::<BTreeSet<_>>(),
            allow_subtree_scope: self.policy.allow_subtree_scope,
        }
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse TOML config: {0}")]
    ParseToml(String),

    #[error("config validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_has_sensible_values() {
        let config = AppConfig::default();

        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.derivation.senior_age_from, 60);
        assert_eq!(config.clock.utc_offset_minutes, 480);
        assert!(!config.policy.allow_subtree_scope);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn default_config_validates() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[http]
host = "127.0.0.1"
port = 9090

[storage]
backend = "postgres"

[reference_data]
geography_path = "/etc/barangay/psgc.json"

[policy]
self_editable_fields = ["email"]
allow_subtree_scope = true

[derivation]
senior_age_from = 65

[log]
format = "pretty"
level = "debug"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();

        assert_eq!(config.http.host, "127.0.0.1");
        assert_eq!(config.http.port, 9090);
        assert_eq!(config.storage.backend, StorageBackend::Postgres);
        assert_eq!(
            config.reference_data.geography_path,
            Some(PathBuf::from("/etc/barangay/psgc.json"))
        );
        assert_eq!(config.derivation.senior_age_from, 65);
        assert_eq!(config.derivation.minor_age_below, 18);
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(config.log.level, "debug");

        let policy = config.access_policy();
        assert!(policy.allow_subtree_scope);
        assert_eq!(
            policy.self_editable_fields.into_iter().collect::<Vec<_>>(),
            vec!["email".to_string()]
        );
    }

    #[test]
    fn env_vars_override_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[http]
port = 9090
"#
        )
        .unwrap();

        // SAFETY: test runs single-threaded for this env var
        unsafe { std::env::set_var("BARANGAY_HTTP_PORT", "8181") };
        let config = AppConfig::load(Some(&path)).unwrap();
        unsafe { std::env::remove_var("BARANGAY_HTTP_PORT") };

        assert_eq!(config.http.port, 8181);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/barangay.toml")));

        assert!(matches!(result, Err(ConfigError::ReadFile(..))));
    }

    #[test]
    fn validation_rejects_zero_port() {
        let mut config = AppConfig::default();
        config.http.port = 0;

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("port")));
    }

    #[test]
    fn validation_rejects_unknown_self_editable_field() {
        let mut config = AppConfig::default();
        config.policy.self_editable_fields.push("derived".to_string());

        let result = config.validate();
        assert!(
            matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("derived"))
        );
    }

    #[test]
    fn validation_rejects_inverted_oosy_window() {
        let mut config = AppConfig::default();
        config.derivation.oosy_min_age = 30;

        let result = config.validate();
        assert!(
            matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("oosy_min_age"))
        );
    }
}
