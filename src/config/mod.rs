pub mod secrets;
pub mod tls;

use crate::models::ServerConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 2;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub kieservers: Vec<ServerConfig>,
    pub retry_interval_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub callback_timeout_secs: u64,
    pub secrets_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let database_url = crate::paths::data_dir()
            .map(|dir| format!("sqlite:{}", dir.join("process_migration.db").display()))
            .unwrap_or_else(|_| "sqlite:process_migration.db".to_string());
        Self {
            database_url,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            kieservers: Vec::new(),
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            callback_timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
            secrets_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = Self::from_conf_file()? {
            config.apply_file(file_config);
        }

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(host) = std::env::var("HOST") {
            config.host = host;
        }

        if let Ok(port) = std::env::var("PORT") {
            config.port = port.parse().unwrap_or(DEFAULT_PORT);
        }

        if let Ok(secrets_path) = std::env::var("PIM_SECRETS_PATH") {
            config.secrets_path = Some(PathBuf::from(secrets_path));
        }

        config.normalize_database_url()?;
        config.normalize_secrets_path()?;
        config.validate_servers()?;
        Ok(config)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs.max(1))
    }

    fn from_conf_file() -> Result<Option<FileConfig>> {
        let path = crate::paths::conf_dir()?.join("config.json");
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file_config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(Some(file_config))
    }

    fn apply_file(&mut self, file_config: FileConfig) {
        if let Some(database_url) = file_config.database_url {
            self.database_url = database_url;
        }
        if let Some(host) = file_config.host {
            self.host = host;
        }
        if let Some(port) = file_config.port {
            self.port = port;
        }
        if let Some(kieservers) = file_config.kieservers {
            self.kieservers = kieservers;
        }
        if let Some(retry_interval_secs) = file_config.retry_interval_secs {
            self.retry_interval_secs = retry_interval_secs;
        }
        if let Some(shutdown_timeout_secs) = file_config.shutdown_timeout_secs {
            self.shutdown_timeout_secs = shutdown_timeout_secs;
        }
        if let Some(callback_timeout_secs) = file_config.callback_timeout_secs {
            self.callback_timeout_secs = callback_timeout_secs;
        }
        if let Some(secrets_path) = file_config.secrets_path {
            self.secrets_path = Some(PathBuf::from(secrets_path));
        }
    }

    fn normalize_database_url(&mut self) -> Result<()> {
        let Some(path_str) = self.database_url.strip_prefix("sqlite:") else {
            return Ok(());
        };

        let path = Path::new(path_str);
        if path.is_absolute() {
            return Ok(());
        }

        if path
            .components()
            .any(|component| matches!(component, std::path::Component::ParentDir))
        {
            anyhow::bail!("SQLite database path cannot contain '..'");
        }

        let root = crate::paths::install_root()?;
        let absolute = root.join(path);
        self.database_url = format!("sqlite:{}", absolute.display());
        Ok(())
    }

    fn normalize_secrets_path(&mut self) -> Result<()> {
        let Some(path) = self.secrets_path.as_ref() else {
            return Ok(());
        };

        if path.to_string_lossy().trim().is_empty() {
            anyhow::bail!("secrets_path in config cannot be empty");
        }

        if path.is_relative() {
            self.secrets_path = Some(crate::paths::conf_dir()?.join(path));
        }
        Ok(())
    }

    fn validate_servers(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for server in &self.kieservers {
            if server.id.trim().is_empty() {
                anyhow::bail!("kie server with host {} has an empty id", server.host);
            }
            if server.host.trim().is_empty() {
                anyhow::bail!("kie server {} has an empty host", server.id);
            }
            if !seen.insert(server.id.as_str()) {
                anyhow::bail!("kie server id {} is configured more than once", server.id);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    database_url: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    kieservers: Option<Vec<ServerConfig>>,
    retry_interval_secs: Option<u64>,
    shutdown_timeout_secs: Option<u64>,
    callback_timeout_secs: Option<u64>,
    secrets_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_JSON: &str = r#"{
        "port": 8090,
        "retry_interval_secs": 3,
        "callback_timeout_secs": 20,
        "secrets_path": "secrets.json",
        "kieservers": [
            {
                "id": "kie-server-1",
                "host": "http://localhost:8180/kie-server/services/rest/server",
                "username": "admin",
                "password": "admin123"
            },
            {
                "id": "vault",
                "name": "Vault backed",
                "host": "https://kie.example.com/services/rest/server",
                "credentials_provider": "kieserver6",
                "client_cert": {
                    "cert_name": "pim",
                    "cert_password": "changeit",
                    "keystore_path": "/etc/pim/keystore.pem",
                    "keystore_credentials_provider": "keystore",
                    "truststore_path": "/etc/pim/truststore.pem",
                    "truststore_password": "changeit"
                }
            }
        ]
    }"#;

    #[test]
    fn file_values_override_defaults() {
        let file_config: FileConfig = serde_json::from_str(CONFIG_JSON).unwrap();
        let mut config = Config {
            database_url: "sqlite:test.db".to_string(),
            ..Config::default()
        };
        config.apply_file(file_config);

        assert_eq!(config.port, 8090);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.retry_interval(), Duration::from_secs(3));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.callback_timeout(), Duration::from_secs(20));
        assert_eq!(config.secrets_path, Some(PathBuf::from("secrets.json")));
        assert_eq!(config.kieservers.len(), 2);
        assert_eq!(config.kieservers[0].display_name(), "kie-server-1");
        assert_eq!(config.kieservers[1].display_name(), "Vault backed");
        let cert = config.kieservers[1].client_cert.as_ref().unwrap();
        assert_eq!(cert.keystore_credentials_provider.as_deref(), Some("keystore"));
        assert!(config.validate_servers().is_ok());
    }

    #[test]
    fn retry_interval_never_drops_to_zero() {
        let config = Config {
            retry_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.retry_interval(), Duration::from_secs(1));
    }

    #[test]
    fn duplicate_server_ids_are_rejected() {
        let file_config: FileConfig = serde_json::from_str(CONFIG_JSON).unwrap();
        let mut config = Config::default();
        config.apply_file(file_config);
        let duplicate = config.kieservers[0].clone();
        config.kieservers.push(duplicate);

        assert!(config.validate_servers().is_err());
    }

    #[test]
    fn absolute_database_path_is_kept() {
        let mut config = Config {
            database_url: "sqlite:/var/lib/pim/pim.db".to_string(),
            ..Config::default()
        };
        config.normalize_database_url().unwrap();
        assert_eq!(config.database_url, "sqlite:/var/lib/pim/pim.db");
    }

    #[test]
    fn database_path_with_parent_dir_is_rejected() {
        let mut config = Config {
            database_url: "sqlite:../pim.db".to_string(),
            ..Config::default()
        };
        assert!(config.normalize_database_url().is_err());
    }
}
