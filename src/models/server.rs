use crate::config::secrets::{SecretStore, resolve_secret};
use crate::config::tls;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

const CREDENTIALS_PROVIDER_USER_KEY: &str = "user";
const CREDENTIALS_PROVIDER_PASSWORD_KEY: &str = "password";

/// One configured remote process server, as loaded from configuration.
#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    pub id: String,
    pub name: Option<String>,
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub credentials_provider: Option<String>,
    pub client_cert: Option<ClientCertConfig>,
}

#[derive(Clone, Deserialize)]
pub struct ClientCertConfig {
    pub cert_name: String,
    pub cert_password: Option<String>,
    pub cert_credentials_provider: Option<String>,
    pub keystore_path: PathBuf,
    pub keystore_password: Option<String>,
    pub keystore_credentials_provider: Option<String>,
    pub truststore_path: PathBuf,
    pub truststore_password: Option<String>,
    pub truststore_credentials_provider: Option<String>,
}

#[derive(Clone, PartialEq)]
pub enum Credentials {
    Anonymous,
    Basic {
        username: String,
        password: Option<String>,
    },
    Bearer(String),
}

/// PEM material for mutual TLS, read from disk when the server is loaded.
/// `identity_pem` holds the certificate chain and the decrypted private key.
#[derive(Clone, PartialEq)]
pub struct ClientCertificate {
    pub cert_name: String,
    pub identity_pem: Vec<u8>,
    pub roots_pem: Vec<u8>,
}

/// Everything needed to open a client against a server, resolved up front.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerAuth {
    pub credentials: Credentials,
    pub client_cert: Option<ClientCertificate>,
}

/// Identity reported by the remote server itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerIdentity {
    pub server_id: String,
    pub name: String,
    pub version: Option<String>,
}

impl ServerConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn resolve_auth(&self, secrets: &dyn SecretStore) -> Result<ServerAuth> {
        let mut credentials = if let Some(key) = &self.credentials_provider {
            let user = secrets
                .get(key, CREDENTIALS_PROVIDER_USER_KEY)
                .ok_or_else(|| {
                    AppError::Credentials(format!("Missing credential in vault with key {}", key))
                })?;
            Credentials::Basic {
                username: user,
                password: secrets.get(key, CREDENTIALS_PROVIDER_PASSWORD_KEY),
            }
        } else if let (Some(username), Some(password)) = (&self.username, &self.password) {
            Credentials::Basic {
                username: username.clone(),
                password: Some(password.clone()),
            }
        } else {
            Credentials::Anonymous
        };

        if let Some(token) = &self.token {
            credentials = Credentials::Bearer(token.clone());
        }

        let client_cert = self
            .client_cert
            .as_ref()
            .map(|cert| cert.resolve(secrets))
            .transpose()?;

        Ok(ServerAuth {
            credentials,
            client_cert,
        })
    }
}

impl ClientCertConfig {
    fn resolve(&self, secrets: &dyn SecretStore) -> Result<ClientCertificate> {
        let cert_password = resolve_secret(
            secrets,
            self.cert_password.as_deref(),
            self.cert_credentials_provider.as_deref(),
        )?;
        // PEM stores have no integrity password; these only need to resolve.
        resolve_secret(
            secrets,
            self.keystore_password.as_deref(),
            self.keystore_credentials_provider.as_deref(),
        )?;
        resolve_secret(
            secrets,
            self.truststore_password.as_deref(),
            self.truststore_credentials_provider.as_deref(),
        )?;

        Ok(ClientCertificate {
            cert_name: self.cert_name.clone(),
            identity_pem: tls::load_identity(&self.keystore_path, &cert_password)?,
            roots_pem: tls::load_roots(&self.truststore_path)?,
        })
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("credentials_provider", &self.credentials_provider)
            .field("has_password", &self.password.is_some())
            .field("has_token", &self.token.is_some())
            .field("client_cert", &self.client_cert.as_ref().map(|c| &c.cert_name))
            .finish()
    }
}

impl fmt::Debug for ClientCertConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertConfig")
            .field("cert_name", &self.cert_name)
            .field("keystore_path", &self.keystore_path)
            .field("truststore_path", &self.truststore_path)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("cert_name", &self.cert_name)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Anonymous => f.write_str("Anonymous"),
            Credentials::Basic { username, .. } => {
                f.debug_struct("Basic").field("username", username).finish_non_exhaustive()
            }
            Credentials::Bearer(_) => f.write_str("Bearer(..)"),
        }
    }
}
