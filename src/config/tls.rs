//! PEM material for mutual TLS against kie servers.
//!
//! A keystore is a PEM file holding the client certificate chain and its
//! private key. The key may be an encrypted PKCS#8 block, in which case it is
//! opened with the certificate password. A truststore is a PEM bundle of
//! trusted roots. Both are read and checked when the server is loaded.

use crate::error::{AppError, Result};
use pkcs8::der::Document;
use pkcs8::{EncryptedPrivateKeyInfo, LineEnding};
use std::fmt;
use std::path::Path;

const CERTIFICATE_LABEL: &str = "CERTIFICATE";
const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";
const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

struct PemBlock {
    label: String,
    text: String,
}

/// Reads a keystore and returns the certificate chain followed by the
/// decrypted private key, in the form `reqwest::Identity::from_pem` accepts.
pub fn load_identity(path: &Path, key_password: &str) -> Result<Vec<u8>> {
    let content = read_pem(path, "keystore")?;

    let mut chain = String::new();
    let mut key = None;
    for block in pem_blocks(&content) {
        if block.label == CERTIFICATE_LABEL {
            chain.push_str(&block.text);
        } else if block.label == ENCRYPTED_KEY_LABEL {
            key = Some(decrypt_key(&block.text, key_password, path)?);
        } else if block.label.ends_with(PRIVATE_KEY_LABEL) {
            key = Some(block.text);
        }
    }

    if chain.is_empty() {
        return Err(AppError::Configuration(format!(
            "Keystore {} has no certificate",
            path.display()
        )));
    }
    let key = key.ok_or_else(|| {
        AppError::Configuration(format!("Keystore {} has no private key", path.display()))
    })?;

    let identity = format!("{}{}", chain, key).into_bytes();
    reqwest::Identity::from_pem(&identity).map_err(|e| {
        AppError::Configuration(format!("Invalid keystore {}: {}", path.display(), e))
    })?;
    Ok(identity)
}

/// Reads a truststore and checks it holds at least one certificate.
pub fn load_roots(path: &Path) -> Result<Vec<u8>> {
    let content = read_pem(path, "truststore")?;
    let roots = reqwest::Certificate::from_pem_bundle(content.as_bytes()).map_err(|e| {
        AppError::Configuration(format!("Invalid truststore {}: {}", path.display(), e))
    })?;
    if roots.is_empty() {
        return Err(AppError::Configuration(format!(
            "Truststore {} has no certificate",
            path.display()
        )));
    }
    Ok(content.into_bytes())
}

fn read_pem(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        AppError::Configuration(format!("Failed to read {} {}: {}", what, path.display(), e))
    })
}

fn decrypt_key(block: &str, password: &str, path: &Path) -> Result<String> {
    let (_, document) = Document::from_pem(block).map_err(|e| invalid_key(path, e))?;
    let encrypted =
        EncryptedPrivateKeyInfo::try_from(document.as_bytes()).map_err(|e| invalid_key(path, e))?;
    let decrypted = encrypted.decrypt(password).map_err(|e| {
        AppError::Credentials(format!(
            "Unable to decrypt private key in {}: {}",
            path.display(),
            e
        ))
    })?;
    let pem = decrypted
        .to_pem(PRIVATE_KEY_LABEL, LineEnding::LF)
        .map_err(|e| invalid_key(path, e))?;
    Ok(pem.as_str().to_string())
}

fn invalid_key(path: &Path, e: impl fmt::Display) -> AppError {
    AppError::Configuration(format!("Invalid encrypted key in {}: {}", path.display(), e))
}

fn pem_blocks(content: &str) -> Vec<PemBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<PemBlock> = None;

    for line in content.lines().map(str::trim) {
        if let Some(label) = line
            .strip_prefix("-----BEGIN ")
            .and_then(|rest| rest.strip_suffix("-----"))
        {
            current = Some(PemBlock {
                label: label.to_string(),
                text: String::new(),
            });
        }
        if let Some(block) = current.as_mut() {
            block.text.push_str(line);
            block.text.push('\n');
        }
        if line.starts_with("-----END ") {
            blocks.extend(current.take());
        }
    }
    blocks
}
