//! Factory secrets parsing.
//!
//! The secrets file is produced by the factory provisioning step and
//! consumed, never generated, here. Layout is line-oriented and
//! order-significant, one base64 value per line:
//!
//! ```text
//! nonce
//! symmetric key
//! rsa p
//! rsa q
//! rsa dP
//! rsa dQ
//! rsa qInv
//! ```

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::ProvisionError;

/// Expected decoded length of the symmetric key.
pub const SYMMETRIC_KEY_LEN: usize = 32;
/// Expected decoded length of the cipher nonce.
pub const NONCE_LEN: usize = 8;

const SECRETS_LINES: usize = 7;

/// RSA CRT components supplied by the factory, big-endian bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct CrtComponents {
    pub p: Vec<u8>,
    pub q: Vec<u8>,
    pub dp: Vec<u8>,
    pub dq: Vec<u8>,
    pub qinv: Vec<u8>,
}

/// Key material for one provisioning run.
///
/// The symmetric key and nonce are kept in the base64 text form because
/// that is exactly what crosses the cipher-engine boundary; the RSA
/// components are decoded for key reconstruction.
#[derive(Clone)]
pub struct FactorySecrets {
    nonce_b64: String,
    key_b64: String,
    rsa: CrtComponents,
}

impl std::fmt::Debug for FactorySecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactorySecrets")
            .field("nonce_b64", &"[redacted]")
            .field("key_b64", &"[redacted]")
            .field("rsa", &"[redacted]")
            .finish()
    }
}

impl FactorySecrets {
    pub fn load(path: &Path) -> Result<Self, ProvisionError> {
        let raw = fs::read_to_string(path).map_err(|e| ProvisionError::SecretsOpen {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ProvisionError> {
        let lines: Vec<&str> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.len() != SECRETS_LINES {
            return Err(ProvisionError::SecretsFormat(format!(
                "expected {SECRETS_LINES} lines, found {}",
                lines.len()
            )));
        }
        let nonce = decode_line(lines[0], "nonce")?;
        if nonce.len() != NONCE_LEN {
            return Err(ProvisionError::SecretsFormat(format!(
                "nonce must decode to {NONCE_LEN} bytes, got {}",
                nonce.len()
            )));
        }
        let key = decode_line(lines[1], "symmetric key")?;
        if key.len() != SYMMETRIC_KEY_LEN {
            return Err(ProvisionError::SecretsFormat(format!(
                "symmetric key must decode to {SYMMETRIC_KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let rsa = CrtComponents {
            p: decode_line(lines[2], "rsa p")?,
            q: decode_line(lines[3], "rsa q")?,
            dp: decode_line(lines[4], "rsa dP")?,
            dq: decode_line(lines[5], "rsa dQ")?,
            qinv: decode_line(lines[6], "rsa qInv")?,
        };
        Ok(Self {
            nonce_b64: lines[0].to_string(),
            key_b64: lines[1].to_string(),
            rsa,
        })
    }

    /// Nonce exactly as it crosses the cipher-engine boundary.
    pub fn nonce_b64(&self) -> &str {
        &self.nonce_b64
    }

    /// Symmetric key exactly as it crosses the cipher-engine boundary.
    pub fn symmetric_key_b64(&self) -> &str {
        &self.key_b64
    }

    pub fn rsa(&self) -> &CrtComponents {
        &self.rsa
    }
}

fn decode_line(line: &str, what: &str) -> Result<Vec<u8>, ProvisionError> {
    STANDARD
        .decode(line.as_bytes())
        .map_err(|_| ProvisionError::SecretsFormat(format!("invalid base64 {what}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    fn valid_secrets_text() -> String {
        [
            b64(&[1u8; NONCE_LEN]),
            b64(&[2u8; SYMMETRIC_KEY_LEN]),
            b64(&[3u8; 128]),
            b64(&[5u8; 128]),
            b64(&[7u8; 128]),
            b64(&[9u8; 128]),
            b64(&[11u8; 128]),
        ]
        .join("\n")
    }

    #[test]
    fn parses_seven_line_file() {
        let secrets = FactorySecrets::parse(&valid_secrets_text()).expect("secrets should parse");
        assert_eq!(secrets.rsa().p, vec![3u8; 128]);
        assert_eq!(secrets.nonce_b64(), b64(&[1u8; NONCE_LEN]));
    }

    #[test]
    fn rejects_wrong_line_count() {
        let text = valid_secrets_text();
        let truncated = text.rsplit_once('\n').expect("text has lines").0;
        assert!(matches!(
            FactorySecrets::parse(truncated),
            Err(ProvisionError::SecretsFormat(_))
        ));
    }

    #[test]
    fn rejects_bad_base64() {
        let mut lines: Vec<String> = valid_secrets_text().lines().map(String::from).collect();
        lines[2] = "not base64!!".to_string();
        assert!(matches!(
            FactorySecrets::parse(&lines.join("\n")),
            Err(ProvisionError::SecretsFormat(_))
        ));
    }

    #[test]
    fn rejects_short_symmetric_key() {
        let mut lines: Vec<String> = valid_secrets_text().lines().map(String::from).collect();
        lines[1] = b64(&[2u8; 16]);
        assert!(matches!(
            FactorySecrets::parse(&lines.join("\n")),
            Err(ProvisionError::SecretsFormat(_))
        ));
    }

    #[test]
    fn debug_output_is_redacted() {
        let secrets = FactorySecrets::parse(&valid_secrets_text()).expect("secrets should parse");
        let rendered = format!("{secrets:?}");
        assert!(!rendered.contains(&b64(&[2u8; SYMMETRIC_KEY_LEN])));
    }
}
