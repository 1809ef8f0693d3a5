//! Signed game package provisioning pipeline.
//!
//! Given a line-oriented manifest of game binaries, the pipeline wraps each
//! binary in a self-describing container, computes a streaming SHA-256
//! digest over the finished container, signs the digest record with an RSA
//! PKCS#1 v1.5 key, and optionally hands the package to an external cipher
//! engine for in-place encryption.
//!
//! One failed entry never aborts the batch: every stage reports a typed
//! error that is caught at the entry boundary by the orchestrator.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub mod cipher;
pub mod integrity;
pub mod manifest;
pub mod orchestrator;
pub mod package;
pub mod secrets;
pub mod signing;

pub use cipher::{CipherEngine, CommandCipherEngine};
pub use manifest::{parse_manifest_line, ManifestEntry};
pub use orchestrator::{
    CancelToken, EntryEvent, FailedEntry, Orchestrator, ProvisionConfig, ProvisionReport,
    ProvisionedEntry, SkippedLine, DEFAULT_CHUNK_SIZE,
};
pub use package::{build_package, package_file_name, read_package_header, PackageHeader};
pub use secrets::{CrtComponents, FactorySecrets};
pub use signing::{decode_public_key_b64, verify_digest_text, KeyProvider, SignatureService};

/// Pipeline stage an entry was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Package,
    Hash,
    Sign,
    Encrypt,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Package => "package",
            Stage::Hash => "hash",
            Stage::Sign => "sign",
            Stage::Encrypt => "encrypt",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("could not read manifest {}: {}", path.display(), source)]
    ManifestOpen { path: PathBuf, source: io::Error },
    #[error("could not open factory secrets {}: {}", path.display(), source)]
    SecretsOpen { path: PathBuf, source: io::Error },
    #[error("invalid factory secrets: {0}")]
    SecretsFormat(String),
    #[error("could not create output directory {}: {}", path.display(), source)]
    OutputDir { path: PathBuf, source: io::Error },
    #[error("{}: {}", path.display(), source)]
    ArtifactIo { path: PathBuf, source: io::Error },
    #[error("hashing {} failed: {}", path.display(), source)]
    Hash { path: PathBuf, source: io::Error },
    #[error("signing failed: {0}")]
    Sign(String),
    #[error("invalid key material: {0}")]
    Key(String),
    #[error("cipher engine failed to launch: {0}")]
    CipherLaunch(String),
    #[error("cipher engine failed ({status}): {stderr}")]
    CipherExit { status: String, stderr: String },
    #[error("cipher engine timed out after {0:?}")]
    CipherTimeout(Duration),
    #[error("malformed package {}: {}", path.display(), reason)]
    PackageFormat { path: PathBuf, reason: String },
}

impl ProvisionError {
    /// True for conditions that abort the whole run rather than one entry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProvisionError::ManifestOpen { .. }
                | ProvisionError::SecretsOpen { .. }
                | ProvisionError::SecretsFormat(_)
                | ProvisionError::OutputDir { .. }
        )
    }
}
