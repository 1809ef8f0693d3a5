//! Batch orchestration.
//!
//! Entries are processed strictly in manifest order, one at a time, each
//! through `Package -> Hash -> Sign -> Encrypt`. A failure at any stage
//! aborts only that entry's remaining stages; the batch continues. Only
//! opening the manifest, loading the secrets and creating the output
//! directory are process-fatal.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cipher::CipherEngine;
use crate::integrity;
use crate::manifest::{self, ManifestEntry};
use crate::package;
use crate::secrets::FactorySecrets;
use crate::signing::{KeyProvider, SignatureService};
use crate::{ProvisionError, Stage};

/// Block size for all streamed file copies and hashes.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Batch-level settings, passed in explicitly at construction.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub output_dir: PathBuf,
    pub chunk_size: usize,
    /// Embed the run's public key as a header line in every package
    /// (offline-verification variant); when false the verification key is
    /// distributed out of band.
    pub embed_public_key: bool,
    pub key_provider: KeyProvider,
}

impl ProvisionConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            embed_public_key: false,
            key_provider: KeyProvider::Imported,
        }
    }
}

/// Cooperative stop flag, checked between manifest entries only so a
/// cancelled run never leaves a half-written package behind.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionedEntry {
    pub name: String,
    pub version: String,
    pub source_path: String,
    pub package_path: PathBuf,
    pub encrypted: bool,
}

#[derive(Debug)]
pub struct FailedEntry {
    pub name: String,
    pub version: String,
    pub stage: Stage,
    pub error: ProvisionError,
}

/// A non-empty manifest line that did not match the entry grammar.
#[derive(Debug, Clone)]
pub struct SkippedLine {
    pub line_number: usize,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub provisioned: Vec<ProvisionedEntry>,
    pub failed: Vec<FailedEntry>,
    pub skipped: Vec<SkippedLine>,
    pub cancelled: bool,
}

/// Events surfaced while the batch runs; the CLI turns these into progress
/// and error lines as they happen.
#[derive(Debug)]
pub enum EntryEvent<'a> {
    Provisioned(&'a ProvisionedEntry),
    Failed(&'a FailedEntry),
    Skipped(&'a SkippedLine),
}

pub struct Orchestrator {
    config: ProvisionConfig,
    secrets: FactorySecrets,
    signer: SignatureService,
    cipher: Option<Box<dyn CipherEngine>>,
}

impl Orchestrator {
    /// Resolves the signing key once; it is shared by every entry in the
    /// run so all packages verify against one public key.
    pub fn new(
        config: ProvisionConfig,
        secrets: FactorySecrets,
        cipher: Option<Box<dyn CipherEngine>>,
    ) -> Result<Self, ProvisionError> {
        let signer = SignatureService::new(config.key_provider, &secrets)?;
        Ok(Self {
            config,
            secrets,
            signer,
            cipher,
        })
    }

    pub fn public_key_b64(&self) -> Result<String, ProvisionError> {
        self.signer.public_key_b64()
    }

    /// Drive the whole manifest. Entry failures are recorded in the report
    /// and never abort the batch; the returned error covers process-fatal
    /// conditions only. Re-running with identical inputs is safe: outputs
    /// are deterministically named and fully overwritten.
    pub fn run(
        &self,
        manifest_path: &Path,
        cancel: &CancelToken,
        observer: &mut dyn FnMut(EntryEvent<'_>),
    ) -> Result<ProvisionReport, ProvisionError> {
        let file = File::open(manifest_path).map_err(|e| ProvisionError::ManifestOpen {
            path: manifest_path.to_path_buf(),
            source: e,
        })?;
        fs::create_dir_all(&self.config.output_dir).map_err(|e| ProvisionError::OutputDir {
            path: self.config.output_dir.clone(),
            source: e,
        })?;

        let mut report = ProvisionReport::default();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let line = line.map_err(|e| ProvisionError::ManifestOpen {
                path: manifest_path.to_path_buf(),
                source: e,
            })?;
            let Some(entry) = manifest::parse_manifest_line(&line) else {
                if !line.trim().is_empty() {
                    report.skipped.push(SkippedLine {
                        line_number: index + 1,
                        text: line.trim().to_string(),
                    });
                    observer(EntryEvent::Skipped(
                        report.skipped.last().expect("skip was just recorded"),
                    ));
                }
                continue;
            };
            match self.provision_entry(&entry) {
                Ok(done) => {
                    report.provisioned.push(done);
                    observer(EntryEvent::Provisioned(
                        report.provisioned.last().expect("entry was just recorded"),
                    ));
                }
                Err((stage, error)) => {
                    report.failed.push(FailedEntry {
                        name: entry.name.clone(),
                        version: entry.version.clone(),
                        stage,
                        error,
                    });
                    observer(EntryEvent::Failed(
                        report.failed.last().expect("failure was just recorded"),
                    ));
                }
            }
        }
        Ok(report)
    }

    /// One entry through the stage machine; the failing stage is reported
    /// alongside the error so an operator can re-run just this entry.
    fn provision_entry(
        &self,
        entry: &ManifestEntry,
    ) -> Result<ProvisionedEntry, (Stage, ProvisionError)> {
        let package_path = self
            .config
            .output_dir
            .join(package::package_file_name(entry));

        let embedded_key = if self.config.embed_public_key {
            Some(self.signer.public_key_b64().map_err(|e| (Stage::Package, e))?)
        } else {
            None
        };
        package::build_package(
            entry,
            Path::new(&entry.source_path),
            &package_path,
            self.config.chunk_size,
            embedded_key.as_deref(),
        )
        .map_err(|e| (Stage::Package, e))?;

        let digest = integrity::hash_file(&package_path, self.config.chunk_size)
            .map_err(|e| (Stage::Hash, e))?;
        let digest_path = integrity::write_digest_sidecar(&package_path, &digest)
            .map_err(|e| (Stage::Hash, e))?;

        // The signed value is the digest record as persisted, read back
        // from disk, so the signature covers exactly what ships.
        let digest_text = fs::read(&digest_path).map_err(|e| {
            (
                Stage::Sign,
                ProvisionError::ArtifactIo {
                    path: digest_path.clone(),
                    source: e,
                },
            )
        })?;
        let signature = self
            .signer
            .sign_digest_text(&digest_text)
            .map_err(|e| (Stage::Sign, e))?;
        let signature_path = integrity::signature_sidecar_path(&package_path);
        fs::write(&signature_path, &signature).map_err(|e| {
            (
                Stage::Sign,
                ProvisionError::ArtifactIo {
                    path: signature_path.clone(),
                    source: e,
                },
            )
        })?;

        let mut encrypted = false;
        if let Some(engine) = &self.cipher {
            engine
                .encrypt_in_place(
                    &package_path,
                    self.secrets.symmetric_key_b64(),
                    self.secrets.nonce_b64(),
                )
                .map_err(|e| (Stage::Encrypt, e))?;
            encrypted = true;
        }

        Ok(ProvisionedEntry {
            name: entry.name.clone(),
            version: entry.version.clone(),
            source_path: entry.source_path.clone(),
            package_path,
            encrypted,
        })
    }
}
