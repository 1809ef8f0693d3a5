//! Streaming package integrity digests.
//!
//! The digest covers the fully written package file (header and payload),
//! not the source binary alone, so recipients can verify the distributed
//! file as a whole. Files are hashed in fixed-size chunks; the digest is
//! independent of the chunk size.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::ProvisionError;

/// Sidecar path for the hex digest record: `<package>.SHA256`.
pub fn digest_sidecar_path(package_path: &Path) -> PathBuf {
    let mut name = package_path.as_os_str().to_os_string();
    name.push(".SHA256");
    PathBuf::from(name)
}

/// Sidecar path for the raw signature bytes: `<package>.SHA256.SIG`.
pub fn signature_sidecar_path(package_path: &Path) -> PathBuf {
    let mut name = package_path.as_os_str().to_os_string();
    name.push(".SHA256.SIG");
    PathBuf::from(name)
}

/// Hash a file with an incremental SHA-256, returning the lower-case hex
/// digest. The file is never loaded whole into memory.
pub fn hash_file(path: &Path, chunk_size: usize) -> Result<String, ProvisionError> {
    let mut file = File::open(path).map_err(|e| ProvisionError::Hash {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = file.read(&mut buf).map_err(|e| ProvisionError::Hash {
            path: path.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Persist the digest record next to the package: exactly the hex text,
/// UTF-8, no trailing newline. Returns the sidecar path.
pub fn write_digest_sidecar(package_path: &Path, digest: &str) -> Result<PathBuf, ProvisionError> {
    let sidecar = digest_sidecar_path(package_path);
    fs::write(&sidecar, digest.as_bytes()).map_err(|e| ProvisionError::ArtifactIo {
        path: sidecar.clone(),
        source: e,
    })?;
    Ok(sidecar)
}
