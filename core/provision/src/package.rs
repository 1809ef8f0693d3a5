//! Package container format.
//!
//! A package is a single file `<name>-v<version>`: ordered `key:value`
//! header lines followed by the raw payload bytes, unterminated.
//!
//! ```text
//! version:1.0
//! name:2048
//! users:drew ben lou hunter
//! public_key:<base64 DER>        (mode-dependent, may be absent)
//! <payload>
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use crate::manifest::ManifestEntry;
use crate::ProvisionError;

/// Parsed header of a built package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageHeader {
    pub version: String,
    pub name: String,
    pub users: Vec<String>,
    pub public_key: Option<String>,
}

impl PackageHeader {
    /// Membership check; the authorization list is a set on the read side.
    pub fn authorizes(&self, user: &str) -> bool {
        self.users.iter().any(|u| u == user)
    }
}

/// Output file name for an entry: `<name>-v<version>`.
pub fn package_file_name(entry: &ManifestEntry) -> String {
    format!("{}-v{}", entry.name, entry.version)
}

/// Write the container: header lines in fixed order, then the source
/// binary copied in `chunk_size` blocks so memory use is independent of
/// the artifact size. Returns the number of payload bytes copied.
///
/// Open and write failures are fatal for this entry only; open handles are
/// closed on the early-return path by drop.
pub fn build_package(
    entry: &ManifestEntry,
    source_path: &Path,
    dest_path: &Path,
    chunk_size: usize,
    public_key_b64: Option<&str>,
) -> Result<u64, ProvisionError> {
    let mut source = File::open(source_path).map_err(|e| ProvisionError::ArtifactIo {
        path: source_path.to_path_buf(),
        source: e,
    })?;
    let mut dest = File::create(dest_path).map_err(|e| ProvisionError::ArtifactIo {
        path: dest_path.to_path_buf(),
        source: e,
    })?;

    let mut header = String::new();
    header.push_str(&format!("version:{}\n", entry.version));
    header.push_str(&format!("name:{}\n", entry.name));
    header.push_str(&format!("users:{}\n", entry.users.join(" ")));
    if let Some(key) = public_key_b64 {
        header.push_str(&format!("public_key:{key}\n"));
    }
    dest.write_all(header.as_bytes())
        .map_err(|e| ProvisionError::ArtifactIo {
            path: dest_path.to_path_buf(),
            source: e,
        })?;

    let mut copied = 0u64;
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = source.read(&mut buf).map_err(|e| ProvisionError::ArtifactIo {
            path: source_path.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        dest.write_all(&buf[..n])
            .map_err(|e| ProvisionError::ArtifactIo {
                path: dest_path.to_path_buf(),
                source: e,
            })?;
        copied += n as u64;
    }
    Ok(copied)
}

/// Parse the header lines back out of a package file.
///
/// Returns the header and the byte offset at which the payload begins.
/// Header write order is fixed; `users` membership is order-insensitive on
/// the read side. A payload whose first bytes happen to spell a
/// `public_key:` line is indistinguishable from the embedded-key variant;
/// the provisioning mode disambiguates for callers that care.
pub fn read_package_header(path: &Path) -> Result<(PackageHeader, u64), ProvisionError> {
    let file = File::open(path).map_err(|e| ProvisionError::ArtifactIo {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = BufReader::new(file);
    let mut offset = 0u64;

    let version = expect_header_line(&mut reader, path, "version", &mut offset)?;
    let name = expect_header_line(&mut reader, path, "name", &mut offset)?;
    let users_value = expect_header_line(&mut reader, path, "users", &mut offset)?;
    let users: Vec<String> = users_value
        .split(' ')
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect();
    if users.is_empty() {
        return Err(ProvisionError::PackageFormat {
            path: path.to_path_buf(),
            reason: "users header line is empty".to_string(),
        });
    }

    let mut line = Vec::new();
    let n = reader
        .read_until(b'\n', &mut line)
        .map_err(|e| ProvisionError::ArtifactIo {
            path: path.to_path_buf(),
            source: e,
        })?;
    let mut public_key = None;
    let mut payload_offset = offset;
    if n > 0 && line.starts_with(b"public_key:") && line.ends_with(b"\n") {
        let value = &line["public_key:".len()..line.len() - 1];
        let value = std::str::from_utf8(value).map_err(|_| ProvisionError::PackageFormat {
            path: path.to_path_buf(),
            reason: "public_key header line is not UTF-8".to_string(),
        })?;
        public_key = Some(value.to_string());
        payload_offset += n as u64;
    }

    Ok((
        PackageHeader {
            version,
            name,
            users,
            public_key,
        },
        payload_offset,
    ))
}

fn expect_header_line(
    reader: &mut BufReader<File>,
    path: &Path,
    key: &str,
    offset: &mut u64,
) -> Result<String, ProvisionError> {
    let mut line = Vec::new();
    let n = reader
        .read_until(b'\n', &mut line)
        .map_err(|e| ProvisionError::ArtifactIo {
            path: path.to_path_buf(),
            source: e,
        })?;
    let malformed = |reason: String| ProvisionError::PackageFormat {
        path: path.to_path_buf(),
        reason,
    };
    if n == 0 || !line.ends_with(b"\n") {
        return Err(malformed(format!("missing {key} header line")));
    }
    let text = std::str::from_utf8(&line[..line.len() - 1])
        .map_err(|_| malformed(format!("{key} header line is not UTF-8")))?;
    let (found_key, value) = text
        .split_once(':')
        .ok_or_else(|| malformed(format!("missing {key} header line")))?;
    if found_key != key {
        return Err(malformed(format!(
            "expected {key} header line, found {found_key}"
        )));
    }
    *offset += n as u64;
    Ok(value.to_string())
}
