//! External cipher engine invocation.
//!
//! The symmetric transform is never performed here. The engine is an
//! external collaborator invoked as `<program> <packagePath> <keyText>
//! <nonceText>`; key and nonce cross the boundary as the base64 text from
//! the factory secrets file. Argument order and encoding are part of the
//! external protocol and must stay stable across engine implementations.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::ProvisionError;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Capability seam for in-place package encryption, so the pipeline can be
/// tested against an in-process fake and run against a subprocess in
/// production.
pub trait CipherEngine {
    fn encrypt_in_place(
        &self,
        package_path: &Path,
        key_b64: &str,
        nonce_b64: &str,
    ) -> Result<(), ProvisionError>;
}

/// Invokes the engine command and classifies the outcome: zero exit is
/// success; non-zero exit, launch failure and timeout are distinct
/// entry-level errors.
pub struct CommandCipherEngine {
    program: PathBuf,
    timeout: Duration,
}

impl CommandCipherEngine {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl CipherEngine for CommandCipherEngine {
    fn encrypt_in_place(
        &self,
        package_path: &Path,
        key_b64: &str,
        nonce_b64: &str,
    ) -> Result<(), ProvisionError> {
        let mut child = Command::new(&self.program)
            .arg(package_path)
            .arg(key_b64)
            .arg(nonce_b64)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ProvisionError::CipherLaunch(format!("{}: {e}", self.program.display()))
            })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Err(e) => return Err(ProvisionError::CipherLaunch(format!("wait failed: {e}"))),
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    let mut stderr = String::new();
                    if let Some(mut pipe) = child.stderr.take() {
                        let _ = pipe.read_to_string(&mut stderr);
                    }
                    return Err(ProvisionError::CipherExit {
                        status: status.to_string(),
                        stderr: stderr.trim().to_string(),
                    });
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ProvisionError::CipherTimeout(self.timeout));
                    }
                    thread::sleep(WAIT_POLL_INTERVAL);
                }
            }
        }
    }
}
