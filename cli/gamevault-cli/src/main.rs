mod constants;
mod fileio;
mod flags;

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use gamevault_provision::integrity::{digest_sidecar_path, hash_file, signature_sidecar_path};
use gamevault_provision::signing::MIN_KEY_BITS;
use gamevault_provision::{
    decode_public_key_b64, read_package_header, verify_digest_text, CancelToken, CipherEngine,
    CommandCipherEngine, EntryEvent, FactorySecrets, KeyProvider, Orchestrator, ProvisionConfig,
    ProvisionError, DEFAULT_CHUNK_SIZE,
};
use rsa::RsaPublicKey;
use serde_json::{json, Value};

use constants::{
    DEFAULT_CIPHER_TIMEOUT_SECS, DEFAULT_OUTPUT_DIR, MAX_DIGEST_BYTES, MAX_PUBLIC_KEY_BYTES,
    MAX_SIGNATURE_BYTES,
};
use fileio::{read_file_limited, read_text_file_limited};
use flags::{has_switch, optional_string, optional_u64, optional_usize, parse_args, required_path};

const USAGE: &str = "usage:\n  gamevault-cli provision <factory-secrets> <manifest> [--output-dir <dir>] [--cipher-engine <path>] [--cipher-timeout-secs <seconds>] [--chunk-size <bytes>] [--embed-public-key] [--ephemeral-key]\n  gamevault-cli inspect --package <file>\n  gamevault-cli verify --package <file> [--public-key <file>]";

/// Fatal I/O on a required artifact, and usage errors.
const EXIT_FATAL_IO: u8 = 1;
/// The manifest or factory secrets file could not be used at all.
const EXIT_INPUT_OPEN: u8 = 2;

struct Failure {
    code: u8,
    message: String,
}

impl Failure {
    fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self::new(EXIT_FATAL_IO, message)
    }
}

fn main() -> ExitCode {
    match run(env::args().skip(1).collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("command failed: {}", failure.message);
            ExitCode::from(failure.code)
        }
    }
}

fn run(args: Vec<String>) -> Result<(), Failure> {
    let command = args
        .first()
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());
    let started = Instant::now();
    let result = match args.first().map(String::as_str) {
        Some("provision") => run_provision(&args[1..]),
        Some("inspect") => run_inspect(&args[1..]),
        Some("verify") => run_verify(&args[1..]),
        _ => Err(Failure::from(USAGE.to_string())),
    };
    let duration_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(()) => emit_obs(
            "gamevault.command",
            vec![
                ("command", json!(command)),
                ("status", json!("ok")),
                ("duration_ms", json!(duration_ms)),
            ],
        ),
        Err(failure) => emit_obs(
            "gamevault.command",
            vec![
                ("command", json!(command)),
                ("status", json!("error")),
                ("duration_ms", json!(duration_ms)),
                ("error", json!(failure.message)),
            ],
        ),
    }
    result
}

fn run_provision(args: &[String]) -> Result<(), Failure> {
    let (operands, parsed) = parse_args(
        args,
        &[
            "--output-dir",
            "--cipher-engine",
            "--cipher-timeout-secs",
            "--chunk-size",
        ],
        &["--embed-public-key", "--ephemeral-key"],
        USAGE,
    )?;
    let [secrets_operand, manifest_operand] = operands.as_slice() else {
        return Err(Failure::from(USAGE.to_string()));
    };
    let secrets_path = PathBuf::from(secrets_operand);
    let manifest_path = PathBuf::from(manifest_operand);

    let output_dir =
        optional_string(&parsed, "--output-dir").unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());
    let chunk_size = optional_usize(&parsed, "--chunk-size")?.unwrap_or(DEFAULT_CHUNK_SIZE);
    if chunk_size == 0 {
        return Err(Failure::from("--chunk-size must be non-zero".to_string()));
    }
    let timeout_secs =
        optional_u64(&parsed, "--cipher-timeout-secs")?.unwrap_or(DEFAULT_CIPHER_TIMEOUT_SECS);
    let cipher = optional_string(&parsed, "--cipher-engine").map(|program| {
        Box::new(CommandCipherEngine::new(
            program,
            Duration::from_secs(timeout_secs),
        )) as Box<dyn CipherEngine>
    });

    let secrets = FactorySecrets::load(&secrets_path).map_err(provision_failure)?;
    let mut config = ProvisionConfig::new(&output_dir);
    config.chunk_size = chunk_size;
    config.embed_public_key = has_switch(&parsed, "--embed-public-key");
    config.key_provider = if has_switch(&parsed, "--ephemeral-key") {
        KeyProvider::Ephemeral { bits: MIN_KEY_BITS }
    } else {
        KeyProvider::Imported
    };
    let orchestrator = Orchestrator::new(config, secrets, cipher).map_err(provision_failure)?;

    let report = orchestrator
        .run(&manifest_path, &CancelToken::new(), &mut |event| match event {
            EntryEvent::Provisioned(done) => {
                println!("{} -> {}", done.source_path, done.package_path.display());
            }
            EntryEvent::Failed(failed) => {
                eprintln!(
                    "error: {} v{}: {} stage failed: {}",
                    failed.name, failed.version, failed.stage, failed.error
                );
            }
            EntryEvent::Skipped(line) => {
                eprintln!(
                    "skipped malformed manifest line {}: {}",
                    line.line_number, line.text
                );
            }
        })
        .map_err(provision_failure)?;

    emit_obs(
        "gamevault.provision",
        vec![
            ("manifest", json!(manifest_path.display().to_string())),
            ("provisioned", json!(report.provisioned.len())),
            ("failed", json!(report.failed.len())),
            ("skipped", json!(report.skipped.len())),
            ("cancelled", json!(report.cancelled)),
        ],
    );
    println!(
        "OK provision manifest={} provisioned={} failed={} skipped={}",
        manifest_path.display(),
        report.provisioned.len(),
        report.failed.len(),
        report.skipped.len()
    );
    Ok(())
}

fn run_inspect(args: &[String]) -> Result<(), Failure> {
    let (operands, parsed) = parse_args(args, &["--package"], &[], USAGE)?;
    if !operands.is_empty() {
        return Err(Failure::from(USAGE.to_string()));
    }
    let package_path = required_path(&parsed, "--package", USAGE)?;

    let (header, payload_offset) =
        read_package_header(&package_path).map_err(|e| Failure::from(e.to_string()))?;
    let total_bytes = fs::metadata(&package_path)
        .map_err(|e| Failure::from(format!("{}: {e}", package_path.display())))?
        .len();

    println!("name={}", header.name);
    println!("version={}", header.version);
    println!("users={}", header.users.len());
    for (index, user) in header.users.iter().enumerate() {
        println!("user[{index}]={user}");
    }
    println!("public_key_present={}", header.public_key.is_some());
    println!("payload_bytes={}", total_bytes.saturating_sub(payload_offset));
    Ok(())
}

fn run_verify(args: &[String]) -> Result<(), Failure> {
    let (operands, parsed) = parse_args(args, &["--package", "--public-key"], &[], USAGE)?;
    if !operands.is_empty() {
        return Err(Failure::from(USAGE.to_string()));
    }
    let package_path = required_path(&parsed, "--package", USAGE)?;
    let public_key_path = optional_string(&parsed, "--public-key").map(PathBuf::from);

    let digest = hash_file(&package_path, DEFAULT_CHUNK_SIZE)
        .map_err(|e| Failure::from(e.to_string()))?;
    let digest_text = read_file_limited(
        &digest_sidecar_path(&package_path),
        MAX_DIGEST_BYTES,
        "digest record",
    )?;
    if digest_text != digest.as_bytes() {
        return Err(Failure::from(format!(
            "package digest mismatch (expected {digest}, record {})",
            String::from_utf8_lossy(&digest_text)
        )));
    }
    let signature = read_file_limited(
        &signature_sidecar_path(&package_path),
        MAX_SIGNATURE_BYTES,
        "signature record",
    )?;

    let public = load_public_key(&package_path, public_key_path.as_deref())?;
    if !verify_digest_text(&digest_text, &signature, &public) {
        return Err(Failure::from("signature verification failed".to_string()));
    }
    println!("OK verify package={} digest={digest}", package_path.display());
    Ok(())
}

fn load_public_key(
    package_path: &std::path::Path,
    public_key_path: Option<&std::path::Path>,
) -> Result<RsaPublicKey, Failure> {
    match public_key_path {
        Some(path) => {
            let text = read_text_file_limited(path, MAX_PUBLIC_KEY_BYTES, "public key")?;
            decode_public_key_b64(&text).map_err(|e| Failure::from(e.to_string()))
        }
        None => {
            let (header, _) =
                read_package_header(package_path).map_err(|e| Failure::from(e.to_string()))?;
            let embedded = header.public_key.ok_or_else(|| {
                Failure::from("package embeds no public key; pass --public-key".to_string())
            })?;
            decode_public_key_b64(&embedded).map_err(|e| Failure::from(e.to_string()))
        }
    }
}

fn provision_failure(err: ProvisionError) -> Failure {
    let code = match &err {
        ProvisionError::ManifestOpen { .. }
        | ProvisionError::SecretsOpen { .. }
        | ProvisionError::SecretsFormat(_) => EXIT_INPUT_OPEN,
        _ => EXIT_FATAL_IO,
    };
    Failure::new(code, err.to_string())
}

fn obs_enabled() -> bool {
    matches!(
        env::var("GAMEVAULT_OBS_JSON")
            .map(|v| v.to_ascii_lowercase())
            .as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn emit_obs(event: &str, fields: Vec<(&str, Value)>) {
    if !obs_enabled() {
        return;
    }

    let mut record = serde_json::Map::new();
    record.insert("event".to_string(), json!(event));
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    record.insert("timestamp".to_string(), json!(timestamp));
    for (key, value) in fields {
        record.insert(key.to_string(), value);
    }
    eprintln!("{}", Value::Object(record));
}
