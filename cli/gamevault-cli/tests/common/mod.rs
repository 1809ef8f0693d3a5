#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use num_bigint_dig::ModInverse;
use rand::rngs::OsRng;
use rsa::traits::PrivateKeyParts;
use rsa::{BigUint, RsaPrivateKey};

static UNIQUE_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn temp_dir(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should be monotonic")
        .as_nanos();
    let uniq = UNIQUE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "gamevault-cli-{test_name}-{}-{nanos}-{uniq}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("temp dir should be created");
    dir
}

pub fn write(path: &PathBuf, bytes: &[u8]) {
    fs::write(path, bytes).expect("write should succeed");
}

/// One RSA key for the whole test binary; 2048-bit generation is too slow
/// to repeat per test.
pub fn generated_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).expect("key generation"))
}

/// Factory secrets text whose CRT components describe the shared test key.
pub fn secrets_text() -> &'static str {
    static TEXT: OnceLock<String> = OnceLock::new();
    TEXT.get_or_init(|| {
        let key = generated_key();
        let primes = key.primes();
        let (p, q) = (&primes[0], &primes[1]);
        let one = BigUint::from(1u32);
        let dp = key.d() % (p - &one);
        let dq = key.d() % (q - &one);
        let qinv = q
            .mod_inverse(p)
            .and_then(|v| v.to_biguint())
            .expect("q should be invertible modulo p");
        [
            STANDARD.encode([7u8; 8]),
            STANDARD.encode([42u8; 32]),
            STANDARD.encode(p.to_bytes_be()),
            STANDARD.encode(q.to_bytes_be()),
            STANDARD.encode(dp.to_bytes_be()),
            STANDARD.encode(dq.to_bytes_be()),
            STANDARD.encode(qinv.to_bytes_be()),
        ]
        .join("\n")
    })
}

/// Write a FactorySecrets file into `root` and return its path.
pub fn secrets_file(root: &PathBuf) -> PathBuf {
    let path = root.join("FactorySecrets.txt");
    write(&path, secrets_text().as_bytes());
    path
}

/// Write an executable shell script standing in for the cipher engine.
#[cfg(unix)]
pub fn fake_engine(root: &PathBuf, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = root.join(name);
    write(&path, format!("#!/bin/sh\n{body}\n").as_bytes());
    let mut perms = fs::metadata(&path)
        .expect("script should exist")
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("script should be made executable");
    path
}
