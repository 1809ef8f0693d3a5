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

pub const TEST_KEY_BITS: usize = 2048;

static UNIQUE_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn temp_dir(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should be monotonic")
        .as_nanos();
    let uniq = UNIQUE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "gamevault-provision-{test_name}-{}-{nanos}-{uniq}",
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
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, TEST_KEY_BITS).expect("key generation"))
}

/// Factory secrets text whose CRT components describe `key`.
pub fn secrets_text_for(key: &RsaPrivateKey) -> String {
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
}

pub fn secrets_text() -> &'static str {
    static TEXT: OnceLock<String> = OnceLock::new();
    TEXT.get_or_init(|| secrets_text_for(generated_key()))
}
