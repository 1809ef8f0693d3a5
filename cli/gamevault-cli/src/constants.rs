pub const MAX_DIGEST_BYTES: u64 = 1024;
pub const MAX_SIGNATURE_BYTES: u64 = 64 * 1024;
pub const MAX_PUBLIC_KEY_BYTES: u64 = 16 * 1024;

pub const DEFAULT_OUTPUT_DIR: &str = "generated/games";
pub const DEFAULT_CIPHER_TIMEOUT_SECS: u64 = 60;
