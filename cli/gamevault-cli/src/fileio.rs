use std::fs;
use std::path::Path;

/// Read a small required file, refusing anything over `max_bytes` so a
/// mis-pointed path cannot pull an arbitrarily large file into memory.
pub fn read_file_limited(
    path: &Path,
    max_bytes: u64,
    logical_name: &str,
) -> Result<Vec<u8>, String> {
    let meta = fs::metadata(path).map_err(|e| format!("{}: {e}", path.display()))?;
    if meta.len() > max_bytes {
        return Err(format!(
            "{logical_name} exceeds maximum size ({} bytes > {max_bytes} bytes): {}",
            meta.len(),
            path.display()
        ));
    }
    fs::read(path).map_err(|e| format!("{}: {e}", path.display()))
}

/// `read_file_limited` for UTF-8 text inputs such as the base64 public key.
pub fn read_text_file_limited(
    path: &Path,
    max_bytes: u64,
    logical_name: &str,
) -> Result<String, String> {
    let bytes = read_file_limited(path, max_bytes, logical_name)?;
    String::from_utf8(bytes)
        .map_err(|_| format!("{logical_name} is not UTF-8: {}", path.display()))
}
