//! Manifest line parsing.
//!
//! One entry per line: `<sourcePath> <name> <version> <user>+`, whitespace
//! separated. `version` is `major` or `major.minor`, digits only. Lines that
//! do not match the grammar parse to `None`; the orchestrator skips them
//! without aborting the batch and records them for observability.

/// One provisioning request parsed from a manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path to the source game binary.
    pub source_path: String,
    /// Game name, used to derive the package file name.
    pub name: String,
    /// `major` or `major.minor` version string.
    pub version: String,
    /// Users authorized to play the game. Insertion order is preserved;
    /// duplicate tokens are dropped.
    pub users: Vec<String>,
}

/// Parse one manifest line, or `None` if it does not match the grammar.
///
/// The whole line must match: a trailing token outside the grammar rejects
/// the line rather than being silently discarded.
pub fn parse_manifest_line(line: &str) -> Option<ManifestEntry> {
    let mut tokens = line.split_whitespace();
    let source_path = tokens.next()?;
    let name = tokens.next()?;
    let version = tokens.next()?;
    if !is_path_token(source_path) || !is_name_token(name) || !is_version_token(version) {
        return None;
    }
    let mut users: Vec<String> = Vec::new();
    for user in tokens {
        if !is_user_token(user) {
            return None;
        }
        if !users.iter().any(|u| u == user) {
            users.push(user.to_string());
        }
    }
    if users.is_empty() {
        return None;
    }
    Some(ManifestEntry {
        source_path: source_path.to_string(),
        name: name.to_string(),
        version: version.to_string(),
        users,
    })
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_path_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| is_word_char(c) || matches!(c, '/' | '-' | '.'))
}

fn is_name_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| is_word_char(c) || matches!(c, '-' | '.'))
}

fn is_version_token(token: &str) -> bool {
    fn all_digits(part: &str) -> bool {
        !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())
    }
    match token.split_once('.') {
        None => all_digits(token),
        Some((major, minor)) => all_digits(major) && all_digits(minor),
    }
}

fn is_user_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(is_word_char)
}
