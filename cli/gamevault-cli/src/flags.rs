use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Split command arguments into positional operands and `--flag` values.
/// Flags in `allowed` take a value; flags in `switches` stand alone.
/// Unknown or duplicated flags reject the whole command line.
pub fn parse_args(
    args: &[String],
    allowed: &[&str],
    switches: &[&str],
    usage: &str,
) -> Result<(Vec<String>, HashMap<String, String>), String> {
    let mut operands = Vec::new();
    let mut out = HashMap::new();
    let allowed_set = allowed.iter().copied().collect::<HashSet<_>>();
    let switch_set = switches.iter().copied().collect::<HashSet<_>>();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        if !arg.starts_with("--") {
            operands.push(arg.to_string());
            i += 1;
            continue;
        }
        if switch_set.contains(arg) {
            if out.insert(arg.to_string(), "true".to_string()).is_some() {
                return Err(usage.to_string());
            }
            i += 1;
            continue;
        }
        if !allowed_set.contains(arg) {
            return Err(usage.to_string());
        }
        i += 1;
        let Some(value) = args.get(i) else {
            return Err(usage.to_string());
        };
        if out.insert(arg.to_string(), value.clone()).is_some() {
            return Err(usage.to_string());
        }
        i += 1;
    }
    Ok((operands, out))
}

pub fn required_path(
    values: &HashMap<String, String>,
    key: &str,
    usage: &str,
) -> Result<PathBuf, String> {
    values
        .get(key)
        .map(PathBuf::from)
        .ok_or_else(|| usage.to_string())
}

pub fn optional_string(values: &HashMap<String, String>, key: &str) -> Option<String> {
    values.get(key).cloned()
}

pub fn has_switch(values: &HashMap<String, String>, key: &str) -> bool {
    values.get(key).map(String::as_str) == Some("true")
}

pub fn optional_usize(
    values: &HashMap<String, String>,
    key: &str,
) -> Result<Option<usize>, String> {
    values
        .get(key)
        .map(|v| v.parse::<usize>().map_err(|_| format!("invalid {key}: {v}")))
        .transpose()
}

pub fn optional_u64(
    values: &HashMap<String, String>,
    key: &str,
) -> Result<Option<u64>, String> {
    values
        .get(key)
        .map(|v| v.parse::<u64>().map_err(|_| format!("invalid {key}: {v}")))
        .transpose()
}
