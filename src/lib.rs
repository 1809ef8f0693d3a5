//! Gamevault host crate.
//!
//! The implementation is split across repository crates: the provisioning
//! pipeline lives in `core/provision` and the command-line front end in
//! `cli/gamevault-cli`.

/// Returns the current crate identity string.
pub fn crate_id() -> &'static str {
    "gamevault-host"
}
