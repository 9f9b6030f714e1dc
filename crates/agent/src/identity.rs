//! Stable host identity persisted under the data directory.
//!
//! The fingerprint survives OS reinstalls as long as the data directory
//! does, so the hub keeps recognizing the system.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::AgentError;

const FINGERPRINT_FILE: &str = "fingerprint";
const FINGERPRINT_LEN: usize = 48;

/// Some firmware ships this placeholder instead of a real DMI UUID.
const BOGUS_MACHINE_UUID: &str = "03000200-0400-0500-0006-000700080009";

/// Loads the persisted fingerprint, deriving and persisting a fresh one
/// when the file is missing or empty.
pub fn load_or_create(
    data_dir: &Path,
    hostname: &str,
    cpu_model: &str,
) -> Result<String, AgentError> {
    let path = fingerprint_path(data_dir);
    if let Ok(contents) = std::fs::read_to_string(&path) {
        let existing = contents.trim();
        if !existing.is_empty() {
            return Ok(existing.to_string());
        }
    }

    let fingerprint = derive(read_machine_id().as_deref(), hostname, cpu_model);

    std::fs::create_dir_all(data_dir)
        .map_err(|e| AgentError::Config(format!("cannot create data dir: {e}")))?;
    std::fs::write(&path, &fingerprint)
        .map_err(|e| AgentError::Config(format!("cannot persist fingerprint: {e}")))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644));
    }

    debug!(%fingerprint, "derived new fingerprint");
    Ok(fingerprint)
}

/// Removes the persisted fingerprint. A missing file is not an error.
pub fn delete(data_dir: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(fingerprint_path(data_dir)) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn fingerprint_path(data_dir: &Path) -> PathBuf {
    data_dir.join(FINGERPRINT_FILE)
}

/// Hashes the most stable identifier available: the platform machine id
/// when it exists and is not the well-known bogus literal, otherwise
/// hostname plus CPU model.
fn derive(machine_id: Option<&str>, hostname: &str, cpu_model: &str) -> String {
    let seed = match machine_id {
        Some(id) if !id.is_empty() && id != BOGUS_MACHINE_UUID => id.to_string(),
        _ => format!("{hostname}{cpu_model}"),
    };
    let digest = Sha256::digest(seed.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

fn read_machine_id() -> Option<String> {
    std::fs::read_to_string("/etc/machine-id")
        .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
        .ok()
        .map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let a = derive(Some("abc-123"), "host", "cpu");
        let b = derive(Some("abc-123"), "host", "cpu");
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn derive_falls_back_without_machine_id() {
        let with_id = derive(Some("abc-123"), "host", "cpu");
        let without = derive(None, "host", "cpu");
        assert_ne!(with_id, without);
        assert_eq!(without, derive(None, "host", "cpu"));
    }

    #[test]
    fn bogus_machine_uuid_is_rejected() {
        let bogus = derive(Some(BOGUS_MACHINE_UUID), "host", "cpu");
        let fallback = derive(None, "host", "cpu");
        assert_eq!(bogus, fallback);
    }

    #[test]
    fn persisted_fingerprint_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FINGERPRINT_FILE), "  cafe0123  \n").unwrap();
        let fp = load_or_create(dir.path(), "host", "cpu").unwrap();
        assert_eq!(fp, "cafe0123");
    }

    #[test]
    fn empty_file_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FINGERPRINT_FILE), "   \n").unwrap();
        let fp = load_or_create(dir.path(), "host", "cpu").unwrap();
        assert_eq!(fp.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn load_persists_for_next_startup() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create(dir.path(), "host", "cpu").unwrap();
        let second = load_or_create(dir.path(), "other-host", "other-cpu").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        load_or_create(dir.path(), "host", "cpu").unwrap();
        delete(dir.path()).unwrap();
        delete(dir.path()).unwrap();
    }
}
