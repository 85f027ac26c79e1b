//! Local migration history - the ordered directory of migration entries.
//!
//! The history is a read-only data source: one scan per invocation, no
//! caching. Each entry lives in its own directory named
//! `YYYYMMDDHHMMSS_label` containing a `migration.sql` script, so lexical
//! order equals chronological order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ResolveError, ResolveResult};

/// A single local migration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationEntry {
    /// Full entry name, e.g. `20240101120000_create_users`.
    pub name: String,
    /// Hex SHA-256 of the script body.
    pub checksum: String,
    /// The migration script.
    pub script: String,
}

impl MigrationEntry {
    /// Create an entry, computing the checksum from the script body.
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        let script = script.into();
        let checksum = compute_checksum(&script);
        Self {
            name: name.into(),
            checksum,
            script,
        }
    }

    /// Verify the stored checksum against the script body.
    pub fn verify_checksum(&self) -> bool {
        compute_checksum(&self.script) == self.checksum
    }

    /// The timestamp prefix of the entry name.
    pub fn timestamp(&self) -> &str {
        &self.name[..TIMESTAMP_LEN.min(self.name.len())]
    }
}

/// Compute a hex SHA-256 checksum of migration content.
pub fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

const TIMESTAMP_LEN: usize = 14;
const SCRIPT_FILE: &str = "migration.sql";

/// Read-only view of the migration history directory.
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    /// Create a store over the given history directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The history directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load all entries, sorted by name.
    ///
    /// A missing directory is an empty history, not an error.
    pub async fn load(&self) -> ResolveResult<Vec<MigrationEntry>> {
        let mut entries = Vec::new();

        if !self.dir.exists() {
            debug!(dir = %self.dir.display(), "history directory does not exist");
            return Ok(entries);
        }

        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.is_dir() && path.join(SCRIPT_FILE).exists() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            entries.push(read_entry(&path).await?);
        }

        debug!(count = entries.len(), "loaded migration history");
        Ok(entries)
    }
}

/// Read one entry from its directory.
async fn read_entry(path: &Path) -> ResolveResult<MigrationEntry> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ResolveError::invalid_migration("invalid directory name"))?;

    validate_entry_name(name)?;

    let script = tokio::fs::read_to_string(path.join(SCRIPT_FILE)).await?;
    Ok(MigrationEntry::new(name, script))
}

/// Validate the `YYYYMMDDHHMMSS_label` naming convention.
fn validate_entry_name(name: &str) -> ResolveResult<()> {
    let valid = name.len() > TIMESTAMP_LEN + 1
        && name.as_bytes()[TIMESTAMP_LEN] == b'_'
        && name[..TIMESTAMP_LEN].chars().all(|c| c.is_ascii_digit());

    if valid {
        Ok(())
    } else {
        Err(ResolveError::invalid_migration(format!(
            "invalid entry name '{}', expected YYYYMMDDHHMMSS_label",
            name
        )))
    }
}
