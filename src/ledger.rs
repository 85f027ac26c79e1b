//! Ledger client boundary - the database-resident record of applied
//! migrations.
//!
//! The ledger is append-only from the database's perspective; the only
//! mutations this crate performs are marking an entry applied (baseline)
//! or rolled back, and both are idempotent and atomic per entry. Concrete
//! drivers live behind [`LedgerClient`]; this crate ships an in-memory
//! client for tests and embedding.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ResolveError, ResolveResult};

/// One row of the applied-migrations table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Migration entry name.
    pub name: String,
    /// Checksum recorded when the migration ran.
    pub checksum: String,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution finished successfully.
    pub applied_at: Option<DateTime<Utc>>,
    /// When the entry was marked rolled back.
    pub rolled_back_at: Option<DateTime<Utc>>,
    /// Whether execution failed.
    pub failed: bool,
}

impl LedgerRecord {
    /// A successfully applied record.
    pub fn applied(name: impl Into<String>, checksum: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            checksum: checksum.into(),
            started_at: now,
            applied_at: Some(now),
            rolled_back_at: None,
            failed: false,
        }
    }

    /// A record whose execution failed.
    pub fn failed(name: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checksum: checksum.into(),
            started_at: Utc::now(),
            applied_at: None,
            rolled_back_at: None,
            failed: true,
        }
    }

    /// Applied, not failed, not rolled back.
    pub fn is_active(&self) -> bool {
        self.applied_at.is_some() && !self.failed && self.rolled_back_at.is_none()
    }
}

/// The database's migration state at one point in time.
///
/// One diagnostic call gathers both the record list and the opaque
/// "database holds non-ledger schema objects" signal. How a driver
/// decides the latter is implementation-defined; this crate only consumes
/// the boolean.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// All ledger records, in applied order.
    pub records: Vec<LedgerRecord>,
    /// Whether the database contains user schema outside the ledger table.
    pub has_unmanaged_schema: bool,
}

impl LedgerSnapshot {
    /// Records that are applied and still in effect.
    pub fn active_records(&self) -> impl Iterator<Item = &LedgerRecord> {
        self.records.iter().filter(|r| r.is_active())
    }

    /// Names of records with `failed = true`.
    pub fn failed_names(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.failed)
            .map(|r| r.name.clone())
            .collect()
    }
}

/// Boundary to the database's applied-migrations table.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch the current snapshot.
    ///
    /// Fails with [`ResolveError::Unreachable`] carrying the driver's
    /// diagnostic code when the database cannot be opened.
    async fn snapshot(&self) -> ResolveResult<LedgerSnapshot>;

    /// Mark an entry applied without running its script. Idempotent:
    /// re-marking an active entry is a no-op.
    async fn mark_applied(&self, name: &str, checksum: &str) -> ResolveResult<()>;

    /// Mark an entry rolled back. Idempotent: re-marking an already
    /// rolled-back entry is a no-op.
    async fn mark_rolled_back(&self, name: &str) -> ResolveResult<()>;
}

/// In-memory ledger client.
///
/// Intended for tests and embedded use. Tracks how many mutation calls it
/// has received so callers can assert that declined resolutions touched
/// nothing.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    unreachable: Option<(String, String)>,
    records: Vec<LedgerRecord>,
    has_unmanaged_schema: bool,
    mutation_calls: usize,
}

impl MemoryLedger {
    /// An empty, reachable ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger seeded with records.
    pub fn with_records(records: Vec<LedgerRecord>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                records,
                ..Default::default()
            }),
        }
    }

    /// A database with user schema but no ledger records.
    pub fn unmanaged() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                has_unmanaged_schema: true,
                ..Default::default()
            }),
        }
    }

    /// A database that cannot be opened; every call reports the given
    /// driver code and message.
    pub fn unreachable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                unreachable: Some((code.into(), message.into())),
                ..Default::default()
            }),
        }
    }

    /// Current records, for assertions.
    pub fn records(&self) -> Vec<LedgerRecord> {
        self.state.lock().expect("ledger lock").records.clone()
    }

    /// Number of `mark_*` calls received, including no-ops.
    pub fn mutation_calls(&self) -> usize {
        self.state.lock().expect("ledger lock").mutation_calls
    }

    fn check_reachable(state: &MemoryState) -> ResolveResult<()> {
        if let Some((code, message)) = &state.unreachable {
            return Err(ResolveError::unreachable(code, message));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LedgerClient for MemoryLedger {
    async fn snapshot(&self) -> ResolveResult<LedgerSnapshot> {
        let state = self.state.lock().expect("ledger lock");
        Self::check_reachable(&state)?;
        Ok(LedgerSnapshot {
            records: state.records.clone(),
            has_unmanaged_schema: state.has_unmanaged_schema,
        })
    }

    async fn mark_applied(&self, name: &str, checksum: &str) -> ResolveResult<()> {
        let mut state = self.state.lock().expect("ledger lock");
        Self::check_reachable(&state)?;
        state.mutation_calls += 1;

        if let Some(record) = state.records.iter_mut().find(|r| r.name == name) {
            if record.is_active() && record.checksum == checksum {
                debug!(name, "mark_applied is a no-op, entry already active");
                return Ok(());
            }
            let now = Utc::now();
            record.checksum = checksum.to_string();
            record.applied_at = Some(now);
            record.rolled_back_at = None;
            record.failed = false;
        } else {
            state.records.push(LedgerRecord::applied(name, checksum));
        }
        debug!(name, "marked applied");
        Ok(())
    }

    async fn mark_rolled_back(&self, name: &str) -> ResolveResult<()> {
        let mut state = self.state.lock().expect("ledger lock");
        Self::check_reachable(&state)?;
        state.mutation_calls += 1;

        let record = state
            .records
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| {
                ResolveError::database(format!("no ledger record for '{}'", name))
            })?;

        if record.rolled_back_at.is_none() {
            record.rolled_back_at = Some(Utc::now());
            record.failed = false;
            debug!(name, "marked rolled back");
        } else {
            debug!(name, "mark_rolled_back is a no-op, entry already rolled back");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_activity() {
        let applied = LedgerRecord::applied("20240101000000_init", "abc");
        assert!(applied.is_active());

        let failed = LedgerRecord::failed("20240102000000_posts", "def");
        assert!(!failed.is_active());

        let mut rolled_back = LedgerRecord::applied("20240103000000_tags", "ghi");
        rolled_back.rolled_back_at = Some(Utc::now());
        assert!(!rolled_back.is_active());
    }

    #[test]
    fn test_snapshot_failed_names() {
        let snapshot = LedgerSnapshot {
            records: vec![
                LedgerRecord::applied("20240101000000_init", "a"),
                LedgerRecord::failed("20240102000000_posts", "b"),
            ],
            has_unmanaged_schema: false,
        };
        assert_eq!(snapshot.failed_names(), vec!["20240102000000_posts"]);
        assert_eq!(snapshot.active_records().count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_propagates_driver_code() {
        let ledger = MemoryLedger::unreachable("P1003", "SQLite database file doesn't exist");
        let err = ledger.snapshot().await.unwrap_err();
        assert_eq!(err.code(), Some("P1003"));
        assert_eq!(err.to_string(), "P1003: SQLite database file doesn't exist");
    }

    #[tokio::test]
    async fn test_mark_applied_idempotent() {
        let ledger = MemoryLedger::new();
        ledger.mark_applied("20240101000000_init", "abc").await.unwrap();
        let once = ledger.records();

        ledger.mark_applied("20240101000000_init", "abc").await.unwrap();
        let twice = ledger.records();

        assert_eq!(once, twice);
        assert_eq!(ledger.mutation_calls(), 2);
    }

    #[tokio::test]
    async fn test_mark_applied_revives_rolled_back_entry() {
        let ledger = MemoryLedger::new();
        ledger.mark_applied("20240101000000_init", "abc").await.unwrap();
        ledger.mark_rolled_back("20240101000000_init").await.unwrap();
        ledger.mark_applied("20240101000000_init", "abc").await.unwrap();

        let records = ledger.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_active());
    }

    #[tokio::test]
    async fn test_mark_rolled_back_idempotent() {
        let ledger =
            MemoryLedger::with_records(vec![LedgerRecord::failed("20240101000000_init", "abc")]);
        ledger.mark_rolled_back("20240101000000_init").await.unwrap();
        let once = ledger.records();
        assert!(once[0].rolled_back_at.is_some());
        assert!(!once[0].failed);

        ledger.mark_rolled_back("20240101000000_init").await.unwrap();
        assert_eq!(ledger.records()[0].rolled_back_at, once[0].rolled_back_at);
    }

    #[tokio::test]
    async fn test_mark_rolled_back_unknown_entry() {
        let ledger = MemoryLedger::new();
        let err = ledger.mark_rolled_back("20240101000000_init").await.unwrap_err();
        assert!(matches!(err, ResolveError::Database(_)));
    }
}
