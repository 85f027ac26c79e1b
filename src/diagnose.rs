//! Drift diagnosis - classifies local history against the database ledger.
//!
//! The local filesystem and the database ledger are two independently
//! mutated views of "which migrations happened". Rather than modelling
//! them as shared state, [`diagnose`] compares two read-only sequences and
//! produces exactly one [`Diagnosis`], with a deterministic classification
//! order: unmanaged database, then conflict, then failed migrations, then
//! unapplied history, else up to date. An unreachable database surfaces as
//! an error from the snapshot fetch and is mapped to
//! [`Diagnosis::Unreachable`] by the controller.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::history::MigrationEntry;
use crate::ledger::{LedgerRecord, LedgerSnapshot};

/// The classified drift between history and ledger.
///
/// Exactly one variant applies to a given (history, snapshot) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnosis {
    /// Every local entry has an active ledger record and vice versa.
    UpToDate,
    /// One or more ledger records have `failed = true`.
    FailedMigrations {
        /// Names of the failed records.
        names: Vec<String>,
    },
    /// Local entries with no ledger record, all sorting after the applied
    /// ones. Safe to apply forward (by a separate deploy command).
    UnappliedHistory {
        /// Unapplied entry names, in history order.
        names: Vec<String>,
    },
    /// History and ledger disagree on content or ordering.
    Conflict {
        /// Every diverging entry name.
        names: Vec<String>,
    },
    /// The database contains user schema but no ledger records at all.
    NonEmptyUnmanaged,
    /// The database cannot be opened.
    Unreachable {
        /// Driver diagnostic code.
        code: String,
        /// Driver message.
        message: String,
    },
}

impl Diagnosis {
    /// Whether this diagnosis requires no resolution action.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::UpToDate | Self::UnappliedHistory { .. })
    }
}

/// Classify the drift between a local history and a ledger snapshot.
///
/// Pure given its inputs; the side-effecting snapshot fetch is the
/// caller's job. Tolerates an empty history and an empty ledger.
pub fn diagnose(history: &[MigrationEntry], snapshot: &LedgerSnapshot) -> Diagnosis {
    // A database with user objects but no ledger table was never
    // initialized for migration tracking.
    if snapshot.records.is_empty() && snapshot.has_unmanaged_schema {
        return Diagnosis::NonEmptyUnmanaged;
    }

    let active: HashMap<&str, &LedgerRecord> = snapshot
        .active_records()
        .map(|r| (r.name.as_str(), r))
        .collect();
    let local: HashSet<&str> = history.iter().map(|e| e.name.as_str()).collect();

    let mut conflicts = BTreeSet::new();

    // Applied but missing locally: the history was edited after the fact.
    for name in active.keys() {
        if !local.contains(name) {
            conflicts.insert((*name).to_string());
        }
    }

    // Name matches but content differs; comparison is byte-exact.
    for entry in history {
        if let Some(record) = active.get(entry.name.as_str())
            && record.checksum != entry.checksum
        {
            conflicts.insert(entry.name.clone());
        }
    }

    // Ordering tie-break: an unapplied entry sorting before some applied
    // record cannot be applied forward without rewriting the past.
    if let Some(last_applied) = active.keys().max() {
        for entry in history {
            if !active.contains_key(entry.name.as_str()) && entry.name.as_str() < *last_applied {
                conflicts.insert(entry.name.clone());
            }
        }
    }

    if !conflicts.is_empty() {
        return Diagnosis::Conflict {
            names: conflicts.into_iter().collect(),
        };
    }

    let failed = snapshot.failed_names();
    if !failed.is_empty() {
        return Diagnosis::FailedMigrations { names: failed };
    }

    // Rolled-back records are inert, so their entries count as unapplied.
    let unapplied: Vec<String> = history
        .iter()
        .filter(|e| !active.contains_key(e.name.as_str()))
        .map(|e| e.name.clone())
        .collect();

    if !unapplied.is_empty() {
        return Diagnosis::UnappliedHistory { names: unapplied };
    }

    Diagnosis::UpToDate
}
