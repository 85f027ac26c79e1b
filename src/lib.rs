//! # rectify
//!
//! Migration-state reconciliation for SQL migration workflows.
//!
//! This crate compares a local, ordered migration history against the
//! authoritative ledger of migrations the database says were applied,
//! classifies the drift between the two, and drives a resolution: a
//! no-op, a guarded ledger mutation behind a human confirmation, or a
//! hard failure with a stable diagnostic code.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌───────────────┐
//! │ History Store │   │ Ledger Client │
//! └───────┬───────┘   └───────┬───────┘
//!         │  entries          │  snapshot
//!         ▼                   ▼
//!        ┌─────────────────────┐
//!        │  Diagnostic Engine  │──▶ Diagnosis
//!        └──────────┬──────────┘
//!                   ▼
//!        ┌─────────────────────┐   ┌───────────────────┐
//!        │     Resolver        │◀─▶│ Confirmation Gate │
//!        └──────────┬──────────┘   └───────────────────┘
//!                   │  mark applied / rolled back
//!                   ▼
//!        ┌─────────────────────┐
//!        │    Ledger Client    │──▶ Outcome
//!        └─────────────────────┘
//! ```
//!
//! The diagnosis is computed fresh on every invocation by a pure
//! function over two read-only sequences; the only durable side effects
//! are the per-entry, idempotent ledger mutations. Destructive
//! resolutions require an explicit "yes" from the [`ConfirmationGate`],
//! and unattended execution (CI) fails closed rather than guessing
//! consent.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rectify::{ResolveOptions, resolve_project};
//!
//! async fn resolve() -> Result<(), Box<dyn std::error::Error>> {
//!     let ledger = /* your LedgerClient implementation */;
//!
//!     let options = ResolveOptions::for_project("./my-app")
//!         .database("dev.db")
//!         .early_access(true)
//!         .unattended(rectify::unattended_from_env());
//!
//!     let outcome = resolve_project(&options, &ledger).await?;
//!     println!("{}", outcome.summary());
//!     std::process::exit(outcome.exit_code());
//! }
//! ```
//!
//! ## Diagnoses
//!
//! | Diagnosis | Resolution |
//! |---|---|
//! | `UpToDate` | nothing to resolve |
//! | `UnappliedHistory` | nothing to resolve (deploying is a separate command) |
//! | `FailedMigrations` | mark rolled back, after confirmation |
//! | `Conflict` | baseline the diverged entries, after confirmation |
//! | `NonEmptyUnmanaged` | fails with `P3005`; needs a manual baseline |
//! | `Unreachable` | fails with the driver's code verbatim |

pub mod diagnose;
pub mod error;
pub mod gate;
pub mod history;
pub mod ledger;
pub mod resolve;

// Re-exports
pub use diagnose::{Diagnosis, diagnose};
pub use error::{ResolveError, ResolveResult};
pub use gate::{ConfirmationGate, Decision, StdinGate, UnattendedGate, unattended_from_env};
pub use history::{HistoryStore, MigrationEntry, compute_checksum};
pub use ledger::{LedgerClient, LedgerRecord, LedgerSnapshot, MemoryLedger};
pub use resolve::{
    MIGRATIONS_DIR, Outcome, ResolveAction, ResolveOptions, Resolver, SCHEMA_FILE_NAME,
    resolve_project, resolve_project_with_gate,
};
