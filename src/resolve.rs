//! Reconciliation controller - decides and executes the resolution for a
//! diagnosis.
//!
//! The controller runs one sequential flow per invocation: snapshot the
//! ledger, diagnose, optionally prompt, optionally mutate. The
//! confirmation prompt is the only suspension point. Any action that
//! discards database state requires an explicit affirmative answer; when
//! no human is available the controller fails closed with the typed error
//! rather than guessing consent. A declined or aborted prompt is not a
//! fault: it yields [`Outcome::Cancelled`], which exits 0 having mutated
//! nothing.
//!
//! There are no retries here. Retry policy, if any, belongs to the ledger
//! client transport, and at-most-one resolution in flight per database is
//! the caller's concern.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::diagnose::{Diagnosis, diagnose};
use crate::error::{ResolveError, ResolveResult};
use crate::gate::{ConfirmationGate, Decision, StdinGate, UnattendedGate};
use crate::history::{HistoryStore, MigrationEntry};
use crate::ledger::LedgerClient;

/// Default schema file name, relative to the project root.
pub const SCHEMA_FILE_NAME: &str = "schema.prax";
/// Default migration history directory, relative to the project root.
pub const MIGRATIONS_DIR: &str = "migrations";

/// The ledger mutation a resolution performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveAction {
    /// Entries were marked applied without running their scripts.
    MarkedApplied,
    /// Entries were marked rolled back.
    MarkedRolledBack,
}

impl fmt::Display for ResolveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarkedApplied => write!(f, "applied"),
            Self::MarkedRolledBack => write!(f, "rolled back"),
        }
    }
}

/// Terminal outcome of a resolution.
///
/// Failures travel as `Err(ResolveError)`; every `Outcome` is a clean
/// exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Ledger and history already agree (or only trail forward).
    NothingToResolve,
    /// Ledger mutations were performed.
    Resolved {
        /// What was done.
        action: ResolveAction,
        /// The entries it was done to.
        names: Vec<String>,
    },
    /// The operator declined or aborted the confirmation prompt.
    Cancelled,
}

impl Outcome {
    /// Process exit code for this outcome.
    ///
    /// Always 0: cancellation is informed refusal, not a system fault.
    pub fn exit_code(&self) -> i32 {
        0
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        match self {
            Self::NothingToResolve => "Nothing to resolve.".to_string(),
            Self::Cancelled => "Resolve cancelled.".to_string(),
            Self::Resolved { action, names } => {
                let mut out = format!("Marked the following migration(s) as {}:\n", action);
                for name in names {
                    out.push_str("  - ");
                    out.push_str(name);
                    out.push('\n');
                }
                out
            }
        }
    }
}

/// The reconciliation controller.
pub struct Resolver<'a> {
    ledger: &'a dyn LedgerClient,
    gate: &'a dyn ConfirmationGate,
    database: String,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over a ledger client and a confirmation gate.
    ///
    /// `database` is a display name used in prompts and error messages.
    pub fn new(
        ledger: &'a dyn LedgerClient,
        gate: &'a dyn ConfirmationGate,
        database: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            gate,
            database: database.into(),
        }
    }

    /// Run the full flow: snapshot, diagnose, resolve.
    pub async fn run(&self, history: &[MigrationEntry]) -> ResolveResult<Outcome> {
        let diagnosis = match self.ledger.snapshot().await {
            Ok(snapshot) => diagnose(history, &snapshot),
            Err(ResolveError::Unreachable { code, message }) => {
                Diagnosis::Unreachable { code, message }
            }
            Err(e) => return Err(e),
        };
        debug!(?diagnosis, "diagnosed migration state");
        self.resolve(history, diagnosis).await
    }

    /// Resolve an already-computed diagnosis.
    pub async fn resolve(
        &self,
        history: &[MigrationEntry],
        diagnosis: Diagnosis,
    ) -> ResolveResult<Outcome> {
        match diagnosis {
            Diagnosis::UpToDate => Ok(Outcome::NothingToResolve),
            // Applying forward is the deploy command's job, not ours.
            Diagnosis::UnappliedHistory { .. } => Ok(Outcome::NothingToResolve),
            Diagnosis::Unreachable { code, message } => {
                Err(ResolveError::Unreachable { code, message })
            }
            Diagnosis::NonEmptyUnmanaged => self.resolve_unmanaged(history).await,
            Diagnosis::Conflict { names } => self.resolve_conflict(history, names).await,
            Diagnosis::FailedMigrations { names } => self.resolve_failed(names).await,
        }
    }

    async fn resolve_unmanaged(&self, history: &[MigrationEntry]) -> ResolveResult<Outcome> {
        let unmanaged = || ResolveError::UnmanagedDatabase {
            database: self.database.clone(),
        };

        if !self.gate.attended() {
            return Err(unmanaged());
        }

        let prompt = format!(
            "The database `{}` is not empty and has no migration ledger. \
             Baseline it by marking all {} local migration(s) as applied?",
            self.database,
            history.len()
        );
        match self.gate.ask(&prompt).await {
            // Baselining an unmanaged schema needs an operator-chosen
            // starting point the engine cannot infer; even a confirmed
            // baseline stops here and asks for the manual setup flow.
            Decision::Yes => Err(unmanaged()),
            Decision::No | Decision::Aborted => Ok(Outcome::Cancelled),
        }
    }

    async fn resolve_conflict(
        &self,
        history: &[MigrationEntry],
        names: Vec<String>,
    ) -> ResolveResult<Outcome> {
        if !self.gate.attended() {
            return Err(ResolveError::Conflict { names });
        }

        let all_present_locally = names
            .iter()
            .all(|name| history.iter().any(|e| &e.name == name));

        let prompt = format!(
            "{} migration(s) diverged from the database ledger: {}. \
             Mark the diverged migration(s) as applied with their local contents?",
            names.len(),
            names.join(", ")
        );
        match self.gate.ask(&prompt).await {
            Decision::Yes if all_present_locally => {
                for name in &names {
                    if let Some(entry) = history.iter().find(|e| &e.name == name) {
                        self.ledger.mark_applied(&entry.name, &entry.checksum).await?;
                    }
                }
                info!(count = names.len(), "baselined diverged migrations");
                Ok(Outcome::Resolved {
                    action: ResolveAction::MarkedApplied,
                    names,
                })
            }
            // Entries recorded in the database but absent locally have no
            // local contents to re-mark from.
            Decision::Yes => Err(ResolveError::Conflict { names }),
            Decision::No | Decision::Aborted => Ok(Outcome::Cancelled),
        }
    }

    async fn resolve_failed(&self, names: Vec<String>) -> ResolveResult<Outcome> {
        if names.is_empty() {
            return Err(ResolveError::ManualResolutionRequired(
                "the database reports failed migrations but could not enumerate them; \
                 inspect the ledger table directly"
                    .to_string(),
            ));
        }

        if !self.gate.attended() {
            return Err(ResolveError::ManualResolutionRequired(format!(
                "failed migration(s) found: {}. Re-run interactively to mark them as \
                 rolled back, or resolve them in the ledger directly.",
                names.join(", ")
            )));
        }

        let prompt = format!(
            "{} failed migration(s) found: {}. Mark them as rolled back?",
            names.len(),
            names.join(", ")
        );
        match self.gate.ask(&prompt).await {
            Decision::Yes => {
                for name in &names {
                    self.ledger.mark_rolled_back(name).await?;
                }
                info!(count = names.len(), "marked failed migrations rolled back");
                Ok(Outcome::Resolved {
                    action: ResolveAction::MarkedRolledBack,
                    names,
                })
            }
            Decision::No | Decision::Aborted => Ok(Outcome::Cancelled),
        }
    }
}

/// Options for resolving migration state for a project.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Path to the schema file (existence check and display only).
    pub schema_path: PathBuf,
    /// Path to the migration history directory.
    pub migrations_dir: PathBuf,
    /// Display name of the target database.
    pub database: String,
    /// Opt-in flag while this functionality is pre-stable.
    pub early_access: bool,
    /// Whether execution is unattended (CI); forces fail-closed prompts.
    pub unattended: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            schema_path: PathBuf::from(SCHEMA_FILE_NAME),
            migrations_dir: PathBuf::from(MIGRATIONS_DIR),
            database: "database".to_string(),
            early_access: false,
            unattended: false,
        }
    }
}

impl ResolveOptions {
    /// Create options rooted at a project directory, using the default
    /// schema and migrations locations.
    pub fn for_project(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            schema_path: root.join(SCHEMA_FILE_NAME),
            migrations_dir: root.join(MIGRATIONS_DIR),
            ..Default::default()
        }
    }

    /// Set the schema file path.
    pub fn schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = path.into();
        self
    }

    /// Set the migration history directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Set the database display name.
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = name.into();
        self
    }

    /// Opt into the pre-stable functionality.
    pub fn early_access(mut self, enabled: bool) -> Self {
        self.early_access = enabled;
        self
    }

    /// Mark execution as unattended.
    pub fn unattended(mut self, unattended: bool) -> Self {
        self.unattended = unattended;
        self
    }

    /// Check preconditions that must hold before any database access.
    fn check_preconditions(&self) -> ResolveResult<()> {
        if !self.early_access {
            return Err(ResolveError::precondition(
                "This functionality is in Early Access and may change; it is not \
                 recommended for production use yet. Opt in with the early-access \
                 flag to use it.",
            ));
        }

        if !self.schema_path.exists() {
            return Err(ResolveError::precondition(format!(
                "Could not find a schema file at `{}`; it is required for this \
                 command. Create one or point the options at its location.",
                self.schema_path.display()
            )));
        }

        Ok(())
    }
}

/// Resolve migration state for a project.
///
/// Builds the confirmation gate from [`ResolveOptions::unattended`]: the
/// interactive stdin gate when a human is available, the fail-closed
/// unattended gate otherwise.
pub async fn resolve_project(
    options: &ResolveOptions,
    ledger: &dyn LedgerClient,
) -> ResolveResult<Outcome> {
    if options.unattended {
        resolve_project_with_gate(options, ledger, &UnattendedGate).await
    } else {
        resolve_project_with_gate(options, ledger, &StdinGate::new()).await
    }
}

/// Resolve migration state for a project with an explicit gate.
pub async fn resolve_project_with_gate(
    options: &ResolveOptions,
    ledger: &dyn LedgerClient,
    gate: &dyn ConfirmationGate,
) -> ResolveResult<Outcome> {
    options.check_preconditions()?;
    info!(schema = %options.schema_path.display(), "schema loaded");

    let history = HistoryStore::new(&options.migrations_dir).load().await?;
    Resolver::new(ledger, gate, &options.database)
        .run(&history)
        .await
}
