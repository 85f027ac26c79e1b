//! Error types for the reconciliation engine.

use thiserror::Error;

/// Result type alias for resolution operations.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Errors that can occur while reconciling migration state.
///
/// Errors that originate from a classified database condition carry a
/// stable machine-readable diagnostic code, available via [`code`].
///
/// [`code`]: ResolveError::code
#[derive(Debug, Error)]
pub enum ResolveError {
    /// File system error while reading migration history.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required input was missing before any database access happened.
    #[error("{0}")]
    Precondition(String),

    /// The database file or server cannot be opened.
    ///
    /// Carries the driver's diagnostic code and message verbatim, e.g.
    /// `P1003: SQLite database file doesn't exist`.
    #[error("{code}: {message}")]
    Unreachable {
        /// Driver diagnostic code.
        code: String,
        /// Driver message.
        message: String,
    },

    /// The database contains schema objects but no migration ledger.
    #[error(
        "P3005\n\nThe database schema for `{database}` is not empty. \
         Baseline it by picking a starting migration and marking the \
         existing history as applied against an introspected schema, or \
         point this project at an empty database."
    )]
    UnmanagedDatabase {
        /// Display name of the database.
        database: String,
    },

    /// Local migration history and the database ledger disagree.
    #[error(
        "P3012: the migration history diverges from the database ledger \
         for: {}. These entries were edited after being applied or are \
         recorded in the database but missing locally; they cannot be \
         resolved automatically.",
        .names.join(", ")
    )]
    Conflict {
        /// Every diverging entry name.
        names: Vec<String>,
    },

    /// Failed migrations the engine cannot enumerate or roll back safely.
    #[error("P3009: {0}")]
    ManualResolutionRequired(String),

    /// Database operation error reported by the ledger client.
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid migration entry on disk.
    #[error("Invalid migration: {0}")]
    InvalidMigration(String),
}

impl ResolveError {
    /// Create a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create an unreachable-database error from a driver code and message.
    pub fn unreachable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create an invalid migration error.
    pub fn invalid_migration(msg: impl Into<String>) -> Self {
        Self::InvalidMigration(msg.into())
    }

    /// The stable diagnostic code for this error, when one exists.
    ///
    /// Precondition and ambient errors have no code and are surfaced
    /// verbatim.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Unreachable { code, .. } => Some(code),
            Self::UnmanagedDatabase { .. } => Some("P3005"),
            Self::Conflict { .. } => Some("P3012"),
            Self::ManualResolutionRequired(_) => Some("P3009"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_display_verbatim() {
        let err = ResolveError::unreachable("P1003", "SQLite database file doesn't exist");
        assert_eq!(err.to_string(), "P1003: SQLite database file doesn't exist");
        assert_eq!(err.code(), Some("P1003"));
    }

    #[test]
    fn test_unmanaged_names_database() {
        let err = ResolveError::UnmanagedDatabase {
            database: "dev.db".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("P3005"));
        assert!(msg.contains("`dev.db`"));
        assert!(msg.contains("not empty"));
        assert_eq!(err.code(), Some("P3005"));
    }

    #[test]
    fn test_conflict_names_every_entry() {
        let err = ResolveError::Conflict {
            names: vec![
                "20240101000000_init".to_string(),
                "20240102000000_posts".to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("20240101000000_init"));
        assert!(msg.contains("20240102000000_posts"));
        assert_eq!(err.code(), Some("P3012"));
    }

    #[test]
    fn test_precondition_has_no_code() {
        let err = ResolveError::precondition("missing schema file");
        assert_eq!(err.code(), None);
        assert_eq!(err.to_string(), "missing schema file");
    }
}
