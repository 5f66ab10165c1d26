use crate::types::{ObjectKind, Violation};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsafe migration: {} destructive drop/create pair(s) found:\n{}", .violations.len(), render_violations(.violations))]
    UnsafeMigration { violations: Vec<Violation> },

    #[error(
        "Kill switch blocked '{operation}' in environment '{environment}'. \
         To proceed, pass the confirmation text: {expected_confirmation}"
    )]
    KillSwitchBlocked {
        operation: String,
        environment: String,
        expected_confirmation: String,
    },

    #[error("Migration {0} not found")]
    MigrationNotFound(u64),

    #[error("Migration {0} is already applied")]
    AlreadyApplied(u64),

    #[error("Migration {0} is not applied")]
    NotApplied(u64),

    #[error("Statement failed: {message}\n  statement: {statement}")]
    ExecutionFailed { statement: String, message: String },

    #[error("Trigger '{0}' is not registered")]
    TriggerNotFound(String),

    #[error("Duplicate migration version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        version: u64,
        first: String,
        second: String,
    },

    #[error("Invalid migration name '{0}': expected <version>_<name>")]
    InvalidMigrationName(String),

    #[error("Invalid migration file '{path}': {reason}")]
    InvalidMigrationFile { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization/Deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    pub fn execution(statement: impl Into<String>, message: impl ToString) -> Self {
        Error::ExecutionFailed {
            statement: statement.into(),
            message: message.to_string(),
        }
    }
}

fn render_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| {
            let target = match (&v.kind, &v.table) {
                (ObjectKind::Trigger, Some(table)) => format!("trigger {} ON {}", v.name, table),
                (kind, _) => format!("{} {}", kind, v.name),
            };
            format!(
                "  - {target}\n      drop:   {}\n      create: {}",
                v.drop_statement.trim(),
                v.create_statement.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, Error>;
