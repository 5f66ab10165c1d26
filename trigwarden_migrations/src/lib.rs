pub use trigwarden_core::{Error, Result};

#[doc(hidden)]
pub use inventory;

pub mod capture;
pub mod comparator;
pub mod migration;
pub mod reporter;
pub mod runner;
pub mod validator;

pub use capture::{capture, StatementRecorder};
pub use comparator::{Comparator, MigrationDiff};
pub use migration::{DefinitionMigration, Migration, MigrationSet, SqlFileMigration};
pub use runner::{MigrationRunner, MigrationStatus};
pub use validator::SafetyValidator;

/// File name for a new SQL migration: `<unix timestamp>_<name>.sql`.
pub fn migration_file_name(timestamp: i64, name: &str) -> String {
    let name: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{timestamp}_{name}.sql")
}

pub fn migration_template(name: &str) -> String {
    format!("-- Migration: {name}\n\n-- up\n\n-- down\n")
}
