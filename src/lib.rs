//! trigwarden - versioned, drift-checked PostgreSQL triggers.
//!
//! Triggers and their functions are kept as declarations in a registry, each
//! with a content checksum and version. This crate binds that registry to a
//! database, detects drift between declared and live state, and gates
//! destructive operations behind a confirmation kill switch. Versioned
//! migrations live in `trigwarden_migrations`.

pub mod backend;
pub mod config;
pub mod drift;
pub mod kill_switch;
pub mod registry;

pub use backend::{Database, Ledger, MemoryDatabase, RegistryStore, Transaction};
#[cfg(feature = "pg")]
pub use backend::PgDatabase;
pub use config::{Config, KillSwitchConfig, MigrationConfig};
pub use drift::{DriftDetector, DriftSummary};
pub use kill_switch::{KillSwitch, Operation};
pub use registry::{OperationContext, TriggerRegistry};
pub use trigwarden_core::*;
