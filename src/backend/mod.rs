//! Persistence bindings.
//!
//! The catalog, the migration ledger and the trigger registry all live in the
//! target database. [`Database`] ties them together with transactions so that
//! DDL and bookkeeping commit or roll back as one unit.

pub mod memory;
#[cfg(feature = "pg")]
pub mod pg;

use async_trait::async_trait;
use trigwarden_core::{Catalog, Result, StatementSink, TriggerDeclaration};

pub use memory::MemoryDatabase;
#[cfg(feature = "pg")]
pub use pg::PgDatabase;

/// Versions recorded as applied.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn applied_versions(&self) -> Result<Vec<u64>>;
}

#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn declarations(&self) -> Result<Vec<TriggerDeclaration>>;

    async fn find_declaration(&self, name: &str) -> Result<Option<TriggerDeclaration>>;

    async fn save_declaration(&self, declaration: &TriggerDeclaration) -> Result<()>;

    async fn delete_declaration(&self, name: &str) -> Result<()>;
}

#[async_trait]
pub trait Database: Catalog + Ledger + RegistryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

/// An open transaction. Dropping it without [`Transaction::commit`] discards
/// its work.
#[async_trait]
pub trait Transaction: StatementSink {
    fn as_sink(&mut self) -> &mut dyn StatementSink;

    async fn record_version(&mut self, version: u64) -> Result<()>;

    async fn remove_version(&mut self, version: u64) -> Result<()>;

    async fn save_declaration(&mut self, declaration: &TriggerDeclaration) -> Result<()>;

    async fn delete_declaration(&mut self, name: &str) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
