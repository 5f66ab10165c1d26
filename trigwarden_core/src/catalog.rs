use crate::error::Result;
use crate::types::{CatalogFunction, CatalogObject};
use async_trait::async_trait;

/// Something that accepts SQL statements, one at a time.
///
/// Migration procedures only ever talk to a sink. Production wiring binds it
/// to a transaction; capture wiring binds it to a recorder.
#[async_trait]
pub trait StatementSink: Send {
    async fn execute(&mut self, sql: &str) -> Result<()>;
}

/// Read-only view of the live trigger and function catalogs.
///
/// Lookups take identifiers as written (`public.Users`, `"MixedCase"`) and
/// resolve them with [`crate::sql::ident`].
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn find_function(&self, name: &str) -> Result<Option<CatalogFunction>>;

    async fn find_trigger(&self, name: &str) -> Result<Option<CatalogObject>>;

    async fn find_triggers_for_table(&self, table: &str) -> Result<Vec<CatalogObject>>;

    async fn all_triggers(&self) -> Result<Vec<CatalogObject>>;

    async fn trigger_exists_on(&self, name: &str, table: &str) -> Result<bool> {
        Ok(self
            .find_triggers_for_table(table)
            .await?
            .iter()
            .any(|t| t.trigger_name == name))
    }
}
