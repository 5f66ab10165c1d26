use super::{Database, Ledger, RegistryStore, Transaction};
use crate::config::MigrationConfig;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row};
use std::str::FromStr;
use trigwarden_core::sql::ident;
use trigwarden_core::{
    Catalog, CatalogFunction, CatalogObject, Error, Result, Source, StatementSink, Timing,
    TriggerDeclaration,
};

const TRIGGER_SELECT: &str = r#"
    SELECT t.tgname::text AS trigger_name,
           c.relname::text AS table_name,
           p.proname::text AS function_name,
           pg_get_triggerdef(t.oid) AS trigger_definition,
           p.prosrc AS function_definition,
           t.tgenabled <> 'D' AS enabled
    FROM pg_trigger t
    JOIN pg_class c ON c.oid = t.tgrelid
    JOIN pg_proc p ON p.oid = t.tgfoid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE NOT t.tgisinternal
      AND n.nspname NOT IN ('pg_catalog', 'information_schema')
"#;

#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
    ledger_table: String,
    registry_table: String,
}

impl PgDatabase {
    pub fn new(pool: &PgPool, config: &MigrationConfig) -> Self {
        Self {
            pool: pool.clone(),
            ledger_table: config.ledger_table.clone(),
            registry_table: config.registry_table.clone(),
        }
    }

    pub async fn connect(url: &str, config: &MigrationConfig) -> Result<Self> {
        let pool = PgPool::connect(url)
            .await
            .map_err(|e| Error::execution("CONNECT", e))?;
        Ok(Self::new(&pool, config))
    }

    /// Creates the ledger and registry tables when missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} (version VARCHAR(32) PRIMARY KEY)",
                self.ledger_table
            ),
            format!(
                r#"CREATE TABLE IF NOT EXISTS {} (
                    name TEXT PRIMARY KEY,
                    table_name TEXT NOT NULL,
                    version BIGINT NOT NULL,
                    enabled BOOLEAN NOT NULL DEFAULT TRUE,
                    checksum TEXT NOT NULL,
                    source TEXT NOT NULL,
                    environment TEXT,
                    function_name TEXT NOT NULL,
                    function_body TEXT,
                    events TEXT[] NOT NULL DEFAULT '{{}}',
                    condition TEXT,
                    timing TEXT NOT NULL,
                    installed_at TIMESTAMPTZ,
                    last_verified_at TIMESTAMPTZ,
                    last_executed_at TIMESTAMPTZ
                )"#,
                self.registry_table
            ),
        ];
        for statement in statements {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::execution(&statement, e))?;
        }
        Ok(())
    }
}

fn catalog_object(row: &PgRow) -> std::result::Result<CatalogObject, sqlx::Error> {
    Ok(CatalogObject {
        trigger_name: row.try_get("trigger_name")?,
        table_name: row.try_get("table_name")?,
        function_name: row.try_get("function_name")?,
        trigger_definition: row.try_get("trigger_definition")?,
        function_definition: row.try_get("function_definition")?,
        enabled: row.try_get("enabled")?,
    })
}

fn declaration(row: &PgRow) -> std::result::Result<TriggerDeclaration, sqlx::Error> {
    let source: String = row.try_get("source")?;
    let timing: String = row.try_get("timing")?;
    let version: i64 = row.try_get("version")?;
    Ok(TriggerDeclaration {
        name: row.try_get("name")?,
        table: row.try_get("table_name")?,
        version: registry_version(version)?,
        enabled: row.try_get("enabled")?,
        checksum: row.try_get("checksum")?,
        source: Source::from_str(&source).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        environment: row.try_get("environment")?,
        function_name: row.try_get("function_name")?,
        function_body: row.try_get("function_body")?,
        events: row.try_get("events")?,
        condition: row.try_get("condition")?,
        timing: Timing::from_str(&timing).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        installed_at: row.try_get("installed_at")?,
        last_verified_at: row.try_get("last_verified_at")?,
        last_executed_at: row.try_get("last_executed_at")?,
    })
}

/// Declaration versions are `u32`; anything else in the column is corrupt.
fn registry_version(raw: i64) -> std::result::Result<u32, sqlx::Error> {
    u32::try_from(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn upsert_declaration_sql(table: &str) -> String {
    format!(
        r#"INSERT INTO {table} (name, table_name, version, enabled, checksum, source, environment,
               function_name, function_body, events, condition, timing,
               installed_at, last_verified_at, last_executed_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
           ON CONFLICT (name) DO UPDATE SET
               table_name = EXCLUDED.table_name,
               version = EXCLUDED.version,
               enabled = EXCLUDED.enabled,
               checksum = EXCLUDED.checksum,
               source = EXCLUDED.source,
               environment = EXCLUDED.environment,
               function_name = EXCLUDED.function_name,
               function_body = EXCLUDED.function_body,
               events = EXCLUDED.events,
               condition = EXCLUDED.condition,
               timing = EXCLUDED.timing,
               installed_at = EXCLUDED.installed_at,
               last_verified_at = EXCLUDED.last_verified_at,
               last_executed_at = EXCLUDED.last_executed_at"#
    )
}

fn bind_declaration<'q>(
    sql: &'q str,
    d: &'q TriggerDeclaration,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(sql)
        .bind(&d.name)
        .bind(&d.table)
        .bind(i64::from(d.version))
        .bind(d.enabled)
        .bind(&d.checksum)
        .bind(d.source.as_ref())
        .bind(&d.environment)
        .bind(&d.function_name)
        .bind(&d.function_body)
        .bind(&d.events)
        .bind(&d.condition)
        .bind(d.timing.as_ref())
        .bind(d.installed_at)
        .bind(d.last_verified_at)
        .bind(d.last_executed_at)
}

#[async_trait]
impl Catalog for PgDatabase {
    async fn find_function(&self, name: &str) -> Result<Option<CatalogFunction>> {
        let sql = r#"
            SELECT p.proname::text AS name, p.prosrc AS definition
            FROM pg_proc p
            JOIN pg_namespace n ON n.oid = p.pronamespace
            WHERE p.proname = $1
              AND n.nspname NOT IN ('pg_catalog', 'information_schema')
            LIMIT 1
        "#;
        let row = sqlx::query(sql)
            .bind(ident(name))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::execution(sql, e))?;
        row.map(|row| -> std::result::Result<CatalogFunction, sqlx::Error> {
            Ok(CatalogFunction {
                name: row.try_get("name")?,
                definition: row.try_get("definition")?,
            })
        })
        .transpose()
        .map_err(|e| Error::execution(sql, e))
    }

    async fn find_trigger(&self, name: &str) -> Result<Option<CatalogObject>> {
        let sql = format!("{TRIGGER_SELECT} AND t.tgname = $1 LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(ident(name))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::execution(&sql, e))?;
        row.as_ref()
            .map(catalog_object)
            .transpose()
            .map_err(|e| Error::execution(&sql, e))
    }

    async fn find_triggers_for_table(&self, table: &str) -> Result<Vec<CatalogObject>> {
        let sql = format!("{TRIGGER_SELECT} AND c.relname = $1 ORDER BY t.tgname");
        let rows = sqlx::query(&sql)
            .bind(ident(table))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::execution(&sql, e))?;
        rows.iter()
            .map(catalog_object)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::execution(&sql, e))
    }

    async fn all_triggers(&self) -> Result<Vec<CatalogObject>> {
        let sql = format!("{TRIGGER_SELECT} ORDER BY t.tgname");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::execution(&sql, e))?;
        rows.iter()
            .map(catalog_object)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::execution(&sql, e))
    }
}

#[async_trait]
impl Ledger for PgDatabase {
    async fn applied_versions(&self) -> Result<Vec<u64>> {
        let sql = format!("SELECT version FROM {} ORDER BY version", self.ledger_table);
        let versions: Vec<String> = sqlx::query_scalar(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::execution(&sql, e))?;
        let mut parsed = versions
            .iter()
            .map(|v| {
                v.parse::<u64>()
                    .map_err(|e| Error::execution(&sql, format!("bad ledger version '{v}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        parsed.sort_unstable();
        Ok(parsed)
    }
}

#[async_trait]
impl RegistryStore for PgDatabase {
    async fn declarations(&self) -> Result<Vec<TriggerDeclaration>> {
        let sql = format!("SELECT * FROM {} ORDER BY name", self.registry_table);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::execution(&sql, e))?;
        rows.iter()
            .map(declaration)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::execution(&sql, e))
    }

    async fn find_declaration(&self, name: &str) -> Result<Option<TriggerDeclaration>> {
        let sql = format!("SELECT * FROM {} WHERE name = $1", self.registry_table);
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::execution(&sql, e))?;
        row.as_ref()
            .map(declaration)
            .transpose()
            .map_err(|e| Error::execution(&sql, e))
    }

    async fn save_declaration(&self, declaration: &TriggerDeclaration) -> Result<()> {
        let sql = upsert_declaration_sql(&self.registry_table);
        bind_declaration(&sql, declaration)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::execution(&sql, e))?;
        Ok(())
    }

    async fn delete_declaration(&self, name: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE name = $1", self.registry_table);
        sqlx::query(&sql)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::execution(&sql, e))?;
        Ok(())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::execution("BEGIN", e))?;
        Ok(Box::new(PgTransaction {
            tx,
            ledger_table: self.ledger_table.clone(),
            registry_table: self.registry_table.clone(),
        }))
    }
}

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    ledger_table: String,
    registry_table: String,
}

#[async_trait]
impl StatementSink for PgTransaction {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        let conn: &mut sqlx::PgConnection = &mut self.tx;
        sqlx::Executor::execute(conn, sqlx::raw_sql(sql))
            .await
            .map_err(|e| Error::execution(sql, e))?;
        Ok(())
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    fn as_sink(&mut self) -> &mut dyn StatementSink {
        self
    }

    async fn record_version(&mut self, version: u64) -> Result<()> {
        let sql = format!("INSERT INTO {} (version) VALUES ($1)", self.ledger_table);
        sqlx::query(&sql)
            .bind(version.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| Error::execution(&sql, e))?;
        Ok(())
    }

    async fn remove_version(&mut self, version: u64) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE version = $1", self.ledger_table);
        sqlx::query(&sql)
            .bind(version.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| Error::execution(&sql, e))?;
        Ok(())
    }

    async fn save_declaration(&mut self, declaration: &TriggerDeclaration) -> Result<()> {
        let sql = upsert_declaration_sql(&self.registry_table);
        bind_declaration(&sql, declaration)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| Error::execution(&sql, e))?;
        Ok(())
    }

    async fn delete_declaration(&mut self, name: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE name = $1", self.registry_table);
        sqlx::query(&sql)
            .bind(name)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| Error::execution(&sql, e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| Error::execution("COMMIT", e))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| Error::execution("ROLLBACK", e))
    }
}
