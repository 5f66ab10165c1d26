#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use trigwarden::{MemoryDatabase, MigrationConfig};
use trigwarden_core::{Result, StatementSink, TriggerDefinition};
use trigwarden_migrations::{Migration, MigrationRunner, MigrationSet};

pub const AUDIT_BODY: &str = " BEGIN INSERT INTO audit_log(row_id) VALUES (NEW.id); RETURN NEW; END; ";

pub fn audit_definition() -> TriggerDefinition {
    TriggerDefinition::new("users_audit", "users")
        .on(["INSERT", "UPDATE"])
        .function("audit_users", AUDIT_BODY)
}

/// A unit that issues fixed statements.
#[derive(Debug, Clone)]
pub struct RawMigration {
    pub version: u64,
    pub name: String,
    pub up: Vec<String>,
    pub down: Vec<String>,
}

impl RawMigration {
    pub fn new<I, J, S, T>(version: u64, up: I, down: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            version,
            name: format!("raw_{version}"),
            up: up.into_iter().map(Into::into).collect(),
            down: down.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Migration for RawMigration {
    fn version(&self) -> u64 {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, sink: &mut dyn StatementSink) -> Result<()> {
        for statement in &self.up {
            sink.execute(statement).await?;
        }
        Ok(())
    }

    async fn down(&self, sink: &mut dyn StatementSink) -> Result<()> {
        for statement in &self.down {
            sink.execute(statement).await?;
        }
        Ok(())
    }
}

pub fn runner(db: &Arc<MemoryDatabase>, migrations: MigrationSet) -> MigrationRunner {
    MigrationRunner::new(db.clone(), migrations, &MigrationConfig::default())
}
