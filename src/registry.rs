//! Registry operations on declared triggers.
//!
//! Destructive operations go through the kill switch first, then run their DDL
//! and the registry update in one transaction.

use crate::backend::{Database, Transaction};
use crate::drift::DriftDetector;
use crate::kill_switch::{KillSwitch, Operation};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};
use trigwarden_core::sql::render;
use trigwarden_core::{
    DriftResult, DriftState, Error, Result, Source, TriggerDeclaration, TriggerDefinition,
};

const AUDIT: &str = "trigwarden::audit";

/// Who is asking, where, and with what confirmation.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    pub environment: String,
    pub actor: String,
    pub confirmation: Option<String>,
}

impl OperationContext {
    pub fn new(environment: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            actor: actor.into(),
            confirmation: None,
        }
    }

    pub fn confirmed(mut self, confirmation: impl Into<String>) -> Self {
        self.confirmation = Some(confirmation.into());
        self
    }
}

pub struct TriggerRegistry {
    db: Arc<dyn Database>,
    kill_switch: KillSwitch,
}

impl TriggerRegistry {
    pub fn new(db: Arc<dyn Database>, kill_switch: KillSwitch) -> Self {
        Self { db, kill_switch }
    }

    /// Registers a definition as a `declared` trigger. An existing row keeps
    /// its install timestamp and enabled flag.
    pub async fn register(&self, definition: &TriggerDefinition) -> Result<TriggerDeclaration> {
        let mut declaration = definition.declaration(Source::Declared);
        match self.db.find_declaration(&definition.name).await? {
            Some(existing) => {
                declaration.installed_at = existing.installed_at;
                declaration.last_verified_at = existing.last_verified_at;
                declaration.last_executed_at = existing.last_executed_at;
                declaration.enabled = existing.enabled;
            }
            None => declaration.installed_at = Some(OffsetDateTime::now_utc()),
        }
        self.db.save_declaration(&declaration).await?;
        info!(
            target: AUDIT,
            trigger = %declaration.name,
            version = declaration.version,
            "trigger registered"
        );
        Ok(declaration)
    }

    pub async fn list(&self) -> Result<Vec<TriggerDeclaration>> {
        self.db.declarations().await
    }

    pub async fn find(&self, name: &str) -> Result<TriggerDeclaration> {
        self.db
            .find_declaration(name)
            .await?
            .ok_or_else(|| Error::TriggerNotFound(name.to_string()))
    }

    pub async fn enable(&self, name: &str, ctx: &OperationContext) -> Result<TriggerDeclaration> {
        self.set_enabled(name, true, Operation::EnableTrigger, ctx).await
    }

    pub async fn disable(&self, name: &str, ctx: &OperationContext) -> Result<TriggerDeclaration> {
        self.set_enabled(name, false, Operation::DisableTrigger, ctx).await
    }

    async fn set_enabled(
        &self,
        name: &str,
        enabled: bool,
        operation: Operation,
        ctx: &OperationContext,
    ) -> Result<TriggerDeclaration> {
        self.gate(operation, ctx)?;
        let mut declaration = self.find(name).await?;
        declaration.enabled = enabled;

        let mut statements = Vec::new();
        if self.db.find_trigger(name).await?.is_some() {
            statements.push(render::set_trigger_enabled(name, &declaration.table, enabled));
        }
        self.apply(&statements, Change::Save(&declaration)).await?;
        info!(
            target: AUDIT,
            trigger = name,
            %operation,
            actor = %ctx.actor,
            environment = %ctx.environment,
            "trigger updated"
        );
        Ok(declaration)
    }

    /// Drops the trigger from the database and removes its declaration.
    pub async fn drop_trigger(&self, name: &str, ctx: &OperationContext) -> Result<()> {
        self.gate(Operation::DropTrigger, ctx)?;
        let declaration = self.find(name).await?;
        let statements = vec![render::drop_trigger(name, &declaration.table)];
        self.apply(&statements, Change::Delete(name)).await?;
        info!(
            target: AUDIT,
            trigger = name,
            actor = %ctx.actor,
            environment = %ctx.environment,
            "trigger dropped"
        );
        Ok(())
    }

    /// Reinstalls function and trigger from the declaration.
    pub async fn re_execute(
        &self,
        name: &str,
        ctx: &OperationContext,
    ) -> Result<TriggerDeclaration> {
        self.gate(Operation::ReExecuteTrigger, ctx)?;
        let mut declaration = self.find(name).await?;
        let definition = TriggerDefinition::from(&declaration);

        let mut statements = vec![render::drop_trigger(&declaration.name, &declaration.table)];
        statements.extend(definition.up_statements());
        if !declaration.enabled {
            statements.push(render::set_trigger_enabled(
                &declaration.name,
                &declaration.table,
                false,
            ));
        }

        let now = OffsetDateTime::now_utc();
        declaration.last_executed_at = Some(now);
        declaration.installed_at.get_or_insert(now);
        self.apply(&statements, Change::Save(&declaration)).await?;
        info!(
            target: AUDIT,
            trigger = name,
            actor = %ctx.actor,
            environment = %ctx.environment,
            "trigger re-executed"
        );
        Ok(declaration)
    }

    /// Runs drift detection for one trigger and stamps `last_verified_at`
    /// when it is in sync.
    pub async fn verify(&self, name: &str) -> Result<DriftResult> {
        let result = DriftDetector::new(self.db.clone()).detect(name).await?;
        if result.state == DriftState::InSync {
            if let Some(mut declaration) = result.declaration.clone() {
                declaration.last_verified_at = Some(OffsetDateTime::now_utc());
                self.db.save_declaration(&declaration).await?;
            }
        }
        Ok(result)
    }

    fn gate(&self, operation: Operation, ctx: &OperationContext) -> Result<()> {
        self.kill_switch.check(
            operation,
            &ctx.environment,
            ctx.confirmation.as_deref(),
            &ctx.actor,
        )
    }

    async fn apply(&self, statements: &[String], change: Change<'_>) -> Result<()> {
        let mut tx = self.db.begin().await?;
        match Self::stage(tx.as_mut(), statements, change).await {
            Ok(()) => tx.commit().await,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn stage(
        tx: &mut dyn Transaction,
        statements: &[String],
        change: Change<'_>,
    ) -> Result<()> {
        for statement in statements {
            tx.execute(statement).await?;
        }
        match change {
            Change::Save(declaration) => tx.save_declaration(declaration).await,
            Change::Delete(name) => tx.delete_declaration(name).await,
        }
    }
}

enum Change<'a> {
    Save(&'a TriggerDeclaration),
    Delete(&'a str),
}
