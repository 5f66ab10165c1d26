//! Static safety validation.
//!
//! A drop followed by a plain `CREATE` of the same object destroys whatever
//! was there before, along with its grants and dependents. The validator
//! flags such pairs whenever the object already exists. `CREATE OR REPLACE
//! FUNCTION` is never flagged. Triggers have no replace form, so recreating an
//! existing trigger is always flagged and must be allowed explicitly.

use crate::capture::capture;
use crate::migration::Migration;
use std::sync::Arc;
use tracing::warn;
use trigwarden_core::sql::{ClassifiedOperation, DropOperation, OperationSet};
use trigwarden_core::{Catalog, Direction, Error, ObjectKind, Result, Violation};

pub struct SafetyValidator<C: ?Sized> {
    catalog: Arc<C>,
}

impl<C: Catalog + ?Sized> SafetyValidator<C> {
    pub fn new(catalog: Arc<C>) -> Self {
        Self { catalog }
    }

    /// Captures `unit` in `direction` and checks its statements.
    ///
    /// Returns the violations found. Without `allow_unsafe`, any violation
    /// fails with [`Error::UnsafeMigration`].
    pub async fn validate(
        &self,
        unit: &dyn Migration,
        direction: Direction,
        allow_unsafe: bool,
    ) -> Result<Vec<Violation>> {
        let statements = capture(unit, direction).await?;
        let operations = OperationSet::classify_all(&statements);
        let violations = self.violations(&operations).await?;

        if violations.is_empty() {
            return Ok(violations);
        }
        if !allow_unsafe {
            return Err(Error::UnsafeMigration { violations });
        }
        for v in &violations {
            warn!(
                version = unit.version(),
                kind = %v.kind,
                name = %v.name,
                "unsafe drop/create allowed"
            );
        }
        Ok(violations)
    }

    /// Every drop that pairs with a non-replacing create of an existing object.
    pub async fn violations(&self, operations: &OperationSet) -> Result<Vec<Violation>> {
        let mut violations = Vec::new();
        for drop in operations.drops() {
            let Some(create) = operations.creates().find(|c| same_identity(drop, c)) else {
                continue;
            };
            if self.exists(drop).await? {
                violations.push(Violation {
                    kind: drop.kind,
                    name: drop.name.clone(),
                    table: drop.table.clone(),
                    drop_statement: drop.statement.clone(),
                    create_statement: create.statement().to_string(),
                });
            }
        }
        Ok(violations)
    }

    async fn exists(&self, drop: &DropOperation) -> Result<bool> {
        match (drop.kind, drop.table.as_deref()) {
            (ObjectKind::Function, _) => {
                Ok(self.catalog.find_function(&drop.name).await?.is_some())
            }
            (ObjectKind::Trigger, Some(table)) => {
                self.catalog.trigger_exists_on(&drop.name, table).await
            }
            (ObjectKind::Trigger, None) => Ok(false),
        }
    }
}

fn same_identity(drop: &DropOperation, create: &ClassifiedOperation) -> bool {
    if create.kind() != drop.kind || create.name() != drop.name {
        return false;
    }
    match drop.kind {
        ObjectKind::Function => true,
        ObjectKind::Trigger => create.table() == drop.table.as_deref(),
    }
}
