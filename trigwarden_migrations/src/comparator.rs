//! Pre-apply comparison of a unit's intended objects against the catalog.

use crate::capture::capture;
use crate::migration::Migration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trigwarden_core::sql::{
    self, ClassifiedOperation, DropOperation, FunctionOperation, OperationSet, TriggerOperation,
};
use trigwarden_core::{
    Catalog, CatalogObject, DiffEntry, DiffStatus, Direction, ObjectKind, Result,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationDiff {
    pub version: u64,
    pub name: String,
    pub direction: Direction,
    /// True iff some function or trigger entry is new or modified.
    pub has_differences: bool,
    pub functions: Vec<DiffEntry>,
    pub triggers: Vec<DiffEntry>,
    /// Passed through as captured; drops are not checked against the catalog.
    pub drops: Vec<DropOperation>,
}

impl MigrationDiff {
    pub fn entries(&self) -> impl Iterator<Item = &DiffEntry> {
        self.functions.iter().chain(self.triggers.iter())
    }

    pub fn count(&self, status: DiffStatus) -> usize {
        self.entries().filter(|e| e.status == status).count()
    }
}

pub struct Comparator<C: ?Sized> {
    catalog: Arc<C>,
}

impl<C: Catalog + ?Sized> Comparator<C> {
    pub fn new(catalog: Arc<C>) -> Self {
        Self { catalog }
    }

    pub async fn compare(
        &self,
        unit: &dyn Migration,
        direction: Direction,
    ) -> Result<MigrationDiff> {
        let statements = capture(unit, direction).await?;
        let operations = OperationSet::classify_all(&statements);

        let mut functions = Vec::new();
        for f in operations.functions() {
            functions.push(self.compare_function(f).await?);
        }
        let mut triggers = Vec::new();
        for t in operations.triggers() {
            triggers.push(self.compare_trigger(t).await?);
        }

        let has_differences = functions
            .iter()
            .chain(triggers.iter())
            .any(|e| e.status != DiffStatus::Unchanged);

        Ok(MigrationDiff {
            version: unit.version(),
            name: unit.name().to_string(),
            direction,
            has_differences,
            functions,
            triggers,
            drops: operations.drops().cloned().collect(),
        })
    }

    async fn compare_function(&self, expected: &FunctionOperation) -> Result<DiffEntry> {
        let actual = self.catalog.find_function(&expected.name).await?;
        let (status, differences) = match &actual {
            None => (DiffStatus::New, Vec::new()),
            Some(f) if f.definition == expected.body => (DiffStatus::Unchanged, Vec::new()),
            Some(_) => (DiffStatus::Modified, vec!["body differs".to_string()]),
        };
        Ok(DiffEntry {
            kind: ObjectKind::Function,
            identity: expected.name.clone(),
            status,
            expected_text: expected.body.clone(),
            actual_text: actual.map(|f| f.definition),
            differences,
        })
    }

    async fn compare_trigger(&self, expected: &TriggerOperation) -> Result<DiffEntry> {
        let actual = self.catalog.find_trigger(&expected.name).await?;
        let (status, differences) = match &actual {
            None => (DiffStatus::New, Vec::new()),
            Some(object) => {
                let differences = trigger_differences(expected, object);
                if differences.is_empty() {
                    (DiffStatus::Unchanged, differences)
                } else {
                    (DiffStatus::Modified, differences)
                }
            }
        };
        Ok(DiffEntry {
            kind: ObjectKind::Trigger,
            identity: format!("{} ON {}", expected.name, expected.table),
            status,
            expected_text: expected.statement.clone(),
            actual_text: actual.map(|o| o.trigger_definition),
            differences,
        })
    }
}

/// Field-by-field comparison after normalizing both sides.
pub fn trigger_differences(expected: &TriggerOperation, actual: &CatalogObject) -> Vec<String> {
    let mut differences = Vec::new();

    let actual_table = sql::ident(&actual.table_name);
    if expected.table != actual_table {
        differences.push(format!("table: expected {}, actual {}", expected.table, actual_table));
    }
    let actual_function = sql::ident(&actual.function_name);
    if expected.function != actual_function {
        differences.push(format!(
            "function: expected {}, actual {}",
            expected.function, actual_function
        ));
    }

    let Some(ClassifiedOperation::TriggerCreate(parsed)) = sql::classify(&actual.trigger_definition)
    else {
        differences.push("definition: database definition could not be parsed".to_string());
        return differences;
    };

    let (expected_events, actual_events) = (expected.sorted_events(), parsed.sorted_events());
    if expected_events != actual_events {
        differences.push(format!(
            "events: expected [{}], actual [{}]",
            expected_events.join(", "),
            actual_events.join(", ")
        ));
    }
    if expected.timing != parsed.timing {
        differences.push(format!(
            "timing: expected {}, actual {}",
            expected.timing.keyword(),
            parsed.timing.keyword()
        ));
    }

    let expected_condition = expected.condition.as_deref().map(normalized);
    let actual_condition = parsed.condition.as_deref().map(normalized);
    if expected_condition != actual_condition {
        differences.push(format!(
            "condition: expected {}, actual {}",
            expected_condition.as_deref().unwrap_or("<none>"),
            actual_condition.as_deref().unwrap_or("<none>")
        ));
    }

    differences
}

/// Conditions compare case-insensitively; the catalog prints keywords and
/// column references in its own case.
fn normalized(condition: &str) -> String {
    sql::normalize_condition(condition).to_lowercase()
}
