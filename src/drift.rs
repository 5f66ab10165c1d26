//! Drift detection between registry declarations and the live catalog.
//!
//! Each trigger lands in exactly one [`DriftState`]. The checks run in a fixed
//! order and the first match wins:
//!
//! 1. `disabled` - the declaration is disabled
//! 2. `manual_override` - the declaration's source is `manual`
//! 3. `dropped` - declared but missing from the catalog
//! 4. `unknown` - in the catalog but not declared
//! 5. `drifted` - checksum recomputed from the catalog differs
//! 6. `in_sync` - checksums match

use crate::backend::Database;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{debug, warn};
use trigwarden_core::checksum::{self, ChecksumInput};
use trigwarden_core::{CatalogObject, DriftResult, DriftState, Result, TriggerDeclaration};

/// Counts per drift state. All six states are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftSummary {
    pub counts: BTreeMap<DriftState, usize>,
    pub total: usize,
}

impl DriftSummary {
    pub fn from_results(results: &[DriftResult]) -> Self {
        let mut counts: BTreeMap<DriftState, usize> =
            DriftState::iter().map(|state| (state, 0)).collect();
        for result in results {
            *counts.entry(result.state).or_default() += 1;
        }
        Self {
            counts,
            total: results.len(),
        }
    }

    pub fn count(&self, state: DriftState) -> usize {
        self.counts.get(&state).copied().unwrap_or_default()
    }
}

pub struct DriftDetector {
    db: Arc<dyn Database>,
}

/// Checksum of what the catalog actually holds, hashed with the same inputs
/// the declaration was hashed with. Version, condition and timing cannot be
/// read back reliably from catalog text and are taken from the declaration.
pub fn catalog_checksum(declaration: &TriggerDeclaration, object: &CatalogObject) -> String {
    checksum::compute(&ChecksumInput {
        name: &object.trigger_name,
        table: &object.table_name,
        version: declaration.version,
        function_body: Some(&object.function_definition),
        condition: declaration.condition.as_deref(),
        timing: declaration.timing,
    })
}

/// Pure classification of one declaration/catalog pair.
pub fn classify(
    name: &str,
    declaration: Option<TriggerDeclaration>,
    catalog_object: Option<CatalogObject>,
) -> DriftResult {
    let (state, details) = match (&declaration, &catalog_object) {
        (Some(d), _) if !d.enabled => (DriftState::Disabled, "trigger is disabled".to_string()),
        (Some(d), _) if d.is_manual() => (
            DriftState::ManualOverride,
            "trigger is managed manually".to_string(),
        ),
        (Some(_), None) => (
            DriftState::Dropped,
            "declared trigger is missing from the database".to_string(),
        ),
        (None, Some(_)) => (
            DriftState::Unknown,
            "trigger exists in the database but is not declared".to_string(),
        ),
        (None, None) => (
            DriftState::Unknown,
            "trigger is neither declared nor present in the database".to_string(),
        ),
        (Some(d), Some(object)) => {
            let actual = catalog_checksum(d, object);
            if actual == d.checksum {
                (DriftState::InSync, "checksums match".to_string())
            } else {
                (
                    DriftState::Drifted,
                    format!(
                        "checksum mismatch: declared {}, database {}",
                        short(&d.checksum),
                        short(&actual)
                    ),
                )
            }
        }
    };

    DriftResult {
        state,
        name: name.to_string(),
        declaration,
        catalog_object,
        details,
    }
}

fn short(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}

impl DriftDetector {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Classifies a single trigger by name.
    pub async fn detect(&self, name: &str) -> Result<DriftResult> {
        let declaration = self.db.find_declaration(name).await?;
        Ok(self.detect_declared(name, declaration).await)
    }

    async fn detect_declared(
        &self,
        name: &str,
        declaration: Option<TriggerDeclaration>,
    ) -> DriftResult {
        match self.db.find_trigger(name).await {
            Ok(object) => classify(name, declaration, object),
            Err(e) => {
                warn!(trigger = name, error = %e, "catalog lookup failed during drift detection");
                DriftResult {
                    state: DriftState::Unknown,
                    name: name.to_string(),
                    declaration,
                    catalog_object: None,
                    details: format!("catalog lookup failed: {e}"),
                }
            }
        }
    }

    /// Classifies every declaration plus every undeclared catalog trigger.
    pub async fn detect_all(&self) -> Result<Vec<DriftResult>> {
        let declarations = self.db.declarations().await?;
        let declared: HashSet<String> = declarations.iter().map(|d| d.catalog_name()).collect();

        let mut results = Vec::with_capacity(declarations.len());
        for declaration in declarations {
            let name = declaration.name.clone();
            results.push(self.detect_declared(&name, Some(declaration)).await);
        }

        match self.db.all_triggers().await {
            Ok(objects) => {
                for object in objects {
                    if !declared.contains(&object.trigger_name) {
                        let name = object.trigger_name.clone();
                        results.push(classify(&name, None, Some(object)));
                    }
                }
            }
            Err(e) => warn!(
                error = %e,
                "could not list catalog triggers; unmanaged triggers omitted"
            ),
        }

        debug!(count = results.len(), "drift detection finished");
        Ok(results)
    }

    pub async fn summary(&self) -> Result<DriftSummary> {
        Ok(DriftSummary::from_results(&self.detect_all().await?))
    }
}
