use std::sync::Arc;

use anyhow::Result;
use trigwarden::{KillSwitch, KillSwitchConfig, MemoryDatabase, TriggerDefinition, TriggerRegistry};

mod drift;
mod kill_switch;
mod memory;
mod registry;

pub const AUDIT_BODY: &str = " BEGIN INSERT INTO audit_log(row_id) VALUES (NEW.id); RETURN NEW; END; ";

pub fn audit_definition() -> TriggerDefinition {
    TriggerDefinition::new("users_audit", "users")
        .on(["INSERT", "UPDATE"])
        .function("audit_users", AUDIT_BODY)
        .when("NEW.email IS NOT NULL")
        .version(1)
}

/// Kill switch that ignores the process environment.
pub fn kill_switch() -> KillSwitch {
    KillSwitch::new(KillSwitchConfig::default()).with_override_signal(|| false)
}

/// A database with `definition` installed and registered.
pub async fn installed(
    definition: &TriggerDefinition,
) -> Result<(Arc<MemoryDatabase>, TriggerRegistry)> {
    let db = Arc::new(MemoryDatabase::new());
    db.seed(definition.up_statements())?;
    let registry = TriggerRegistry::new(db.clone(), kill_switch());
    registry.register(definition).await?;
    Ok((db, registry))
}
