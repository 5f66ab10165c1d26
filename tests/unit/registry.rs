use std::sync::Arc;

use anyhow::Result;
use pretty_assertions::assert_eq;
use tokio::test;
use trigwarden::{
    Catalog, DriftState, Error, MemoryDatabase, OperationContext, RegistryStore, Source,
    TriggerRegistry,
};

use super::{audit_definition, installed, kill_switch};

fn production() -> OperationContext {
    OperationContext::new("production", "alice")
}

#[test]
async fn test_register_keeps_install_timestamp() -> Result<()> {
    let db = Arc::new(MemoryDatabase::new());
    let registry = TriggerRegistry::new(db.clone(), kill_switch());

    let first = registry.register(&audit_definition()).await?;
    assert_eq!(first.source, Source::Declared);
    assert!(first.installed_at.is_some());
    assert_eq!(first.checksum, first.computed_checksum());

    let second = registry.register(&audit_definition().version(2)).await?;
    assert_eq!(second.installed_at, first.installed_at);
    assert_ne!(second.checksum, first.checksum);

    assert_eq!(registry.list().await?.len(), 1);
    assert_eq!(registry.find("users_audit").await?.version, 2);
    assert!(matches!(
        registry.find("ghost").await,
        Err(Error::TriggerNotFound(_))
    ));
    Ok(())
}

#[test]
async fn test_disable_and_enable_in_development() -> Result<()> {
    let (db, registry) = installed(&audit_definition()).await?;
    let ctx = OperationContext::new("development", "alice");

    let disabled = registry.disable("users_audit", &ctx).await?;
    assert!(!disabled.enabled);
    assert!(!db.find_trigger("users_audit").await?.unwrap().enabled);
    assert_eq!(registry.verify("users_audit").await?.state, DriftState::Disabled);

    registry.enable("users_audit", &ctx).await?;
    assert!(db.find_trigger("users_audit").await?.unwrap().enabled);
    assert!(db.find_declaration("users_audit").await?.unwrap().enabled);
    Ok(())
}

#[test]
async fn test_enable_in_production_needs_confirmation() -> Result<()> {
    let (db, registry) = installed(&audit_definition()).await?;
    registry
        .disable("users_audit", &production().confirmed("EXECUTE DISABLE_TRIGGER"))
        .await?;

    let err = registry
        .enable("users_audit", &production().confirmed("EXECUTE DISABLE_TRIGGER"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::KillSwitchBlocked { .. }));
    assert!(!db.find_declaration("users_audit").await?.unwrap().enabled);

    registry
        .enable("users_audit", &production().confirmed("EXECUTE ENABLE_TRIGGER"))
        .await?;
    assert!(db.find_declaration("users_audit").await?.unwrap().enabled);
    Ok(())
}

#[test]
async fn test_drop_trigger_removes_object_and_declaration() -> Result<()> {
    let (db, registry) = installed(&audit_definition()).await?;

    assert!(registry.drop_trigger("users_audit", &production()).await.is_err());
    assert!(db.find_trigger("users_audit").await?.is_some());

    registry
        .drop_trigger("users_audit", &production().confirmed("EXECUTE DROP_TRIGGER"))
        .await?;
    assert!(db.find_trigger("users_audit").await?.is_none());
    assert!(db.find_declaration("users_audit").await?.is_none());
    Ok(())
}

#[test]
async fn test_re_execute_repairs_drift() -> Result<()> {
    let (db, registry) = installed(&audit_definition()).await?;
    db.set_function_body("audit_users", "BEGIN RETURN NULL; END;");
    assert_eq!(registry.verify("users_audit").await?.state, DriftState::Drifted);

    let declaration = registry
        .re_execute("users_audit", &OperationContext::new("development", "alice"))
        .await?;
    assert!(declaration.last_executed_at.is_some());

    let result = registry.verify("users_audit").await?;
    assert_eq!(result.state, DriftState::InSync);
    assert!(db
        .find_declaration("users_audit")
        .await?
        .unwrap()
        .last_verified_at
        .is_some());
    Ok(())
}

#[test]
async fn test_failed_ddl_leaves_registry_untouched() -> Result<()> {
    let (db, registry) = installed(&audit_definition()).await?;
    db.fail_on("DISABLE TRIGGER");

    let ctx = OperationContext::new("development", "alice");
    assert!(registry.disable("users_audit", &ctx).await.is_err());
    assert!(db.find_declaration("users_audit").await?.unwrap().enabled);
    assert!(db.find_trigger("users_audit").await?.unwrap().enabled);
    Ok(())
}

#[test]
async fn test_failed_rollback_keeps_statement_error() -> Result<()> {
    let (db, registry) = installed(&audit_definition()).await?;
    db.fail_on("DROP TRIGGER");
    db.fail_on("ROLLBACK");
    let ctx = OperationContext::new("development", "alice");

    let err = registry.drop_trigger("users_audit", &ctx).await.unwrap_err();
    let Error::ExecutionFailed { statement, .. } = err else {
        panic!("expected ExecutionFailed, got {err}");
    };
    assert!(statement.starts_with("DROP TRIGGER IF EXISTS users_audit"));
    assert!(db.find_declaration("users_audit").await?.is_some());
    Ok(())
}
