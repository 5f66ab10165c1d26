use anyhow::Result;
use tokio::test;
use trigwarden::{Catalog, Database, Error, Ledger, MemoryDatabase};

use super::audit_definition;

#[test]
async fn test_catalog_reflects_seeded_statements() -> Result<()> {
    let db = MemoryDatabase::new();
    db.seed(audit_definition().up_statements())?;

    let function = db.find_function("audit_users").await?.unwrap();
    assert!(function.definition.contains("audit_log"));

    let trigger = db.find_trigger("users_audit").await?.unwrap();
    assert_eq!(trigger.table_name, "users");
    assert_eq!(trigger.function_name, "audit_users");
    assert!(trigger.enabled);
    assert!(trigger.trigger_definition.contains("AFTER INSERT OR UPDATE ON users"));

    assert!(db.trigger_exists_on("users_audit", "users").await?);
    assert!(!db.trigger_exists_on("users_audit", "orders").await?);
    assert_eq!(db.find_triggers_for_table("users").await?.len(), 1);
    Ok(())
}

#[test]
async fn test_rejects_what_postgres_rejects() -> Result<()> {
    let db = MemoryDatabase::new();
    let up = audit_definition().up_statements();

    let missing_function = db.seed([&up[1]]).unwrap_err();
    assert!(matches!(missing_function, Error::ExecutionFailed { .. }));

    db.seed(&up)?;
    assert!(db.seed([&up[1]]).is_err(), "duplicate trigger");
    assert!(db.seed(["DROP FUNCTION audit_users()"]).is_err(), "dependent trigger");
    assert!(db.seed(["DROP TRIGGER nope ON users"]).is_err());
    db.seed(["DROP TRIGGER IF EXISTS nope ON users"])?;
    assert!(db.seed(["   "]).is_err());
    Ok(())
}

#[test]
async fn test_alter_table_toggles_trigger() -> Result<()> {
    let db = MemoryDatabase::new();
    db.seed(audit_definition().up_statements())?;
    db.seed(["ALTER TABLE users DISABLE TRIGGER users_audit"])?;
    assert!(!db.find_trigger("users_audit").await?.unwrap().enabled);
    db.seed(["ALTER TABLE users ENABLE TRIGGER users_audit"])?;
    assert!(db.find_trigger("users_audit").await?.unwrap().enabled);
    Ok(())
}

#[test]
async fn test_transaction_commits_atomically() -> Result<()> {
    let db = MemoryDatabase::new();
    let up = audit_definition().up_statements();

    let mut tx = db.begin().await?;
    for statement in &up {
        tx.execute(statement).await?;
    }
    tx.record_version(7).await?;
    assert!(db.find_trigger("users_audit").await?.is_none());
    assert!(db.applied_versions().await?.is_empty());
    tx.commit().await?;

    assert!(db.find_trigger("users_audit").await?.is_some());
    assert_eq!(db.applied_versions().await?, vec![7]);
    assert_eq!(db.executed_statements(), up);
    Ok(())
}

#[test]
async fn test_rollback_discards_work() -> Result<()> {
    let db = MemoryDatabase::new();
    db.fail_on("CREATE TRIGGER");

    let mut tx = db.begin().await?;
    let up = audit_definition().up_statements();
    tx.execute(&up[0]).await?;
    assert!(tx.execute(&up[1]).await.is_err());
    tx.rollback().await?;

    assert!(db.find_function("audit_users").await?.is_none());
    db.clear_failures();
    db.seed(&up)?;
    Ok(())
}
