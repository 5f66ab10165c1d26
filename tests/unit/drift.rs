use std::sync::Arc;

use anyhow::Result;
use pretty_assertions::assert_eq;
use strum::IntoEnumIterator;
use tokio::test;
use trigwarden::{
    DriftDetector, DriftState, MemoryDatabase, RegistryStore, Source, TriggerDefinition,
};

use super::{audit_definition, installed, AUDIT_BODY};

#[test]
async fn test_installed_declaration_is_in_sync() -> Result<()> {
    let (db, _) = installed(&audit_definition()).await?;
    let result = DriftDetector::new(db).detect("users_audit").await?;
    assert_eq!(result.state, DriftState::InSync);
    assert!(result.catalog_object.is_some());
    Ok(())
}

#[test]
async fn test_one_character_body_change_is_drifted() -> Result<()> {
    let (db, _) = installed(&audit_definition()).await?;
    db.set_function_body("audit_users", format!("{AUDIT_BODY}x"));

    let result = DriftDetector::new(db).detect("users_audit").await?;
    assert_eq!(result.state, DriftState::Drifted);
    assert!(result.details.starts_with("checksum mismatch"));
    Ok(())
}

#[test]
async fn test_disabled_wins_over_everything() -> Result<()> {
    let (db, _) = installed(&audit_definition()).await?;
    let mut declaration = db.find_declaration("users_audit").await?.unwrap();
    declaration.enabled = false;
    declaration.source = Source::Manual;
    db.save_declaration(&declaration).await?;
    db.set_function_body("audit_users", "changed");

    let result = DriftDetector::new(db.clone()).detect("users_audit").await?;
    assert_eq!(result.state, DriftState::Disabled);

    db.seed(["DROP TRIGGER users_audit ON users"])?;
    let result = DriftDetector::new(db).detect("users_audit").await?;
    assert_eq!(result.state, DriftState::Disabled);
    Ok(())
}

#[test]
async fn test_manual_declaration_is_manual_override() -> Result<()> {
    let (db, _) = installed(&audit_definition()).await?;
    let mut declaration = db.find_declaration("users_audit").await?.unwrap();
    declaration.source = Source::Manual;
    db.save_declaration(&declaration).await?;
    db.set_function_body("audit_users", "changed");

    let result = DriftDetector::new(db).detect("users_audit").await?;
    assert_eq!(result.state, DriftState::ManualOverride);
    Ok(())
}

#[test]
async fn test_declared_but_missing_is_dropped() -> Result<()> {
    let db = Arc::new(MemoryDatabase::new());
    db.save_declaration(&audit_definition().declaration(Source::Declared))
        .await?;

    let result = DriftDetector::new(db).detect("users_audit").await?;
    assert_eq!(result.state, DriftState::Dropped);
    assert!(result.catalog_object.is_none());
    Ok(())
}

#[test]
async fn test_undeclared_and_absent_are_unknown() -> Result<()> {
    let db = Arc::new(MemoryDatabase::new());
    db.seed(audit_definition().up_statements())?;
    let detector = DriftDetector::new(db);

    let live_only = detector.detect("users_audit").await?;
    assert_eq!(live_only.state, DriftState::Unknown);
    assert!(live_only.declaration.is_none());
    assert!(live_only.catalog_object.is_some());

    let nowhere = detector.detect("ghost").await?;
    assert_eq!(nowhere.state, DriftState::Unknown);
    assert!(nowhere.declaration.is_none());
    assert!(nowhere.catalog_object.is_none());
    Ok(())
}

#[test]
async fn test_timing_and_condition_do_not_cause_drift() -> Result<()> {
    let definition = audit_definition();
    let (db, _) = installed(&definition).await?;
    db.seed([
        "DROP TRIGGER users_audit ON users".to_string(),
        TriggerDefinition::new("users_audit", "users")
            .timing(trigwarden::Timing::Before)
            .on(["DELETE"])
            .function("audit_users", AUDIT_BODY)
            .up_statements()
            .remove(1),
    ])?;

    let result = DriftDetector::new(db).detect("users_audit").await?;
    assert_eq!(result.state, DriftState::InSync);
    Ok(())
}

#[test]
async fn test_detect_all_and_summary() -> Result<()> {
    let (db, registry) = installed(&audit_definition()).await?;
    registry
        .register(
            &TriggerDefinition::new("orders_audit", "orders")
                .function("audit_orders", "BEGIN RETURN NEW; END;"),
        )
        .await?;
    db.seed(
        TriggerDefinition::new("legacy_touch", "accounts")
            .function("touch", "BEGIN NEW.updated_at = now(); RETURN NEW; END;")
            .up_statements(),
    )?;

    let detector = DriftDetector::new(db);
    let mut results = detector.detect_all().await?;
    results.sort_by(|a, b| a.name.cmp(&b.name));
    let states: Vec<_> = results.iter().map(|r| (r.name.as_str(), r.state)).collect();
    assert_eq!(
        states,
        vec![
            ("legacy_touch", DriftState::Unknown),
            ("orders_audit", DriftState::Dropped),
            ("users_audit", DriftState::InSync),
        ]
    );

    let summary = detector.summary().await?;
    assert_eq!(summary.counts.len(), DriftState::iter().count());
    assert_eq!(summary.total, 3);
    assert_eq!(summary.count(DriftState::InSync), 1);
    assert_eq!(summary.count(DriftState::Dropped), 1);
    assert_eq!(summary.count(DriftState::Unknown), 1);
    assert_eq!(summary.count(DriftState::Drifted), 0);
    Ok(())
}

#[test]
async fn test_schema_qualified_table_is_in_sync() -> Result<()> {
    let definition = TriggerDefinition::new("users_audit", "public.users")
        .on(["INSERT", "UPDATE"])
        .function("audit_users", AUDIT_BODY);
    let (db, _) = installed(&definition).await?;

    let result = DriftDetector::new(db).detect("users_audit").await?;
    assert_eq!(result.state, DriftState::InSync, "{}", result.details);
    assert_eq!(result.catalog_object.unwrap().table_name, "users");
    Ok(())
}

#[test]
async fn test_mixed_case_name_matches_folded_catalog_name() -> Result<()> {
    let definition = TriggerDefinition::new("UsersAudit", "Users")
        .on(["INSERT"])
        .function("AuditUsers", AUDIT_BODY);
    let (db, _) = installed(&definition).await?;

    let detector = DriftDetector::new(db);
    assert_eq!(detector.detect("UsersAudit").await?.state, DriftState::InSync);

    let results = detector.detect_all().await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "UsersAudit");
    assert_eq!(results[0].state, DriftState::InSync);
    Ok(())
}

#[test]
async fn test_catalog_error_degrades_only_that_entry() -> Result<()> {
    let (db, registry) = installed(&audit_definition()).await?;
    let orders = TriggerDefinition::new("orders_audit", "orders")
        .function("audit_orders", "BEGIN RETURN NEW; END;");
    db.seed(orders.up_statements())?;
    registry.register(&orders).await?;
    db.fail_lookup("users_audit");

    let detector = DriftDetector::new(db.clone());
    let mut results = detector.detect_all().await?;
    results.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(results.len(), 2);

    assert_eq!(results[0].name, "orders_audit");
    assert_eq!(results[0].state, DriftState::InSync);
    assert_eq!(results[1].name, "users_audit");
    assert_eq!(results[1].state, DriftState::Unknown);
    assert!(results[1].declaration.is_some());
    assert!(results[1].catalog_object.is_none());
    assert!(results[1].details.starts_with("catalog lookup failed"));

    let single = detector.detect("users_audit").await?;
    assert_eq!(single.state, DriftState::Unknown);

    db.clear_failures();
    assert_eq!(detector.detect("users_audit").await?.state, DriftState::InSync);
    Ok(())
}
