mod common;

use anyhow::Result;
use common::{audit_definition, RawMigration, AUDIT_BODY};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use trigwarden::MemoryDatabase;
use trigwarden_core::{DiffStatus, Direction, TriggerDefinition};
use trigwarden_migrations::{reporter, Comparator, DefinitionMigration};

#[tokio::test]
async fn test_everything_new_on_empty_catalog() -> Result<()> {
    let unit = DefinitionMigration::new(1, "audit").with(audit_definition());
    let diff = Comparator::new(Arc::new(MemoryDatabase::new()))
        .compare(&unit, Direction::Up)
        .await?;

    assert!(diff.has_differences);
    assert_eq!(diff.functions.len(), 1);
    assert_eq!(diff.functions[0].status, DiffStatus::New);
    assert_eq!(diff.triggers.len(), 1);
    assert_eq!(diff.triggers[0].status, DiffStatus::New);
    assert!(diff.drops.is_empty());
    assert_eq!(reporter::summary(&diff), "2 new, 0 modified, 0 unchanged, 0 drops");
    Ok(())
}

#[tokio::test]
async fn test_identical_objects_are_unchanged() -> Result<()> {
    let db = Arc::new(MemoryDatabase::new());
    db.seed(audit_definition().up_statements())?;
    let unit = DefinitionMigration::new(1, "audit").with(audit_definition());

    let diff = Comparator::new(db).compare(&unit, Direction::Up).await?;
    assert!(!diff.has_differences);
    assert!(diff.entries().all(|e| e.status == DiffStatus::Unchanged));
    Ok(())
}

#[tokio::test]
async fn test_added_event_is_modified_with_events_difference() -> Result<()> {
    let db = Arc::new(MemoryDatabase::new());
    db.seed(
        TriggerDefinition::new("t", "users")
            .on(["INSERT"])
            .function("audit_users", AUDIT_BODY)
            .up_statements(),
    )?;
    let unit = RawMigration::new(
        1,
        ["CREATE TRIGGER t AFTER UPDATE OR INSERT ON users FOR EACH ROW EXECUTE FUNCTION audit_users()"],
        Vec::<String>::new(),
    );

    let diff = Comparator::new(db).compare(&unit, Direction::Up).await?;
    assert!(diff.has_differences);
    let trigger = &diff.triggers[0];
    assert_eq!(trigger.status, DiffStatus::Modified);
    assert_eq!(
        trigger.differences,
        vec!["events: expected [INSERT, UPDATE], actual [INSERT]".to_string()]
    );
    assert!(reporter::format(&diff).contains("~ t ON users [modified]"));
    Ok(())
}

#[tokio::test]
async fn test_condition_and_body_changes() -> Result<()> {
    let db = Arc::new(MemoryDatabase::new());
    db.seed(audit_definition().when("NEW.email IS NOT NULL").up_statements())?;

    let changed = audit_definition()
        .function("audit_users", " BEGIN RETURN NEW; END; ")
        .when("NEW.email IS NULL");
    let unit = DefinitionMigration::new(2, "audit_v2").with(changed);
    let diff = Comparator::new(db).compare(&unit, Direction::Up).await?;

    assert_eq!(diff.functions[0].status, DiffStatus::Modified);
    assert_eq!(diff.functions[0].differences, vec!["body differs".to_string()]);
    assert_eq!(diff.triggers[0].status, DiffStatus::Modified);
    assert_eq!(diff.triggers[0].differences.len(), 1);
    assert!(diff.triggers[0].differences[0].starts_with("condition:"));
    Ok(())
}

#[tokio::test]
async fn test_condition_whitespace_and_parentheses_are_ignored() -> Result<()> {
    let db = Arc::new(MemoryDatabase::new());
    db.seed(audit_definition().when("NEW.email IS NOT NULL").up_statements())?;
    let unit = DefinitionMigration::new(1, "audit")
        .with(audit_definition().when("(new.email   IS NOT NULL)"));

    let diff = Comparator::new(db).compare(&unit, Direction::Up).await?;
    assert_eq!(diff.triggers[0].status, DiffStatus::Unchanged);
    Ok(())
}

#[tokio::test]
async fn test_drops_pass_through() -> Result<()> {
    let unit = DefinitionMigration::new(1, "audit").with(audit_definition());
    let diff = Comparator::new(Arc::new(MemoryDatabase::new()))
        .compare(&unit, Direction::Down)
        .await?;

    assert!(!diff.has_differences);
    assert_eq!(diff.drops.len(), 2);
    assert_eq!(diff.drops[0].statement, "DROP TRIGGER IF EXISTS users_audit ON users");
    assert_eq!(reporter::summary(&diff), "0 new, 0 modified, 0 unchanged, 2 drops");
    Ok(())
}
