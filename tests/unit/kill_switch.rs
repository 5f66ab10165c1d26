use anyhow::Result;
use tokio::test;
use trigwarden::{Error, KillSwitch, KillSwitchConfig, Operation};

use super::kill_switch;

#[test]
async fn test_unprotected_environment_never_blocks() -> Result<()> {
    let switch = kill_switch();
    for operation in [
        Operation::MigrateUp,
        Operation::MigrateDown,
        Operation::DropTrigger,
        Operation::ReExecuteTrigger,
    ] {
        switch.check(operation, "development", None, "alice")?;
        switch.check(operation, "test", Some("wrong"), "alice")?;
    }
    assert!(!switch.is_active("development"));
    Ok(())
}

#[test]
async fn test_protected_environment_requires_exact_confirmation() -> Result<()> {
    let switch = kill_switch();
    assert!(switch.is_active("production"));
    assert_eq!(
        switch.expected_confirmation(Operation::EnableTrigger),
        "EXECUTE ENABLE_TRIGGER"
    );

    switch.check(
        Operation::EnableTrigger,
        "production",
        Some("EXECUTE ENABLE_TRIGGER"),
        "alice",
    )?;

    let attempts = [
        None,
        Some("execute enable_trigger"),
        Some("EXECUTE DISABLE_TRIGGER"),
        Some(""),
    ];
    for attempt in attempts {
        let err = switch
            .check(Operation::EnableTrigger, "production", attempt, "alice")
            .unwrap_err();
        match err {
            Error::KillSwitchBlocked {
                operation,
                environment,
                expected_confirmation,
            } => {
                assert_eq!(operation, "enable_trigger");
                assert_eq!(environment, "production");
                assert_eq!(expected_confirmation, "EXECUTE ENABLE_TRIGGER");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    Ok(())
}

#[test]
async fn test_disabled_switch_allows_everything() -> Result<()> {
    let switch = KillSwitch::new(KillSwitchConfig {
        enabled: false,
        ..KillSwitchConfig::default()
    })
    .with_override_signal(|| false);
    switch.check(Operation::DropTrigger, "production", None, "bob")?;
    Ok(())
}

#[test]
async fn test_custom_confirmation_pattern() -> Result<()> {
    let switch = kill_switch().with_confirmation_pattern(|op| format!("yes, {op}"));
    switch.check(Operation::DropTrigger, "staging", Some("yes, drop_trigger"), "bob")?;
    assert!(switch
        .check(Operation::DropTrigger, "staging", Some("EXECUTE DROP_TRIGGER"), "bob")
        .is_err());
    Ok(())
}

#[test]
async fn test_override_scope_is_restored_after_error() -> Result<()> {
    let switch = kill_switch();

    let inside: Result<(), Error> = KillSwitch::override_scope(async {
        assert!(KillSwitch::override_active());
        switch.check(Operation::MigrateDown, "production", None, "ops")?;
        Err(Error::Config("boom".into()))
    })
    .await;
    assert!(matches!(inside, Err(Error::Config(_))));

    assert!(!KillSwitch::override_active());
    assert!(switch
        .check(Operation::MigrateDown, "production", None, "ops")
        .is_err());
    Ok(())
}

#[test]
async fn test_override_scope_is_task_local() -> Result<()> {
    let seen_elsewhere = KillSwitch::override_scope(async {
        tokio::spawn(async { KillSwitch::override_active() }).await
    })
    .await?;
    assert!(!seen_elsewhere);

    let sync_seen = KillSwitch::sync_override_scope(KillSwitch::override_active);
    assert!(sync_seen);
    Ok(())
}

#[test]
async fn test_external_signal_still_needs_confirmation_when_required() -> Result<()> {
    let switch = KillSwitch::new(KillSwitchConfig::default()).with_override_signal(|| true);
    assert!(switch
        .check(Operation::MigrateUp, "production", None, "ci")
        .is_err());
    switch.check(Operation::MigrateUp, "production", Some("EXECUTE MIGRATE_UP"), "ci")?;

    let lenient = KillSwitch::new(KillSwitchConfig {
        confirmation_required: false,
        ..KillSwitchConfig::default()
    })
    .with_override_signal(|| true);
    lenient.check(Operation::MigrateUp, "production", None, "ci")?;
    Ok(())
}
