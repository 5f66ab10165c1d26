//! Confirmation gate for destructive operations in protected environments.
//!
//! A check passes when the switch is inactive for the environment, when the
//! caller runs inside an [`KillSwitch::override_scope`], when the external
//! override signal is raised (with the confirmation text too, if the config
//! requires it), or when the caller supplies the expected confirmation text.
//! Everything else fails with [`Error::KillSwitchBlocked`].

use crate::config::KillSwitchConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumString};
use tracing::{info, warn};
use trigwarden_core::{Error, Result};

const AUDIT: &str = "trigwarden::audit";

/// Operations the kill switch knows how to gate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    MigrateUp,
    MigrateDown,
    EnableTrigger,
    DisableTrigger,
    DropTrigger,
    ReExecuteTrigger,
}

pub type ConfirmationPattern = Arc<dyn Fn(&str) -> String + Send + Sync>;
pub type OverrideSignal = Arc<dyn Fn() -> bool + Send + Sync>;

tokio::task_local! {
    static OVERRIDE: bool;
}

#[derive(Clone)]
pub struct KillSwitch {
    config: KillSwitchConfig,
    pattern: ConfirmationPattern,
    override_signal: OverrideSignal,
}

impl fmt::Debug for KillSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KillSwitch")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

pub fn default_confirmation(operation: &str) -> String {
    format!("EXECUTE {}", operation.to_uppercase())
}

impl KillSwitch {
    pub fn new(config: KillSwitchConfig) -> Self {
        let var = config.override_env_var.clone();
        Self {
            config,
            pattern: Arc::new(default_confirmation),
            override_signal: Arc::new(move || env_flag(&var)),
        }
    }

    pub fn with_confirmation_pattern(
        mut self,
        pattern: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.pattern = Arc::new(pattern);
        self
    }

    pub fn with_override_signal(
        mut self,
        signal: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.override_signal = Arc::new(signal);
        self
    }

    pub fn config(&self) -> &KillSwitchConfig {
        &self.config
    }

    pub fn is_active(&self, environment: &str) -> bool {
        self.config.enabled
            && self
                .config
                .protected_environments
                .iter()
                .any(|e| e.eq_ignore_ascii_case(environment))
    }

    pub fn expected_confirmation(&self, operation: Operation) -> String {
        (self.pattern)(operation.as_ref())
    }

    pub fn check(
        &self,
        operation: Operation,
        environment: &str,
        confirmation: Option<&str>,
        actor: &str,
    ) -> Result<()> {
        if !self.is_active(environment) {
            return Ok(());
        }
        info!(target: AUDIT, %operation, environment, actor, "kill switch check");

        if Self::override_active() {
            warn!(
                target: AUDIT,
                %operation,
                environment,
                actor,
                "kill switch overridden by scoped override"
            );
            return Ok(());
        }

        let expected = self.expected_confirmation(operation);
        let confirmed = confirmation.is_some_and(|c| c.trim() == expected);

        if (self.override_signal)() {
            if !self.config.confirmation_required || confirmed {
                warn!(
                    target: AUDIT,
                    %operation,
                    environment,
                    actor,
                    "kill switch overridden by external signal"
                );
                return Ok(());
            }
            return Err(self.blocked(operation, environment, actor, expected));
        }

        if confirmed {
            info!(
                target: AUDIT,
                %operation,
                environment,
                actor,
                "kill switch allowed with confirmation"
            );
            return Ok(());
        }

        Err(self.blocked(operation, environment, actor, expected))
    }

    fn blocked(
        &self,
        operation: Operation,
        environment: &str,
        actor: &str,
        expected: String,
    ) -> Error {
        warn!(
            target: AUDIT,
            %operation,
            environment,
            actor,
            expected = %expected,
            "kill switch blocked operation"
        );
        Error::KillSwitchBlocked {
            operation: operation.to_string(),
            environment: environment.to_string(),
            expected_confirmation: expected,
        }
    }

    /// Runs `fut` with the in-process override set. The override is local to
    /// the current task and is gone once `fut` completes, fails or panics.
    pub async fn override_scope<F: Future>(fut: F) -> F::Output {
        OVERRIDE.scope(true, fut).await
    }

    /// Synchronous variant of [`KillSwitch::override_scope`].
    pub fn sync_override_scope<R>(f: impl FnOnce() -> R) -> R {
        OVERRIDE.sync_scope(true, f)
    }

    pub fn override_active() -> bool {
        OVERRIDE.try_with(|active| *active).unwrap_or(false)
    }
}

fn env_flag(var: &str) -> bool {
    std::env::var(var)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
