use crate::capture::StatementRecorder;
use crate::migration::{Migration, MigrationSet};
use crate::validator::SafetyValidator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use trigwarden::backend::{Database, Transaction};
use trigwarden::MigrationConfig;
use trigwarden_core::{Direction, Error, Result};

/// Name reported for ledger versions that have no unit anymore.
pub const MISSING: &str = "<missing>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub version: u64,
    pub name: String,
    pub applied: bool,
}

/// Applies and reverts migration units against the ledger.
pub struct MigrationRunner {
    db: Arc<dyn Database>,
    migrations: MigrationSet,
    allow_unsafe: bool,
}

impl MigrationRunner {
    pub fn new(db: Arc<dyn Database>, migrations: MigrationSet, config: &MigrationConfig) -> Self {
        Self {
            db,
            migrations,
            allow_unsafe: config.allow_unsafe,
        }
    }

    pub fn allow_unsafe(mut self, allow_unsafe: bool) -> Self {
        self.allow_unsafe = allow_unsafe;
        self
    }

    pub fn migrations(&self) -> &MigrationSet {
        &self.migrations
    }

    async fn applied(&self) -> Result<BTreeSet<u64>> {
        Ok(self.db.applied_versions().await?.into_iter().collect())
    }

    /// Highest applied version, or 0 when nothing is applied.
    pub async fn current_version(&self) -> Result<u64> {
        Ok(self.applied().await?.last().copied().unwrap_or(0))
    }

    /// Discovered units above the current version, ascending.
    pub async fn pending(&self) -> Result<Vec<Arc<dyn Migration>>> {
        let current = self.current_version().await?;
        Ok(self
            .migrations
            .iter()
            .filter(|m| m.version() > current)
            .cloned()
            .collect())
    }

    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        let applied = self.applied().await?;
        let mut status: Vec<MigrationStatus> = self
            .migrations
            .iter()
            .map(|m| MigrationStatus {
                version: m.version(),
                name: m.name().to_string(),
                applied: applied.contains(&m.version()),
            })
            .collect();
        status.extend(
            applied
                .iter()
                .filter(|v| !self.migrations.contains(**v))
                .map(|v| MigrationStatus {
                    version: *v,
                    name: MISSING.to_string(),
                    applied: true,
                }),
        );
        status.sort_by_key(|s| s.version);
        Ok(status)
    }

    /// Applies `target` alone, or every pending unit in ascending order.
    /// Returns the versions applied.
    pub async fn run_up(&self, target: Option<u64>) -> Result<Vec<u64>> {
        let versions = match target {
            Some(version) => {
                if self.applied().await?.contains(&version) {
                    return Err(Error::AlreadyApplied(version));
                }
                if !self.migrations.contains(version) {
                    return Err(Error::MigrationNotFound(version));
                }
                vec![version]
            }
            None => self.pending().await?.iter().map(|m| m.version()).collect(),
        };

        for version in &versions {
            self.apply(*version, Direction::Up).await?;
        }
        if versions.is_empty() {
            info!("no pending migrations");
        }
        Ok(versions)
    }

    /// Reverts every applied version above `target`, newest first, or just
    /// the newest applied version. Returns the versions reverted.
    pub async fn run_down(&self, target: Option<u64>) -> Result<Vec<u64>> {
        let applied = self.applied().await?;
        let versions: Vec<u64> = match target {
            Some(target) => {
                if target != 0 && !self.migrations.contains(target) {
                    return Err(Error::MigrationNotFound(target));
                }
                let current = applied.last().copied().unwrap_or(0);
                if target >= current {
                    return Err(Error::NotApplied(target));
                }
                applied.range(target + 1..).rev().copied().collect()
            }
            None => match applied.last() {
                Some(version) => vec![*version],
                None => return Err(Error::NotApplied(0)),
            },
        };

        for version in &versions {
            self.apply(*version, Direction::Down).await?;
        }
        Ok(versions)
    }

    async fn apply(&self, version: u64, direction: Direction) -> Result<()> {
        let unit = self
            .migrations
            .get(version)
            .ok_or(Error::MigrationNotFound(version))?;

        SafetyValidator::new(self.db.clone())
            .validate(unit.as_ref(), direction, self.allow_unsafe)
            .await?;

        let started = OffsetDateTime::now_utc();
        let mut tx = self.db.begin().await?;
        match Self::execute(tx.as_mut(), unit.as_ref(), direction).await {
            Ok(count) => {
                tx.commit().await?;
                let elapsed = OffsetDateTime::now_utc() - started;
                info!(
                    version,
                    name = unit.name(),
                    %direction,
                    statements = count,
                    elapsed_ms = elapsed.whole_milliseconds() as i64,
                    "migration {}",
                    if direction == Direction::Up { "applied" } else { "reverted" }
                );
            }
            Err(e) => {
                warn!(
                    version,
                    name = unit.name(),
                    %direction,
                    error = %e,
                    "migration failed, rolling back"
                );
                if let Err(rollback) = tx.rollback().await {
                    warn!(version, error = %rollback, "rollback failed");
                }
                return Err(e);
            }
        }

        if direction == Direction::Down {
            self.cleanup().await;
        }
        Ok(())
    }

    async fn execute(
        tx: &mut dyn Transaction,
        unit: &dyn Migration,
        direction: Direction,
    ) -> Result<usize> {
        let count = {
            let mut recorder = StatementRecorder::passthrough(tx.as_sink());
            unit.run(direction, &mut recorder).await?;
            recorder.statements().len()
        };

        match direction {
            Direction::Up => {
                tx.record_version(unit.version()).await?;
                let now = OffsetDateTime::now_utc();
                for mut declaration in unit.declarations() {
                    declaration.installed_at = Some(now);
                    declaration.last_executed_at = Some(now);
                    tx.save_declaration(&declaration).await?;
                }
            }
            Direction::Down => tx.remove_version(unit.version()).await?,
        }
        Ok(count)
    }

    /// Removes registry declarations whose trigger no longer exists. Failures
    /// are logged and swallowed.
    pub async fn cleanup(&self) {
        if let Err(e) = self.try_cleanup().await {
            warn!(error = %e, "registry cleanup after down migration failed");
        }
    }

    async fn try_cleanup(&self) -> Result<()> {
        for declaration in self.db.declarations().await? {
            if self.db.find_trigger(&declaration.name).await?.is_none() {
                self.db.delete_declaration(&declaration.name).await?;
                debug!(trigger = %declaration.name, "removed declaration for dropped trigger");
            }
        }
        Ok(())
    }
}
