//! Statement capture.
//!
//! A [`StatementRecorder`] stands in for the database while a unit's procedure
//! runs. In record-only mode nothing reaches the database; in pass-through
//! mode every statement is recorded and then forwarded to an inner sink.

use crate::migration::Migration;
use async_trait::async_trait;
use tracing::debug;
use trigwarden_core::{Direction, Result, StatementSink};

pub struct StatementRecorder<'a> {
    statements: Vec<String>,
    inner: Option<&'a mut dyn StatementSink>,
}

impl StatementRecorder<'static> {
    pub fn record_only() -> Self {
        Self {
            statements: Vec::new(),
            inner: None,
        }
    }
}

impl<'a> StatementRecorder<'a> {
    pub fn passthrough(inner: &'a mut dyn StatementSink) -> Self {
        Self {
            statements: Vec::new(),
            inner: Some(inner),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_some()
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<String> {
        self.statements
    }
}

#[async_trait]
impl StatementSink for StatementRecorder<'_> {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.statements.push(sql.to_string());
        match self.inner.as_mut() {
            Some(inner) => {
                debug!(statement = sql, "executing");
                inner.execute(sql).await
            }
            None => Ok(()),
        }
    }
}

/// Runs `unit` in `direction` against a record-only sink and returns the
/// statements it issued, in order.
pub async fn capture(unit: &dyn Migration, direction: Direction) -> Result<Vec<String>> {
    let mut recorder = StatementRecorder::record_only();
    unit.run(direction, &mut recorder).await?;
    debug!(
        version = unit.version(),
        %direction,
        count = recorder.statements().len(),
        "captured statements"
    );
    Ok(recorder.into_statements())
}
