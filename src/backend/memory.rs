//! In-process database used by tests and dry runs.
//!
//! Statements are applied to a small model of the trigger catalog using the
//! same classifier migrations are validated with, plus `ALTER TABLE ...
//! ENABLE|DISABLE TRIGGER`. Everything else is accepted and only logged.
//! Transactions work on a snapshot of the state and swap it in on commit;
//! concurrent transactions are last-commit-wins.

use super::{Database, Ledger, RegistryStore, Transaction};
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};
use trigwarden_core::sql::{self, render, ClassifiedOperation};
use trigwarden_core::{
    Catalog, CatalogFunction, CatalogObject, Error, ObjectKind, Result, StatementSink, Timing,
    TriggerDeclaration,
};

static ALTER_TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)^\s*ALTER\s+TABLE\s+(?:ONLY\s+)?(?P<table>[\w."]+)\s+(?P<verb>ENABLE|DISABLE)\s+TRIGGER\s+(?P<name>[\w."]+)"#,
    )
    .expect("valid ALTER TABLE pattern")
});

#[derive(Debug, Clone)]
struct StoredTrigger {
    name: String,
    table: String,
    timing: Timing,
    events: Vec<String>,
    condition: Option<String>,
    function: String,
    enabled: bool,
}

#[derive(Debug, Clone, Default)]
struct State {
    functions: BTreeMap<String, String>,
    triggers: BTreeMap<String, StoredTrigger>,
    ledger: BTreeSet<u64>,
    registry: BTreeMap<String, TriggerDeclaration>,
    executed: Vec<String>,
}

impl State {
    fn catalog_object(&self, trigger: &StoredTrigger) -> CatalogObject {
        CatalogObject {
            trigger_name: trigger.name.clone(),
            table_name: trigger.table.clone(),
            function_name: trigger.function.clone(),
            trigger_definition: render::create_trigger(
                &trigger.name,
                &trigger.table,
                trigger.timing,
                &trigger.events,
                trigger.condition.as_deref(),
                &trigger.function,
            ),
            function_definition: self
                .functions
                .get(&trigger.function)
                .cloned()
                .unwrap_or_default(),
            enabled: trigger.enabled,
        }
    }

    fn apply(&mut self, statement: &str, failures: &[String]) -> Result<()> {
        if statement.trim().is_empty() {
            return Err(Error::execution(statement, "syntax error at end of input"));
        }
        if let Some(pattern) = failures.iter().find(|p| statement.contains(p.as_str())) {
            return Err(Error::execution(
                statement,
                format!("injected failure for '{pattern}'"),
            ));
        }

        if let Some(caps) = ALTER_TRIGGER.captures(statement) {
            let name = sql::ident(&caps["name"]);
            let table = sql::ident(&caps["table"]);
            let trigger = self
                .triggers
                .get_mut(&name)
                .filter(|t| t.table == table)
                .ok_or_else(|| {
                    Error::execution(
                        statement,
                        format!("trigger \"{name}\" for table \"{table}\" does not exist"),
                    )
                })?;
            trigger.enabled = caps["verb"].eq_ignore_ascii_case("ENABLE");
        } else if let Some(op) = sql::classify(statement) {
            self.apply_operation(statement, op)?;
        }

        self.executed.push(statement.to_string());
        Ok(())
    }

    fn apply_operation(&mut self, statement: &str, op: ClassifiedOperation) -> Result<()> {
        match op {
            ClassifiedOperation::FunctionCreate(f) => {
                if self.functions.contains_key(&f.name) {
                    return Err(Error::execution(
                        statement,
                        format!("function \"{}\" already exists", f.name),
                    ));
                }
                self.functions.insert(f.name, f.body);
            }
            ClassifiedOperation::FunctionReplace(f) => {
                self.functions.insert(f.name, f.body);
            }
            ClassifiedOperation::TriggerCreate(t) => {
                if self.triggers.contains_key(&t.name) {
                    return Err(Error::execution(
                        statement,
                        format!("trigger \"{}\" already exists", t.name),
                    ));
                }
                if !self.functions.contains_key(&t.function) {
                    return Err(Error::execution(
                        statement,
                        format!("function {}() does not exist", t.function),
                    ));
                }
                self.triggers.insert(
                    t.name.clone(),
                    StoredTrigger {
                        name: t.name,
                        table: t.table,
                        timing: t.timing,
                        events: t.events,
                        condition: t.condition,
                        function: t.function,
                        enabled: true,
                    },
                );
            }
            ClassifiedOperation::Drop(d) => match d.kind {
                ObjectKind::Trigger => {
                    let exists = self
                        .triggers
                        .get(&d.name)
                        .is_some_and(|t| Some(&t.table) == d.table.as_ref());
                    if exists {
                        self.triggers.remove(&d.name);
                    } else if !d.if_exists {
                        return Err(Error::execution(
                            statement,
                            format!("trigger \"{}\" does not exist", d.name),
                        ));
                    }
                }
                ObjectKind::Function => {
                    if self.triggers.values().any(|t| t.function == d.name) {
                        return Err(Error::execution(
                            statement,
                            format!(
                                "cannot drop function {}() because other objects depend on it",
                                d.name
                            ),
                        ));
                    }
                    if self.functions.remove(&d.name).is_none() && !d.if_exists {
                        return Err(Error::execution(
                            statement,
                            format!("function {}() does not exist", d.name),
                        ));
                    }
                }
            },
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
    failures: Arc<Mutex<Vec<String>>>,
    lookup_failures: Arc<Mutex<BTreeSet<String>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies statements directly, outside any transaction.
    pub fn seed<I, S>(&self, statements: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let failures = self.failures.lock().clone();
        let mut state = self.state.lock();
        for statement in statements {
            state.apply(statement.as_ref(), &failures)?;
        }
        Ok(())
    }

    /// Rewrites a function body behind the registry's back.
    pub fn set_function_body(&self, name: &str, body: impl Into<String>) {
        self.state.lock().functions.insert(name.to_string(), body.into());
    }

    /// Any later statement containing `pattern` fails with `ExecutionFailed`.
    /// `ROLLBACK` makes transaction rollbacks fail too.
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.failures.lock().push(pattern.into());
    }

    /// Catalog reads of trigger `name` fail until failures are cleared.
    pub fn fail_lookup(&self, name: &str) {
        self.lookup_failures.lock().insert(sql::ident(name));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
        self.lookup_failures.lock().clear();
    }

    /// Every statement that has been committed, in order.
    pub fn executed_statements(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }
}

#[async_trait]
impl Catalog for MemoryDatabase {
    async fn find_function(&self, name: &str) -> Result<Option<CatalogFunction>> {
        Ok(self
            .state
            .lock()
            .functions
            .get(&sql::ident(name))
            .map(|definition| CatalogFunction {
                name: sql::ident(name),
                definition: definition.clone(),
            }))
    }

    async fn find_trigger(&self, name: &str) -> Result<Option<CatalogObject>> {
        let name = sql::ident(name);
        if self.lookup_failures.lock().contains(&name) {
            return Err(Error::execution(
                format!("SELECT ... WHERE tgname = '{name}'"),
                "catalog unavailable",
            ));
        }
        let state = self.state.lock();
        Ok(state.triggers.get(&name).map(|t| state.catalog_object(t)))
    }

    async fn find_triggers_for_table(&self, table: &str) -> Result<Vec<CatalogObject>> {
        let table = sql::ident(table);
        let state = self.state.lock();
        Ok(state
            .triggers
            .values()
            .filter(|t| t.table == table)
            .map(|t| state.catalog_object(t))
            .collect())
    }

    async fn all_triggers(&self) -> Result<Vec<CatalogObject>> {
        let state = self.state.lock();
        Ok(state
            .triggers
            .values()
            .map(|t| state.catalog_object(t))
            .collect())
    }
}

#[async_trait]
impl Ledger for MemoryDatabase {
    async fn applied_versions(&self) -> Result<Vec<u64>> {
        Ok(self.state.lock().ledger.iter().copied().collect())
    }
}

#[async_trait]
impl RegistryStore for MemoryDatabase {
    async fn declarations(&self) -> Result<Vec<TriggerDeclaration>> {
        Ok(self.state.lock().registry.values().cloned().collect())
    }

    async fn find_declaration(&self, name: &str) -> Result<Option<TriggerDeclaration>> {
        Ok(self.state.lock().registry.get(name).cloned())
    }

    async fn save_declaration(&self, declaration: &TriggerDeclaration) -> Result<()> {
        self.state
            .lock()
            .registry
            .insert(declaration.name.clone(), declaration.clone());
        Ok(())
    }

    async fn delete_declaration(&self, name: &str) -> Result<()> {
        self.state.lock().registry.remove(name);
        Ok(())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction {
            working: self.state.lock().clone(),
            failures: self.failures.lock().clone(),
            db: self.clone(),
        }))
    }
}

pub struct MemoryTransaction {
    db: MemoryDatabase,
    working: State,
    failures: Vec<String>,
}

#[async_trait]
impl StatementSink for MemoryTransaction {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.working.apply(sql, &self.failures)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn as_sink(&mut self) -> &mut dyn StatementSink {
        self
    }

    async fn record_version(&mut self, version: u64) -> Result<()> {
        if !self.working.ledger.insert(version) {
            return Err(Error::execution(
                format!("INSERT INTO ledger (version) VALUES ('{version}')"),
                "duplicate key value violates unique constraint",
            ));
        }
        Ok(())
    }

    async fn remove_version(&mut self, version: u64) -> Result<()> {
        self.working.ledger.remove(&version);
        Ok(())
    }

    async fn save_declaration(&mut self, declaration: &TriggerDeclaration) -> Result<()> {
        self.working
            .registry
            .insert(declaration.name.clone(), declaration.clone());
        Ok(())
    }

    async fn delete_declaration(&mut self, name: &str) -> Result<()> {
        self.working.registry.remove(name);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { db, working, .. } = *self;
        *db.state.lock() = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        if self.failures.iter().any(|p| "ROLLBACK".contains(p.as_str())) {
            return Err(Error::execution("ROLLBACK", "injected failure"));
        }
        Ok(())
    }
}
