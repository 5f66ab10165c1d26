use crate::sql::render;
use crate::types::{Source, Timing, TriggerDeclaration};
use serde::{Deserialize, Serialize};

/// Structured form of a declared trigger: what a trigger definition block
/// evaluates to before it is registered or turned into DDL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub name: String,
    pub table: String,
    pub timing: Timing,
    pub events: Vec<String>,
    pub function_name: String,
    pub function_body: String,
    pub condition: Option<String>,
    pub version: u32,
    pub environment: Option<String>,
    pub enabled: bool,
}

impl TriggerDefinition {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            function_name: format!("{name}_fn"),
            name,
            table: table.into(),
            timing: Timing::After,
            events: vec!["INSERT".to_string()],
            function_body: String::new(),
            condition: None,
            version: 1,
            environment: None,
            enabled: true,
        }
    }

    pub fn timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn on<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.events = events
            .into_iter()
            .map(|e| e.as_ref().trim().to_uppercase())
            .collect();
        self
    }

    pub fn function(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.function_name = name.into();
        self.function_body = body.into();
        self
    }

    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Builds the registry row for this definition with a fresh checksum.
    pub fn declaration(&self, source: Source) -> TriggerDeclaration {
        let mut declaration = TriggerDeclaration {
            name: self.name.clone(),
            table: self.table.clone(),
            version: self.version,
            enabled: self.enabled,
            checksum: String::new(),
            source,
            environment: self.environment.clone(),
            function_name: self.function_name.clone(),
            function_body: Some(self.function_body.clone()),
            events: self.events.clone(),
            condition: self.condition.clone(),
            timing: self.timing,
            installed_at: None,
            last_verified_at: None,
            last_executed_at: None,
        };
        declaration.refresh_checksum();
        declaration
    }

    pub fn up_statements(&self) -> Vec<String> {
        vec![
            render::create_function(&self.function_name, &self.function_body),
            render::create_trigger(
                &self.name,
                &self.table,
                self.timing,
                &self.events,
                self.condition.as_deref(),
                &self.function_name,
            ),
        ]
    }

    pub fn down_statements(&self) -> Vec<String> {
        vec![
            render::drop_trigger(&self.name, &self.table),
            render::drop_function(&self.function_name),
        ]
    }
}

impl From<&TriggerDeclaration> for TriggerDefinition {
    fn from(declaration: &TriggerDeclaration) -> Self {
        Self {
            name: declaration.name.clone(),
            table: declaration.table.clone(),
            timing: declaration.timing,
            events: declaration.events.clone(),
            function_name: declaration.function_name.clone(),
            function_body: declaration.function_body.clone().unwrap_or_default(),
            condition: declaration.condition.clone(),
            version: declaration.version,
            environment: declaration.environment.clone(),
            enabled: declaration.enabled,
        }
    }
}
