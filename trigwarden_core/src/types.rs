use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use time::OffsetDateTime;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Timing {
    Before,
    After,
}

impl Timing {
    pub fn keyword(&self) -> &'static str {
        match self {
            Timing::Before => "BEFORE",
            Timing::After => "AFTER",
        }
    }
}

/// Where a declaration came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Source {
    Declared,
    Generated,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ObjectKind {
    Function,
    Trigger,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Direction {
    Up,
    Down,
}

/// A registry row describing a trigger's intended shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDeclaration {
    pub name: String,
    pub table: String,
    pub version: u32,
    pub enabled: bool,
    pub checksum: String,
    pub source: Source,
    pub environment: Option<String>,
    pub function_name: String,
    pub function_body: Option<String>,
    pub events: Vec<String>,
    pub condition: Option<String>,
    pub timing: Timing,
    #[serde(with = "time::serde::rfc3339::option")]
    pub installed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_verified_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_executed_at: Option<OffsetDateTime>,
}

impl TriggerDeclaration {
    /// Recomputes the checksum from the stored content fields. Name and table
    /// are hashed in their catalog form so a declaration on `public.Users`
    /// matches the installed `users` trigger.
    pub fn computed_checksum(&self) -> String {
        crate::checksum::compute(&crate::checksum::ChecksumInput {
            name: &self.catalog_name(),
            table: &crate::sql::ident(&self.table),
            version: self.version,
            function_body: self.function_body.as_deref(),
            condition: self.condition.as_deref(),
            timing: self.timing,
        })
    }

    /// Trigger name as the catalog stores it.
    pub fn catalog_name(&self) -> String {
        crate::sql::ident(&self.name)
    }

    pub fn refresh_checksum(&mut self) {
        self.checksum = self.computed_checksum();
    }

    pub fn is_manual(&self) -> bool {
        self.source == Source::Manual
    }
}

/// A trigger as reported by the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogObject {
    pub trigger_name: String,
    pub table_name: String,
    pub function_name: String,
    pub trigger_definition: String,
    pub function_definition: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFunction {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiffStatus {
    New,
    Modified,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub kind: ObjectKind,
    pub identity: String,
    pub status: DiffStatus,
    pub expected_text: String,
    pub actual_text: Option<String>,
    pub differences: Vec<String>,
}

/// A destructive drop paired with a non-replacing create of an existing object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ObjectKind,
    pub name: String,
    pub table: Option<String>,
    pub drop_statement: String,
    pub create_statement: String,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DriftState {
    Disabled,
    ManualOverride,
    Dropped,
    Unknown,
    Drifted,
    InSync,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftResult {
    pub state: DriftState,
    pub name: String,
    pub declaration: Option<TriggerDeclaration>,
    pub catalog_object: Option<CatalogObject>,
    pub details: String,
}
