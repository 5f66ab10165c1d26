//! Recognition of the narrow statement shapes trigger migrations issue.
//!
//! This is not a SQL parser. Four shapes are recognized, tried in order:
//!
//! 1. `DROP TRIGGER [IF EXISTS] <name> ON <table>`
//! 2. `DROP FUNCTION [IF EXISTS] <name>(...)`
//! 3. `CREATE [OR REPLACE] FUNCTION <name>(...) ... AS <body>`
//! 4. `CREATE TRIGGER <name> {BEFORE|AFTER} <events> ON <table> FOR EACH ROW
//!    [WHEN (<condition>)] EXECUTE {FUNCTION|PROCEDURE} <fn>()`
//!
//! Anything else classifies to `None`. Classification never fails.

pub mod render;
pub mod split;

pub use split::split_statements;

use crate::types::{ObjectKind, Timing};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

static DROP_TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)^\s*DROP\s+TRIGGER\s+(?P<if_exists>IF\s+EXISTS\s+)?(?P<name>[\w."]+)\s+ON\s+(?P<table>[\w."]+)"#,
    )
    .expect("valid DROP TRIGGER pattern")
});

static DROP_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^\s*DROP\s+FUNCTION\s+(?P<if_exists>IF\s+EXISTS\s+)?(?P<name>[\w."]+)"#)
        .expect("valid DROP FUNCTION pattern")
});

static CREATE_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)^\s*CREATE\s+(?P<replace>OR\s+REPLACE\s+)?FUNCTION\s+(?P<name>[\w."]+)\s*\("#,
    )
    .expect("valid CREATE FUNCTION pattern")
});

static CREATE_TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)^\s*CREATE\s+TRIGGER\s+(?P<name>[\w."]+)\s+(?P<timing>BEFORE|AFTER)\s+(?P<events>.+?)\s+ON\s+(?P<table>[\w."]+)\s+FOR\s+EACH\s+ROW\s*(?:WHEN\s*\((?P<condition>.*)\)\s*)?EXECUTE\s+(?:FUNCTION|PROCEDURE)\s+(?P<function>[\w."]+)\s*\("#,
    )
    .expect("valid CREATE TRIGGER pattern")
});

static EVENT_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+OR\s+").expect("valid event separator pattern"));

static AS_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bAS\s+(?P<body>.*)$").expect("valid AS pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionOperation {
    pub name: String,
    pub body: String,
    pub statement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerOperation {
    pub name: String,
    pub table: String,
    pub timing: Timing,
    pub events: Vec<String>,
    pub condition: Option<String>,
    pub function: String,
    pub statement: String,
}

impl TriggerOperation {
    pub fn sorted_events(&self) -> Vec<String> {
        let mut events = self.events.clone();
        events.sort();
        events
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropOperation {
    pub kind: ObjectKind,
    pub name: String,
    pub table: Option<String>,
    pub if_exists: bool,
    pub statement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifiedOperation {
    FunctionCreate(FunctionOperation),
    FunctionReplace(FunctionOperation),
    TriggerCreate(TriggerOperation),
    Drop(DropOperation),
}

impl ClassifiedOperation {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ClassifiedOperation::FunctionCreate(_) | ClassifiedOperation::FunctionReplace(_) => {
                ObjectKind::Function
            }
            ClassifiedOperation::TriggerCreate(_) => ObjectKind::Trigger,
            ClassifiedOperation::Drop(d) => d.kind,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ClassifiedOperation::FunctionCreate(f) | ClassifiedOperation::FunctionReplace(f) => {
                &f.name
            }
            ClassifiedOperation::TriggerCreate(t) => &t.name,
            ClassifiedOperation::Drop(d) => &d.name,
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            ClassifiedOperation::TriggerCreate(t) => Some(&t.table),
            ClassifiedOperation::Drop(d) => d.table.as_deref(),
            _ => None,
        }
    }

    pub fn statement(&self) -> &str {
        match self {
            ClassifiedOperation::FunctionCreate(f) | ClassifiedOperation::FunctionReplace(f) => {
                &f.statement
            }
            ClassifiedOperation::TriggerCreate(t) => &t.statement,
            ClassifiedOperation::Drop(d) => &d.statement,
        }
    }
}

/// Classifies a single statement. Returns `None` for anything unrecognized.
pub fn classify(statement: &str) -> Option<ClassifiedOperation> {
    if let Some(caps) = DROP_TRIGGER.captures(statement) {
        return Some(ClassifiedOperation::Drop(DropOperation {
            kind: ObjectKind::Trigger,
            name: ident(&caps["name"]),
            table: Some(ident(&caps["table"])),
            if_exists: caps.name("if_exists").is_some(),
            statement: statement.to_string(),
        }));
    }

    if let Some(caps) = DROP_FUNCTION.captures(statement) {
        return Some(ClassifiedOperation::Drop(DropOperation {
            kind: ObjectKind::Function,
            name: ident(&caps["name"]),
            table: None,
            if_exists: caps.name("if_exists").is_some(),
            statement: statement.to_string(),
        }));
    }

    if let Some(caps) = CREATE_FUNCTION.captures(statement) {
        let function = FunctionOperation {
            name: ident(&caps["name"]),
            body: extract_body(statement),
            statement: statement.to_string(),
        };
        return Some(if caps.name("replace").is_some() {
            ClassifiedOperation::FunctionReplace(function)
        } else {
            ClassifiedOperation::FunctionCreate(function)
        });
    }

    if let Some(caps) = CREATE_TRIGGER.captures(statement) {
        let timing = Timing::from_str(&caps["timing"]).ok()?;
        return Some(ClassifiedOperation::TriggerCreate(TriggerOperation {
            name: ident(&caps["name"]),
            table: ident(&caps["table"]),
            timing,
            events: parse_events(&caps["events"]),
            condition: caps
                .name("condition")
                .map(|c| c.as_str().trim().to_string())
                .filter(|c| !c.is_empty()),
            function: ident(&caps["function"]),
            statement: statement.to_string(),
        }));
    }

    None
}

/// Function body: text between the first pair of `$$`, else the text after
/// `AS`, else the whole statement.
pub fn extract_body(statement: &str) -> String {
    if let Some(start) = statement.find("$$") {
        let rest = &statement[start + 2..];
        if let Some(end) = rest.find("$$") {
            return rest[..end].to_string();
        }
    }
    if let Some(caps) = AS_BODY.captures(statement) {
        return caps["body"].trim().to_string();
    }
    statement.to_string()
}

/// Unqualified, unquoted identifier. Unquoted names fold to lowercase the way
/// PostgreSQL folds them.
pub fn ident(raw: &str) -> String {
    let last = raw.rsplit('.').next().unwrap_or(raw).trim();
    if last.len() >= 2 && last.starts_with('"') && last.ends_with('"') {
        last[1..last.len() - 1].to_string()
    } else {
        last.trim_matches('"').to_lowercase()
    }
}

fn parse_events(raw: &str) -> Vec<String> {
    EVENT_SEPARATOR
        .split(raw.trim())
        .filter(|e| !e.trim().is_empty())
        .map(|event| {
            let event = event.split_whitespace().collect::<Vec<_>>().join(" ");
            match event.split_once(' ') {
                Some((keyword, rest)) => format!("{} {}", keyword.to_uppercase(), rest),
                None => event.to_uppercase(),
            }
        })
        .collect()
}

/// Canonical form of a WHEN condition: whitespace collapsed, redundant outer
/// parentheses removed. Case is preserved.
pub fn normalize_condition(condition: &str) -> String {
    let mut current = condition.split_whitespace().collect::<Vec<_>>().join(" ");
    while current.starts_with('(') && current.ends_with(')') && wraps_whole(&current) {
        current = current[1..current.len() - 1].trim().to_string();
    }
    current
}

fn wraps_whole(s: &str) -> bool {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != s.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// A migration's statements, classified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSet {
    pub operations: Vec<ClassifiedOperation>,
}

impl OperationSet {
    pub fn classify_all<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            operations: statements
                .into_iter()
                .filter_map(|s| classify(s.as_ref()))
                .collect(),
        }
    }

    pub fn drops(&self) -> impl Iterator<Item = &DropOperation> {
        self.operations.iter().filter_map(|op| match op {
            ClassifiedOperation::Drop(d) => Some(d),
            _ => None,
        })
    }

    /// Creates that do not replace: `CREATE FUNCTION` and `CREATE TRIGGER`.
    pub fn creates(&self) -> impl Iterator<Item = &ClassifiedOperation> {
        self.operations.iter().filter(|op| {
            matches!(
                op,
                ClassifiedOperation::FunctionCreate(_) | ClassifiedOperation::TriggerCreate(_)
            )
        })
    }

    pub fn replaces(&self) -> impl Iterator<Item = &FunctionOperation> {
        self.operations.iter().filter_map(|op| match op {
            ClassifiedOperation::FunctionReplace(f) => Some(f),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionOperation> {
        self.operations.iter().filter_map(|op| match op {
            ClassifiedOperation::FunctionCreate(f) | ClassifiedOperation::FunctionReplace(f) => {
                Some(f)
            }
            _ => None,
        })
    }

    pub fn triggers(&self) -> impl Iterator<Item = &TriggerOperation> {
        self.operations.iter().filter_map(|op| match op {
            ClassifiedOperation::TriggerCreate(t) => Some(t),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
