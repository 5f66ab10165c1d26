//! DDL rendering for trigger definitions and declarations.
//!
//! Everything rendered here classifies back through [`super::classify`].

use crate::types::Timing;

pub fn create_function(name: &str, body: &str) -> String {
    format!(
        "CREATE OR REPLACE FUNCTION {name}() RETURNS trigger LANGUAGE plpgsql AS $${body}$$"
    )
}

pub fn create_trigger(
    name: &str,
    table: &str,
    timing: Timing,
    events: &[String],
    condition: Option<&str>,
    function: &str,
) -> String {
    let mut stmt = format!(
        "CREATE TRIGGER {name} {} {} ON {table} FOR EACH ROW",
        timing.keyword(),
        events.join(" OR ")
    );
    if let Some(condition) = condition {
        stmt.push_str(&format!(" WHEN ({condition})"));
    }
    stmt.push_str(&format!(" EXECUTE FUNCTION {function}()"));
    stmt
}

pub fn drop_trigger(name: &str, table: &str) -> String {
    format!("DROP TRIGGER IF EXISTS {name} ON {table}")
}

pub fn drop_function(name: &str) -> String {
    format!("DROP FUNCTION IF EXISTS {name}()")
}

pub fn set_trigger_enabled(name: &str, table: &str, enabled: bool) -> String {
    let verb = if enabled { "ENABLE" } else { "DISABLE" };
    format!("ALTER TABLE {table} {verb} TRIGGER {name}")
}
