//! Plain-text rendering of a [`MigrationDiff`] for review before applying.

use crate::comparator::MigrationDiff;
use std::fmt::Write;
use trigwarden_core::{DiffEntry, DiffStatus, ObjectKind};

/// One line: `3 new, 1 modified, 2 unchanged, 1 drop`.
pub fn summary(diff: &MigrationDiff) -> String {
    if !diff.has_differences && diff.drops.is_empty() {
        return "no differences".to_string();
    }
    format!(
        "{} new, {} modified, {} unchanged, {} drop{}",
        diff.count(DiffStatus::New),
        diff.count(DiffStatus::Modified),
        diff.count(DiffStatus::Unchanged),
        diff.drops.len(),
        if diff.drops.len() == 1 { "" } else { "s" }
    )
}

pub fn format(diff: &MigrationDiff) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Migration {}_{} ({})",
        diff.version, diff.name, diff.direction
    );
    let _ = writeln!(out, "{}", "─".repeat(50));

    section(&mut out, "Functions", &diff.functions);
    section(&mut out, "Triggers", &diff.triggers);

    if !diff.drops.is_empty() {
        let _ = writeln!(out, "Drops:");
        for drop in &diff.drops {
            let target = match (drop.kind, &drop.table) {
                (ObjectKind::Trigger, Some(table)) => format!("{} ON {}", drop.name, table),
                _ => drop.name.clone(),
            };
            let _ = writeln!(out, "  - {} {}", drop.kind, target);
        }
    }

    let _ = writeln!(out, "{}", "─".repeat(50));
    let _ = write!(out, "Summary: {}", summary(diff));
    out
}

fn section(out: &mut String, title: &str, entries: &[DiffEntry]) {
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(out, "{title}:");
    for entry in entries {
        let marker = match entry.status {
            DiffStatus::New => '+',
            DiffStatus::Modified => '~',
            DiffStatus::Unchanged => '=',
        };
        let _ = writeln!(out, "  {marker} {} [{}]", entry.identity, entry.status);
        for difference in &entry.differences {
            let _ = writeln!(out, "      {difference}");
        }
    }
}
