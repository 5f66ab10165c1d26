//! Content checksums for trigger declarations.
//!
//! Both the registry side and the catalog side of drift detection feed the
//! same [`ChecksumInput`] shape into [`compute`], so a declaration that matches
//! its installed object always hashes identically.

use crate::types::Timing;
use sha2::{Digest, Sha256};

const SEPARATOR: [u8; 1] = [0x1f];

#[derive(Debug, Clone, Copy)]
pub struct ChecksumInput<'a> {
    pub name: &'a str,
    pub table: &'a str,
    pub version: u32,
    pub function_body: Option<&'a str>,
    pub condition: Option<&'a str>,
    pub timing: Timing,
}

/// Hex-encoded SHA-256 over `name, table, version, function_body, condition, timing`.
pub fn compute(input: &ChecksumInput<'_>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.name.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(input.table.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(input.version.to_string().as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(input.function_body.unwrap_or_default().as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(input.condition.unwrap_or_default().as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(input.timing.as_ref().as_bytes());
    format!("{:x}", hasher.finalize())
}
