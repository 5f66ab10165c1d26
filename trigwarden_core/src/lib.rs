//! Core types for trigwarden: the trigger data model, content checksums,
//! statement classification and the catalog/sink capabilities the rest of the
//! workspace is written against.

pub mod catalog;
pub mod checksum;
pub mod definition;
pub mod error;
pub mod sql;
pub mod types;

pub use catalog::{Catalog, StatementSink};
pub use definition::TriggerDefinition;
pub use error::{Error, Result};
pub use types::*;
