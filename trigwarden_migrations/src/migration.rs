use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use trigwarden_core::sql::split_statements;
use trigwarden_core::{
    Direction, Error, Result, Source, StatementSink, TriggerDeclaration, TriggerDefinition,
};

/// A versioned, reversible unit of trigger DDL.
///
/// Procedures only see a [`StatementSink`], so the same unit can be captured
/// for validation and executed for real.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Timestamp-derived version, unique within a [`MigrationSet`].
    fn version(&self) -> u64;

    fn name(&self) -> &str;

    async fn up(&self, sink: &mut dyn StatementSink) -> Result<()>;

    async fn down(&self, sink: &mut dyn StatementSink) -> Result<()>;

    /// Declarations the runner saves to the registry alongside the ledger row
    /// when this unit is applied.
    fn declarations(&self) -> Vec<TriggerDeclaration> {
        Vec::new()
    }

    async fn run(&self, direction: Direction, sink: &mut dyn StatementSink) -> Result<()> {
        match direction {
            Direction::Up => self.up(sink).await,
            Direction::Down => self.down(sink).await,
        }
    }
}

impl fmt::Debug for dyn Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.version(), self.name())
    }
}

/// Self-registration of compiled-in migrations.
///
/// ```ignore
/// trigwarden_migrations::register_migration!(AuditUsers);
/// ```
pub struct MigrationRegistration {
    pub build: fn() -> Box<dyn Migration>,
}

impl MigrationRegistration {
    pub const fn new(build: fn() -> Box<dyn Migration>) -> Self {
        Self { build }
    }
}

inventory::collect!(MigrationRegistration);

#[macro_export]
macro_rules! register_migration {
    ($migration:expr) => {
        $crate::inventory::submit! {
            $crate::migration::MigrationRegistration::new(|| ::std::boxed::Box::new($migration))
        }
    };
}

/// Installs a fixed set of trigger definitions on up and removes them on down.
#[derive(Debug, Clone)]
pub struct DefinitionMigration {
    version: u64,
    name: String,
    definitions: Vec<TriggerDefinition>,
}

impl DefinitionMigration {
    pub fn new(version: u64, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            definitions: Vec::new(),
        }
    }

    pub fn with(mut self, definition: TriggerDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn definitions(&self) -> &[TriggerDefinition] {
        &self.definitions
    }
}

#[async_trait]
impl Migration for DefinitionMigration {
    fn version(&self) -> u64 {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, sink: &mut dyn StatementSink) -> Result<()> {
        for definition in &self.definitions {
            for statement in definition.up_statements() {
                sink.execute(&statement).await?;
            }
        }
        Ok(())
    }

    async fn down(&self, sink: &mut dyn StatementSink) -> Result<()> {
        for definition in self.definitions.iter().rev() {
            for statement in definition.down_statements() {
                sink.execute(&statement).await?;
            }
        }
        Ok(())
    }

    fn declarations(&self) -> Vec<TriggerDeclaration> {
        self.definitions
            .iter()
            .map(|d| d.declaration(Source::Generated))
            .collect()
    }
}

/// A migration read from `<version>_<name>.sql`, with `-- up` and `-- down`
/// sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFileMigration {
    version: u64,
    name: String,
    path: PathBuf,
    up: Vec<String>,
    down: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Up,
    Down,
}

impl SqlFileMigration {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (version, name) = MigrationSet::parse_file_name(path)?;
        let source = std::fs::read_to_string(path)?;
        Self::parse(version, name, path, &source)
    }

    pub fn parse(version: u64, name: String, path: &Path, source: &str) -> Result<Self> {
        let mut up = String::new();
        let mut down = String::new();
        let mut section = Section::Preamble;
        let mut seen_up = false;

        for line in source.lines() {
            match section_marker(line) {
                Some(Section::Up) => {
                    section = Section::Up;
                    seen_up = true;
                    continue;
                }
                Some(marker) => {
                    section = marker;
                    continue;
                }
                None => {}
            }
            let target = match section {
                Section::Preamble => continue,
                Section::Up => &mut up,
                Section::Down => &mut down,
            };
            target.push_str(line);
            target.push('\n');
        }

        if !seen_up {
            return Err(Error::InvalidMigrationFile {
                path: path.display().to_string(),
                reason: "missing '-- up' section".to_string(),
            });
        }

        Ok(Self {
            version,
            name,
            path: path.to_path_buf(),
            up: split_statements(&up),
            down: split_statements(&down),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn statements(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }
}

fn section_marker(line: &str) -> Option<Section> {
    let marker = line.trim().strip_prefix("--")?.trim();
    if marker.eq_ignore_ascii_case("up") {
        Some(Section::Up)
    } else if marker.eq_ignore_ascii_case("down") {
        Some(Section::Down)
    } else {
        None
    }
}

#[async_trait]
impl Migration for SqlFileMigration {
    fn version(&self) -> u64 {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, sink: &mut dyn StatementSink) -> Result<()> {
        for statement in &self.up {
            sink.execute(statement).await?;
        }
        Ok(())
    }

    async fn down(&self, sink: &mut dyn StatementSink) -> Result<()> {
        for statement in &self.down {
            sink.execute(statement).await?;
        }
        Ok(())
    }
}

/// Version-keyed collection of migration units.
#[derive(Default, Clone)]
pub struct MigrationSet {
    units: BTreeMap<u64, Arc<dyn Migration>>,
}

impl fmt::Debug for MigrationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.units.values()).finish()
    }
}

impl MigrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every migration submitted with [`register_migration!`].
    pub fn from_registry() -> Result<Self> {
        let mut set = Self::new();
        for registration in inventory::iter::<MigrationRegistration>() {
            set.register_boxed((registration.build)())?;
        }
        Ok(set)
    }

    /// Compiled-in migrations plus the SQL files in `dir`.
    pub fn discover(dir: impl AsRef<Path>) -> Result<Self> {
        let mut set = Self::from_registry()?;
        set.load_dir(dir)?;
        Ok(set)
    }

    pub fn register<M: Migration + 'static>(&mut self, migration: M) -> Result<()> {
        self.insert(Arc::new(migration))
    }

    pub fn register_boxed(&mut self, migration: Box<dyn Migration>) -> Result<()> {
        self.insert(Arc::from(migration))
    }

    fn insert(&mut self, migration: Arc<dyn Migration>) -> Result<()> {
        let version = migration.version();
        if let Some(existing) = self.units.get(&version) {
            return Err(Error::DuplicateVersion {
                version,
                first: existing.name().to_string(),
                second: migration.name().to_string(),
            });
        }
        self.units.insert(version, migration);
        Ok(())
    }

    /// Loads every `*.sql` file in `dir`. A missing directory adds nothing.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "migration directory not found");
            return Ok(0);
        }

        let mut paths = std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        paths.retain(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "sql"));
        paths.sort();

        for path in &paths {
            self.register(SqlFileMigration::load(path)?)?;
        }
        debug!(dir = %dir.display(), count = paths.len(), "loaded sql migrations");
        Ok(paths.len())
    }

    pub fn get(&self, version: u64) -> Option<Arc<dyn Migration>> {
        self.units.get(&version).cloned()
    }

    pub fn contains(&self, version: u64) -> bool {
        self.units.contains_key(&version)
    }

    pub fn versions(&self) -> impl Iterator<Item = u64> + '_ {
        self.units.keys().copied()
    }

    /// Units in ascending version order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Migration>> {
        self.units.values()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get_file_stem(path: &str) -> &str {
        std::path::Path::new(path)
            .file_stem()
            .and_then(|f| f.to_str())
            .unwrap_or(path)
    }

    /// Splits `20240101120000_audit_users.sql` into its version and name.
    pub fn parse_file_name(path: impl AsRef<Path>) -> Result<(u64, String)> {
        let path = path.as_ref();
        let stem = Self::get_file_stem(&path.to_string_lossy()).to_string();
        let invalid = || Error::InvalidMigrationName(stem.clone());

        let (digits, name) = stem.split_once('_').ok_or_else(invalid)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || name.is_empty() {
            return Err(invalid());
        }
        let version = digits.parse::<u64>().map_err(|_| invalid())?;
        Ok((version, name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_get_file_stem() {
        let pair = vec![
            ("20240101000001_audit_users.sql", "20240101000001_audit_users"),
            ("db/triggers/20240101000001_audit_users.sql", "20240101000001_audit_users"),
            (
                "/srv/app/db/triggers/20240101000001_audit_users.tmp.sql",
                "20240101000001_audit_users.tmp",
            ),
        ];
        for (path, expect) in pair {
            assert_eq!(MigrationSet::get_file_stem(path), expect);
        }
    }

    #[test]
    fn test_parse_file_name() {
        let (version, name) =
            MigrationSet::parse_file_name("db/triggers/20240101000001_audit_users.sql").unwrap();
        assert_eq!(version, 20240101000001);
        assert_eq!(name, "audit_users");

        for bad in ["audit_users.sql", "2024_.sql", "v1_audit.sql", "20240101.sql"] {
            assert!(matches!(
                MigrationSet::parse_file_name(bad),
                Err(Error::InvalidMigrationName(_))
            ));
        }
    }

    #[test]
    fn test_parse_sections() {
        let source = "-- Migration: audit_users\n\n-- up\n\
            CREATE OR REPLACE FUNCTION audit_fn() RETURNS trigger AS $$ BEGIN RETURN NEW; END; $$ LANGUAGE plpgsql;\n\
            CREATE TRIGGER audit AFTER INSERT ON users FOR EACH ROW EXECUTE FUNCTION audit_fn();\n\
            \n-- down\nDROP TRIGGER IF EXISTS audit ON users;\nDROP FUNCTION IF EXISTS audit_fn();\n";
        let path = Path::new("1_audit_users.sql");
        let unit = SqlFileMigration::parse(1, "audit_users".into(), path, source).unwrap();

        assert_eq!(unit.statements(Direction::Up).len(), 2);
        assert!(unit.statements(Direction::Up)[0].contains("RETURN NEW; END;"));
        assert_eq!(
            unit.statements(Direction::Down),
            &[
                "DROP TRIGGER IF EXISTS audit ON users".to_string(),
                "DROP FUNCTION IF EXISTS audit_fn()".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_up_section_is_rejected() {
        let err =
            SqlFileMigration::parse(1, "x".into(), Path::new("1_x.sql"), "SELECT 1;").unwrap_err();
        assert!(matches!(err, Error::InvalidMigrationFile { .. }));
    }

    #[test]
    fn test_duplicate_versions_are_rejected() {
        let mut set = MigrationSet::new();
        set.register(DefinitionMigration::new(7, "first")).unwrap();
        let err = set.register(DefinitionMigration::new(7, "second")).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateVersion { version: 7, ref first, ref second }
                if first == "first" && second == "second"
        ));
    }
}
