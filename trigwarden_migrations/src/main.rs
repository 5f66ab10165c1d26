use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;
use trigwarden::drift::DriftDetector;
use trigwarden::kill_switch::{KillSwitch, Operation};
use trigwarden::{Config, Database, PgDatabase};
use trigwarden_core::{DiffStatus, Direction, DriftState};
use trigwarden_migrations::{
    migration_file_name, migration_template, reporter, Comparator, MigrationRunner, MigrationSet,
    SafetyValidator,
};

#[derive(Parser)]
#[command(
    name = "trigwarden",
    about = "Versioned, drift-checked PostgreSQL trigger management",
    version,
    author
)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", help = "PostgreSQL connection URL")]
    database_url: Option<String>,

    #[arg(
        short,
        long,
        env = "TRIGWARDEN_CONFIG",
        help = "Configuration file",
        default_value = "trigwarden.toml"
    )]
    config: PathBuf,

    #[arg(
        short,
        long,
        env = "TRIGWARDEN_ENV",
        help = "Environment name, overrides the config file"
    )]
    environment: Option<String>,

    #[arg(
        short,
        long,
        env = "MIGRATIONS_DIR",
        help = "Migrations directory, overrides the config file"
    )]
    migrations_dir: Option<PathBuf>,

    #[arg(long, help = "Confirmation text for protected environments")]
    confirm: Option<String>,

    #[arg(long, env = "USER", default_value = "cli", help = "Actor recorded in audit logs")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show migration status
    Status,

    /// Apply pending migrations, or a single version
    Up {
        #[arg(short, long, help = "Apply only this version")]
        version: Option<u64>,
    },

    /// Revert the latest migration, or everything above a version
    Down {
        #[arg(short, long, help = "Revert every applied version above this one")]
        version: Option<u64>,
    },

    /// Check a migration for destructive drop/create pairs
    Validate {
        version: u64,
        #[arg(short, long, default_value = "up")]
        direction: Direction,
        #[arg(long, help = "Report violations without failing")]
        allow_unsafe: bool,
    },

    /// Compare what a migration would create with the database
    Diff {
        version: u64,
        #[arg(short, long, default_value = "up")]
        direction: Direction,
        #[arg(long)]
        json: bool,
    },

    /// Classify declared and live triggers by drift state
    Drift {
        name: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Create a new SQL migration file
    New {
        #[arg(help = "Name of the migration")]
        name: String,
    },
}

struct App {
    config: Config,
    migrations_dir: PathBuf,
    database_url: Option<String>,
}

impl App {
    async fn connect(&self) -> Result<Arc<dyn Database>> {
        let Some(url) = self.database_url.as_deref() else {
            bail!("Database URL is required, pass --database-url or set DATABASE_URL");
        };
        let db = PgDatabase::connect(url, &self.config.migrations)
            .await
            .context("Failed to connect to database")?;
        db.ensure_schema().await?;
        Ok(Arc::new(db))
    }

    async fn runner(&self) -> Result<MigrationRunner> {
        let migrations = MigrationSet::discover(&self.migrations_dir)?;
        Ok(MigrationRunner::new(
            self.connect().await?,
            migrations,
            &self.config.migrations,
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(environment) = cli.environment {
        config.environment = environment;
    }
    let app = App {
        migrations_dir: cli
            .migrations_dir
            .unwrap_or_else(|| config.migrations.directory.clone()),
        database_url: cli.database_url,
        config,
    };
    let kill_switch = KillSwitch::new(app.config.kill_switch.clone());

    match cli.command {
        Commands::Status => show_status(&app.runner().await?).await?,
        Commands::Up { version } => {
            kill_switch.check(
                Operation::MigrateUp,
                &app.config.environment,
                cli.confirm.as_deref(),
                &cli.actor,
            )?;
            let applied = app.runner().await?.run_up(version).await?;
            report_versions("Applied", &applied);
        }
        Commands::Down { version } => {
            kill_switch.check(
                Operation::MigrateDown,
                &app.config.environment,
                cli.confirm.as_deref(),
                &cli.actor,
            )?;
            let reverted = app.runner().await?.run_down(version).await?;
            report_versions("Reverted", &reverted);
        }
        Commands::Validate {
            version,
            direction,
            allow_unsafe,
        } => {
            let migrations = MigrationSet::discover(&app.migrations_dir)?;
            let unit = migrations
                .get(version)
                .ok_or(trigwarden_core::Error::MigrationNotFound(version))?;
            let violations = SafetyValidator::new(app.connect().await?)
                .validate(unit.as_ref(), direction, allow_unsafe)
                .await?;
            if violations.is_empty() {
                println!("{}", "No unsafe operations found".green());
            } else {
                println!(
                    "{}",
                    format!("{} unsafe operation(s) allowed:", violations.len()).yellow()
                );
                for v in violations {
                    println!("  - {} {}", v.kind, v.name);
                }
            }
        }
        Commands::Diff {
            version,
            direction,
            json,
        } => {
            let migrations = MigrationSet::discover(&app.migrations_dir)?;
            let unit = migrations
                .get(version)
                .ok_or(trigwarden_core::Error::MigrationNotFound(version))?;
            let diff = Comparator::new(app.connect().await?)
                .compare(unit.as_ref(), direction)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&diff)?);
            } else {
                println!("{}", reporter::format(&diff));
                if diff.count(DiffStatus::Modified) > 0 {
                    println!("{}", "Review modified objects before applying".yellow());
                }
            }
        }
        Commands::Drift { name, json } => {
            let detector = DriftDetector::new(app.connect().await?);
            let results = match name {
                Some(name) => vec![detector.detect(&name).await?],
                None => detector.detect_all().await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                show_drift(&results);
            }
        }
        Commands::New { name } => create_migration(&app.migrations_dir, &name)?,
    }

    Ok(())
}

fn create_migration(dir: &Path, name: &str) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let timestamp = OffsetDateTime::now_utc().unix_timestamp();
    let path = dir.join(migration_file_name(timestamp, name));
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    std::fs::write(&path, migration_template(name))?;
    println!("{} {}", "Created migration:".green(), path.display());
    Ok(())
}

fn report_versions(verb: &str, versions: &[u64]) {
    if versions.is_empty() {
        println!("{}", "Nothing to do".yellow());
        return;
    }
    for version in versions {
        println!("{} {}", format!("{verb}:").green(), version);
    }
}

async fn show_status(runner: &MigrationRunner) -> Result<()> {
    let status = runner.status().await?;
    if status.is_empty() {
        println!("{}", "No migrations found".yellow());
        return Ok(());
    }

    println!("\n{}", "Migration Status:".bold());
    println!("{}", "─".repeat(50).dimmed());
    for entry in status {
        let symbol = if entry.applied { "✓".green() } else { "✗".red() };
        println!(
            "{} {} {} ({})",
            symbol,
            entry.version,
            entry.name,
            if entry.applied { "applied" } else { "pending" }
        );
    }
    println!("{}", "─".repeat(50).dimmed());
    println!("Current version: {}", runner.current_version().await?);
    Ok(())
}

fn show_drift(results: &[trigwarden_core::DriftResult]) {
    for result in results {
        let state = match result.state {
            DriftState::InSync => result.state.to_string().green(),
            DriftState::Drifted | DriftState::Dropped => result.state.to_string().red(),
            DriftState::Unknown => result.state.to_string().yellow(),
            DriftState::Disabled | DriftState::ManualOverride => result.state.to_string().dimmed(),
        };
        println!("{:<16} {} - {}", state, result.name, result.details);
    }
    let summary = trigwarden::DriftSummary::from_results(results);
    let counts = summary
        .counts
        .iter()
        .map(|(state, count)| format!("{state}: {count}"))
        .collect::<Vec<_>>()
        .join(", ");
    println!("{}", "─".repeat(50).dimmed());
    println!("{} ({} total)", counts, summary.total);
}
