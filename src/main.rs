//! Lamad Curriculum CLI
//!
//! ## Usage
//!
//! ```bash
//! # First generation or wholesale replacement
//! lamad-curriculum reconcile --user alice --intent replace --file roadmap.json
//!
//! # Append modules, with a snapshot and automatic restore on failure
//! lamad-curriculum reconcile --user alice --intent add --file extra.json --guarded
//!
//! # Inspect
//! lamad-curriculum show --user alice
//! lamad-curriculum stats --user alice --weekly-hours 6
//!
//! # Backups
//! lamad-curriculum snapshot --user alice
//! lamad-curriculum backups --user alice
//! lamad-curriculum restore --user alice --backup <backup-id>
//!
//! # Progress
//! lamad-curriculum progress --user alice --module <module-id> --percent 100
//! ```
//!
//! Every command prints camelCase JSON on stdout; logs go to stderr.

use clap::{Parser, Subcommand};
use lamad_curriculum::services::spawn_logging_listener;
use lamad_curriculum::views::{
    ActiveCurriculumView, BackupView, GuardedReconciliationView, ReconciliationView, RestoreView,
    SnapshotView, StatsView,
};
use lamad_curriculum::{Config, CurriculumDb, CurriculumDraft, Intent, Services};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lamad-curriculum")]
#[command(about = "Reconcile generated curricula into persisted learning paths")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "LAMAD_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "LAMAD_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Study hours per week for completion estimates
    #[arg(long, env = "LAMAD_WEEKLY_HOURS")]
    weekly_hours: Option<f64>,

    /// Skip snapshots before guarded reconciliations
    #[arg(long)]
    no_backup: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge a curriculum JSON file into the user's active path
    Reconcile {
        #[arg(long)]
        user: String,
        /// add | replace
        #[arg(long)]
        intent: Intent,
        /// Curriculum JSON (object with a module list, or a bare array)
        #[arg(long)]
        file: PathBuf,
        /// Snapshot first and restore if the reconciliation fails
        #[arg(long)]
        guarded: bool,
    },
    /// Take a backup of the active curriculum
    Snapshot {
        #[arg(long)]
        user: String,
    },
    /// List backups, newest first
    Backups {
        #[arg(long)]
        user: String,
    },
    /// Restore a backup through a full replacement
    Restore {
        #[arg(long)]
        user: String,
        #[arg(long)]
        backup: String,
    },
    /// Progress rollup for the active path
    Stats {
        #[arg(long)]
        user: String,
    },
    /// Print the active curriculum
    Show {
        #[arg(long)]
        user: String,
    },
    /// Record a completion percentage for a module
    Progress {
        #[arg(long)]
        user: String,
        #[arg(long)]
        module: String,
        #[arg(long)]
        percent: i64,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("lamad_curriculum=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(hours) = args.weekly_hours {
        config.weekly_hours = hours;
    }
    if args.no_backup {
        config.backups_enabled = false;
    }
    config.validate()?;

    info!(
        storage_dir = %config.storage_dir.display(),
        weekly_hours = config.weekly_hours,
        backups_enabled = config.backups_enabled,
        "Starting lamad-curriculum"
    );

    // Ensure storage directory exists
    tokio::fs::create_dir_all(&config.storage_dir).await?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(CurriculumDb::open(&config.database_path())?);
    let services = Services::new(db, &config);
    let listener = spawn_logging_listener(Arc::clone(&services.events));
    let curriculum = &services.curriculum;

    match args.command {
        Command::Reconcile { user, intent, file, guarded } => {
            let json = tokio::fs::read_to_string(&file).await?;
            let target = CurriculumDraft::from_json_str(&json)?;
            info!(user_id = %user, intent = %intent, modules = target.modules.len(), "Loaded target curriculum");

            if guarded {
                let outcome = curriculum.guarded_reconcile(&user, &target, intent)?;
                print_json(&GuardedReconciliationView::from(outcome))?;
            } else {
                let result = curriculum.reconcile(&user, &target, intent)?;
                print_json(&ReconciliationView::from(result))?;
            }
        }
        Command::Snapshot { user } => {
            print_json(&SnapshotView::from(curriculum.snapshot(&user)))?;
        }
        Command::Backups { user } => {
            let backups: Vec<BackupView> = curriculum
                .list_backups(&user)?
                .into_iter()
                .map(BackupView::from)
                .collect();
            print_json(&backups)?;
        }
        Command::Restore { user, backup } => {
            print_json(&RestoreView::from(curriculum.restore(&user, &backup)))?;
        }
        Command::Stats { user } => {
            print_json(&StatsView::from(curriculum.get_stats(&user)?))?;
        }
        Command::Show { user } => {
            let view = curriculum.active_curriculum(&user)?.map(ActiveCurriculumView::from);
            print_json(&view)?;
        }
        Command::Progress { user, module, percent } => {
            let row = curriculum.record_progress(&user, &module, percent)?;
            print_json(&serde_json::json!({
                "moduleId": row.module_id,
                "progressPercentage": row.progress_percentage,
                "isCompleted": row.is_completed,
                "completionDate": row.completion_date,
            }))?;
        }
    }

    // Dropping the services closes the bus; the listener drains and exits
    drop(services);
    listener.await?;

    Ok(())
}
