use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use launchtree_lib::backup::{self, ExportOptions};
use launchtree_lib::NodeStore;

const APP_ID: &str = "com.launchtree.desktop";
const DB_FILE_NAME: &str = "launchtree.sqlite3";
const PREFS_FILE_NAME: &str = "prefs.json";

#[derive(Debug, Parser)]
#[command(name = "launchtree", about = "Launchtree store maintenance", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance and inspection commands.
    #[command(subcommand)]
    Db(DbCommand),
    /// Backup archive export and restore.
    #[command(subcommand)]
    Backup(BackupCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Run the SQLite integrity check and report its status.
    Status {
        /// Emit a machine-readable JSON object instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Run VACUUM to compact the database.
    Vacuum,
}

#[derive(Debug, Subcommand)]
enum BackupCommand {
    /// Create a backup archive of the store and preferences.
    Export {
        /// Directory to place the archive in (defaults to the data dir).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Emit a machine-readable JSON object with the archive details.
        #[arg(long)]
        json: bool,
    },
    /// Restore a backup archive over the live store. Requires a restart.
    Import {
        /// Path to a `.backup.*.zip` archive.
        archive: PathBuf,
    },
}

fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LAUNCHTREE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("launchtree")
}

fn main() {
    launchtree_lib::init_logging();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn run(command: Commands) -> Result<i32> {
    let runtime = tokio::runtime::Runtime::new().context("start async runtime")?;
    runtime.block_on(async {
        match command {
            Commands::Db(db) => handle_db_command(db).await,
            Commands::Backup(cmd) => handle_backup_command(cmd).await,
        }
    })
}

async fn handle_db_command(command: DbCommand) -> Result<i32> {
    let db_path = data_dir().join(DB_FILE_NAME);
    match command {
        DbCommand::Status { json } => {
            let store = NodeStore::open(&db_path).await.context("open store")?;
            let result: String = sqlx::query_scalar("PRAGMA quick_check;")
                .fetch_one(store.pool())
                .await
                .context("run quick_check")?;
            store.close().await;

            let healthy = result.eq_ignore_ascii_case("ok");
            if json {
                println!(
                    "{}",
                    json!({ "status": if healthy { "ok" } else { "error" }, "detail": result })
                );
            } else if healthy {
                println!("Database OK: {}", db_path.display());
            } else {
                println!("Database check failed: {result}");
            }
            Ok(if healthy { 0 } else { 1 })
        }
        DbCommand::Vacuum => {
            let store = NodeStore::open(&db_path).await.context("open store")?;
            sqlx::query("VACUUM;")
                .execute(store.pool())
                .await
                .context("vacuum database")?;
            store.close().await;
            println!("Database vacuum completed.");
            Ok(0)
        }
    }
}

async fn handle_backup_command(command: BackupCommand) -> Result<i32> {
    let dir = data_dir();
    let db_path = dir.join(DB_FILE_NAME);
    let prefs_path = dir.join(PREFS_FILE_NAME);

    match command {
        BackupCommand::Export { out, json } => {
            let store = NodeStore::open(&db_path).await.context("open store")?;
            let opts = ExportOptions {
                out_dir: out.unwrap_or_else(|| dir.join("backups")),
                app_id: APP_ID.to_string(),
            };
            let entry = backup::export_backup(store.pool(), &db_path, &prefs_path, &opts)
                .await
                .context("export backup")?;
            store.close().await;

            if json {
                println!(
                    "{}",
                    json!({
                        "zipPath": entry.zip_path.display().to_string(),
                        "appId": entry.metadata.app_id,
                        "appVersion": entry.metadata.app_version,
                        "createdAt": entry.metadata.created_at,
                    })
                );
            } else {
                println!("Backup written to {}", entry.zip_path.display());
            }
            Ok(0)
        }
        BackupCommand::Import { archive } => {
            let report =
                backup::import_backup(&db_path, &prefs_path, &archive).context("import backup")?;
            println!(
                "Restored entries: {}. Restart the application before using the store.",
                report.replaced.join(", ")
            );
            Ok(0)
        }
    }
}
