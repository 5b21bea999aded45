//! Whole-store backup archive: a zip bundling a checkpointed database
//! snapshot, the preference blob, structured metadata and a human-readable
//! README. Import swaps files under the live store and requires a process
//! restart before the store is used again.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::available_space;
use rusqlite::{backup::Backup, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tempfile::TempDir;
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db::sync_dir;
use crate::{AppError, AppResult};

pub const DATABASE_ENTRY: &str = "database";
pub const PREFERENCES_ENTRY: &str = "preferences";
pub const METADATA_ENTRY: &str = "metadata";
pub const README_ENTRY: &str = "README.html";

const PARTIAL_SUFFIX: &str = ".partial";
const REQUIRED_FREE_MULTIPLIER: f64 = 1.2;

const README_HTML: &str = "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Launchtree backup</title></head>\n<body>\n<h1>Launchtree backup</h1>\n<p>This archive contains a complete snapshot of your launcher layout:\nthe <code>database</code> entry holds every item and folder, and the\n<code>preferences</code> entry holds your settings. Restore it from the\napplication's backup screen; do not edit the entries by hand.</p>\n</body>\n</html>\n";

/// Structured record written to the `metadata` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub app_id: String,
    pub app_version: String,
    /// Generation time, seconds since the Unix epoch.
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub out_dir: PathBuf,
    pub app_id: String,
}

#[derive(Debug, Clone)]
pub struct BackupEntry {
    pub zip_path: PathBuf,
    pub metadata: BackupMetadata,
}

/// Which live files an import replaced. The process must restart before the
/// store or preference layer is touched again.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub replaced: Vec<String>,
    pub metadata: Option<BackupMetadata>,
}

/// Problems with the archive itself, distinct from plain I/O failures.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("archive has no `database` entry")]
    MissingDatabase,
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<BundleError> for AppError {
    fn from(error: BundleError) -> Self {
        match error {
            BundleError::MissingDatabase => {
                AppError::new("BACKUP/MISSING_DATABASE", error.to_string())
            }
            BundleError::Zip(err) => AppError::from(err).with_context("source", "backup_bundle"),
            BundleError::Io(err) => AppError::from(err).with_context("source", "backup_bundle"),
        }
    }
}

/// Export the whole store to `{yyyyMMdd-HHmmss}.backup.{app-id}.zip` under
/// `opts.out_dir`. The snapshot is checkpointed first so the archive never
/// captures a torn WAL state.
pub async fn export_backup(
    pool: &SqlitePool,
    db_path: &Path,
    prefs_path: &Path,
    opts: &ExportOptions,
) -> AppResult<BackupEntry> {
    sqlx::query("PRAGMA wal_checkpoint(TRUNCATE);")
        .execute(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "wal_checkpoint"))?;

    fs::create_dir_all(&opts.out_dir).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_backup_dir")
            .with_context("path", opts.out_dir.display().to_string())
    })?;

    let db_size = fs::metadata(db_path).map(|meta| meta.len()).unwrap_or(0);
    let required = ((db_size as f64 * REQUIRED_FREE_MULTIPLIER).ceil()) as u64;
    let available = free_disk_space(&opts.out_dir)?;
    if available < required {
        return Err(AppError::new(
            "BACKUP/LOW_DISK",
            "Not enough disk space for a backup archive",
        )
        .with_context("available_bytes", available.to_string())
        .with_context("required_bytes", required.to_string()));
    }

    let staging = TempDir::new_in(&opts.out_dir)
        .map_err(|err| AppError::from(err).with_context("operation", "backup_staging_dir"))?;
    let snapshot_path = staging.path().join(DATABASE_ENTRY);
    run_sqlite_backup(db_path, &snapshot_path)?;

    let metadata = BackupMetadata {
        app_id: opts.app_id.clone(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        created_at: crate::time::now_secs(),
    };

    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    let file_name = format!("{timestamp}.backup.{}.zip", opts.app_id);
    let zip_path = opts.out_dir.join(&file_name);
    let partial_path = opts.out_dir.join(format!("{file_name}{PARTIAL_SUFFIX}"));

    let result = write_archive(&partial_path, &snapshot_path, prefs_path, &metadata);
    if result.is_err() {
        let _ = fs::remove_file(&partial_path);
        return Err(result.unwrap_err());
    }

    fs::rename(&partial_path, &zip_path).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "finalize_backup")
            .with_context("from", partial_path.display().to_string())
            .with_context("to", zip_path.display().to_string())
    })?;
    sync_dir(&opts.out_dir).ok();

    tracing::info!(
        target: "launchtree",
        event = "backup_exported",
        path = %zip_path.display(),
        db_size_bytes = db_size,
    );
    Ok(BackupEntry { zip_path, metadata })
}

fn write_archive(
    zip_path: &Path,
    snapshot_path: &Path,
    prefs_path: &Path,
    metadata: &BackupMetadata,
) -> AppResult<()> {
    let file = File::create(zip_path).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_backup_zip")
            .with_context("path", zip_path.display().to_string())
    })?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    writer
        .start_file(DATABASE_ENTRY, options)
        .map_err(AppError::from)?;
    let mut snapshot = File::open(snapshot_path).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "open_snapshot")
            .with_context("path", snapshot_path.display().to_string())
    })?;
    io::copy(&mut snapshot, &mut writer)
        .map_err(|err| AppError::from(err).with_context("operation", "zip_database_entry"))?;

    writer
        .start_file(PREFERENCES_ENTRY, options)
        .map_err(AppError::from)?;
    match File::open(prefs_path) {
        Ok(mut prefs) => {
            io::copy(&mut prefs, &mut writer).map_err(|err| {
                AppError::from(err).with_context("operation", "zip_preferences_entry")
            })?;
        }
        // No preference file yet: archive an empty document so import
        // always has something to restore.
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            writer
                .write_all(b"{}")
                .map_err(|err| AppError::from(err).with_context("operation", "zip_preferences_entry"))?;
        }
        Err(err) => {
            return Err(AppError::from(err)
                .with_context("operation", "open_preferences")
                .with_context("path", prefs_path.display().to_string()));
        }
    }

    writer
        .start_file(METADATA_ENTRY, options)
        .map_err(AppError::from)?;
    let metadata_bytes = serde_json::to_vec_pretty(metadata).map_err(AppError::from)?;
    writer
        .write_all(&metadata_bytes)
        .map_err(|err| AppError::from(err).with_context("operation", "zip_metadata_entry"))?;

    writer
        .start_file(README_ENTRY, options)
        .map_err(AppError::from)?;
    writer
        .write_all(README_HTML.as_bytes())
        .map_err(|err| AppError::from(err).with_context("operation", "zip_readme_entry"))?;

    let file = writer.finish().map_err(AppError::from)?;
    file.sync_all().ok();
    Ok(())
}

/// Restore a backup archive over the live files. Every replacement is
/// copy-then-atomic-rename, so a failure mid-import never leaves a file half
/// overwritten. The caller must restart the process afterwards: open handles
/// still point at the old inodes.
pub fn import_backup(
    db_path: &Path,
    prefs_path: &Path,
    archive_path: &Path,
) -> AppResult<ImportReport> {
    let file = File::open(archive_path).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "open_backup_archive")
            .with_context("path", archive_path.display().to_string())
    })?;
    let mut archive = ZipArchive::new(file).map_err(BundleError::from).map_err(AppError::from)?;

    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    if !names.iter().any(|name| name == DATABASE_ENTRY) {
        return Err(BundleError::MissingDatabase.into());
    }

    let mut report = ImportReport::default();

    for name in names {
        let target = match name.as_str() {
            DATABASE_ENTRY => db_path,
            PREFERENCES_ENTRY => prefs_path,
            METADATA_ENTRY => {
                report.metadata = read_metadata(&mut archive);
                continue;
            }
            _ => {
                tracing::debug!(
                    target: "launchtree",
                    event = "backup_entry_ignored",
                    entry = %name,
                );
                continue;
            }
        };

        replace_from_entry(&mut archive, &name, target)?;
        if name == DATABASE_ENTRY {
            remove_sidecars(db_path).map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "remove_live_sidecars")
                    .with_context("path", db_path.display().to_string())
            })?;
        }
        report.replaced.push(name);
    }

    tracing::warn!(
        target: "launchtree",
        event = "backup_imported",
        replaced = report.replaced.len(),
        msg = "restart required before the store is used again",
    );
    Ok(report)
}

fn read_metadata(archive: &mut ZipArchive<File>) -> Option<BackupMetadata> {
    let mut entry = archive.by_name(METADATA_ENTRY).ok()?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).ok()?;
    match serde_json::from_slice::<BackupMetadata>(&buf) {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            tracing::warn!(
                target: "launchtree",
                event = "backup_metadata_unreadable",
                error = %err,
            );
            None
        }
    }
}

fn replace_from_entry(
    archive: &mut ZipArchive<File>,
    entry_name: &str,
    target: &Path,
) -> AppResult<()> {
    let parent = target.parent().ok_or_else(|| {
        AppError::new("BACKUP/NO_PARENT", "Target path has no parent directory")
            .with_context("path", target.display().to_string())
    })?;
    fs::create_dir_all(parent).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_target_dir")
            .with_context("path", parent.display().to_string())
    })?;

    let mut partial = OsString::from(target.as_os_str());
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    let result = (|| -> AppResult<()> {
        let mut entry = archive
            .by_name(entry_name)
            .map_err(BundleError::from)
            .map_err(AppError::from)?;
        let mut out = File::create(&partial).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "create_partial_file")
                .with_context("path", partial.display().to_string())
        })?;
        io::copy(&mut entry, &mut out).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "extract_entry")
                .with_context("entry", entry_name.to_string())
        })?;
        out.sync_all().map_err(AppError::from)?;
        Ok(())
    })();

    if let Err(err) = result {
        let _ = fs::remove_file(&partial);
        return Err(err);
    }

    fs::rename(&partial, target).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "promote_partial_file")
            .with_context("from", partial.display().to_string())
            .with_context("to", target.display().to_string())
    })?;
    sync_dir(parent).ok();
    Ok(())
}

fn remove_sidecar(base: &Path, suffix: &str) -> io::Result<()> {
    let mut os = OsString::from(base.as_os_str());
    os.push(suffix);
    match fs::remove_file(PathBuf::from(os)) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn remove_sidecars(live_path: &Path) -> io::Result<()> {
    remove_sidecar(live_path, "-wal")?;
    remove_sidecar(live_path, "-shm")?;
    Ok(())
}

fn run_sqlite_backup(src: &Path, dest: &Path) -> AppResult<()> {
    let src_flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI;
    let src_conn = Connection::open_with_flags(src, src_flags).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "open_source_db")
            .with_context("path", src.display().to_string())
    })?;
    let mut dest_conn = Connection::open(dest).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_snapshot_db")
            .with_context("path", dest.display().to_string())
    })?;

    {
        let backup = Backup::new(&src_conn, &mut dest_conn)
            .map_err(|err| AppError::from(err).with_context("operation", "backup_init"))?;
        backup
            .step(-1)
            .map_err(|err| AppError::from(err).with_context("operation", "backup_step"))?;
    }

    dest_conn
        .execute_batch("PRAGMA wal_checkpoint(PASSIVE);")
        .ok();
    dest_conn.execute_batch("PRAGMA journal_mode=DELETE;").ok();

    dest_conn
        .close()
        .map_err(|(_, err)| AppError::from(err).with_context("operation", "close_snapshot_db"))?;
    src_conn
        .close()
        .map_err(|(_, err)| AppError::from(err).with_context("operation", "close_source_db"))?;

    Ok(())
}

fn free_disk_space(path: &Path) -> AppResult<u64> {
    if let Ok(fake) = std::env::var("LAUNCHTREE_BACKUP_FAKE_FREE_BYTES") {
        if let Ok(value) = fake.parse::<u64>() {
            return Ok(value);
        }
    }
    available_space(path).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "available_space")
            .with_context("path", path.display().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn import_rejects_archive_without_database_entry() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("broken.zip");
        let file = File::create(&archive_path).unwrap();
        let mut writer = ZipWriter::new(file);
        writer
            .start_file("unrelated", FileOptions::default())
            .unwrap();
        writer.write_all(b"noise").unwrap();
        writer.finish().unwrap();

        let err = import_backup(
            &dir.path().join("store.sqlite3"),
            &dir.path().join("prefs.json"),
            &archive_path,
        )
        .unwrap_err();
        assert_eq!(err.code(), "BACKUP/MISSING_DATABASE");
    }

    #[test]
    fn run_sqlite_backup_copies_content() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.sqlite3");
        let dest = dir.path().join("dest.sqlite3");

        let conn = Connection::open(&src).unwrap();
        conn.execute_batch(
            "CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT); INSERT INTO t(v) VALUES ('x');",
        )
        .unwrap();
        conn.close().unwrap();

        run_sqlite_backup(&src, &dest).unwrap();

        let copy = Connection::open(&dest).unwrap();
        let count: i64 = copy
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
