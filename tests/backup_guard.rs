use anyhow::Result;
use launchtree_lib::backup::{self, ExportOptions};
use launchtree_lib::{NodeStore, SpecialMode};
use tempfile::tempdir;

// Kept alone in this binary: the fake free-space override is process-global.
#[tokio::test]
async fn export_refuses_to_run_on_a_nearly_full_disk() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("store.sqlite3");
    let store = NodeStore::open(&db_path).await?;
    store.get_or_create_special(SpecialMode::Home).await?;

    std::env::set_var("LAUNCHTREE_BACKUP_FAKE_FREE_BYTES", "1");
    let opts = ExportOptions {
        out_dir: dir.path().join("backups"),
        app_id: "com.example.test".to_string(),
    };
    let result =
        backup::export_backup(store.pool(), &db_path, &dir.path().join("prefs.json"), &opts).await;
    std::env::remove_var("LAUNCHTREE_BACKUP_FAKE_FREE_BYTES");
    store.close().await;

    let err = result.unwrap_err();
    assert_eq!(err.code(), "BACKUP/LOW_DISK");

    // The preflight fires before any archive bytes are staged.
    let leftovers: Vec<_> = std::fs::read_dir(&opts.out_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some())
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}
