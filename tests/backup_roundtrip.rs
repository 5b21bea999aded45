use anyhow::Result;
use launchtree_lib::backup::{self, ExportOptions};
use launchtree_lib::model::NotePayload;
use launchtree_lib::{NodeKind, NodeStore, Payload, Preferences, SpecialMode};
use serde_json::json;
use tempfile::tempdir;

#[path = "util.rs"]
mod util;

const APP_ID: &str = "com.example.test";

#[tokio::test]
async fn export_then_import_restores_tree_and_preferences() -> Result<()> {
    let source_dir = tempdir()?;
    let db_path = source_dir.path().join("store.sqlite3");
    let prefs_path = source_dir.path().join("prefs.json");

    let store = NodeStore::open(&db_path).await?;
    let home = store.get_or_create_special(SpecialMode::Home).await?;
    let note_id = util::append(&store, home.id, NodeKind::Note, "groceries").await;
    store
        .update_payload(&Payload::Note(NotePayload {
            node_id: note_id,
            body: "remember the milk".to_string(),
        }))
        .await?;

    let mut prefs = Preferences::load(&prefs_path)?;
    prefs.set("theme", json!("dark"));
    prefs.save()?;

    let opts = ExportOptions {
        out_dir: source_dir.path().join("backups"),
        app_id: APP_ID.to_string(),
    };
    let entry = backup::export_backup(store.pool(), &db_path, &prefs_path, &opts).await?;
    store.close().await;

    assert_eq!(entry.metadata.app_id, APP_ID);

    let restore_dir = tempdir()?;
    let restored_db = restore_dir.path().join("store.sqlite3");
    let restored_prefs = restore_dir.path().join("prefs.json");
    let report = backup::import_backup(&restored_db, &restored_prefs, &entry.zip_path)?;

    assert!(report.replaced.iter().any(|name| name == "database"));
    assert!(report.replaced.iter().any(|name| name == "preferences"));
    let metadata = report.metadata.expect("metadata entry restored");
    assert_eq!(metadata.app_id, APP_ID);

    let restored = NodeStore::open(&restored_db).await?;
    let restored_home = restored.get_or_create_special(SpecialMode::Home).await?;
    assert_eq!(restored_home.id, home.id);
    let note = restored.get_node(note_id).await?;
    assert_eq!(note.label, "groceries");
    match restored.get_payload(note_id).await? {
        Payload::Note(note) => assert_eq!(note.body, "remember the milk"),
        other => panic!("expected a note payload, got {:?}", other.kind()),
    }
    restored.close().await;

    let prefs = Preferences::load(&restored_prefs)?;
    assert_eq!(prefs.get("theme"), Some(&json!("dark")));
    Ok(())
}

#[tokio::test]
async fn archive_name_and_entries_follow_the_bundle_layout() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("store.sqlite3");
    let store = NodeStore::open(&db_path).await?;
    store.get_or_create_special(SpecialMode::Home).await?;

    let opts = ExportOptions {
        out_dir: dir.path().join("backups"),
        app_id: APP_ID.to_string(),
    };
    // No preference file on disk yet: the entry is still written.
    let entry =
        backup::export_backup(store.pool(), &db_path, &dir.path().join("prefs.json"), &opts)
            .await?;
    store.close().await;

    let name = entry
        .zip_path
        .file_name()
        .expect("archive file name")
        .to_string_lossy()
        .into_owned();
    let suffix = format!(".backup.{APP_ID}.zip");
    let stamp = name.strip_suffix(&suffix).expect("archive suffix");
    assert_eq!(stamp.len(), 15);
    assert!(stamp
        .chars()
        .enumerate()
        .all(|(i, c)| if i == 8 { c == '-' } else { c.is_ascii_digit() }));

    let file = std::fs::File::open(&entry.zip_path)?;
    let archive = zip::ZipArchive::new(file)?;
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, vec!["README.html", "database", "metadata", "preferences"]);
    Ok(())
}
