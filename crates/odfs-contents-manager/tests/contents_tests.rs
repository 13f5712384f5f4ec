use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use odfs_contents_core::{ContentFormat, ContentType, FileFormat, FsBackend, SaveModel, SnapshotKind};
use odfs_contents_local::{LocalFs, LocalFsConfig, MemoryFs};
use odfs_contents_manager::{ContentsError, ContentsManager, DocumentCodec, ManagerConfig, NotebookCodec};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

fn memory_manager() -> (ContentsManager, Arc<MemoryFs>) {
    let fs = Arc::new(MemoryFs::new());
    let manager = ContentsManager::new(fs.clone(), ManagerConfig::default()).unwrap();
    (manager, fs)
}

fn local_manager() -> (ContentsManager, Arc<LocalFs>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let fs = Arc::new(LocalFs::new(LocalFsConfig::new(temp_dir.path())).unwrap());
    let manager = ContentsManager::new(fs.clone(), ManagerConfig::default()).unwrap();
    (manager, fs, temp_dir)
}

fn notebook(source: &str) -> Value {
    json!({
        "cells": [
            {"cell_type": "markdown", "metadata": {}, "source": source}
        ],
        "metadata": {},
        "nbformat": 4,
        "nbformat_minor": 5
    })
}

#[tokio::test]
async fn test_text_round_trip() {
    let (manager, _fs, _temp_dir) = local_manager();

    for (i, text) in ["", "hello", "zażółć gęślą jaźń\n", "tabs\tand\r\nbreaks", "日本語 🚀"]
        .iter()
        .enumerate()
    {
        let path = format!("text{}.txt", i);
        manager.save(SaveModel::text(*text), &path).await.unwrap();

        let model = manager.get(&path, true, None, Some("text")).await.unwrap();
        assert_eq!(model.text(), Some(*text));
        assert_eq!(model.format, Some(ContentFormat::Text));
    }
}

#[tokio::test]
async fn test_base64_round_trip() {
    let (manager, _fs, _temp_dir) = local_manager();

    let samples: Vec<Vec<u8>> = vec![
        vec![],
        vec![0x00],
        vec![0xff, 0xfe, 0xfd],
        (0u8..=255).collect(),
        b"plain ascii".to_vec(),
    ];
    for (i, bytes) in samples.iter().enumerate() {
        let path = format!("blob{}.bin", i);
        let encoded = STANDARD.encode(bytes);
        manager
            .save(SaveModel::file(encoded.clone(), FileFormat::Base64), &path)
            .await
            .unwrap();

        let model = manager.get(&path, true, None, Some("base64")).await.unwrap();
        assert_eq!(model.text(), Some(encoded.as_str()));
        assert_eq!(model.format, Some(ContentFormat::Base64));
    }
}

#[tokio::test]
async fn test_format_auto_detection() {
    let (manager, _fs) = memory_manager();

    let binary = STANDARD.encode([0xc3, 0x28, 0xa0, 0xa1]);
    manager
        .save(SaveModel::file(binary.clone(), FileFormat::Base64), "image.dat")
        .await
        .unwrap();
    manager.save(SaveModel::text("just text"), "notes").await.unwrap();

    let model = manager.get("image.dat", true, None, None).await.unwrap();
    assert_eq!(model.format, Some(ContentFormat::Base64));
    assert_eq!(model.text(), Some(binary.as_str()));

    let model = manager.get("notes", true, None, None).await.unwrap();
    assert_eq!(model.format, Some(ContentFormat::Text));
    assert_eq!(model.mimetype.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn test_directory_listing_survives_broken_child() {
    let (manager, fs) = memory_manager();
    manager.save(SaveModel::directory(), "d").await.unwrap();
    for name in ["a.txt", "b.txt", "c.ipynb"] {
        fs.write_all(&format!("d/{}", name), b"{}").await.unwrap();
    }
    manager.save(SaveModel::directory(), "d/sub").await.unwrap();
    fs.add_broken_entry("d/dangling").unwrap();

    let model = manager.get("d", true, None, None).await.unwrap();
    let names: Vec<_> = model
        .entries()
        .unwrap()
        .iter()
        .map(|m| m.name.clone())
        .collect();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.ipynb", "sub"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_directory_listing_skips_dangling_symlink() {
    let (manager, _fs, temp_dir) = local_manager();
    std::fs::write(temp_dir.path().join("real.txt"), "x").unwrap();
    std::os::unix::fs::symlink(
        temp_dir.path().join("gone.txt"),
        temp_dir.path().join("link.txt"),
    )
    .unwrap();

    let model = manager.get("", true, None, None).await.unwrap();
    let names: Vec<_> = model
        .entries()
        .unwrap()
        .iter()
        .map(|m| m.name.as_str())
        .collect();
    assert_eq!(names, vec!["real.txt"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_dangling_symlink_can_be_deleted() {
    let (manager, _fs, temp_dir) = local_manager();
    let link = temp_dir.path().join("link.txt");
    std::os::unix::fs::symlink(temp_dir.path().join("gone.txt"), &link).unwrap();

    manager.delete("link.txt").await.unwrap();
    assert!(std::fs::symlink_metadata(&link).is_err());

    let err = manager.delete("link.txt").await.unwrap_err();
    assert!(matches!(err, ContentsError::NotFound(_)));
}

#[tokio::test]
async fn test_checkpoint_identity_and_order() {
    let (manager, _fs) = memory_manager();
    manager.save(SaveModel::text("one"), "f.txt").await.unwrap();

    let first = manager.create_checkpoint("f.txt").await.unwrap();
    let listing = manager.list_checkpoints("f.txt").await.unwrap();
    assert_eq!(listing.items.len(), 1);
    assert_eq!(listing.items[0].id, first.id);

    let second = manager.create_checkpoint("f.txt").await.unwrap();
    assert_ne!(first.id, second.id);

    let ids: Vec<_> = manager
        .list_checkpoints("f.txt")
        .await
        .unwrap()
        .items
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[tokio::test]
async fn test_checkpoint_content_round_trip() {
    let (manager, _fs, _temp_dir) = local_manager();

    manager.save(SaveModel::text("file body"), "f.txt").await.unwrap();
    let checkpoint = manager.create_checkpoint("f.txt").await.unwrap();
    let content = manager.get_checkpoint("f.txt", &checkpoint.id).await.unwrap();
    assert_eq!(content.kind, SnapshotKind::File);
    assert_eq!(content.content, json!("file body"));
    assert_eq!(content.format, Some(FileFormat::Text));

    let doc = notebook("# Notes");
    manager
        .save(SaveModel::document(doc.clone()), "n.ipynb")
        .await
        .unwrap();
    let checkpoint = manager.create_checkpoint("n.ipynb").await.unwrap();
    let content = manager.get_checkpoint("n.ipynb", &checkpoint.id).await.unwrap();
    assert_eq!(content.kind, SnapshotKind::Document);
    assert_eq!(content.content, doc);
}

#[tokio::test]
async fn test_document_save_replaces_previous_bytes() {
    let (manager, fs, _temp_dir) = local_manager();
    let long = notebook(&"long line ".repeat(100));
    let short = notebook("short");

    manager
        .save(SaveModel::document(long), "n.ipynb")
        .await
        .unwrap();
    manager
        .save(SaveModel::document(short.clone()), "n.ipynb")
        .await
        .unwrap();

    let stored = fs.read_all("n.ipynb").await.unwrap();
    assert_eq!(stored, NotebookCodec::default().serialize(&short).unwrap());

    let model = manager.get("n.ipynb", true, None, None).await.unwrap();
    assert_eq!(model.document(), Some(&short));
    assert_eq!(model.size, Some(stored.len() as u64));
}

#[tokio::test]
async fn test_type_resolution() {
    let (manager, _fs) = memory_manager();
    manager.save(SaveModel::text("{}"), "data.json").await.unwrap();
    manager.save(SaveModel::directory(), "d").await.unwrap();

    let result = manager
        .get("data.json", false, Some(ContentType::Directory), None)
        .await;
    assert!(matches!(result, Err(ContentsError::TypeMismatch(_))));

    let result = manager.get("d", false, Some(ContentType::Document), None).await;
    assert!(matches!(result, Err(ContentsError::TypeMismatch(_))));

    let model = manager.get("data.json", true, None, None).await.unwrap();
    assert_eq!(model.content_type, ContentType::File);

    let model = manager
        .get("data.json", true, Some(ContentType::Document), None)
        .await
        .unwrap();
    assert_eq!(model.content_type, ContentType::Document);
}

#[tokio::test]
async fn test_save_and_get_text_file() {
    let (manager, _fs, _temp_dir) = local_manager();
    manager.save(SaveModel::directory(), "/a").await.unwrap();

    let saved = manager
        .save(SaveModel::text("hello"), "/a/b.txt")
        .await
        .unwrap();
    assert_eq!(saved.path, "a/b.txt");
    assert_eq!(saved.name, "b.txt");
    assert_eq!(saved.size, Some(5));

    let model = manager.get("/a/b.txt", true, None, None).await.unwrap();
    assert_eq!(model.content_type, ContentType::File);
    assert_eq!(model.format, Some(ContentFormat::Text));
    assert_eq!(model.text(), Some("hello"));
    assert_eq!(model.mimetype.as_deref(), Some("text/plain"));
    assert_eq!(model.size, Some(5));
    assert!(model.writable);
}

#[tokio::test]
async fn test_checkpoint_keeps_old_version() {
    let (manager, _fs, _temp_dir) = local_manager();
    manager.save(SaveModel::directory(), "a").await.unwrap();
    manager.save(SaveModel::text("v1"), "/a/b.txt").await.unwrap();

    let checkpoint = manager.create_checkpoint("/a/b.txt").await.unwrap();
    manager.save(SaveModel::text("v2"), "/a/b.txt").await.unwrap();

    let listing = manager.list_checkpoints("/a/b.txt").await.unwrap();
    assert_eq!(listing.items.len(), 1);

    let content = manager
        .get_checkpoint("/a/b.txt", &checkpoint.id)
        .await
        .unwrap();
    assert_eq!(content.content, json!("v1"));

    let live = manager.get("/a/b.txt", true, None, None).await.unwrap();
    assert_eq!(live.text(), Some("v2"));
}

#[tokio::test]
async fn test_restore_checkpoint_replaces_longer_content() {
    let (manager, _fs) = memory_manager();
    manager.save(SaveModel::text("v1"), "f.txt").await.unwrap();
    let checkpoint = manager.create_checkpoint("f.txt").await.unwrap();
    manager
        .save(SaveModel::text("a much longer second version"), "f.txt")
        .await
        .unwrap();

    manager
        .restore_checkpoint("f.txt", &checkpoint.id)
        .await
        .unwrap();
    let model = manager.get("f.txt", true, None, None).await.unwrap();
    assert_eq!(model.text(), Some("v1"));
}

#[tokio::test]
async fn test_restore_document_checkpoint() {
    let (manager, _fs) = memory_manager();
    let original = notebook("original");
    manager
        .save(SaveModel::document(original.clone()), "n.ipynb")
        .await
        .unwrap();
    let baseline = manager.list_checkpoints("n.ipynb").await.unwrap().items;
    assert_eq!(baseline.len(), 1);

    manager
        .save(SaveModel::document(notebook("edited")), "n.ipynb")
        .await
        .unwrap();
    manager
        .restore_checkpoint("n.ipynb", &baseline[0].id)
        .await
        .unwrap();

    let model = manager.get("n.ipynb", true, None, None).await.unwrap();
    assert_eq!(model.document(), Some(&original));
}

#[tokio::test]
async fn test_delete_checkpoint() {
    let (manager, _fs) = memory_manager();
    manager.save(SaveModel::text("x"), "f.txt").await.unwrap();
    let checkpoint = manager.create_checkpoint("f.txt").await.unwrap();

    manager.delete_checkpoint("f.txt", &checkpoint.id).await.unwrap();
    assert!(manager.list_checkpoints("f.txt").await.unwrap().items.is_empty());

    let err = manager
        .delete_checkpoint("f.txt", &checkpoint.id)
        .await
        .unwrap_err();
    assert_eq!(err.class(), odfs_contents_manager::ErrorClass::NotFound);
}

#[tokio::test]
async fn test_custom_checkpoint_dir() {
    let fs = Arc::new(MemoryFs::new());
    let config = ManagerConfig::default().with_checkpoint_dir(".snapshots");
    let manager = ContentsManager::new(fs.clone(), config).unwrap();

    manager.save(SaveModel::text("x"), "f.txt").await.unwrap();
    let checkpoint = manager.create_checkpoint("f.txt").await.unwrap();
    assert!(fs
        .exists(&format!(".snapshots/f.txt.{}", checkpoint.id))
        .await
        .unwrap());
}
