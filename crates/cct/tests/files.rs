//! Crash-safe save and load of tree files

mod common;

use callpath_cct::file::temp_path;
use callpath_cct::{
    load_tree_file, save_tree_file, CallTree, CodecConfig, FileError, Frame, TreeParams,
};
use callpath_format::RootConvention;
use common::{assert_same_tree, lip_tree, params_for};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[test]
fn test_save_and_load() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tree.cct");
    let tree = lip_tree();
    let config = CodecConfig::default();

    let summary = save_tree_file(
        &path,
        &tree,
        tree.root().unwrap(),
        params_for(&tree, 0),
        &config,
    )
    .unwrap();
    assert_eq!(summary.num_nodes, tree.len() as u64);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), summary.bytes);
    assert!(!temp_path(&path).exists());

    let mut copy = CallTree::for_reading(2);
    let read = load_tree_file(&path, &mut copy, 2, &config).unwrap();
    assert_eq!(read.header.num_nodes(), tree.len() as u64);
    assert_same_tree(&tree, &copy);
}

#[test]
fn test_save_self_loop_without_sync() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("old.cct");
    let tree = lip_tree();
    let config = CodecConfig::for_testing().with_root_convention(RootConvention::SelfLoop);

    save_tree_file(&path, &tree, tree.root().unwrap(), params_for(&tree, 1), &config).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[10..15], b"01.00");

    let mut copy = CallTree::for_reading(2);
    let read = load_tree_file(&path, &mut copy, 2, &config).unwrap();
    assert_eq!(read.header.epoch(), 1);
    assert_same_tree(&tree, &copy);
}

#[test]
fn test_failed_save_keeps_previous_file() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tree.cct");
    let tree = lip_tree();
    let config = CodecConfig::for_testing();

    save_tree_file(&path, &tree, tree.root().unwrap(), params_for(&tree, 0), &config).unwrap();
    let before = std::fs::read(&path).unwrap();

    let wrong = TreeParams {
        num_nodes: 2,
        ..params_for(&tree, 0)
    };
    let err = save_tree_file(&path, &tree, tree.root().unwrap(), wrong, &config).unwrap_err();
    assert!(matches!(err, FileError::Codec(_)));
    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert!(!temp_path(&path).exists());
}

/// The temp file is a symlink to `/dev/full`, so the buffered write only
/// fails when it is flushed.
#[cfg(target_os = "linux")]
#[test]
fn test_failed_flush_removes_temp_file() {
    let full = std::path::Path::new("/dev/full");
    if !full.exists() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tree.cct");
    let tmp = temp_path(&path);
    std::os::unix::fs::symlink(full, &tmp).unwrap();

    let tree = lip_tree();
    let err = save_tree_file(
        &path,
        &tree,
        tree.root().unwrap(),
        params_for(&tree, 0),
        &CodecConfig::for_testing(),
    )
    .unwrap_err();
    match err {
        FileError::Io { op, .. } => assert_eq!(op, "flush"),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(std::fs::symlink_metadata(&tmp).is_err());
    assert!(!path.exists());
}

#[test]
fn test_invalid_config_rejected_before_writing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tree.cct");
    let tree = CallTree::new(0, Frame::at(1));
    let config = CodecConfig {
        format_version: "9.9.9".into(),
        ..CodecConfig::for_testing()
    };
    let err = save_tree_file(&path, &tree, tree.root().unwrap(), params_for(&tree, 0), &config)
        .unwrap_err();
    assert!(matches!(err, FileError::Config(_)));
    assert!(!path.exists());
}

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let mut tree = CallTree::for_reading(0);
    let err = load_tree_file(
        &dir.path().join("absent.cct"),
        &mut tree,
        0,
        &CodecConfig::default(),
    )
    .unwrap_err();
    match err {
        FileError::Io { op, .. } => assert_eq!(op, "open"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_load_respects_max_nodes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tree.cct");
    let tree = lip_tree();
    let config = CodecConfig::for_testing();
    save_tree_file(&path, &tree, tree.root().unwrap(), params_for(&tree, 0), &config).unwrap();

    let strict = config.with_max_nodes(3);
    let mut copy = CallTree::for_reading(2);
    let err = load_tree_file(&path, &mut copy, 2, &strict).unwrap_err();
    match err {
        FileError::Codec(e) => assert!(e.is_format()),
        other => panic!("unexpected error {other:?}"),
    }
}
