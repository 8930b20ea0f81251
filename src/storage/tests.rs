use super::*;
use crate::error::{HistoryError, StoreError};
use tempfile::tempdir;

fn file_snapshot(sha: &str, path: &str, content: &str) -> Snapshot {
    Snapshot {
        id: UnitId::for_file(sha, path),
        sha: sha.to_string(),
        path: path.to_string(),
        language: Some("Python".to_string()),
        kind: UnitKind::File,
        name: path.to_string(),
        line_range: (1, content.lines().count()),
        content: content.to_string(),
        content_hash: "filehash".to_string(),
    }
}

fn unit_snapshot(sha: &str, line: usize, body: &str) -> Snapshot {
    Snapshot {
        id: UnitId::for_unit(sha, "a.py", line, 0),
        sha: sha.to_string(),
        path: "a.py".to_string(),
        language: Some("Python".to_string()),
        kind: UnitKind::Function,
        name: "foo".to_string(),
        line_range: (line, line + 1),
        content: body.to_string(),
        content_hash: "bodyhash".to_string(),
    }
}

fn reference(sha: &str, target: &UnitId) -> Reference {
    Reference {
        id: UnitId::for_unit(sha, "a.py", 1, 0),
        sha: sha.to_string(),
        path: "a.py".to_string(),
        kind: UnitKind::Function,
        name: "foo".to_string(),
        line_range: (1, 2),
        content_hash: "bodyhash".to_string(),
        snapshot_id: target.clone(),
    }
}

fn diff_unit(sha: &str, parent: &str) -> DiffUnit {
    DiffUnit {
        id: UnitId::for_diff(sha, "a.py"),
        sha: sha.to_string(),
        path: "a.py".to_string(),
        language: None,
        parent_sha: parent.to_string(),
        diff: "@@ -1 +1 @@\n-a\n+b\n".to_string(),
        changed_units: vec![],
    }
}

#[test]
fn test_unit_ids() {
    assert_eq!(UnitId::for_file("abc", "src/a.py").as_str(), "abc:src/a.py");
    assert_eq!(UnitId::for_unit("abc", "a.py", 12, 0).as_str(), "abc:a.py:12");
    assert_eq!(UnitId::for_unit("abc", "a.py", 12, 2).as_str(), "abc:a.py:12#2");
    assert_eq!(UnitId::for_diff("abc", "a.py").as_str(), "abc:a.py:diff");
}

#[test]
fn test_put_and_get() {
    let store = MemoryStore::new();
    let snapshot = file_snapshot("r", "a.py", "x = 1\n");
    store.put(StoredUnit::Snapshot(snapshot.clone())).unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(
        store.get(&snapshot.id),
        Some(StoredUnit::Snapshot(snapshot.clone()))
    );
    assert_eq!(store.file_snapshots("a.py"), vec![snapshot.clone()]);
    assert_eq!(store.file_snapshot_at("r", "a.py"), Some(snapshot));
    assert!(store.was_touched("r", "a.py"));
    assert!(store.unit_snapshots().is_empty());
}

#[test]
fn test_reference_must_point_to_snapshot() {
    let store = MemoryStore::new();
    let missing = UnitId::from("nowhere");
    let result = store.put(StoredUnit::Reference(reference("c1", &missing)));
    assert!(matches!(
        result,
        Err(HistoryError::Store(StoreError::DanglingReference { .. }))
    ));

    // A reference to a reference is rejected as well
    let snapshot = unit_snapshot("r", 1, "def foo():\n    pass");
    store.put(StoredUnit::Snapshot(snapshot.clone())).unwrap();
    let first = reference("c1", &snapshot.id);
    store.put(StoredUnit::Reference(first.clone())).unwrap();
    let chained = reference("c2", &first.id);
    assert!(store.put(StoredUnit::Reference(chained)).is_err());
}

#[test]
fn test_resolve_is_one_hop() {
    let store = MemoryStore::new();
    let snapshot = unit_snapshot("r", 1, "def foo():\n    pass");
    store.put(StoredUnit::Snapshot(snapshot.clone())).unwrap();
    let reference = reference("c1", &snapshot.id);
    store.put(StoredUnit::Reference(reference.clone())).unwrap();

    assert_eq!(store.resolve(&reference.id), Some(snapshot.clone()));
    assert_eq!(store.resolve(&snapshot.id), Some(snapshot));
    assert_eq!(store.payload_bytes(), "def foo():\n    pass".len());
}

#[test]
fn test_put_is_idempotent_but_detects_conflicts() {
    let store = MemoryStore::new();
    let snapshot = file_snapshot("r", "a.py", "x = 1\n");
    store.put(StoredUnit::Snapshot(snapshot.clone())).unwrap();
    store.put(StoredUnit::Snapshot(snapshot.clone())).unwrap();
    assert_eq!(store.len(), 1);

    let mut changed = snapshot;
    changed.content = "x = 2\n".to_string();
    assert!(matches!(
        store.put(StoredUnit::Snapshot(changed)),
        Err(HistoryError::Store(StoreError::Conflict(_)))
    ));
}

#[test]
fn test_diff_lookup_by_parent() {
    let store = MemoryStore::new();
    store.put(StoredUnit::Diff(diff_unit("c1", "r"))).unwrap();

    assert!(store.diff_for("c1", "a.py", "r").is_some());
    assert!(store.diff_for("c1", "a.py", "other").is_none());
    assert!(store.diff_for("c1", "b.py", "r").is_none());
    assert_eq!(store.counts(), (0, 0, 1));
}

#[test]
fn test_touch_and_removal_markers() {
    let store = MemoryStore::new();
    store.record_touch("c1", "a.py").unwrap();
    store.record_removal("c2", "a.py").unwrap();

    assert!(store.was_touched("c1", "a.py"));
    assert!(!store.is_removed("c1", "a.py"));
    assert!(store.is_removed("c2", "a.py"));
    assert!(store.was_touched("c2", "a.py"));
}

#[test]
fn test_save_load_rebuilds_indexes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested/store.json");

    let store = MemoryStore::new();
    let snapshot = file_snapshot("r", "a.py", "x = 1\n");
    store.put(StoredUnit::Snapshot(snapshot.clone())).unwrap();
    store.put(StoredUnit::Diff(diff_unit("c1", "r"))).unwrap();
    store.record_removal("c2", "a.py").unwrap();
    store
        .record_commit(CommitRecord {
            sha: "r".to_string(),
            parents: vec![],
            depth: 0,
            branches: vec!["main".to_string()],
            is_merge: false,
            author: "dev".to_string(),
            timestamp: 1_704_067_200,
            message: "init".to_string(),
            refs: vec![],
        })
        .unwrap();
    store.save(&path).unwrap();

    let loaded = MemoryStore::load(&path).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.file_snapshots("a.py"), vec![snapshot]);
    assert!(loaded.diff_for("c1", "a.py", "r").is_some());
    assert!(loaded.is_removed("c2", "a.py"));
    assert_eq!(loaded.commit_record("r").unwrap().branches, vec!["main"]);
}

#[test]
fn test_load_missing_file_is_empty() {
    let dir = tempdir().unwrap();
    let store = MemoryStore::load(&dir.path().join("none.json")).unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_stored_unit_serializes_with_type_tag() {
    let json = serde_json::to_value(StoredUnit::Diff(diff_unit("c1", "r"))).unwrap();
    assert_eq!(json["type"], "diff");
    assert_eq!(json["parent_sha"], "r");
}
