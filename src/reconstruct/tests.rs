use super::*;
use crate::config::PolicyConfig;
use crate::graph::{CommitGraph, build_graph};
use crate::parser::TreeSitterUnitParser;
use crate::policy::{StoragePlan, StoragePolicy};
use crate::source::InMemorySource;
use crate::storage::{CommitRecord, DiffUnit, MemoryStore, StoredUnit, UnitId};

/// 40 numbered assignments, with line `changed` set to `value`
fn module(changed: usize, value: usize) -> String {
    (0..40)
        .map(|i| {
            let v = if i == changed { value } else { i };
            format!("v_{} = {}\n", i, v)
        })
        .collect()
}

/// Store every changed file of every commit, like an ingestion run does
fn ingest(source: &InMemorySource, graph: &CommitGraph, store: &MemoryStore) {
    let policy = StoragePolicy::new(PolicyConfig::default());
    for (index, sha) in graph.topological_order().unwrap().iter().enumerate() {
        let commit = graph.commit(sha).unwrap();
        store
            .record_commit(CommitRecord {
                sha: sha.clone(),
                parents: commit.parents.clone(),
                depth: graph.depth(sha).unwrap(),
                branches: graph.branches_containing(sha),
                is_merge: commit.is_merge(),
                author: commit.author.clone(),
                timestamp: commit.timestamp,
                message: commit.message.clone(),
                refs: commit.refs.clone(),
            })
            .unwrap();

        for path in source.changed_files(sha).unwrap() {
            let plan = policy
                .decide_storage(graph, source, &TreeSitterUnitParser, sha, &path, index)
                .unwrap();
            if plan == StoragePlan::Removed {
                store.record_removal(sha, &path).unwrap();
                continue;
            }
            store.record_touch(sha, &path).unwrap();
            for unit in plan.into_units() {
                store.put(unit).unwrap();
            }
        }
    }
}

/// c0 .. c{n-1}; every commit edits one line of a.py except c5, which only adds b.py
fn linear_history(n: usize) -> (InMemorySource, CommitGraph) {
    let mut source = InMemorySource::new();
    source.commit("c0", &[], [("a.py", module(0, 0))]);
    for i in 1..n {
        let sha = format!("c{}", i);
        let parent = format!("c{}", i - 1);
        if i == 5 {
            source.commit_changes(&sha, &[parent.as_str()], &[("b.py", Some("b = 1\n"))]);
        } else {
            let content = module(i, i * 100);
            source.commit_changes(&sha, &[parent.as_str()], &[("a.py", Some(content.as_str()))]);
        }
    }
    let tip = format!("c{}", n - 1);
    let graph = build_graph(source.raw_commits(), vec![("main".to_string(), tip)]).unwrap();
    (source, graph)
}

fn stored_only() -> ReconstructionConfig {
    ReconstructionConfig {
        live_diffs: false,
        cache_enabled: true,
    }
}

#[test]
fn test_round_trip_from_stored_units_only() {
    let (source, graph) = linear_history(15);
    let store = MemoryStore::new();
    ingest(&source, &graph, &store);
    let reconstructor = Reconstructor::with_config(&graph, &store, &source, stored_only());

    for i in 0..15 {
        let sha = format!("c{}", i);
        let expected = source.file_content(&sha, "a.py").unwrap().unwrap();
        let result = reconstructor.reconstruct(&sha, "a.py").unwrap().unwrap();
        assert_eq!(result.content, expected, "content mismatch at {}", sha);
        assert!(!result.is_degraded(), "unexpected warnings at {}", sha);
    }
}

#[test]
fn test_replay_starts_at_nearest_snapshot() {
    let (source, graph) = linear_history(15);
    let store = MemoryStore::new();
    ingest(&source, &graph, &store);
    let reconstructor = Reconstructor::with_config(&graph, &store, &source, stored_only());

    let origin = |sha: &str| reconstructor.reconstruct(sha, "a.py").unwrap().unwrap().origin;
    assert_eq!(
        origin("c3"),
        Origin::Replay {
            snapshot_sha: "c0".to_string(),
            steps: 3
        }
    );
    // c10 is a periodic snapshot
    assert_eq!(
        origin("c10"),
        Origin::Snapshot {
            sha: "c10".to_string()
        }
    );
    assert_eq!(
        origin("c12"),
        Origin::Replay {
            snapshot_sha: "c10".to_string(),
            steps: 2
        }
    );
}

#[test]
fn test_merge_scenario() {
    let mut source = InMemorySource::new();
    source
        .commit("r", &[], [("a.py", module(0, 0))])
        .commit_changes("c1", &["r"], &[("a.py", Some(module(3, 33).as_str()))])
        .commit_changes("b", &["r"], &[("notes.txt", Some("side\n"))])
        .commit_changes("c2", &["c1", "b"], &[("a.py", Some(module(4, 44).as_str()))]);
    let graph = build_graph(
        source.raw_commits(),
        vec![("main".to_string(), "c2".to_string())],
    )
    .unwrap();
    let store = MemoryStore::new();
    ingest(&source, &graph, &store);

    assert!(store.diff_for("c1", "a.py", "r").is_some());
    assert!(store.file_snapshot_at("c2", "a.py").is_some());

    let reconstructor = Reconstructor::new(&graph, &store, &source);
    let c1 = reconstructor.reconstruct("c1", "a.py").unwrap().unwrap();
    assert_eq!(Some(c1.content), source.file_content("c1", "a.py").unwrap());

    let c2 = reconstructor.reconstruct("c2", "a.py").unwrap().unwrap();
    assert_eq!(
        c2.origin,
        Origin::Snapshot {
            sha: "c2".to_string()
        }
    );

    // b never touched a.py: replay skips it as unchanged
    let b = reconstructor.reconstruct("b", "a.py").unwrap().unwrap();
    assert_eq!(b.content, module(0, 0));
    assert!(!b.is_degraded());
}

#[test]
fn test_replay_follows_first_parents_across_merges() {
    // The side branch is the shorter route from r to m
    let mut source = InMemorySource::new();
    source
        .commit("r", &[], [("a.py", module(0, 0)), ("z.py", module(1, 1))])
        .commit_changes("c1", &["r"], &[("a.py", Some(module(2, 22).as_str()))])
        .commit_changes("c2", &["c1"], &[("a.py", Some(module(3, 33).as_str()))])
        .commit_changes("s1", &["r"], &[("notes.txt", Some("side\n"))])
        .commit_changes("m", &["c2", "s1"], &[("notes.txt", Some("side\n"))]);
    let graph = build_graph(
        source.raw_commits(),
        vec![("main".to_string(), "m".to_string())],
    )
    .unwrap();
    let store = MemoryStore::new();
    ingest(&source, &graph, &store);

    let reconstructor = Reconstructor::with_config(&graph, &store, &source, stored_only());
    let result = reconstructor.reconstruct("m", "z.py").unwrap().unwrap();
    assert_eq!(result.content, module(1, 1));
    assert!(!result.is_degraded());
    assert_eq!(
        result.origin,
        Origin::Replay {
            snapshot_sha: "r".to_string(),
            steps: 3
        }
    );
}

#[test]
fn test_second_request_is_served_from_cache() {
    let (source, graph) = linear_history(4);
    let store = MemoryStore::new();
    ingest(&source, &graph, &store);
    let reconstructor = Reconstructor::new(&graph, &store, &source);

    let first = reconstructor.reconstruct("c3", "a.py").unwrap().unwrap();
    let second = reconstructor.reconstruct("c3", "a.py").unwrap().unwrap();
    assert_eq!(second.origin, Origin::Cache);
    assert_eq!(first.content, second.content);
    assert_eq!(reconstructor.cache().len(), 1);
}

#[test]
fn test_cache_can_be_disabled() {
    let (source, graph) = linear_history(4);
    let store = MemoryStore::new();
    ingest(&source, &graph, &store);
    let config = ReconstructionConfig {
        live_diffs: true,
        cache_enabled: false,
    };
    let reconstructor = Reconstructor::with_config(&graph, &store, &source, config);

    reconstructor.reconstruct("c3", "a.py").unwrap();
    let again = reconstructor.reconstruct("c3", "a.py").unwrap().unwrap();
    assert_ne!(again.origin, Origin::Cache);
    assert!(reconstructor.cache().is_empty());
}

#[test]
fn test_fallback_without_snapshots() {
    let (source, graph) = linear_history(3);
    let store = MemoryStore::new();
    let reconstructor = Reconstructor::new(&graph, &store, &source);

    let result = reconstructor.reconstruct("c2", "a.py").unwrap().unwrap();
    assert_eq!(result.origin, Origin::SourceControl);
    assert_eq!(Some(result.content), source.file_content("c2", "a.py").unwrap());

    assert_eq!(reconstructor.reconstruct("c2", "missing.py").unwrap(), None);
}

#[test]
fn test_fallback_failure_is_not_found() {
    let (mut source, graph) = linear_history(3);
    source.fail_lookups("c2", "a.py");
    let store = MemoryStore::new();
    let reconstructor = Reconstructor::new(&graph, &store, &source);
    assert_eq!(reconstructor.reconstruct("c2", "a.py").unwrap(), None);
}

#[test]
fn test_unknown_commit_is_an_error() {
    let (source, graph) = linear_history(3);
    let store = MemoryStore::new();
    let reconstructor = Reconstructor::new(&graph, &store, &source);
    assert!(matches!(
        reconstructor.reconstruct("zzz", "a.py"),
        Err(HistoryError::UnknownCommit(_))
    ));
}

#[test]
fn test_live_diff_fills_missing_stored_diffs() {
    let (source, graph) = linear_history(4);
    let store = MemoryStore::new();
    let plan = StoragePolicy::new(PolicyConfig::default())
        .decide_storage(&graph, &source, &TreeSitterUnitParser, "c0", "a.py", 0)
        .unwrap();
    for unit in plan.into_units() {
        store.put(unit).unwrap();
    }
    let reconstructor = Reconstructor::new(&graph, &store, &source);

    let result = reconstructor.reconstruct("c3", "a.py").unwrap().unwrap();
    assert_eq!(Some(&result.content), source.file_content("c3", "a.py").unwrap().as_ref());
    assert!(!result.is_degraded());
}

#[test]
fn test_missing_diff_degrades_without_live_diffs() {
    let (source, graph) = linear_history(3);
    let store = MemoryStore::new();
    let plan = StoragePolicy::new(PolicyConfig::default())
        .decide_storage(&graph, &source, &TreeSitterUnitParser, "c0", "a.py", 0)
        .unwrap();
    for unit in plan.into_units() {
        store.put(unit).unwrap();
    }
    let reconstructor = Reconstructor::with_config(&graph, &store, &source, stored_only());

    let result = reconstructor.reconstruct("c2", "a.py").unwrap().unwrap();
    assert!(result.is_degraded());
    assert_eq!(result.warnings.len(), 2);
    assert_eq!(result.content, module(0, 0));
    assert!(reconstructor.cache().is_empty());

    let err = result.into_exact().unwrap_err();
    assert!(matches!(err, HistoryError::PatchApplyFailure { ref sha, .. } if sha == "c1"));
}

#[test]
fn test_non_applying_diff_is_skipped_with_warning() {
    let (source, graph) = linear_history(3);
    let store = MemoryStore::new();
    ingest(&source, &graph, &store);

    // x.py: a snapshot at c0 and a diff at c1 that does not match it
    let bogus = DiffUnit {
        id: UnitId::for_diff("c1", "x.py"),
        sha: "c1".to_string(),
        path: "x.py".to_string(),
        language: None,
        parent_sha: "c0".to_string(),
        diff: "@@ -1,1 +1,1 @@\n-not there\n+replacement\n".to_string(),
        changed_units: Vec::new(),
    };
    store.put(file_snapshot("c0", "x.py", "original\n")).unwrap();
    store.put(StoredUnit::Diff(bogus)).unwrap();

    let reconstructor = Reconstructor::with_config(&graph, &store, &source, stored_only());
    let result = reconstructor.reconstruct("c1", "x.py").unwrap().unwrap();
    assert_eq!(result.content, "original\n");
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].sha, "c1");
}

#[test]
fn test_deleted_file_is_not_found() {
    let mut source = InMemorySource::new();
    source
        .commit("r", &[], [("a.py", "x = 1\n"), ("keep.py", "k = 1\n")])
        .commit_changes("c1", &["r"], &[("a.py", None)])
        .commit_changes("c2", &["c1"], &[("keep.py", Some("k = 2\n"))])
        .commit_changes("c3", &["c2"], &[("a.py", Some("x = 3\n"))]);
    let graph = build_graph(source.raw_commits(), Vec::new()).unwrap();
    let store = MemoryStore::new();
    ingest(&source, &graph, &store);
    let reconstructor = Reconstructor::with_config(&graph, &store, &source, stored_only());

    assert!(store.is_removed("c1", "a.py"));
    assert_eq!(reconstructor.reconstruct("c1", "a.py").unwrap(), None);
    assert_eq!(reconstructor.reconstruct("c2", "a.py").unwrap(), None);
    assert_eq!(
        reconstructor.reconstruct("c3", "a.py").unwrap().unwrap().content,
        "x = 3\n"
    );
}

/// root -> (c, b) -> merge, with c and b both adding the same a.py
fn twin_branches() -> (InMemorySource, CommitGraph) {
    let mut source = InMemorySource::new();
    source
        .commit("root", &[], [("README", "hi\n")])
        .commit_changes("c", &["root"], &[("a.py", Some("x = 1\n"))])
        .commit_changes("b", &["root"], &[("a.py", Some("x = 1\n"))])
        .commit_changes("merge", &["c", "b"], &[("notes.txt", Some("n\n"))]);
    let graph = build_graph(source.raw_commits(), Vec::new()).unwrap();
    (source, graph)
}

fn file_snapshot(sha: &str, path: &str, content: &str) -> StoredUnit {
    StoredUnit::Snapshot(crate::storage::Snapshot {
        id: UnitId::for_file(sha, path),
        sha: sha.to_string(),
        path: path.to_string(),
        language: None,
        kind: crate::source::UnitKind::File,
        name: path.to_string(),
        line_range: (1, content.lines().count()),
        content: content.to_string(),
        content_hash: crate::policy::raw_hash(content),
    })
}

#[test]
fn test_equal_depth_snapshots_prefer_stored_chain() {
    let (source, graph) = twin_branches();
    let store = MemoryStore::new();
    ingest(&source, &graph, &store);
    assert!(store.file_snapshot_at("merge", "a.py").is_none());

    // Only the first parent reaches the merge through stored units
    let reconstructor = Reconstructor::with_config(&graph, &store, &source, stored_only());
    let result = reconstructor.reconstruct("merge", "a.py").unwrap().unwrap();
    assert_eq!(
        result.origin,
        Origin::Replay {
            snapshot_sha: "c".to_string(),
            steps: 1
        }
    );
    assert_eq!(result.content, "x = 1\n");
    assert!(!result.is_degraded());
}

#[test]
fn test_equal_depth_uncovered_snapshots_pick_smallest_sha() {
    let (source, graph) = twin_branches();
    let store = MemoryStore::new();
    store.put(file_snapshot("c", "a.py", "x = 1\n")).unwrap();
    store.put(file_snapshot("b", "a.py", "x = 1\n")).unwrap();

    let reconstructor = Reconstructor::new(&graph, &store, &source);
    let result = reconstructor.reconstruct("merge", "a.py").unwrap().unwrap();
    assert_eq!(
        result.origin,
        Origin::Replay {
            snapshot_sha: "b".to_string(),
            steps: 1
        }
    );
    assert_eq!(result.content, "x = 1\n");
    assert!(!result.is_degraded());
}

#[test]
fn test_side_branch_snapshot_yields_to_stored_first_parent_chain() {
    // s1 rewrites a.py into a deeper snapshot than r, but the merge keeps m1's version
    let rewrite: String = (0..40).map(|i| format!("w_{} = {}\n", i, i)).collect();
    let mut source = InMemorySource::new();
    source
        .commit("r", &[], [("a.py", module(0, 0))])
        .commit_changes("m1", &["r"], &[("a.py", Some(module(7, 77).as_str()))])
        .commit_changes("s1", &["r"], &[("a.py", Some(rewrite.as_str()))])
        .commit_changes("mg", &["m1", "s1"], &[("b.py", Some("b = 1\n"))]);
    let graph = build_graph(
        source.raw_commits(),
        vec![("main".to_string(), "mg".to_string())],
    )
    .unwrap();
    let store = MemoryStore::new();
    ingest(&source, &graph, &store);
    assert!(store.diff_for("m1", "a.py", "r").is_some());
    assert!(store.file_snapshot_at("s1", "a.py").is_some());

    let reconstructor = Reconstructor::with_config(&graph, &store, &source, stored_only());
    let result = reconstructor.reconstruct("mg", "a.py").unwrap().unwrap();
    assert_eq!(result.content, module(7, 77));
    assert!(!result.is_degraded());
    assert_eq!(
        result.origin,
        Origin::Replay {
            snapshot_sha: "r".to_string(),
            steps: 2
        }
    );
}

#[test]
fn test_reconstruct_many_matches_sequential() {
    let (source, graph) = linear_history(12);
    let store = MemoryStore::new();
    ingest(&source, &graph, &store);
    let reconstructor = Reconstructor::new(&graph, &store, &source);

    let requests: Vec<(String, String)> = (0..12)
        .map(|i| (format!("c{}", i), "a.py".to_string()))
        .chain(std::iter::once(("c11".to_string(), "b.py".to_string())))
        .collect();
    let results = reconstructor.reconstruct_many(&requests);

    assert_eq!(results.len(), requests.len());
    for ((sha, path), result) in requests.iter().zip(results) {
        let content = result.unwrap().map(|r| r.content);
        assert_eq!(content, source.file_content(sha, path).unwrap());
    }
}
