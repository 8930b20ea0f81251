use super::*;

/// root -> a -> b -> merge <- c <- root, plus a side branch off `a`
///
/// ```text
/// root -- a -- b ------ merge (main)
///   \      \           /
///    \      side      /
///     c -------------
/// ```
fn diamond() -> CommitGraph {
    build_graph(
        vec![
            RawCommit::new("root", &[]),
            RawCommit::new("a", &["root"]),
            RawCommit::new("b", &["a"]),
            RawCommit::new("c", &["root"]),
            RawCommit::new("merge", &["b", "c"]),
            RawCommit::new("side", &["a"]),
        ],
        vec![
            ("main".to_string(), "merge".to_string()),
            ("feature".to_string(), "side".to_string()),
        ],
    )
    .unwrap()
}

fn linear(n: usize) -> CommitGraph {
    let commits: Vec<RawCommit> = (0..n)
        .map(|i| {
            if i == 0 {
                RawCommit::new("c0", &[])
            } else {
                let parent = format!("c{}", i - 1);
                RawCommit::new(format!("c{}", i), &[parent.as_str()])
            }
        })
        .collect();
    build_graph(commits, vec![("main".to_string(), format!("c{}", n - 1))]).unwrap()
}

#[test]
fn test_children_are_symmetric() {
    let graph = diamond();
    for commit in graph.commits() {
        for parent in graph.parents_in_graph(&commit.sha) {
            assert!(
                graph.get(parent).unwrap().children.contains(&commit.sha),
                "{} should list {} as child",
                parent,
                commit.sha
            );
        }
    }
    assert_eq!(graph.get("root").unwrap().children, vec!["a", "c"]);
    assert_eq!(graph.get("a").unwrap().children, vec!["b", "side"]);
}

#[test]
fn test_empty_sha_is_malformed() {
    let result = build_graph(vec![RawCommit::new("", &[])], Vec::new());
    assert!(matches!(result, Err(HistoryError::MalformedHistory(_))));
}

#[test]
fn test_duplicate_sha_is_malformed() {
    let result = build_graph(
        vec![RawCommit::new("x", &[]), RawCommit::new("x", &[])],
        Vec::new(),
    );
    assert!(matches!(result, Err(HistoryError::MalformedHistory(_))));
}

#[test]
fn test_dangling_references_are_tolerated() {
    let graph = build_graph(
        vec![RawCommit::new("a", &["shallow-parent"])],
        vec![("gone".to_string(), "missing".to_string())],
    )
    .unwrap();

    assert_eq!(graph.dangling_parents(), vec![("a", "shallow-parent")]);
    assert_eq!(graph.dangling_tips(), vec!["gone"]);
    assert_eq!(graph.depth("a").unwrap(), 0);
    assert!(graph.branches_containing("a").is_empty());
}

#[test]
fn test_topological_order_parents_first() {
    let graph = diamond();
    let order = graph.topological_order().unwrap();

    assert_eq!(order.len(), graph.len());
    let unique: std::collections::HashSet<_> = order.iter().collect();
    assert_eq!(unique.len(), order.len(), "every sha exactly once");

    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, sha)| (sha.as_str(), i))
        .collect();
    for commit in graph.commits() {
        for parent in graph.parents_in_graph(&commit.sha) {
            assert!(
                position[parent] < position[commit.sha.as_str()],
                "{} must come before {}",
                parent,
                commit.sha
            );
        }
    }
    assert_eq!(order.first().map(String::as_str), Some("root"));
}

#[test]
fn test_topological_order_is_deterministic() {
    let first = diamond().topological_order().unwrap();
    let second = diamond().topological_order().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_topological_order_detects_cycle() {
    let graph = build_graph(
        vec![RawCommit::new("x", &["y"]), RawCommit::new("y", &["x"])],
        Vec::new(),
    )
    .unwrap();
    assert!(matches!(
        graph.topological_order(),
        Err(HistoryError::MalformedHistory(_))
    ));
}

#[test]
fn test_depth() {
    let graph = diamond();
    assert_eq!(graph.depth("root").unwrap(), 0);
    assert_eq!(graph.depth("a").unwrap(), 1);
    assert_eq!(graph.depth("c").unwrap(), 1);
    assert_eq!(graph.depth("b").unwrap(), 2);
    assert_eq!(graph.depth("merge").unwrap(), 3);
    assert_eq!(graph.depth("side").unwrap(), 2);
}

#[test]
fn test_depth_recurrence_holds_everywhere() {
    let graph = diamond();
    for commit in graph.commits() {
        let parents: Vec<&str> = graph.parents_in_graph(&commit.sha).collect();
        let depth = graph.depth(&commit.sha).unwrap();
        if parents.is_empty() {
            assert_eq!(depth, 0);
        } else {
            let max_parent = parents.iter().map(|p| graph.depth(p).unwrap()).max().unwrap();
            assert_eq!(depth, max_parent + 1);
        }
    }
}

#[test]
fn test_depth_unknown_commit() {
    let graph = diamond();
    assert!(matches!(
        graph.depth("nope"),
        Err(HistoryError::UnknownCommit(_))
    ));
}

#[test]
fn test_depth_on_long_history_does_not_recurse() {
    let graph = linear(50_000);
    assert_eq!(graph.depth("c49999").unwrap(), 49_999);
}

#[test]
fn test_is_ancestor() {
    let graph = diamond();
    assert!(graph.is_ancestor("root", "merge"));
    assert!(graph.is_ancestor("c", "merge"));
    assert!(graph.is_ancestor("a", "side"));
    assert!(!graph.is_ancestor("side", "merge"));
    assert!(!graph.is_ancestor("merge", "root"));
    assert!(!graph.is_ancestor("b", "c"));
}

#[test]
fn test_is_ancestor_reflexive_and_transitive() {
    let graph = diamond();
    let shas: Vec<String> = graph.commits().map(|c| c.sha.clone()).collect();
    for a in &shas {
        assert!(graph.is_ancestor(a, a));
        for b in &shas {
            for c in &shas {
                if graph.is_ancestor(a, b) && graph.is_ancestor(b, c) {
                    assert!(graph.is_ancestor(a, c), "{} <= {} <= {}", a, b, c);
                }
            }
        }
    }
}

#[test]
fn test_is_ancestor_wide_merge_history() {
    // Chain of diamonds: naive recursion would be exponential here
    let mut commits = vec![RawCommit::new("d0", &[])];
    for i in 1..=40 {
        let prev = format!("d{}", i - 1);
        let left = format!("l{}", i);
        let right = format!("r{}", i);
        commits.push(RawCommit::new(left.clone(), &[prev.as_str()]));
        commits.push(RawCommit::new(right.clone(), &[prev.as_str()]));
        commits.push(RawCommit::new(
            format!("d{}", i),
            &[left.as_str(), right.as_str()],
        ));
    }
    let graph = build_graph(commits, Vec::new()).unwrap();

    assert!(graph.is_ancestor("d0", "d40"));
    assert!(!graph.is_ancestor("l40", "r40"));
    assert_eq!(graph.depth("d40").unwrap(), 80);
}

#[test]
fn test_ancestors_include_self() {
    let graph = diamond();
    let ancestors = graph.ancestors("b").unwrap();
    let mut sorted: Vec<_> = ancestors.into_iter().collect();
    sorted.sort();
    assert_eq!(sorted, vec!["a", "b", "root"]);
}

#[test]
fn test_common_ancestor() {
    let graph = diamond();
    assert_eq!(
        graph.common_ancestor("side", "merge").unwrap(),
        Some("a".to_string())
    );
    assert_eq!(
        graph.common_ancestor("b", "c").unwrap(),
        Some("root".to_string())
    );
    assert_eq!(
        graph.common_ancestor("b", "merge").unwrap(),
        Some("b".to_string())
    );
}

#[test]
fn test_common_ancestor_tie_breaks_on_smallest_sha() {
    // Criss-cross: both x and y are merges of p and q
    let graph = build_graph(
        vec![
            RawCommit::new("base", &[]),
            RawCommit::new("q", &["base"]),
            RawCommit::new("p", &["base"]),
            RawCommit::new("x", &["p", "q"]),
            RawCommit::new("y", &["q", "p"]),
        ],
        Vec::new(),
    )
    .unwrap();
    assert_eq!(
        graph.common_ancestor("x", "y").unwrap(),
        Some("p".to_string())
    );
}

#[test]
fn test_common_ancestor_disjoint_histories() {
    let graph = build_graph(
        vec![RawCommit::new("one", &[]), RawCommit::new("two", &[])],
        Vec::new(),
    )
    .unwrap();
    assert_eq!(graph.common_ancestor("one", "two").unwrap(), None);
    assert!(matches!(
        graph.common_ancestor("one", "three"),
        Err(HistoryError::UnknownCommit(_))
    ));
}

#[test]
fn test_branches_containing() {
    let graph = diamond();
    assert_eq!(graph.branches_containing("a"), vec!["feature", "main"]);
    assert_eq!(graph.branches_containing("c"), vec!["main"]);
    assert_eq!(graph.branches_containing("side"), vec!["feature"]);
}

#[test]
fn test_path_between() {
    let graph = diamond();
    assert_eq!(
        graph.path_between("root", "merge").unwrap(),
        vec!["root", "c", "merge"]
    );
    assert_eq!(
        graph.path_between("a", "merge").unwrap(),
        vec!["a", "b", "merge"]
    );
    assert_eq!(graph.path_between("b", "b").unwrap(), vec!["b"]);
    assert!(graph.path_between("side", "merge").is_none());
    assert!(graph.path_between("missing", "merge").is_none());
}

#[test]
fn test_first_parent_path() {
    let graph = diamond();
    assert_eq!(
        graph.first_parent_path("root", "merge").unwrap(),
        vec!["root", "a", "b", "merge"]
    );
    assert_eq!(graph.first_parent_path("merge", "merge").unwrap(), vec!["merge"]);
    // c is only reachable through the second parent
    assert!(graph.first_parent_path("c", "merge").is_none());
    assert!(graph.first_parent_path("root", "missing").is_none());
}

#[test]
fn test_commit_flags() {
    let graph = diamond();
    assert!(graph.get("root").unwrap().is_root());
    assert!(graph.get("merge").unwrap().is_merge());
    assert_eq!(graph.get("merge").unwrap().first_parent(), Some("b"));
}
