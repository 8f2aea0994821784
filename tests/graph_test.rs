use std::collections::HashSet;

use lineage_registry_service::graph::{build_adjacency, is_acyclic, would_create_cycle, Adjacency};

fn adjacency(edges: &[(i64, i64)]) -> Adjacency<i64> {
    build_adjacency(edges.iter().copied())
}

#[test]
fn test_empty_graph_never_creates_cycle_for_distinct_pair() {
    let adj = adjacency(&[]);
    assert!(!would_create_cycle(&adj, 1, 2));
    assert!(!would_create_cycle(&adj, 2, 1));
}

#[test]
fn test_self_loop_is_always_a_cycle() {
    assert!(would_create_cycle(&adjacency(&[]), 1, 1));
    assert!(would_create_cycle(&adjacency(&[(1, 2), (2, 3)]), 2, 2));
}

#[test]
fn test_direct_reverse_edge_is_cycle() {
    // Given: 1 -> 2
    let adj = adjacency(&[(1, 2)]);

    // Then: 2 -> 1 closes a loop
    assert!(would_create_cycle(&adj, 2, 1));
}

#[test]
fn test_transitive_cycle_is_detected() {
    // Given: A -> B -> C
    let adj = build_adjacency([('a', 'b'), ('b', 'c')]);

    // Then: C -> A is rejected, A -> C is a harmless shortcut
    assert!(would_create_cycle(&adj, 'c', 'a'));
    assert!(!would_create_cycle(&adj, 'a', 'c'));
}

#[test]
fn test_diamond_and_extensions() {
    // Given: 1 -> {2, 3} -> 4
    let adj = adjacency(&[(1, 2), (1, 3), (2, 4), (3, 4)]);

    assert!(!would_create_cycle(&adj, 4, 5));
    assert!(!would_create_cycle(&adj, 2, 3));
    assert!(would_create_cycle(&adj, 4, 1));
}

#[test]
fn test_disconnected_components_do_not_interfere() {
    let adj = adjacency(&[(1, 2), (2, 3), (10, 11), (11, 12)]);

    assert!(!would_create_cycle(&adj, 3, 10));
    assert!(!would_create_cycle(&adj, 12, 1));
    assert!(would_create_cycle(&adj, 12, 10));
}

#[test]
fn test_long_chain_does_not_exhaust_the_stack() {
    let n = 200_000;
    let adj = build_adjacency((0..n - 1).map(|i: i64| (i, i + 1)));

    assert!(would_create_cycle(&adj, n - 1, 0));
    assert!(!would_create_cycle(&adj, n - 1, n));
}

#[test]
fn test_traversal_terminates_on_existing_cycle() {
    // Stored data should never look like this, but the walk must still end.
    let adj = adjacency(&[(1, 2), (2, 3), (3, 1)]);

    assert!(!would_create_cycle(&adj, 9, 1));
    assert!(would_create_cycle(&adj, 3, 2));
}

/// Brute-force reachability over every directed graph on four nodes.
#[test]
fn test_cycle_check_matches_transitive_closure_on_all_small_graphs() {
    const N: usize = 4;
    let pairs: Vec<(usize, usize)> = (0..N)
        .flat_map(|u| (0..N).map(move |d| (u, d)))
        .filter(|(u, d)| u != d)
        .collect();

    for mask in 0u32..(1 << pairs.len()) {
        let edges: Vec<(usize, usize)> = pairs
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, &p)| p)
            .collect();

        let mut reach = [[false; N]; N];
        for &(u, d) in &edges {
            reach[u][d] = true;
        }
        for k in 0..N {
            for i in 0..N {
                for j in 0..N {
                    if reach[i][k] && reach[k][j] {
                        reach[i][j] = true;
                    }
                }
            }
        }

        let adj = build_adjacency(edges.iter().copied());
        for &(u, d) in &pairs {
            if edges.contains(&(u, d)) {
                continue;
            }
            assert_eq!(
                would_create_cycle(&adj, u, d),
                reach[d][u],
                "edges {:?}, proposed {} -> {}",
                edges,
                u,
                d
            );
        }
    }
}

#[test]
fn test_build_adjacency_groups_by_source() {
    let adj = adjacency(&[(1, 2), (2, 3), (1, 3)]);

    assert_eq!(adj.len(), 2);
    assert_eq!(adj[&1], HashSet::from([2, 3]));
    assert_eq!(adj[&2], HashSet::from([3]));
    assert!(!adj.contains_key(&3), "sinks have no entry");
}

#[test]
fn test_build_adjacency_ignores_input_order_and_repeats() {
    let edges = [(1, 2), (2, 3), (1, 3), (3, 4), (5, 1)];
    let mut reversed = edges;
    reversed.reverse();
    let mut rotated = edges;
    rotated.rotate_left(2);

    let expected = adjacency(&edges);
    assert_eq!(adjacency(&reversed), expected);
    assert_eq!(adjacency(&rotated), expected);

    let doubled: Vec<(i64, i64)> = edges.iter().chain(edges.iter()).copied().collect();
    assert_eq!(adjacency(&doubled), expected);
}

#[test]
fn test_is_acyclic() {
    assert!(is_acyclic(&adjacency(&[])));
    assert!(is_acyclic(&adjacency(&[(1, 2), (1, 3), (2, 4), (3, 4)])));
    assert!(!is_acyclic(&adjacency(&[(1, 2), (2, 3), (3, 1)])));
    assert!(!is_acyclic(&adjacency(&[(1, 2), (5, 6), (6, 5)])));
}
