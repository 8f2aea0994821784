//! Pure lineage-graph helpers.
//!
//! Everything here works on caller-owned, in-memory edge snapshots and holds no
//! state, so the functions are safe to call from any number of tasks at once.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

/// Node -> set of direct downstream nodes. Nodes without outgoing edges are absent.
pub type Adjacency<N> = HashMap<N, HashSet<N>>;

pub fn build_adjacency<N, I>(edges: I) -> Adjacency<N>
where
    N: Copy + Eq + Hash,
    I: IntoIterator<Item = (N, N)>,
{
    let mut adjacency: Adjacency<N> = HashMap::new();
    for (upstream, downstream) in edges {
        adjacency.entry(upstream).or_default().insert(downstream);
    }
    adjacency
}

/// Returns true when adding `upstream -> downstream` would close a cycle,
/// i.e. `upstream` is already reachable from `downstream` (or they are equal).
///
/// The walk is an iterative DFS with an explicit stack, so long chains cannot
/// exhaust the call stack, and the visited set bounds it to O(V + E).
pub fn would_create_cycle<N>(adjacency: &Adjacency<N>, upstream: N, downstream: N) -> bool
where
    N: Copy + Eq + Hash,
{
    if upstream == downstream {
        return true;
    }

    let mut visited: HashSet<N> = HashSet::new();
    let mut stack = vec![downstream];

    while let Some(node) = stack.pop() {
        if node == upstream {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        if let Some(neighbours) = adjacency.get(&node) {
            stack.extend(neighbours.iter().filter(|n| !visited.contains(*n)).copied());
        }
    }

    false
}

/// Kahn's algorithm over every node the adjacency mentions.
pub fn is_acyclic<N>(adjacency: &Adjacency<N>) -> bool
where
    N: Copy + Eq + Hash,
{
    let mut in_degree: HashMap<N, usize> = HashMap::new();
    for (node, neighbours) in adjacency {
        in_degree.entry(*node).or_insert(0);
        for neighbour in neighbours {
            *in_degree.entry(*neighbour).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<N> = in_degree
        .iter()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(&node, _)| node)
        .collect();

    let mut drained = 0;
    while let Some(node) = queue.pop_front() {
        drained += 1;
        let Some(neighbours) = adjacency.get(&node) else {
            continue;
        };
        for neighbour in neighbours {
            if let Some(degree) = in_degree.get_mut(neighbour) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*neighbour);
                }
            }
        }
    }

    drained == in_degree.len()
}
