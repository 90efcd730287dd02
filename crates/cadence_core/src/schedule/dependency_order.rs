//! Dependency resolution for the update functions of one phase.
//!
//! Kahn's algorithm, except that the ready set is a priority queue: among the
//! functions whose dependencies have all been placed, the highest priority goes
//! next, and registration order breaks ties so the result is deterministic.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Input node: one registered update function.
pub(crate) struct OrderNode<'a> {
    pub name: &'a str,
    pub depends_on: &'a [String],
    pub priority: f32,
    /// Registration sequence, lower registered earlier.
    pub seq: u64,
}

/// Resolved execution plan for a phase. All indices refer to the input slice.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct PhaseOrder {
    /// Full sequential order.
    pub order: Vec<usize>,
    /// Groups of mutually independent functions; each level only depends on earlier ones.
    pub levels: Vec<Vec<usize>>,
    /// Resolved dependencies of each node (unknown names dropped).
    pub dependencies: Vec<Vec<usize>>,
}

/// Names of the functions that could not be ordered because of a cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CycleError {
    pub names: Vec<String>,
}

pub(crate) fn resolve_order(nodes: &[OrderNode<'_>]) -> Result<PhaseOrder, CycleError> {
    let by_name: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (node.name, index))
        .collect();

    // 1. Resolve edges; dependencies on names outside this phase are ignored.
    let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(nodes.len());
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (index, node) in nodes.iter().enumerate() {
        let mut resolved = Vec::with_capacity(node.depends_on.len());
        for name in node.depends_on {
            match by_name.get(name.as_str()) {
                Some(&parent) => {
                    resolved.push(parent);
                    dependents[parent].push(index);
                }
                None => tracing::debug!(
                    function = node.name,
                    dependency = %name,
                    "ignoring dependency on unregistered update function"
                ),
            }
        }
        dependencies.push(resolved);
    }

    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();

    // 2. Seed the ready queue with every root.
    let mut ready: BinaryHeap<Ready> = nodes
        .iter()
        .enumerate()
        .filter(|(index, _)| in_degree[*index] == 0)
        .map(|(index, node)| Ready::new(index, node))
        .collect();

    // 3. Drain in priority order, tracking the level of each node.
    let mut order = Vec::with_capacity(nodes.len());
    let mut level_of = vec![0usize; nodes.len()];
    while let Some(Ready { index, .. }) = ready.pop() {
        order.push(index);
        level_of[index] = dependencies[index]
            .iter()
            .map(|&parent| level_of[parent] + 1)
            .max()
            .unwrap_or(0);
        for &child in &dependents[index] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.push(Ready::new(child, &nodes[child]));
            }
        }
    }

    // 4. Anything left over sits on or behind a cycle.
    if order.len() != nodes.len() {
        let stuck: Vec<bool> = in_degree.iter().map(|&degree| degree > 0).collect();
        let names = cycle_members(&stuck, &dependencies, &dependents)
            .into_iter()
            .map(|index| nodes[index].name.to_string())
            .collect();
        return Err(CycleError { names });
    }

    let level_count = order.iter().map(|&i| level_of[i] + 1).max().unwrap_or(0);
    let mut levels = vec![Vec::new(); level_count];
    for &index in &order {
        levels[level_of[index]].push(index);
    }

    Ok(PhaseOrder {
        order,
        levels,
        dependencies,
    })
}

/// Members of one cycle among the `stuck` nodes, in registration order.
///
/// Every stuck node has a stuck dependency, so following those from any stuck
/// node must revisit one. The revisited node's strongly connected component is
/// the cycle; nodes that merely depend on it are left out.
fn cycle_members(
    stuck: &[bool],
    dependencies: &[Vec<usize>],
    dependents: &[Vec<usize>],
) -> Vec<usize> {
    let Some(mut current) = stuck.iter().position(|&s| s) else {
        return Vec::new();
    };
    let mut seen = vec![false; stuck.len()];
    while !seen[current] {
        seen[current] = true;
        match dependencies[current].iter().find(|&&parent| stuck[parent]) {
            Some(&parent) => current = parent,
            None => break,
        }
    }

    let upstream = reachable(current, stuck, dependencies);
    let downstream = reachable(current, stuck, dependents);
    (0..stuck.len())
        .filter(|&index| upstream[index] && downstream[index])
        .collect()
}

fn reachable(start: usize, stuck: &[bool], edges: &[Vec<usize>]) -> Vec<bool> {
    let mut visited = vec![false; stuck.len()];
    let mut stack = vec![start];
    visited[start] = true;
    while let Some(index) = stack.pop() {
        for &next in &edges[index] {
            if stuck[next] && !visited[next] {
                visited[next] = true;
                stack.push(next);
            }
        }
    }
    visited
}

struct Ready {
    index: usize,
    priority: f32,
    seq: u64,
}

impl Ready {
    fn new(index: usize, node: &OrderNode<'_>) -> Self {
        Self {
            index,
            priority: node.priority,
            seq: node.seq,
        }
    }
}

// Max-heap: higher priority first, then earlier registration.
impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ready {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ready {}
