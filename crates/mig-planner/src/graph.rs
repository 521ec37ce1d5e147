//! Task dependency graph
//!
//! Tasks are loaded into an index arena (`petgraph::DiGraph`) with one
//! edge per resolved dependency, pointing from the dependency to the
//! dependent task. Dependency ids that name no task are kept on the
//! node records but produce no edge, so dangling references never fail a
//! build.

use crate::types::MigrationTask;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One task in the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraphNode {
    /// Task id
    pub task_id: String,
    /// Direct predecessors, verbatim from the task
    pub depends_on: Vec<String>,
    /// Direct successors
    pub blocked_by: Vec<String>,
    /// `depends_on` is empty
    pub can_run_in_parallel: bool,
    /// On the longest weighted path
    pub critical_path: bool,
}

/// Index arena over task ids
struct TaskArena<'a> {
    graph: DiGraph<&'a str, ()>,
    index: HashMap<&'a str, NodeIndex>,
}

impl<'a> TaskArena<'a> {
    fn build<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [String])> + Clone,
    {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for (id, _) in entries.clone() {
            index.entry(id).or_insert_with(|| graph.add_node(id));
        }
        for (id, deps) in entries {
            let to = index[id];
            for dep in deps {
                if let Some(&from) = index.get(dep.as_str()) {
                    graph.update_edge(from, to, ());
                }
            }
        }
        Self { graph, index }
    }

    fn from_tasks(tasks: &'a [MigrationTask]) -> Self {
        Self::build(tasks.iter().map(|t| (t.id.as_str(), t.dependencies.as_slice())))
    }

    fn from_nodes(nodes: &'a [DependencyGraphNode]) -> Self {
        Self::build(nodes.iter().map(|n| (n.task_id.as_str(), n.depends_on.as_slice())))
    }

    fn sorted_neighbors(&self, node: NodeIndex, dir: Direction) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self.graph.neighbors_directed(node, dir).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Kahn layering; returns the batches and the nodes left on cycles
    fn layers(&self) -> (Vec<Vec<NodeIndex>>, Vec<NodeIndex>) {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();

        let mut batches = Vec::new();
        let mut current: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .collect();
        let mut placed = 0;

        while !current.is_empty() {
            let mut next = Vec::new();
            for &node in &current {
                for succ in self.graph.neighbors_directed(node, Direction::Outgoing) {
                    let deg = &mut in_degree[succ.index()];
                    *deg -= 1;
                    if *deg == 0 {
                        next.push(succ);
                    }
                }
            }
            next.sort_unstable();
            placed += current.len();
            batches.push(std::mem::replace(&mut current, next));
        }

        let stuck = if placed == self.graph.node_count() {
            Vec::new()
        } else {
            self.graph
                .node_indices()
                .filter(|n| in_degree[n.index()] > 0)
                .collect()
        };
        (batches, stuck)
    }

    fn ids(&self, nodes: &[NodeIndex]) -> Vec<String> {
        nodes.iter().map(|n| self.graph[*n].to_string()).collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Build one graph node per task, in input order
#[must_use]
pub fn build_graph(tasks: &[MigrationTask]) -> Vec<DependencyGraphNode> {
    let critical: HashSet<String> = critical_path(tasks).into_iter().collect();

    tasks
        .iter()
        .map(|task| DependencyGraphNode {
            task_id: task.id.clone(),
            depends_on: task.dependencies.clone(),
            blocked_by: tasks
                .iter()
                .filter(|other| other.dependencies.contains(&task.id))
                .map(|other| other.id.clone())
                .collect(),
            can_run_in_parallel: task.dependencies.is_empty(),
            critical_path: critical.contains(&task.id),
        })
        .collect()
}

/// Find dependency cycles
///
/// Each cycle is reported once, as the ids along the "depends on"
/// direction starting from its smallest id. A self-dependent task is a
/// cycle of length one.
#[must_use]
pub fn detect_circular_dependencies(tasks: &[MigrationTask]) -> Vec<Vec<String>> {
    let arena = TaskArena::from_tasks(tasks);
    let mut color = vec![Color::White; arena.graph.node_count()];
    let mut seen = HashSet::new();
    let mut cycles = Vec::new();

    for start in arena.graph.node_indices() {
        if color[start.index()] == Color::White {
            visit(&arena, start, &mut color, &mut seen, &mut cycles);
        }
    }
    if !cycles.is_empty() {
        tracing::debug!(count = cycles.len(), "detected circular task dependencies");
    }
    cycles
}

/// Pending dependencies of a node on the DFS stack
struct Frame {
    node: NodeIndex,
    deps: Vec<NodeIndex>,
    next: usize,
}

/// Depth-first walk from `root` on an explicit stack
fn visit(
    arena: &TaskArena<'_>,
    root: NodeIndex,
    color: &mut [Color],
    seen: &mut HashSet<Vec<String>>,
    cycles: &mut Vec<Vec<String>>,
) {
    // Incoming edges lead to the node's dependencies
    let enter = |node: NodeIndex| Frame {
        node,
        deps: arena.sorted_neighbors(node, Direction::Incoming),
        next: 0,
    };
    color[root.index()] = Color::Gray;
    let mut path = vec![root];
    let mut frames = vec![enter(root)];

    while let Some(frame) = frames.last_mut() {
        let node = frame.node;
        let Some(&dep) = frame.deps.get(frame.next) else {
            color[node.index()] = Color::Black;
            path.pop();
            frames.pop();
            continue;
        };
        frame.next += 1;

        match color[dep.index()] {
            Color::White => {
                color[dep.index()] = Color::Gray;
                path.push(dep);
                frames.push(enter(dep));
            }
            Color::Gray => {
                if let Some(pos) = path.iter().position(|n| *n == dep) {
                    let cycle = normalize_cycle(arena.ids(&path[pos..]));
                    if seen.insert(cycle.clone()) {
                        cycles.push(cycle);
                    }
                }
            }
            Color::Black => {}
        }
    }
}

fn normalize_cycle(mut ids: Vec<String>) -> Vec<String> {
    if let Some(min_pos) = ids
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
    {
        ids.rotate_left(min_pos);
    }
    ids
}

/// Group tasks into batches that can run in parallel
///
/// A task enters batch `k` once all of its resolvable dependencies are in
/// batches `0..k`. Tasks stuck on a cycle are appended as one final batch.
#[must_use]
pub fn get_execution_order(graph: &[DependencyGraphNode]) -> Vec<Vec<String>> {
    let arena = TaskArena::from_nodes(graph);
    let (batches, stuck) = arena.layers();
    let mut out: Vec<Vec<String>> = batches.iter().map(|b| arena.ids(b)).collect();
    if !stuck.is_empty() {
        tracing::warn!(
            tasks = stuck.len(),
            "tasks on dependency cycles scheduled in a final batch"
        );
        out.push(arena.ids(&stuck));
    }
    out
}

/// Percentage (floored) of nodes that have no dependencies
#[must_use]
pub fn calculate_parallelism_score(graph: &[DependencyGraphNode]) -> u8 {
    if graph.is_empty() {
        return 0;
    }
    let parallel = graph.iter().filter(|n| n.can_run_in_parallel).count();
    u8::try_from(parallel * 100 / graph.len()).unwrap_or(100)
}

/// Total minutes when each batch runs in parallel and batches run in sequence
#[must_use]
pub fn estimate_total_time(
    graph: &[DependencyGraphNode],
    tasks: &[MigrationTask],
    use_automation: bool,
) -> u32 {
    let mut durations: HashMap<&str, u32> = HashMap::new();
    for task in tasks {
        durations
            .entry(task.id.as_str())
            .or_insert_with(|| task.duration(use_automation));
    }

    get_execution_order(graph)
        .iter()
        .map(|batch| {
            batch
                .iter()
                .map(|id| durations.get(id.as_str()).copied().unwrap_or(0))
                .max()
                .unwrap_or(0)
        })
        .fold(0u32, u32::saturating_add)
}

/// Task ids on the longest path weighted by manual estimates, root first
#[must_use]
pub fn critical_path(tasks: &[MigrationTask]) -> Vec<String> {
    let arena = TaskArena::from_tasks(tasks);
    let mut weight = vec![0u64; arena.graph.node_count()];
    for task in tasks {
        if let Some(&n) = arena.index.get(task.id.as_str()) {
            if weight[n.index()] == 0 {
                weight[n.index()] = u64::from(task.estimated_minutes);
            }
        }
    }

    let (batches, _) = arena.layers();
    let mut dist: Vec<Option<u64>> = vec![None; arena.graph.node_count()];
    let mut best_pred: Vec<Option<NodeIndex>> = vec![None; arena.graph.node_count()];

    for node in batches.iter().flatten() {
        let mut best: Option<(u64, NodeIndex)> = None;
        for pred in arena.sorted_neighbors(*node, Direction::Incoming) {
            if let Some(d) = dist[pred.index()] {
                if best.map_or(true, |(bd, _)| d > bd) {
                    best = Some((d, pred));
                }
            }
        }
        let reach = best.map_or(0, |(d, _)| d);
        dist[node.index()] = Some(reach.saturating_add(weight[node.index()]));
        best_pred[node.index()] = best.map(|(_, p)| p);
    }

    let mut end: Option<(u64, NodeIndex)> = None;
    for node in arena.graph.node_indices() {
        if let Some(d) = dist[node.index()] {
            if end.map_or(true, |(bd, _)| d > bd) {
                end = Some((d, node));
            }
        }
    }

    let mut path: Vec<NodeIndex> = Vec::new();
    if let Some((total, mut node)) = end {
        if total == 0 {
            return Vec::new();
        }
        loop {
            path.push(node);
            match best_pred[node.index()] {
                Some(p) => node = p,
                None => break,
            }
        }
    }
    path.reverse();
    arena.ids(&path)
}
