//! Attack graph extraction.
//!
//! Starting from a seed set, walks pwn edges breadth-first and collects
//! the reachable objects into a standalone graph. The result borrows
//! nothing from the store; nodes carry `ObjectId`s back into it.

use crate::edge::PwnMethod;
use crate::graph::{ObjectGraph, ObjectId};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Which way the walk follows pwn edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Who can reach the seeds: step from a victim to its attackers.
    #[default]
    Normal,
    /// What the seeds can reach: step from an attacker to its victims.
    Inverted,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Normal => write!(f, "normal"),
            Direction::Inverted => write!(f, "inverted"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Direction::Normal),
            "inverted" | "reverse" => Ok(Direction::Inverted),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// Methods the walk may follow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MethodFilter {
    #[default]
    All,
    Only(BTreeSet<PwnMethod>),
}

impl MethodFilter {
    pub fn allows(&self, method: PwnMethod) -> bool {
        match self {
            MethodFilter::All => true,
            MethodFilter::Only(methods) => methods.contains(&method),
        }
    }
}

impl FromIterator<PwnMethod> for MethodFilter {
    fn from_iter<I: IntoIterator<Item = PwnMethod>>(iter: I) -> Self {
        MethodFilter::Only(iter.into_iter().collect())
    }
}

/// An extracted attack graph, edges oriented attacker → victim.
#[derive(Debug, Default)]
pub struct PwnGraph {
    graph: DiGraph<ObjectId, BTreeSet<PwnMethod>>,
    index: HashMap<ObjectId, NodeIndex>,
    depth: HashMap<ObjectId, usize>,
}

impl PwnGraph {
    /// Objects in discovery order, seeds first.
    pub fn objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.graph.node_weights().copied()
    }

    /// Each edge as (attacker, victim, methods).
    pub fn edges(&self) -> impl Iterator<Item = (ObjectId, ObjectId, &BTreeSet<PwnMethod>)> {
        self.graph.edge_indices().filter_map(move |edge| {
            let (source, target) = self.graph.edge_endpoints(edge)?;
            Some((self.graph[source], self.graph[target], &self.graph[edge]))
        })
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.index.contains_key(&id)
    }

    /// Hops from the nearest seed.
    pub fn depth(&self, id: ObjectId) -> Option<usize> {
        self.depth.get(&id).copied()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    fn add_node(&mut self, id: ObjectId, depth: usize) {
        let node = self.graph.add_node(id);
        self.index.insert(id, node);
        self.depth.insert(id, depth);
    }

    fn add_edge(&mut self, attacker: ObjectId, victim: ObjectId, method: PwnMethod) {
        let (Some(&from), Some(&to)) = (self.index.get(&attacker), self.index.get(&victim)) else {
            return;
        };
        match self.graph.find_edge(from, to) {
            Some(edge) => {
                self.graph[edge].insert(method);
            }
            None => {
                self.graph.add_edge(from, to, BTreeSet::from([method]));
            }
        }
    }
}

/// Walks the store from `seeds` up to `max_depth` hops.
///
/// Each object is visited once at the depth it is first reached. Edges are
/// kept only when both endpoints made it into the result, so the boundary
/// at `max_depth` never leaves dangling edges.
pub fn build(
    graph: &ObjectGraph,
    seeds: &[ObjectId],
    methods: &MethodFilter,
    direction: Direction,
    max_depth: usize,
) -> PwnGraph {
    let mut result = PwnGraph::default();
    let mut visited: HashSet<ObjectId> = HashSet::new();
    let mut queue: VecDeque<(ObjectId, usize)> = VecDeque::new();
    let mut traversed: Vec<(ObjectId, ObjectId, PwnMethod)> = Vec::new();

    for &seed in seeds {
        if graph.get(seed).is_some() && visited.insert(seed) {
            result.add_node(seed, 0);
            queue.push_back((seed, 0));
        }
    }

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }

        let neighbours = match direction {
            Direction::Normal => graph.pwnable_by(current),
            Direction::Inverted => graph.can_pwn(current),
        };

        for (method, next) in neighbours {
            if !methods.allows(method) {
                continue;
            }
            let edge = match direction {
                Direction::Normal => (next, current, method),
                Direction::Inverted => (current, next, method),
            };
            traversed.push(edge);

            if visited.insert(next) {
                result.add_node(next, depth + 1);
                queue.push_back((next, depth + 1));
            }
        }
    }

    for (attacker, victim, method) in traversed {
        result.add_edge(attacker, victim, method);
    }

    debug!(
        "Built {} graph: {} nodes, {} edges from {} seeds",
        direction,
        result.node_count(),
        result.edge_count(),
        seeds.len()
    );
    result
}
