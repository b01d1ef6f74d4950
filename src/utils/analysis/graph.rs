use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::config::ScoringConfig;
use crate::core::{Ambiguity, EdgeKind, FileType};

/// Inbound edge count at which `graph_importance` saturates
const IMPORTANCE_SATURATION: f64 = 15.0;
/// Maximum reverse-edge depth searched for an entry point
const ENTRY_SEARCH_DEPTH: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphNode {
    pub repo: String,
    pub file_type: FileType,
    pub is_entry: bool,
    pub symbol_names: Vec<String>,
}

/// `from` depends on `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub from: PathBuf,
    pub to: PathBuf,
    pub kind: EdgeKind,
    pub specifiers: Vec<String>,
}

/// Structural signals of one file, all in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GraphSignals {
    pub graph_importance: f64,
    pub caller_crit_weight: f64,
    pub entry_proximity: f64,
    pub exclusivity: f64,
}

/// Import/injection graph of every source file in the scanned repositories
#[derive(Debug, Clone, Default)]
pub struct RepoGraph {
    nodes: BTreeMap<PathBuf, GraphNode>,
    edges: BTreeMap<PathBuf, Vec<GraphEdge>>,
    reverse_edges: BTreeMap<PathBuf, Vec<GraphEdge>>,
    ambiguities: Vec<Ambiguity>,
}

impl RepoGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, path: PathBuf, node: GraphNode) {
        self.nodes.insert(path, node);
    }

    /// Adds `from -> to`. Self-edges are ignored; a second edge of the same
    /// kind between the same pair merges its specifiers into the first.
    pub fn add_edge(&mut self, from: PathBuf, to: PathBuf, kind: EdgeKind, specifiers: Vec<String>) {
        if from == to {
            return;
        }

        let merge = |list: &mut Vec<GraphEdge>| {
            if let Some(existing) = list
                .iter_mut()
                .find(|e| e.from == from && e.to == to && e.kind == kind)
            {
                for s in &specifiers {
                    if !existing.specifiers.contains(s) {
                        existing.specifiers.push(s.clone());
                    }
                }
                true
            } else {
                false
            }
        };

        let forward = self.edges.entry(from.clone()).or_default();
        if !merge(forward) {
            forward.push(GraphEdge {
                from: from.clone(),
                to: to.clone(),
                kind,
                specifiers: specifiers.clone(),
            });
        }

        let reverse = self.reverse_edges.entry(to.clone()).or_default();
        if !merge(reverse) {
            reverse.push(GraphEdge {
                from,
                to,
                kind,
                specifiers,
            });
        }
    }

    pub fn record_ambiguity(&mut self, ambiguity: Ambiguity) {
        self.ambiguities.push(ambiguity);
    }

    pub fn node(&self, path: &Path) -> Option<&GraphNode> {
        self.nodes.get(path)
    }

    pub fn has_node(&self, path: &Path) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn ambiguities(&self) -> &[Ambiguity] {
        &self.ambiguities
    }

    /// Edges leaving `path` (what it depends on)
    pub fn outgoing(&self, path: &Path) -> &[GraphEdge] {
        self.edges.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edges entering `path` (who depends on it)
    pub fn incoming(&self, path: &Path) -> &[GraphEdge] {
        self.reverse_edges.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct files with an edge into `path`
    pub fn callers(&self, path: &Path) -> BTreeSet<&Path> {
        self.incoming(path).iter().map(|e| e.from.as_path()).collect()
    }

    pub fn dependency_count(&self, path: &Path) -> usize {
        self.callers(path).len()
    }

    /// Files referencing `name` from `path`: importers naming it among their
    /// specifiers, plus every injector when `count_injections` is set.
    pub fn usages(&self, path: &Path, name: &str, count_injections: bool) -> usize {
        let users: BTreeSet<&Path> = self
            .incoming(path)
            .iter()
            .filter(|e| match e.kind {
                EdgeKind::Import => e.specifiers.iter().any(|s| s == name),
                EdgeKind::Inject => count_injections,
            })
            .map(|e| e.from.as_path())
            .collect();
        users.len()
    }

    pub fn graph_importance(&self, path: &Path) -> f64 {
        (self.incoming(path).len() as f64 / IMPORTANCE_SATURATION).min(1.0)
    }

    /// Highest file-type weight among the callers, 0 without callers.
    pub fn caller_crit_weight(&self, path: &Path, config: &ScoringConfig) -> f64 {
        self.callers(path)
            .into_iter()
            .filter_map(|c| self.nodes.get(c))
            .map(|n| config.type_weight(n.file_type))
            .fold(0.0, f64::max)
    }

    /// 1.0 for an entry point, else `1/(1+depth)` of the nearest entry point
    /// reachable through callers, 0 if none within the search depth.
    pub fn entry_proximity(&self, path: &Path) -> f64 {
        let mut visited: HashSet<&Path> = HashSet::new();
        let mut queue: VecDeque<(&Path, usize)> = VecDeque::new();
        visited.insert(path);
        queue.push_back((path, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if self.nodes.get(current).is_some_and(|n| n.is_entry) {
                return 1.0 / (1.0 + depth as f64);
            }
            if depth >= ENTRY_SEARCH_DEPTH {
                continue;
            }
            for edge in self.incoming(current) {
                if visited.insert(edge.from.as_path()) {
                    queue.push_back((edge.from.as_path(), depth + 1));
                }
            }
        }

        0.0
    }

    /// How irreplaceable `path` is to its callers: a caller with `n` other
    /// outgoing edges to files of the same type contributes `1/(1+n)`.
    /// An import and an injection of the same peer are two edges.
    pub fn exclusivity(&self, path: &Path) -> f64 {
        let callers = self.callers(path);
        if callers.is_empty() {
            return 0.0;
        }
        let Some(file_type) = self.nodes.get(path).map(|n| n.file_type) else {
            return 0.0;
        };

        let total: f64 = callers
            .iter()
            .map(|caller| {
                let peers = self
                    .outgoing(caller)
                    .iter()
                    .map(|e| e.to.as_path())
                    .filter(|to| *to != path)
                    .filter(|to| self.nodes.get(*to).is_some_and(|n| n.file_type == file_type))
                    .count();
                1.0 / (1.0 + peers as f64)
            })
            .sum();

        total / callers.len() as f64
    }

    pub fn signals(&self, path: &Path, config: &ScoringConfig) -> GraphSignals {
        GraphSignals {
            graph_importance: self.graph_importance(path),
            caller_crit_weight: self.caller_crit_weight(path, config),
            entry_proximity: self.entry_proximity(path),
            exclusivity: self.exclusivity(path),
        }
    }

    /// Signals for the given paths, computed in parallel.
    pub fn signals_for(
        &self,
        paths: &[PathBuf],
        config: &ScoringConfig,
    ) -> BTreeMap<PathBuf, GraphSignals> {
        paths
            .par_iter()
            .map(|p| (p.clone(), self.signals(p, config)))
            .collect()
    }
}
