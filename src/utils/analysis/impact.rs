//! Impact analysis for signature changes
//!
//! Marks the direct dependents of a file whose method signatures changed and
//! computes the wider blast radius of a change set for display.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::core::{BlastEntry, DependencyEdge, FileNode};
use crate::utils::analysis::rank::edge_carries_break;
use crate::utils::graph::RepoGraph;

/// Reverse hops covered by the blast radius
pub const BLAST_RADIUS_HOPS: usize = 2;

/// Files reached by one hop of propagation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImpactOutcome {
    /// Changed files whose symbols were flagged
    pub impacted_changed: Vec<PathBuf>,
    /// Callers outside the change set that depend on a broken signature
    pub impacted_unchanged: Vec<PathBuf>,
}

impl ImpactOutcome {
    pub fn all(&self) -> Vec<PathBuf> {
        let set: BTreeSet<&PathBuf> = self
            .impacted_changed
            .iter()
            .chain(&self.impacted_unchanged)
            .collect();
        set.into_iter().cloned().collect()
    }
}

impl std::fmt::Display for ImpactOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Impacted changed files: {}", self.impacted_changed.len())?;
        for file in &self.impacted_changed {
            writeln!(f, "  * {}", file.display())?;
        }
        writeln!(f, "Impacted callers: {}", self.impacted_unchanged.len())?;
        for file in self.impacted_unchanged.iter().take(10) {
            writeln!(f, "  -> {}", file.display())?;
        }
        if self.impacted_unchanged.len() > 10 {
            writeln!(f, "  ... and {} more", self.impacted_unchanged.len() - 10)?;
        }
        Ok(())
    }
}

/// Names of signature-changed symbols, keyed by owning file.
pub fn broken_names(files: &[FileNode]) -> HashMap<PathBuf, HashSet<String>> {
    let mut out: HashMap<PathBuf, HashSet<String>> = HashMap::new();
    for file in files {
        let names: HashSet<String> = file
            .symbols
            .iter()
            .filter(|s| s.sig_changed)
            .map(|s| s.name.clone())
            .collect();
        if !names.is_empty() {
            out.insert(file.path.clone(), names);
        }
    }
    out
}

pub struct ImpactAnalyzer<'a> {
    graph: &'a RepoGraph,
}

impl<'a> ImpactAnalyzer<'a> {
    pub fn new(graph: &'a RepoGraph) -> Self {
        Self { graph }
    }

    /// One hop of propagation: for every edge A -> B where B changed a
    /// signature A can observe, flag every symbol of A. Nothing flows further.
    pub fn propagate(&self, files: &mut [FileNode], edges: &[DependencyEdge]) -> ImpactOutcome {
        let broken = broken_names(files);
        let scored: HashSet<PathBuf> = files.iter().map(|f| f.path.clone()).collect();

        let mut changed = BTreeSet::new();
        let mut unchanged = BTreeSet::new();
        for edge in edges {
            let Some(names) = broken.get(&edge.to) else {
                continue;
            };
            let names: HashSet<&str> = names.iter().map(String::as_str).collect();
            if !edge_carries_break(edge.kind, &edge.specifiers, &names) {
                continue;
            }
            if scored.contains(&edge.from) {
                changed.insert(edge.from.clone());
            } else {
                unchanged.insert(edge.from.clone());
            }
        }

        for file in files.iter_mut().filter(|f| changed.contains(&f.path)) {
            for symbol in &mut file.symbols {
                symbol.impacted = true;
            }
        }

        tracing::debug!(
            "Propagation: {} changed and {} unchanged files impacted",
            changed.len(),
            unchanged.len()
        );

        ImpactOutcome {
            impacted_changed: changed.into_iter().collect(),
            impacted_unchanged: unchanged.into_iter().collect(),
        }
    }

    /// Callers within [`BLAST_RADIUS_HOPS`] reverse hops of any changed file,
    /// sorted by hop distance then path. Changed files themselves are omitted.
    pub fn blast_radius(&self, changed: &BTreeSet<PathBuf>) -> Vec<BlastEntry> {
        let mut hops: BTreeMap<&Path, usize> = BTreeMap::new();
        let mut visited: HashSet<&Path> = changed.iter().map(PathBuf::as_path).collect();
        let mut queue: VecDeque<(&Path, usize)> =
            changed.iter().map(|p| (p.as_path(), 0)).collect();

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= BLAST_RADIUS_HOPS {
                continue;
            }
            for caller in self.graph.callers(current) {
                if visited.insert(caller) {
                    hops.insert(caller, depth + 1);
                    queue.push_back((caller, depth + 1));
                }
            }
        }

        let mut entries: Vec<BlastEntry> = hops
            .into_iter()
            .map(|(path, hops)| BlastEntry {
                path: path.to_path_buf(),
                hops,
            })
            .collect();
        entries.sort_by(|a, b| a.hops.cmp(&b.hops).then_with(|| a.path.cmp(&b.path)));
        entries
    }
}
