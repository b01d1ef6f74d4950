//! Composite criticality scoring for files and symbols.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::config::ScoringConfig;
use crate::core::{
    AmplifierBreakdown, ChangedSymbol, CompoundBreakdown, EdgeKind, FileNode, FileScoreBreakdown,
    FileType, SymbolKind, SymbolScoreBreakdown, SymbolStatus,
};
use crate::utils::analysis::classify::{compute_change_crit, is_validation_line, score_lines};
use crate::utils::graph::{GraphSignals, RepoGraph};

const MAX_CRIT: f64 = 10.0;
/// ln(201): 200 changed lines saturate the volume term
const VOLUME_SATURATION: f64 = 5.303304908059076;

const SIG_DEP_MIN_DEPENDENTS: usize = 3;
const SIG_DEP_CAP: f64 = 0.15;
const PROPAGATION_SAME_REPO: f64 = 0.03;
const PROPAGATION_CROSS_REPO: f64 = 0.06;
const PROPAGATION_CAP: f64 = 0.20;
const DTO_RATIO_WEIGHT: f64 = 0.20;
const DTO_CAP: f64 = 0.15;
const ENDPOINT_DELETED: f64 = 0.08;
const ENDPOINT_MODIFIED: f64 = 0.05;
const ENDPOINT_SIG_CHANGED: f64 = 0.04;
const ENDPOINT_CAP: f64 = 0.20;
const TEST_DISCOUNT: f64 = 0.85;

/// Graph-derived inputs of a file score. Phase 1 scores with the default,
/// which carries no signals and no dependents.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StructuralContext {
    pub signals: GraphSignals,
    pub dependency_count: usize,
    /// Inbound edges from co-changed files of the same repo
    pub co_changed_same_repo: usize,
    /// Inbound edges from co-changed files of another repo
    pub co_changed_cross_repo: usize,
    /// Longest forward chain through co-changed files starting here
    pub cascade_depth: usize,
}

/// Rounds to one decimal.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn clamp_crit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, MAX_CRIT)
}

/// Severity label for a 0-10 criticality score.
pub fn crit_level(crit: f64) -> &'static str {
    if crit >= 8.0 {
        "CRITICAL"
    } else if crit >= 6.0 {
        "HIGH"
    } else if crit >= 4.0 {
        "MEDIUM"
    } else if crit >= 2.0 {
        "LOW"
    } else {
        "MINIMAL"
    }
}

pub fn volume(additions: usize, deletions: usize) -> f64 {
    ((1.0 + (additions + deletions) as f64).ln() / VOLUME_SATURATION).min(1.0)
}

pub fn structural(signals: &GraphSignals) -> f64 {
    0.35 * signals.graph_importance
        + 0.25 * signals.caller_crit_weight
        + 0.20 * signals.entry_proximity
        + 0.20 * signals.exclusivity
}

pub fn graph_amplifier(
    file: &FileNode,
    signals: &GraphSignals,
    config: &ScoringConfig,
) -> AmplifierBreakdown {
    let w = &config.weights;
    let type_term = w.file_type * config.type_weight(file.file_type);
    let structure_term = w.dependencies * structural(signals);
    let security_term =
        w.security_context * config.security.bonus_for(&file.path, &file.repo);
    let volume_term = w.change_volume * volume(file.additions, file.deletions);

    AmplifierBreakdown {
        type_term,
        structure_term,
        security_term,
        volume_term,
        total: 0.5 + type_term + structure_term + security_term + volume_term,
    }
}

/// Bonus for a changed method signature on a file with many dependents.
pub fn sig_dep(dependency_count: usize, any_sig_changed: bool) -> f64 {
    if !any_sig_changed || dependency_count < SIG_DEP_MIN_DEPENDENTS {
        return 0.0;
    }
    (dependency_count as f64 / 20.0 * SIG_DEP_CAP).min(SIG_DEP_CAP)
}

pub fn propagation(same_repo: usize, cross_repo: usize) -> f64 {
    (same_repo as f64 * PROPAGATION_SAME_REPO + cross_repo as f64 * PROPAGATION_CROSS_REPO)
        .min(PROPAGATION_CAP)
}

pub fn cascade_bonus(depth: usize) -> f64 {
    match depth {
        0 | 1 => 0.0,
        2 => 0.05,
        3 => 0.10,
        _ => 0.15,
    }
}

/// Depth of the deepest file reachable from `start` through outgoing edges
/// whose every hop lands on a co-changed file.
pub fn cascade_depth(graph: &RepoGraph, start: &Path, changed: &BTreeSet<PathBuf>) -> usize {
    let mut visited: HashSet<&Path> = HashSet::new();
    let mut queue: VecDeque<(&Path, usize)> = VecDeque::new();
    visited.insert(start);
    queue.push_back((start, 0));
    let mut deepest = 0;

    while let Some((current, depth)) = queue.pop_front() {
        deepest = deepest.max(depth);
        for edge in graph.outgoing(current) {
            let next = edge.to.as_path();
            if changed.contains(next) && visited.insert(next) {
                queue.push_back((next, depth + 1));
            }
        }
    }

    deepest
}

/// DTO files only: share of changed lines that are validation decorators.
pub fn dto_contract(file: &FileNode) -> f64 {
    if file.file_type != FileType::Dto {
        return 0.0;
    }
    let (total, validation) = file
        .symbols
        .iter()
        .flat_map(|s| s.changed_lines())
        .fold((0usize, 0usize), |(t, v), line| {
            (t + 1, v + usize::from(is_validation_line(&line.text)))
        });
    if total == 0 {
        return 0.0;
    }
    (validation as f64 / total as f64 * DTO_RATIO_WEIGHT).min(DTO_CAP)
}

/// Controller files only: bonus per touched HTTP route handler.
pub fn endpoint_mod(file: &FileNode) -> f64 {
    if file.file_type != FileType::Controller {
        return 0.0;
    }
    let total: f64 = file
        .symbols
        .iter()
        .filter(|s| s.kind == SymbolKind::Method && s.http_verb.is_some())
        .map(|s| match s.status {
            SymbolStatus::Del => ENDPOINT_DELETED,
            SymbolStatus::Mod if s.sig_changed => ENDPOINT_MODIFIED + ENDPOINT_SIG_CHANGED,
            SymbolStatus::Mod => ENDPOINT_MODIFIED,
            SymbolStatus::New | SymbolStatus::Unch => 0.0,
        })
        .sum();
    total.min(ENDPOINT_CAP)
}

pub fn compound(file: &FileNode, ctx: &StructuralContext) -> CompoundBreakdown {
    let any_sig_changed = file
        .symbols
        .iter()
        .any(|s| s.kind == SymbolKind::Method && s.sig_changed);

    let sig_dep = sig_dep(ctx.dependency_count, any_sig_changed);
    let propagation = propagation(ctx.co_changed_same_repo, ctx.co_changed_cross_repo);
    let cascade_depth = cascade_bonus(ctx.cascade_depth);
    let dto_contract = dto_contract(file);
    let endpoint_mod = endpoint_mod(file);

    CompoundBreakdown {
        sig_dep,
        propagation,
        cascade_depth,
        dto_contract,
        endpoint_mod,
        total: sig_dep + propagation + cascade_depth + dto_contract + endpoint_mod,
    }
}

/// 0.1 when nothing but formatting changed, 0.7 for a tiny single-symbol
/// change, else 1.0.
pub fn fmt_discount(file: &FileNode) -> f64 {
    let active = file.active_symbols().count();
    if active == 0 {
        0.1
    } else if active <= 1 && file.changed_line_count() < 5 {
        0.7
    } else {
        1.0
    }
}

pub fn test_discount(tested: bool) -> f64 {
    if tested { TEST_DISCOUNT } else { 1.0 }
}

/// Recomputes `file.crit`, its breakdown and its dependency count.
pub fn score_file(file: &mut FileNode, ctx: &StructuralContext, config: &ScoringConfig) {
    file.dependency_count = ctx.dependency_count;

    let change_crit = compute_change_crit(&file.symbols, config);
    let amplifier = graph_amplifier(file, &ctx.signals, config);
    let compound = compound(file, ctx);
    let fmt_discount = fmt_discount(file);
    let test_discount = test_discount(file.tested);

    let raw = change_crit * amplifier.total * (1.0 + compound.total) * fmt_discount * test_discount;
    let total = round1(clamp_crit(raw));

    file.crit = total;
    file.breakdown = FileScoreBreakdown {
        change_crit,
        amplifier,
        compound,
        fmt_discount,
        test_discount,
        total,
    };
}

fn status_weight(status: SymbolStatus) -> f64 {
    match status {
        SymbolStatus::New => 0.2,
        SymbolStatus::Mod => 0.5,
        SymbolStatus::Del => 0.7,
        SymbolStatus::Unch => 0.0,
    }
}

/// Scores one symbol against its owning file. `max_usages` is the highest
/// usage count among the file's symbols.
pub fn score_symbol(
    symbol: &ChangedSymbol,
    file_crit: f64,
    max_usages: usize,
    security_path: bool,
    config: &ScoringConfig,
) -> SymbolScoreBreakdown {
    if symbol.status == SymbolStatus::Unch && !symbol.impacted {
        return SymbolScoreBreakdown::default();
    }

    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    let usage = if max_usages == 0 {
        0.0
    } else {
        symbol.usages as f64 / max_usages as f64
    };
    let content_risk = (score_lines(symbol.changed_lines(), config) / MAX_CRIT).min(1.0);

    let mut breakdown = SymbolScoreBreakdown {
        file_crit: 0.25 * (file_crit / MAX_CRIT),
        usage: 0.20 * usage,
        sig_changed: 0.15 * flag(symbol.sig_changed),
        security_path: 0.10 * flag(security_path),
        status: 0.10 * status_weight(symbol.status),
        content_risk: 0.10 * content_risk,
        impacted: 0.10 * flag(symbol.impacted),
        total: 0.0,
    };
    let sum = breakdown.file_crit
        + breakdown.usage
        + breakdown.sig_changed
        + breakdown.security_path
        + breakdown.status
        + breakdown.content_risk
        + breakdown.impacted;
    breakdown.total = round1(clamp_crit(sum * MAX_CRIT));
    breakdown
}

/// Rescores every symbol of `file` from its current crit and usages.
pub fn score_symbols(file: &mut FileNode, config: &ScoringConfig) {
    let max_usages = file.symbols.iter().map(|s| s.usages).max().unwrap_or(0);
    let security_path = config.security.is_sensitive(&file.path, &file.repo);
    let file_crit = file.crit;

    for symbol in &mut file.symbols {
        let breakdown = score_symbol(symbol, file_crit, max_usages, security_path, config);
        symbol.crit = breakdown.total;
        symbol.breakdown = breakdown;
    }
}

/// Fills symbol usages of `file` from the repository graph.
pub fn assign_usages(file: &mut FileNode, graph: &RepoGraph) {
    for symbol in &mut file.symbols {
        symbol.usages = graph.usages(&file.path, &symbol.name, symbol.kind == SymbolKind::Method);
    }
}

/// Structural context of a changed file within the repository graph.
pub fn structural_context(
    graph: &RepoGraph,
    file: &FileNode,
    signals: GraphSignals,
    changed: &BTreeSet<PathBuf>,
) -> StructuralContext {
    let mut same = 0;
    let mut cross = 0;
    for edge in graph.incoming(&file.path) {
        if !changed.contains(&edge.from) {
            continue;
        }
        let caller_repo = graph.node(&edge.from).map(|n| n.repo.as_str());
        if caller_repo.is_some_and(|r| r != file.repo) {
            cross += 1;
        } else {
            same += 1;
        }
    }

    StructuralContext {
        signals,
        dependency_count: graph.dependency_count(&file.path),
        co_changed_same_repo: same,
        co_changed_cross_repo: cross,
        cascade_depth: cascade_depth(graph, &file.path, changed),
    }
}

/// Whether an edge carries a break of `names` from its target to its source.
pub fn edge_carries_break(kind: EdgeKind, specifiers: &[String], names: &HashSet<&str>) -> bool {
    match kind {
        EdgeKind::Inject => true,
        EdgeKind::Import => specifiers.iter().any(|s| names.contains(s.as_str())),
    }
}
