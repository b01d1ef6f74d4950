//! Three-phase criticality scan
//!
//! Phase 1 slices and scores every changed file in isolation while the
//! repository graph is built alongside. Phase 2 rescores with graph signals,
//! usages and compound bonuses. Phase 3 propagates signature breaks one hop.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use rayon::prelude::*;

use crate::config::ScoringConfig;
use crate::core::{
    DependencyEdge, EdgeKind, FileChange, FileNode, FileScoreBreakdown, FileType, ScanEvent,
    ScanInput, ScanPhase, ScanReport, is_test_path,
};
use crate::utils::analysis::rank::{
    StructuralContext, assign_usages, score_file, score_symbols, structural_context,
};
use crate::utils::dependencies::build_repo_graph;
use crate::utils::graph::RepoGraph;
use crate::utils::impact::ImpactAnalyzer;
use crate::utils::slicer::slice_file;

/// Notify helper for optional sender
fn notify(tx: &Option<Sender<ScanEvent>>, event: ScanEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}

/// Scores a snapshot. Total: every input yields a report.
pub fn analyze(input: &ScanInput, config: &ScoringConfig) -> ScanReport {
    analyze_with_events(input, config, &None)
}

/// Same as [`analyze`], reporting each finished phase on `tx`.
pub fn analyze_with_events(
    input: &ScanInput,
    config: &ScoringConfig,
    tx: &Option<Sender<ScanEvent>>,
) -> ScanReport {
    let tested = tested_siblings(&input.changes);

    // Last entry wins on duplicate paths; the map also fixes the file order
    let scored: Vec<&FileChange> = input
        .changes
        .iter()
        .filter(|c| !is_test_path(&c.path))
        .map(|c| (c.path.as_path(), c))
        .collect::<BTreeMap<&Path, &FileChange>>()
        .into_values()
        .collect();

    let (mut files, graph) = rayon::join(
        || provisional_pass(&scored, &tested, config),
        || build_repo_graph(&input.sources),
    );
    tracing::debug!("Phase 1: {} files scored provisionally", files.len());
    notify(tx, ScanEvent::PhaseComplete(ScanPhase::Provisional));

    let changed: BTreeSet<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
    let edges = diff_scoped_edges(&graph, &files);

    graph_aware_pass(&mut files, &graph, &changed, config);
    tracing::debug!(
        "Phase 2: {} files rescored against {} diff-scoped edges",
        files.len(),
        edges.len()
    );
    notify(tx, ScanEvent::PhaseComplete(ScanPhase::GraphAware));

    let analyzer = ImpactAnalyzer::new(&graph);
    let outcome = analyzer.propagate(&mut files, &edges);
    tracing::debug!("Phase 3 impact:\n{}", outcome);
    for file in files
        .iter_mut()
        .filter(|f| outcome.impacted_changed.contains(&f.path))
    {
        score_symbols(file, config);
    }
    notify(tx, ScanEvent::PhaseComplete(ScanPhase::Propagation));

    let blast_radius = analyzer.blast_radius(&changed);
    tracing::debug!("Blast radius: {} files", blast_radius.len());

    files.sort_by(|a, b| b.crit.total_cmp(&a.crit).then_with(|| a.path.cmp(&b.path)));

    ScanReport {
        files,
        edges,
        blast_radius,
        impacted_files: outcome.all(),
        ambiguities: graph.ambiguities().to_vec(),
    }
}

/// Production files whose spec/test sibling is part of the change set.
/// `users.service.spec.ts` and `__tests__/users.service.ts` both mark
/// `users.service.ts`; `test_invoice.py` marks `invoice.py` and
/// `store_test.go` marks `store.go`.
pub fn tested_siblings(changes: &[FileChange]) -> HashSet<PathBuf> {
    changes
        .iter()
        .filter(|c| is_test_path(&c.path))
        .filter_map(|c| sibling_of_test(&c.path))
        .collect()
}

fn sibling_of_test(path: &Path) -> Option<PathBuf> {
    let filename = path.file_name()?.to_str()?;
    let stripped = if let Some(rest) = filename.strip_prefix("test_") {
        rest.to_string()
    } else if let Some(stem) = filename.strip_suffix("_test.go") {
        format!("{}.go", stem)
    } else {
        filename.replacen(".spec.", ".", 1).replacen(".test.", ".", 1)
    };

    let parent = path.parent().unwrap_or(Path::new(""));
    let dir = if parent.file_name().is_some_and(|d| d == "__tests__") {
        parent.parent().unwrap_or(Path::new(""))
    } else {
        parent
    };
    Some(dir.join(stripped))
}

fn new_file_node(change: &FileChange, tested: &HashSet<PathBuf>) -> FileNode {
    FileNode {
        path: change.path.clone(),
        repo: change.repo.clone(),
        file_type: FileType::from_path(&change.path),
        additions: change.additions,
        deletions: change.deletions,
        tested: tested.contains(&change.path),
        symbols: slice_file(change),
        dependency_count: 0,
        crit: 0.0,
        breakdown: FileScoreBreakdown::default(),
    }
}

/// Phase 1: no graph signals, no dependents.
fn provisional_pass(
    changes: &[&FileChange],
    tested: &HashSet<PathBuf>,
    config: &ScoringConfig,
) -> Vec<FileNode> {
    let ctx = StructuralContext::default();
    changes
        .par_iter()
        .map(|change| {
            let mut file = new_file_node(change, tested);
            score_file(&mut file, &ctx, config);
            score_symbols(&mut file, config);
            file
        })
        .collect()
}

/// Every graph edge into a scored file, carrying the target's provisional crit.
fn diff_scoped_edges(graph: &RepoGraph, files: &[FileNode]) -> Vec<DependencyEdge> {
    let mut edges: Vec<DependencyEdge> = files
        .iter()
        .flat_map(|file| {
            graph.incoming(&file.path).iter().map(move |edge| DependencyEdge {
                from: edge.from.clone(),
                to: edge.to.clone(),
                kind: edge.kind,
                label: match edge.kind {
                    EdgeKind::Inject => "inject".to_string(),
                    EdgeKind::Import => edge.specifiers.join(", "),
                },
                specifiers: edge.specifiers.clone(),
                cross_repo: graph.node(&edge.from).is_some_and(|n| n.repo != file.repo),
                risk_crit: file.crit,
            })
        })
        .collect();

    edges.sort_by(|a, b| {
        a.to.cmp(&b.to)
            .then_with(|| a.from.cmp(&b.from))
            .then_with(|| a.kind.cmp(&b.kind))
    });
    edges
}

/// Phase 2: dependency counts, signals, usages and compound bonuses.
fn graph_aware_pass(
    files: &mut [FileNode],
    graph: &RepoGraph,
    changed: &BTreeSet<PathBuf>,
    config: &ScoringConfig,
) {
    let paths: Vec<PathBuf> = changed.iter().cloned().collect();
    let signals = graph.signals_for(&paths, config);

    files.par_iter_mut().for_each(|file| {
        let file_signals = signals.get(&file.path).copied().unwrap_or_default();
        assign_usages(file, graph);
        let ctx = structural_context(graph, file, file_signals, changed);
        score_file(file, &ctx, config);
        score_symbols(file, config);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        DiffLineKind, Hunk, HunkLine, ImportRecord, InjectionRecord, MethodRecord, SourceFile,
        SymbolStatus, SymbolTable,
    };

    fn method(name: &str, start: usize, end: usize, signature: &str) -> MethodRecord {
        MethodRecord {
            name: name.into(),
            start_line: start,
            end_line: end,
            signature: signature.into(),
            ..Default::default()
        }
    }

    fn table(methods: Vec<MethodRecord>) -> SymbolTable {
        SymbolTable {
            methods,
            ..Default::default()
        }
    }

    fn import(specifiers: &[&str], source: &str) -> ImportRecord {
        ImportRecord {
            specifiers: specifiers.iter().map(|s| s.to_string()).collect(),
            source: source.into(),
        }
    }

    fn hunk(start: usize, lines: &[(DiffLineKind, &str)]) -> Hunk {
        Hunk {
            old_start: start,
            new_start: start,
            lines: lines
                .iter()
                .map(|(kind, text)| HunkLine {
                    kind: *kind,
                    text: text.to_string(),
                    old_line: None,
                    new_line: None,
                })
                .collect(),
        }
    }

    fn change(
        repo: &str,
        path: &str,
        hunks: Vec<Hunk>,
        old: Option<SymbolTable>,
        new: Option<SymbolTable>,
    ) -> FileChange {
        let count = |kind| {
            hunks
                .iter()
                .flat_map(|h| &h.lines)
                .filter(|l| l.kind == kind)
                .count()
        };
        let additions = count(DiffLineKind::Add);
        let deletions = count(DiffLineKind::Del);
        FileChange {
            repo: repo.into(),
            path: path.into(),
            additions,
            deletions,
            hunks,
            old_symbols: old,
            new_symbols: new,
            deleted: false,
        }
    }

    fn source(repo: &str, path: &str, symbols: SymbolTable) -> SourceFile {
        SourceFile {
            repo: repo.into(),
            path: path.into(),
            symbols: Some(symbols),
        }
    }

    fn body_change() -> Vec<Hunk> {
        vec![hunk(
            2,
            &[
                (DiffLineKind::Del, "const limit = 10;"),
                (DiffLineKind::Add, "const limit = 20;"),
            ],
        )]
    }

    /// a -> b -> c, all changed; only c's `find` changes its signature
    fn chain_input() -> ScanInput {
        let mut a = table(vec![method("run", 1, 3, "run()")]);
        a.imports = vec![import(&["handle"], "./b")];
        let mut b = table(vec![method("handle", 1, 3, "handle()")]);
        b.imports = vec![import(&["find"], "./c")];
        let c_old = table(vec![method("find", 1, 3, "find(id: string)")]);
        let c_new = table(vec![method("find", 1, 3, "find(id: string, opts: Options)")]);

        ScanInput {
            sources: vec![
                source("api", "api/src/a.ts", a.clone()),
                source("api", "api/src/b.ts", b.clone()),
                source("api", "api/src/c.ts", c_new.clone()),
            ],
            changes: vec![
                change("api", "api/src/a.ts", body_change(), Some(a.clone()), Some(a)),
                change("api", "api/src/b.ts", body_change(), Some(b.clone()), Some(b)),
                change(
                    "api",
                    "api/src/c.ts",
                    vec![hunk(
                        1,
                        &[
                            (DiffLineKind::Del, "find(id: string) {"),
                            (DiffLineKind::Add, "find(id: string, opts: Options) {"),
                        ],
                    )],
                    Some(c_old),
                    Some(c_new),
                ),
            ],
        }
    }

    /// A service with a changed signature, injected by a controller
    fn service_input(dir: &str, name: &str) -> ScanInput {
        let service_path = format!("{}/{}.service.ts", dir, name);
        let controller_path = format!("{}/{}.controller.ts", dir, name);
        let type_name = format!("{}{}Service", name[..1].to_uppercase(), &name[1..]);

        let old = table(vec![method("find", 1, 4, "find(id: string)")]);
        let new = table(vec![method("find", 1, 4, "find(id: string, limit: number)")]);
        let mut controller = table(vec![method("get", 1, 3, "get(id: string)")]);
        controller.injections = vec![InjectionRecord {
            param_name: "service".into(),
            type_name,
        }];

        ScanInput {
            sources: vec![
                source("svc", &service_path, new.clone()),
                source("svc", &controller_path, controller),
            ],
            changes: vec![change("svc", &service_path, body_change(), Some(old), Some(new))],
        }
    }

    #[test]
    fn test_scores_in_range_with_one_decimal() {
        let report = analyze(&chain_input(), &ScoringConfig::default());
        for file in &report.files {
            assert!((0.0..=10.0).contains(&file.crit));
            assert_eq!(file.crit, (file.crit * 10.0).round() / 10.0);
            for symbol in &file.symbols {
                assert!((0.0..=10.0).contains(&symbol.crit));
                assert_eq!(symbol.crit, (symbol.crit * 10.0).round() / 10.0);
            }
        }
    }

    #[test]
    fn test_deterministic_output() {
        let input = chain_input();
        let config = ScoringConfig::default();
        let first = serde_json::to_string(&analyze(&input, &config)).unwrap();
        let second = serde_json::to_string(&analyze(&input, &config)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_propagation_is_one_hop() {
        let report = analyze(&chain_input(), &ScoringConfig::default());

        let b = report.file(Path::new("api/src/b.ts")).unwrap();
        assert!(b.symbols.iter().all(|s| s.impacted));
        let a = report.file(Path::new("api/src/a.ts")).unwrap();
        assert!(a.symbols.iter().all(|s| !s.impacted));
        let c = report.file(Path::new("api/src/c.ts")).unwrap();
        assert!(c.symbols[0].sig_changed);
        assert!(!c.symbols[0].impacted);

        assert_eq!(report.impacted_files, vec![PathBuf::from("api/src/b.ts")]);
    }

    #[test]
    fn test_cascade_over_co_changed_chain() {
        let report = analyze(&chain_input(), &ScoringConfig::default());
        let a = report.file(Path::new("api/src/a.ts")).unwrap();
        assert_eq!(a.breakdown.compound.cascade_depth, 0.05);
        let b = report.file(Path::new("api/src/b.ts")).unwrap();
        assert_eq!(b.breakdown.compound.cascade_depth, 0.0);
        // b and c each have one same-repo co-changed caller
        assert!((b.breakdown.compound.propagation - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_diff_scoped_edges() {
        let report = analyze(&chain_input(), &ScoringConfig::default());
        assert_eq!(report.edges.len(), 2);

        let edge = &report.edges[0];
        assert_eq!(edge.from, PathBuf::from("api/src/a.ts"));
        assert_eq!(edge.to, PathBuf::from("api/src/b.ts"));
        assert_eq!(edge.label, "handle");
        assert!(!edge.cross_repo);
    }

    #[test]
    fn test_security_path_outscores_plain_path() {
        let config = ScoringConfig::default();
        let secure = analyze(&service_input("svc/src/auth", "users"), &config);
        let plain = analyze(&service_input("svc/src/items", "items"), &config);

        let secure = &secure.files[0];
        let plain = &plain.files[0];
        assert_eq!(secure.file_type, FileType::Service);
        assert_eq!(secure.dependency_count, 1);
        assert_eq!(plain.dependency_count, 1);
        assert!(secure.crit > plain.crit, "{} vs {}", secure.crit, plain.crit);
    }

    #[test]
    fn test_unchanged_injector_is_impacted() {
        let report = analyze(&service_input("svc/src/items", "items"), &ScoringConfig::default());
        assert_eq!(
            report.impacted_files,
            vec![PathBuf::from("svc/src/items/items.controller.ts")]
        );
        assert_eq!(report.blast_radius.len(), 1);
        assert_eq!(report.blast_radius[0].hops, 1);
        assert_eq!(report.edges[0].label, "inject");
    }

    #[test]
    fn test_formatting_only_change() {
        let t = table(vec![method("find", 1, 3, "find()")]);
        let input = ScanInput {
            sources: vec![source("api", "api/src/x.ts", t.clone())],
            changes: vec![change(
                "api",
                "api/src/x.ts",
                vec![hunk(
                    2,
                    &[
                        (DiffLineKind::Del, "return  a;"),
                        (DiffLineKind::Add, "  return a;"),
                    ],
                )],
                Some(t.clone()),
                Some(t),
            )],
        };
        let report = analyze(&input, &ScoringConfig::default());
        let file = &report.files[0];
        assert_eq!(file.symbols[0].status, SymbolStatus::Unch);
        assert_eq!(file.breakdown.change_crit, 0.0);
        assert_eq!(file.crit, 0.0);
    }

    #[test]
    fn test_test_changes_mark_sibling() {
        let mut input = service_input("svc/src/items", "items");
        input.changes.push(change(
            "svc",
            "svc/src/items/items.service.spec.ts",
            body_change(),
            None,
            None,
        ));

        let report = analyze(&input, &ScoringConfig::default());
        assert_eq!(report.files.len(), 1);
        assert!(report.files[0].tested);
        assert_eq!(report.files[0].breakdown.test_discount, 0.85);
    }

    #[test]
    fn test_sibling_of_test() {
        assert_eq!(
            sibling_of_test(Path::new("src/users.service.spec.ts")),
            Some(PathBuf::from("src/users.service.ts"))
        );
        assert_eq!(
            sibling_of_test(Path::new("src/__tests__/users.service.test.ts")),
            Some(PathBuf::from("src/users.service.ts"))
        );
        assert_eq!(
            sibling_of_test(Path::new("pkg/billing/test_invoice.py")),
            Some(PathBuf::from("pkg/billing/invoice.py"))
        );
        assert_eq!(
            sibling_of_test(Path::new("svc/store/store_test.go")),
            Some(PathBuf::from("svc/store/store.go"))
        );
    }

    #[test]
    fn test_go_test_marks_sibling() {
        let changes = vec![
            change("svc", "svc/store/store.go", body_change(), None, None),
            change("svc", "svc/store/store_test.go", body_change(), None, None),
        ];
        let tested = tested_siblings(&changes);
        assert!(tested.contains(Path::new("svc/store/store.go")));
        assert_eq!(tested.len(), 1);
    }

    #[test]
    fn test_phase_events() {
        let (tx, rx) = crossbeam_channel::unbounded();
        analyze_with_events(&chain_input(), &ScoringConfig::default(), &Some(tx));

        let phases: Vec<ScanPhase> = rx
            .try_iter()
            .filter_map(|e| match e {
                ScanEvent::PhaseComplete(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                ScanPhase::Provisional,
                ScanPhase::GraphAware,
                ScanPhase::Propagation
            ]
        );
    }

    #[test]
    fn test_empty_input() {
        let report = analyze(&ScanInput::default(), &ScoringConfig::default());
        assert!(report.files.is_empty());
        assert!(report.edges.is_empty());
    }
}
