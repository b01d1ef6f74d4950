use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;

use crate::core::{Ambiguity, EdgeKind, FileType, SourceFile, SymbolTable, is_test_path};
use crate::utils::graph::{GraphNode, RepoGraph};

/// Extensions probed when a relative specifier omits one
const PROBE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

lazy_static! {
    static ref ENTRY_FILE: Regex =
        Regex::new(r"(?i)(\.resolver|\.gateway)\.\w+$|^(main|server)\.\w+$").unwrap();
}

/// True for generated sources that never belong in the graph.
pub fn is_generated_path(path: &Path) -> bool {
    let filename = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or_default()
        .to_lowercase();
    filename.contains(".generated.")
        || filename.ends_with(".d.ts")
        || filename.ends_with(".min.js")
        || path.components().any(|c| c.as_os_str() == "generated")
}

/// External-facing boundary: controllers, resolvers, gateways and main entry files.
pub fn is_entry(path: &Path, file_type: FileType) -> bool {
    if file_type == FileType::Controller {
        return true;
    }
    path.file_name()
        .and_then(|f| f.to_str())
        .is_some_and(|name| ENTRY_FILE.is_match(name))
}

/// Lexically normalizes `.` and `..` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// `user-profile.dto.ts` -> `UserProfileDto`
pub fn pascal_case_name(path: &Path) -> Option<String> {
    let filename = path.file_name()?.to_str()?;
    let stem = match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    };

    let name: String = stem
        .split(['.', '-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();

    if name.is_empty() { None } else { Some(name) }
}

/// Resolves a relative import specifier to a known path.
/// Bare/package specifiers resolve to `None`.
pub fn resolve_import(
    specifier: &str,
    current_file: &Path,
    known: &HashSet<PathBuf>,
) -> Option<PathBuf> {
    let is_relative = specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../");
    if !is_relative {
        return None;
    }

    let current_dir = current_file.parent().unwrap_or(Path::new(""));
    let base = normalize_path(&current_dir.join(specifier));

    if known.contains(&base) {
        return Some(base);
    }

    // `./user.service` -> `./user.service.ts`; appending keeps the dotted stem intact
    for ext in PROBE_EXTENSIONS {
        let mut candidate = base.clone().into_os_string();
        candidate.push(".");
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        if known.contains(&candidate) {
            return Some(candidate);
        }
    }

    for ext in PROBE_EXTENSIONS {
        let candidate = base.join(format!("index.{}", ext));
        if known.contains(&candidate) {
            return Some(candidate);
        }
    }

    None
}

/// PascalCase file name -> candidate paths, sorted
#[derive(Debug, Default)]
pub struct InjectionIndex {
    by_name: HashMap<String, Vec<(PathBuf, String)>>,
}

impl InjectionIndex {
    pub fn build<'a>(files: impl IntoIterator<Item = (&'a Path, &'a str)>) -> Self {
        let mut by_name: HashMap<String, Vec<(PathBuf, String)>> = HashMap::new();
        for (path, repo) in files {
            if let Some(name) = pascal_case_name(path) {
                by_name
                    .entry(name)
                    .or_default()
                    .push((path.to_path_buf(), repo.to_string()));
            }
        }
        for candidates in by_name.values_mut() {
            candidates.sort();
        }
        Self { by_name }
    }

    /// Resolves an injected type name for `from`.
    ///
    /// With several candidates the injecting file's repo wins, then the
    /// longest shared directory prefix, then path order. The second value
    /// lists every candidate when the choice was ambiguous.
    pub fn resolve(
        &self,
        type_name: &str,
        from: &Path,
        from_repo: &str,
    ) -> Option<(PathBuf, Option<Vec<PathBuf>>)> {
        let candidates: Vec<&(PathBuf, String)> = self
            .by_name
            .get(type_name)?
            .iter()
            .filter(|(path, _)| path != from)
            .collect();

        match candidates.len() {
            0 => None,
            1 => Some((candidates[0].0.clone(), None)),
            _ => {
                let best = candidates
                    .iter()
                    .copied()
                    .max_by(|a, b| {
                        rank_key(a, from, from_repo)
                            .cmp(&rank_key(b, from, from_repo))
                            // Reverse path order so the lexicographically first wins ties
                            .then_with(|| b.0.cmp(&a.0))
                    })
                    .map(|c| c.0.clone())?;
                let all = candidates.iter().map(|c| c.0.clone()).collect();
                Some((best, Some(all)))
            }
        }
    }
}

fn rank_key(candidate: &(PathBuf, String), from: &Path, from_repo: &str) -> (bool, usize) {
    (
        candidate.1 == from_repo,
        shared_prefix_len(from, &candidate.0),
    )
}

fn shared_prefix_len(a: &Path, b: &Path) -> usize {
    let a_dir = a.parent().unwrap_or(Path::new(""));
    let b_dir = b.parent().unwrap_or(Path::new(""));
    a_dir
        .components()
        .zip(b_dir.components())
        .take_while(|(x, y)| x == y)
        .count()
}

struct ResolvedEdges {
    from: PathBuf,
    edges: Vec<(PathBuf, EdgeKind, Vec<String>)>,
    ambiguities: Vec<Ambiguity>,
}

fn resolve_file_edges(
    source: &SourceFile,
    table: &SymbolTable,
    known: &HashSet<PathBuf>,
    injections: &InjectionIndex,
) -> ResolvedEdges {
    let mut edges = Vec::new();
    let mut ambiguities = Vec::new();

    for import in &table.imports {
        if let Some(target) = resolve_import(&import.source, &source.path, known) {
            edges.push((target, EdgeKind::Import, import.specifiers.clone()));
        }
    }

    for injection in &table.injections {
        if let Some((target, ambiguous)) =
            injections.resolve(&injection.type_name, &source.path, &source.repo)
        {
            if let Some(candidates) = ambiguous {
                tracing::debug!(
                    "ambiguous injection {} in {}: chose {}",
                    injection.type_name,
                    source.path.display(),
                    target.display()
                );
                ambiguities.push(Ambiguity {
                    from: source.path.clone(),
                    type_name: injection.type_name.clone(),
                    chosen: target.clone(),
                    candidates,
                });
            }
            edges.push((target, EdgeKind::Inject, vec![injection.type_name.clone()]));
        }
    }

    ResolvedEdges {
        from: source.path.clone(),
        edges,
        ambiguities,
    }
}

/// Builds the repository graph from the full source listing.
/// Test and generated files are left out; files that failed to parse become
/// nodes without symbols or edges.
pub fn build_repo_graph(sources: &[SourceFile]) -> RepoGraph {
    let included: Vec<&SourceFile> = sources
        .iter()
        .filter(|s| !is_test_path(&s.path) && !is_generated_path(&s.path))
        .collect();

    let known: HashSet<PathBuf> = included.iter().map(|s| s.path.clone()).collect();
    let injections =
        InjectionIndex::build(included.iter().map(|s| (s.path.as_path(), s.repo.as_str())));

    let mut graph = RepoGraph::new();
    for source in &included {
        let file_type = FileType::from_path(&source.path);
        graph.add_node(
            source.path.clone(),
            GraphNode {
                repo: source.repo.clone(),
                file_type,
                is_entry: is_entry(&source.path, file_type),
                symbol_names: source
                    .symbols
                    .as_ref()
                    .map(SymbolTable::symbol_names)
                    .unwrap_or_default(),
            },
        );
    }

    let resolved: Vec<ResolvedEdges> = included
        .par_iter()
        .filter_map(|source| {
            source
                .symbols
                .as_ref()
                .map(|table| resolve_file_edges(source, table, &known, &injections))
        })
        .collect();

    for file in resolved {
        for (to, kind, specifiers) in file.edges {
            graph.add_edge(file.from.clone(), to, kind, specifiers);
        }
        for ambiguity in file.ambiguities {
            graph.record_ambiguity(ambiguity);
        }
    }

    tracing::debug!(
        "built repo graph: {} nodes, {} edges",
        graph.node_count(),
        graph.edge_count()
    );

    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ImportRecord, InjectionRecord};

    fn known(paths: &[&str]) -> HashSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    fn source(repo: &str, path: &str, table: Option<SymbolTable>) -> SourceFile {
        SourceFile {
            repo: repo.into(),
            path: PathBuf::from(path),
            symbols: table,
        }
    }

    #[test]
    fn test_resolve_relative_imports() {
        let files = known(&[
            "api/src/users/users.service.ts",
            "api/src/common/index.ts",
            "api/src/app.module.ts",
        ]);
        let from = Path::new("api/src/users/users.controller.ts");

        assert_eq!(
            resolve_import("./users.service", from, &files),
            Some(PathBuf::from("api/src/users/users.service.ts"))
        );
        assert_eq!(
            resolve_import("../common", from, &files),
            Some(PathBuf::from("api/src/common/index.ts"))
        );
        assert_eq!(
            resolve_import("../app.module.ts", from, &files),
            Some(PathBuf::from("api/src/app.module.ts"))
        );
        assert_eq!(resolve_import("@nestjs/common", from, &files), None);
        assert_eq!(resolve_import("./missing", from, &files), None);
    }

    #[test]
    fn test_no_suffix_matching() {
        let files = known(&["api/src/other/users.service.ts"]);
        let from = Path::new("api/src/users/users.controller.ts");
        assert_eq!(resolve_import("./users.service", from, &files), None);
    }

    #[test]
    fn test_pascal_case_name() {
        assert_eq!(
            pascal_case_name(Path::new("src/user-profile.dto.ts")).as_deref(),
            Some("UserProfileDto")
        );
        assert_eq!(
            pascal_case_name(Path::new("src/users.service.ts")).as_deref(),
            Some("UsersService")
        );
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("a/b/./../c/d.ts")),
            PathBuf::from("a/c/d.ts")
        );
    }

    #[test]
    fn test_injection_ambiguity_prefers_same_repo_then_nearest() {
        let index = InjectionIndex::build(vec![
            (Path::new("api/src/mail/mail.service.ts"), "api"),
            (Path::new("api/src/legacy/mail/mail.service.ts"), "api"),
            (Path::new("worker/src/mail/mail.service.ts"), "worker"),
        ]);

        let (chosen, ambiguous) = index
            .resolve("MailService", Path::new("api/src/mail/mail.controller.ts"), "api")
            .unwrap();
        assert_eq!(chosen, PathBuf::from("api/src/mail/mail.service.ts"));
        assert_eq!(ambiguous.map(|c| c.len()), Some(3));

        let (chosen, _) = index
            .resolve(
                "MailService",
                Path::new("worker/src/jobs/send.processor.ts"),
                "worker",
            )
            .unwrap();
        assert_eq!(chosen, PathBuf::from("worker/src/mail/mail.service.ts"));
    }

    #[test]
    fn test_build_repo_graph() {
        let controller = SymbolTable {
            imports: vec![
                ImportRecord {
                    specifiers: vec!["UsersService".into()],
                    source: "./users.service".into(),
                },
                ImportRecord {
                    specifiers: vec!["Controller".into()],
                    source: "@nestjs/common".into(),
                },
            ],
            injections: vec![InjectionRecord {
                param_name: "users".into(),
                type_name: "UsersService".into(),
            }],
            ..Default::default()
        };
        let sources = vec![
            source("api", "api/src/users/users.controller.ts", Some(controller)),
            source("api", "api/src/users/users.service.ts", Some(SymbolTable::default())),
            source("api", "api/src/users/users.service.spec.ts", Some(SymbolTable::default())),
            source("api", "api/src/broken.ts", None),
        ];

        let graph = build_repo_graph(&sources);
        assert_eq!(graph.node_count(), 3);
        assert!(graph.has_node(Path::new("api/src/broken.ts")));
        assert!(!graph.has_node(Path::new("api/src/users/users.service.spec.ts")));

        let incoming = graph.incoming(Path::new("api/src/users/users.service.ts"));
        assert_eq!(incoming.len(), 2);
        assert!(incoming.iter().any(|e| e.kind == EdgeKind::Import));
        assert!(incoming.iter().any(|e| e.kind == EdgeKind::Inject));
        assert!(
            graph
                .node(Path::new("api/src/users/users.controller.ts"))
                .unwrap()
                .is_entry
        );
    }

    #[test]
    fn test_entry_patterns() {
        assert!(is_entry(Path::new("src/main.ts"), FileType::Other));
        assert!(is_entry(Path::new("src/chat.gateway.ts"), FileType::Gateway));
        assert!(is_entry(Path::new("src/a.controller.ts"), FileType::Controller));
        assert!(!is_entry(Path::new("src/domain.ts"), FileType::Other));
    }
}
