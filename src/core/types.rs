//! Core types shared across critmap modules
//!
//! Input records mirror what the external parser and diff extractor hand us;
//! output records carry the scores and their breakdowns.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Events emitted during a scan
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Scanning has started
    StartScanning,
    /// Snapshot loaded: (source files, changed files)
    SnapshotLoaded(usize, usize),
    /// A scoring phase finished
    PhaseComplete(ScanPhase),
    /// Scanning complete with message
    Complete(String),
    /// Error occurred
    Error(String),
}

/// The three ordered scoring phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Provisional,
    GraphAware,
    Propagation,
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanPhase::Provisional => write!(f, "provisional scoring"),
            ScanPhase::GraphAware => write!(f, "graph-aware scoring"),
            ScanPhase::Propagation => write!(f, "side-effect propagation"),
        }
    }
}

// ============================================================================
// FILE CLASSIFICATION
// ============================================================================

/// Role of a file, derived from the `name.<role>.<ext>` naming convention
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Controller,
    Service,
    Module,
    Dto,
    Entity,
    Guard,
    Resolver,
    Gateway,
    Repository,
    Interceptor,
    Middleware,
    Pipe,
    Filter,
    Strategy,
    Util,
    Config,
    Test,
    #[default]
    Other,
}

impl FileType {
    /// Detects the file type from its path.
    pub fn from_path(path: &Path) -> Self {
        if is_test_path(path) {
            return FileType::Test;
        }

        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or_default()
            .to_lowercase();

        // user.service.ts -> ["user", "service", "ts"]
        let parts: Vec<&str> = filename.split('.').collect();
        if parts.len() >= 3 {
            let role = parts[parts.len() - 2];
            let detected = match role {
                "controller" => Some(FileType::Controller),
                "service" => Some(FileType::Service),
                "module" => Some(FileType::Module),
                "dto" => Some(FileType::Dto),
                "entity" | "model" | "schema" => Some(FileType::Entity),
                "guard" => Some(FileType::Guard),
                "resolver" => Some(FileType::Resolver),
                "gateway" => Some(FileType::Gateway),
                "repository" => Some(FileType::Repository),
                "interceptor" => Some(FileType::Interceptor),
                "middleware" => Some(FileType::Middleware),
                "pipe" => Some(FileType::Pipe),
                "filter" => Some(FileType::Filter),
                "strategy" => Some(FileType::Strategy),
                "util" | "utils" | "helper" | "helpers" => Some(FileType::Util),
                "config" => Some(FileType::Config),
                _ => None,
            };
            if let Some(t) = detected {
                return t;
            }
        }

        let in_dto_dir = path
            .parent()
            .map(|p| p.components().any(|c| c.as_os_str() == "dto"))
            .unwrap_or(false);
        if in_dto_dir {
            return FileType::Dto;
        }

        FileType::Other
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Controller => "controller",
            FileType::Service => "service",
            FileType::Module => "module",
            FileType::Dto => "dto",
            FileType::Entity => "entity",
            FileType::Guard => "guard",
            FileType::Resolver => "resolver",
            FileType::Gateway => "gateway",
            FileType::Repository => "repository",
            FileType::Interceptor => "interceptor",
            FileType::Middleware => "middleware",
            FileType::Pipe => "pipe",
            FileType::Filter => "filter",
            FileType::Strategy => "strategy",
            FileType::Util => "util",
            FileType::Config => "config",
            FileType::Test => "test",
            FileType::Other => "other",
        }
    }
}

/// True for spec/test files (`*.spec.ts`, `*.test.js`, `__tests__/`, `test_*.py`).
pub fn is_test_path(path: &Path) -> bool {
    let filename = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or_default()
        .to_lowercase();

    filename.contains(".spec.")
        || filename.contains(".test.")
        || filename.starts_with("test_")
        || filename.ends_with("_test.go")
        || path.components().any(|c| c.as_os_str() == "__tests__")
}

/// Category assigned to a single changed line by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineCategory {
    Comment,
    Whitespace,
    Security,
    Signature,
    ErrorHandling,
    DataAccess,
    ControlFlow,
    Injection,
    Concurrency,
    Collection,
    Return,
    Validation,
    Assignment,
    Export,
    Logging,
    Import,
    Other,
}

impl LineCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineCategory::Comment => "comment",
            LineCategory::Whitespace => "whitespace",
            LineCategory::Security => "security",
            LineCategory::Signature => "signature",
            LineCategory::ErrorHandling => "error_handling",
            LineCategory::DataAccess => "data_access",
            LineCategory::ControlFlow => "control_flow",
            LineCategory::Injection => "injection",
            LineCategory::Concurrency => "concurrency",
            LineCategory::Collection => "collection",
            LineCategory::Return => "return",
            LineCategory::Validation => "validation",
            LineCategory::Assignment => "assignment",
            LineCategory::Export => "export",
            LineCategory::Logging => "logging",
            LineCategory::Import => "import",
            LineCategory::Other => "other",
        }
    }
}

// ============================================================================
// INPUT CONTRACT (parser + diff extractor output)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodRecord {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub decorators: Vec<String>,
    /// HTTP verb of a route handler (`GET`, `DELETE`, ...)
    #[serde(default)]
    pub http_verb: Option<String>,
    #[serde(default)]
    pub http_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstantRecord {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default)]
    pub is_type: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    #[serde(default)]
    pub specifiers: Vec<String>,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InjectionRecord {
    pub param_name: String,
    pub type_name: String,
}

/// Parsed symbols of one version of a file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTable {
    #[serde(default)]
    pub methods: Vec<MethodRecord>,
    #[serde(default)]
    pub constants: Vec<ConstantRecord>,
    #[serde(default)]
    pub imports: Vec<ImportRecord>,
    #[serde(default)]
    pub injections: Vec<InjectionRecord>,
}

impl SymbolTable {
    pub fn symbol_names(&self) -> Vec<String> {
        self.methods
            .iter()
            .map(|m| m.name.clone())
            .chain(self.constants.iter().map(|c| c.name.clone()))
            .collect()
    }
}

/// One entry of the full repository listing.
/// `symbols: None` means the file failed to parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceFile {
    pub repo: String,
    pub path: PathBuf,
    #[serde(default)]
    pub symbols: Option<SymbolTable>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffLineKind {
    Add,
    Del,
    Context,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HunkLine {
    pub kind: DiffLineKind,
    pub text: String,
    #[serde(default)]
    pub old_line: Option<usize>,
    #[serde(default)]
    pub new_line: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hunk {
    pub old_start: usize,
    pub new_start: usize,
    #[serde(default)]
    pub lines: Vec<HunkLine>,
}

/// Structured diff plus both symbol tables for one changed file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileChange {
    pub repo: String,
    pub path: PathBuf,
    #[serde(default)]
    pub additions: usize,
    #[serde(default)]
    pub deletions: usize,
    #[serde(default)]
    pub hunks: Vec<Hunk>,
    /// `None` when the file is new
    #[serde(default)]
    pub old_symbols: Option<SymbolTable>,
    /// `None` when the file was deleted or failed to parse
    #[serde(default)]
    pub new_symbols: Option<SymbolTable>,
    /// The file no longer exists in the new version
    #[serde(default)]
    pub deleted: bool,
}

/// Everything one scan needs, fully materialized
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanInput {
    #[serde(default)]
    pub sources: Vec<SourceFile>,
    #[serde(default)]
    pub changes: Vec<FileChange>,
}

// ============================================================================
// SCORED MODEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Method,
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolStatus {
    New,
    Mod,
    Unch,
    Del,
}

impl SymbolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolStatus::New => "new",
            SymbolStatus::Mod => "mod",
            SymbolStatus::Unch => "unch",
            SymbolStatus::Del => "del",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, SymbolStatus::Unch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceLine {
    pub kind: DiffLineKind,
    pub text: String,
}

/// Per-factor contributions of a symbol score, before the final `×10`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SymbolScoreBreakdown {
    pub file_crit: f64,
    pub usage: f64,
    pub sig_changed: f64,
    pub security_path: f64,
    pub status: f64,
    pub content_risk: f64,
    pub impacted: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub status: SymbolStatus,
    pub lines: Vec<SliceLine>,
    pub sig_changed: bool,
    pub is_type: bool,
    pub http_verb: Option<String>,
    pub usages: usize,
    pub impacted: bool,
    pub crit: f64,
    pub breakdown: SymbolScoreBreakdown,
}

impl ChangedSymbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, status: SymbolStatus) -> Self {
        Self {
            name: name.into(),
            kind,
            status,
            lines: Vec::new(),
            sig_changed: false,
            is_type: false,
            http_verb: None,
            usages: 0,
            impacted: false,
            crit: 0.0,
            breakdown: SymbolScoreBreakdown::default(),
        }
    }

    /// Attributed add/del lines, context excluded
    pub fn changed_lines(&self) -> impl Iterator<Item = &SliceLine> {
        self.lines.iter().filter(|l| l.kind != DiffLineKind::Context)
    }
}

/// Multiplier terms of the graph amplifier
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AmplifierBreakdown {
    pub type_term: f64,
    pub structure_term: f64,
    pub security_term: f64,
    pub volume_term: f64,
    pub total: f64,
}

/// Additive compound bonuses
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompoundBreakdown {
    pub sig_dep: f64,
    pub propagation: f64,
    pub cascade_depth: f64,
    pub dto_contract: f64,
    pub endpoint_mod: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileScoreBreakdown {
    pub change_crit: f64,
    pub amplifier: AmplifierBreakdown,
    pub compound: CompoundBreakdown,
    pub fmt_discount: f64,
    pub test_discount: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileNode {
    pub path: PathBuf,
    pub repo: String,
    pub file_type: FileType,
    pub additions: usize,
    pub deletions: usize,
    pub tested: bool,
    pub symbols: Vec<ChangedSymbol>,
    pub dependency_count: usize,
    pub crit: f64,
    pub breakdown: FileScoreBreakdown,
}

impl FileNode {
    pub fn changed_line_count(&self) -> usize {
        self.additions + self.deletions
    }

    pub fn active_symbols(&self) -> impl Iterator<Item = &ChangedSymbol> {
        self.symbols.iter().filter(|s| s.status.is_active())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Import,
    Inject,
}

/// Resolved edge touching a scored file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyEdge {
    pub from: PathBuf,
    pub to: PathBuf,
    pub kind: EdgeKind,
    pub label: String,
    pub specifiers: Vec<String>,
    pub cross_repo: bool,
    pub risk_crit: f64,
}

/// A caller within two reverse hops of a changed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlastEntry {
    pub path: PathBuf,
    pub hops: usize,
}

/// An injection type name that matched more than one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ambiguity {
    pub from: PathBuf,
    pub type_name: String,
    pub chosen: PathBuf,
    pub candidates: Vec<PathBuf>,
}

/// Result of one scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub files: Vec<FileNode>,
    pub edges: Vec<DependencyEdge>,
    pub blast_radius: Vec<BlastEntry>,
    pub impacted_files: Vec<PathBuf>,
    pub ambiguities: Vec<Ambiguity>,
}

impl ScanReport {
    pub fn file(&self, path: &Path) -> Option<&FileNode> {
        self.files.iter().find(|f| f.path == path)
    }
}
