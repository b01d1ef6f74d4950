use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::{FileType, LineCategory};

/// Output format for the generated report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Markdown,
    Plain,
}

/// Main configuration for a critmap run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CritConfig {
    /// Path to the JSON scan snapshot
    pub input: PathBuf,
    /// Output file; `None` writes to stdout
    pub output: Option<PathBuf>,
    /// Output format (JSON, Markdown, Plain)
    pub output_format: OutputFormat,
    /// Enable debug logging
    pub verbose: bool,
    /// Scoring weights and keyword tiers
    pub scoring: ScoringConfig,
}

impl CritConfig {
    /// Validates the configuration, ensuring the input snapshot exists.
    /// Scoring values are taken as given.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.input.exists() {
            anyhow::bail!("Input snapshot does not exist: {:?}", self.input);
        }
        Ok(())
    }

    /// Attempts to load configuration from `critmap.toml` in the current directory.
    pub fn load_from_file() -> Option<Self> {
        let path = Path::new("critmap.toml");
        if !path.exists() {
            return None;
        }
        match Self::load_from_path(path) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Ignoring {:?}: {:#}", path, e);
                None
            }
        }
    }

    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file: {:?}", path))
    }
}

impl Default for CritConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("critmap-input.json"),
            output: None,
            output_format: OutputFormat::Json,
            verbose: false,
            scoring: ScoringConfig::default(),
        }
    }
}

/// Top-level weights of the graph amplifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorWeights {
    pub file_type: f64,
    pub change_volume: f64,
    pub dependencies: f64,
    pub security_context: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            file_type: 0.30,
            change_volume: 0.15,
            dependencies: 0.35,
            security_context: 0.20,
        }
    }
}

/// A group of path keywords sharing one bonus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTier {
    pub keywords: Vec<String>,
    pub bonus: f64,
}

impl KeywordTier {
    fn new(keywords: &[&str], bonus: f64) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            bonus,
        }
    }

    /// A keyword matches a path word it prefixes (`user` matches `users`).
    pub fn matches(&self, words: &[String]) -> bool {
        self.keywords.iter().any(|k| {
            let k = k.to_lowercase();
            words.iter().any(|w| w.starts_with(&k))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityTiers {
    pub high: KeywordTier,
    pub medium: KeywordTier,
    pub low: KeywordTier,
}

impl Default for SecurityTiers {
    fn default() -> Self {
        Self {
            high: KeywordTier::new(
                &[
                    "auth",
                    "security",
                    "payment",
                    "crypto",
                    "password",
                    "token",
                    "session",
                    "permission",
                    "credential",
                    "secret",
                ],
                1.0,
            ),
            medium: KeywordTier::new(
                &[
                    "user", "account", "admin", "billing", "guard", "jwt", "oauth", "role",
                ],
                0.6,
            ),
            low: KeywordTier::new(
                &["api", "middleware", "interceptor", "validation", "config"],
                0.3,
            ),
        }
    }
}

impl SecurityTiers {
    /// Bonus of the highest tier whose keyword appears in the path, 0 if none.
    pub fn bonus_for(&self, path: &Path, repo: &str) -> f64 {
        let words = path_words(path, repo);
        if self.high.matches(&words) {
            self.high.bonus
        } else if self.medium.matches(&words) {
            self.medium.bonus
        } else if self.low.matches(&words) {
            self.low.bonus
        } else {
            0.0
        }
    }

    pub fn is_sensitive(&self, path: &Path, repo: &str) -> bool {
        let words = path_words(path, repo);
        self.high.matches(&words) || self.medium.matches(&words) || self.low.matches(&words)
    }
}

/// Lowercase alphanumeric words of every path segment below the repo root.
/// `api/src/auth/jwt-auth.guard.ts` in repo `api` -> src, auth, jwt, auth, guard, ts
fn path_words(path: &Path, repo: &str) -> Vec<String> {
    let mut segments = path.iter().filter_map(|s| s.to_str()).peekable();
    if segments.peek() == Some(&repo) {
        segments.next();
    }
    segments
        .flat_map(|segment| segment.split(|c: char| !c.is_ascii_alphanumeric()))
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Everything the scoring formulas read. Immutable for a scan and passed
/// explicitly into every call.
///
/// Weight maps are keyed by the snake_case names of [`FileType`] and
/// [`LineCategory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: FactorWeights,
    pub file_type_weights: BTreeMap<String, f64>,
    pub security: SecurityTiers,
    pub line_weights: BTreeMap<String, f64>,
}

impl ScoringConfig {
    pub fn type_weight(&self, file_type: FileType) -> f64 {
        self.file_type_weights
            .get(file_type.as_str())
            .or_else(|| self.file_type_weights.get(FileType::Other.as_str()))
            .copied()
            .unwrap_or(0.4)
    }

    pub fn line_weight(&self, category: LineCategory) -> f64 {
        self.line_weights
            .get(category.as_str())
            .copied()
            .unwrap_or(0.0)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let file_type_weights = [
            (FileType::Guard, 0.9),
            (FileType::Service, 0.8),
            (FileType::Strategy, 0.8),
            (FileType::Entity, 0.75),
            (FileType::Repository, 0.75),
            (FileType::Controller, 0.7),
            (FileType::Resolver, 0.7),
            (FileType::Gateway, 0.7),
            (FileType::Middleware, 0.7),
            (FileType::Dto, 0.6),
            (FileType::Interceptor, 0.6),
            (FileType::Config, 0.6),
            (FileType::Filter, 0.5),
            (FileType::Module, 0.5),
            (FileType::Pipe, 0.5),
            (FileType::Util, 0.4),
            (FileType::Other, 0.4),
            (FileType::Test, 0.1),
        ]
        .into_iter()
        .map(|(t, w)| (t.as_str().to_string(), w))
        .collect();

        let line_weights = [
            (LineCategory::Comment, 0.1),
            (LineCategory::Whitespace, 0.0),
            (LineCategory::Security, 2.5),
            (LineCategory::Signature, 2.0),
            (LineCategory::ErrorHandling, 1.8),
            (LineCategory::DataAccess, 1.7),
            (LineCategory::Injection, 1.5),
            (LineCategory::Concurrency, 1.4),
            (LineCategory::ControlFlow, 1.3),
            (LineCategory::Validation, 1.2),
            (LineCategory::Collection, 1.0),
            (LineCategory::Return, 1.0),
            (LineCategory::Export, 0.9),
            (LineCategory::Assignment, 0.8),
            (LineCategory::Other, 0.6),
            (LineCategory::Import, 0.5),
            (LineCategory::Logging, 0.3),
        ]
        .into_iter()
        .map(|(c, w)| (c.as_str().to_string(), w))
        .collect();

        Self {
            weights: FactorWeights::default(),
            file_type_weights,
            security: SecurityTiers::default(),
            line_weights,
        }
    }
}
