//! Content criticality classifier
//!
//! Turns raw changed lines into a 0-10 "how risky does this text look" score.
//! Each line is matched against an ordered rule list; the first rule that
//! matches decides the line's category, and the category's configured weight
//! is the line's weight.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::ScoringConfig;
use crate::core::{ChangedSymbol, DiffLineKind, LineCategory, SliceLine};

/// Share of the heaviest lines averaged into `topMean`
const TOP_SHARE: f64 = 0.2;
const TOP_BLEND: f64 = 0.6;
const FULL_BLEND: f64 = 0.4;
const SCALE: f64 = 4.0;
/// Both halves of a del/add pair must weigh more than this to earn the bonus
const PAIR_THRESHOLD: f64 = 0.5;
const PAIR_BOOST: f64 = 1.3;

/// How a rule decides whether a trimmed line belongs to it
pub enum Matcher {
    Blank,
    Pattern(&'static Regex),
    Predicate(fn(&str) -> bool),
}

pub struct LineRule {
    pub category: LineCategory,
    matcher: Matcher,
}

impl LineRule {
    fn new(category: LineCategory, matcher: Matcher) -> Self {
        Self { category, matcher }
    }

    pub fn matches(&self, trimmed: &str) -> bool {
        match &self.matcher {
            Matcher::Blank => trimmed.is_empty(),
            Matcher::Pattern(re) => re.is_match(trimmed),
            Matcher::Predicate(f) => f(trimmed),
        }
    }
}

lazy_static! {
    static ref COMMENT: Regex = Regex::new(r"^(//|/\*|\*|#(?:[^\[]|$)|<!--|--\s)").unwrap();
    static ref SECURITY: Regex = Regex::new(
        r"(?i)(\bauth|jwt|token|passw(or)?d|secret|crypt|permission|csrf|saniti[sz]|credential|\broles?\b|@UseGuards|canActivate)"
    ).unwrap();
    static ref FUNCTION_DECL: Regex = Regex::new(
        r"^(export\s+)?(default\s+)?(async\s+)?function\b|^(export\s+)?(default\s+)?(abstract\s+)?class\s|^(pub(\([^)]*\))?\s+)?(async\s+)?fn\s|^(async\s+)?def\s|^(export\s+)?const\s+[\w$]+\s*=\s*(async\s*)?\([^)]*\)\s*(:\s*[^=]+)?=>"
    ).unwrap();
    static ref ROUTE_DECORATOR: Regex = Regex::new(
        r"^@(Get|Post|Put|Patch|Delete|All|Options|Head|Query|Mutation|Subscription|SubscribeMessage)\b"
    ).unwrap();
    static ref METHOD_DECL: Regex = Regex::new(
        r"^((public|private|protected|static|async|readonly|override|get|set)\s+)*([A-Za-z_$][\w$]*)\s*(<[^>]*>)?\s*\([^)]*\)\s*(:\s*[^=;{]+)?\s*\{\s*$"
    ).unwrap();
    static ref ERROR_HANDLING: Regex = Regex::new(
        r"\b(throw|catch|try|finally)\b|\w+(Error|Exception)\("
    ).unwrap();
    static ref DATA_ACCESS: Regex = Regex::new(
        r"\.(find\w*|save|insert\w*|update\w*|delete\w*|remove|upsert|query|createQueryBuilder|execute|exec|aggregate|count|transaction)\s*\(|\b(SELECT|INSERT INTO|UPDATE|DELETE FROM)\b|\bprisma\."
    ).unwrap();
    static ref CONTROL_FLOW: Regex = Regex::new(
        r"^(\}\s*)?(if|else|for|while|switch|case|break|continue|do)\b|^default\s*:"
    ).unwrap();
    static ref INJECTION: Regex = Regex::new(
        r"@(Inject|Injectable|InjectRepository|InjectModel|Module)\b|\bconstructor\s*\(|^(private|protected|public)\s+readonly\s+[\w$]+\s*:"
    ).unwrap();
    static ref CONCURRENCY: Regex = Regex::new(
        r"\bawait\b|Promise\.(all|race|allSettled|any)\b|\.then\(|\bnew Promise\b|\bset(Timeout|Interval)\(|\bMutex\b|\.lock\(|\bspawn\("
    ).unwrap();
    static ref COLLECTION: Regex = Regex::new(
        r"\.(map|filter|reduce|forEach|flatMap|some|every|sort|slice|splice|concat|includes|keys|values|entries)\s*\("
    ).unwrap();
    static ref RETURN: Regex = Regex::new(r"^return\b").unwrap();
    static ref VALIDATION: Regex = Regex::new(
        r"^@(Is[A-Z]\w*|Min|Max|MinLength|MaxLength|Length|Matches|ValidateNested|ValidateIf|Type|Optional|Transform|Expose|Exclude|ApiProperty\w*|Allow|Equals|Contains|ArrayMinSize|ArrayMaxSize)\b"
    ).unwrap();
    static ref ASSIGNMENT: Regex = Regex::new(
        r#"^(const|let|var)\s+|^[\w$.\[\]'"]+\s*([+\-*/%|&?]{1,2})?=[^=>]"#
    ).unwrap();
    static ref EXPORT: Regex = Regex::new(
        r"^export\s+(default\s+)?(const|let|var|interface|type|enum|\{|\*)"
    ).unwrap();
    static ref LOGGING: Regex = Regex::new(
        r"\b(console|logger|Logger)\.\w+\(|\bprint(ln)?!?\(|\blog::|\btracing::|\blogging\."
    ).unwrap();
    static ref IMPORT: Regex = Regex::new(
        r"^import\b|\brequire\(|^from\s+\S+\s+import\b|^use\s+[\w:]+"
    ).unwrap();

    /// Ordered rule list; first match wins. Comments come before every
    /// keyword rule so commented-out code never scores as risky.
    static ref RULES: Vec<LineRule> = vec![
        LineRule::new(LineCategory::Comment, Matcher::Pattern(&COMMENT)),
        LineRule::new(LineCategory::Whitespace, Matcher::Blank),
        LineRule::new(LineCategory::Security, Matcher::Pattern(&SECURITY)),
        LineRule::new(LineCategory::Signature, Matcher::Predicate(is_signature)),
        LineRule::new(LineCategory::ErrorHandling, Matcher::Pattern(&ERROR_HANDLING)),
        LineRule::new(LineCategory::DataAccess, Matcher::Pattern(&DATA_ACCESS)),
        LineRule::new(LineCategory::ControlFlow, Matcher::Pattern(&CONTROL_FLOW)),
        LineRule::new(LineCategory::Injection, Matcher::Pattern(&INJECTION)),
        LineRule::new(LineCategory::Concurrency, Matcher::Pattern(&CONCURRENCY)),
        LineRule::new(LineCategory::Collection, Matcher::Pattern(&COLLECTION)),
        LineRule::new(LineCategory::Return, Matcher::Pattern(&RETURN)),
        LineRule::new(LineCategory::Validation, Matcher::Pattern(&VALIDATION)),
        LineRule::new(LineCategory::Assignment, Matcher::Pattern(&ASSIGNMENT)),
        LineRule::new(LineCategory::Export, Matcher::Pattern(&EXPORT)),
        LineRule::new(LineCategory::Logging, Matcher::Pattern(&LOGGING)),
        LineRule::new(LineCategory::Import, Matcher::Pattern(&IMPORT)),
    ];
}

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "else",
];

/// Function/class declarations, route decorators and method headers.
/// `if (x) {` has the shape of a method header, so control keywords are excluded.
fn is_signature(line: &str) -> bool {
    if FUNCTION_DECL.is_match(line) || ROUTE_DECORATOR.is_match(line) {
        return true;
    }
    match METHOD_DECL.captures(line) {
        Some(caps) => caps
            .get(3)
            .is_some_and(|name| !CONTROL_KEYWORDS.contains(&name.as_str())),
        None => false,
    }
}

/// Returns the category of a single line.
pub fn categorize_line(text: &str) -> LineCategory {
    let trimmed = text.trim();
    RULES
        .iter()
        .find(|rule| rule.matches(trimmed))
        .map(|rule| rule.category)
        .unwrap_or(LineCategory::Other)
}

/// Returns the configured weight of a single line.
pub fn classify_line(text: &str, config: &ScoringConfig) -> f64 {
    config.line_weight(categorize_line(text))
}

/// True for class-validator / serializer decorators (`@IsString()`, `@Type(...)`)
pub fn is_validation_line(text: &str) -> bool {
    VALIDATION.is_match(text.trim())
}

/// Scores a sequence of diff lines. Context lines are ignored.
pub fn score_lines<'a, I>(lines: I, config: &ScoringConfig) -> f64
where
    I: IntoIterator<Item = &'a SliceLine>,
{
    let mut weights = Vec::new();
    let mut prev: Option<(DiffLineKind, f64)> = None;

    for line in lines {
        if line.kind == DiffLineKind::Context {
            continue;
        }
        let raw = classify_line(&line.text, config);
        let mut weight = raw;

        // A deleted line directly replaced by an added one is a true modification
        if let Some((prev_kind, prev_weight)) = prev
            && prev_kind == DiffLineKind::Del
            && line.kind == DiffLineKind::Add
            && prev_weight > PAIR_THRESHOLD
            && raw > PAIR_THRESHOLD
        {
            weight = raw.max(prev_weight) * PAIR_BOOST;
        }

        weights.push(weight);
        prev = Some((line.kind, raw));
    }

    blend(weights)
}

/// Content score of every attributed line across the given symbols.
pub fn compute_change_crit(symbols: &[ChangedSymbol], config: &ScoringConfig) -> f64 {
    score_lines(symbols.iter().flat_map(|s| s.lines.iter()), config)
}

fn blend(mut weights: Vec<f64>) -> f64 {
    if weights.is_empty() {
        return 0.0;
    }

    weights.sort_by(|a, b| b.total_cmp(a));

    let n = weights.len();
    let top_n = ((n as f64 * TOP_SHARE).ceil() as usize).max(1);
    let top_mean = weights[..top_n].iter().sum::<f64>() / top_n as f64;
    let full_mean = weights.iter().sum::<f64>() / n as f64;

    ((top_mean * TOP_BLEND + full_mean * FULL_BLEND) * SCALE).min(10.0)
}
