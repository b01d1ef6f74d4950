//! Diff slicer
//!
//! Attributes structured diff lines to the methods and constants they touch,
//! flags signature changes and drops formatting-only churn.

use std::collections::HashSet;

use crate::core::{
    ChangedSymbol, ConstantRecord, DiffLineKind, FileChange, MethodRecord, SliceLine,
    SymbolKind, SymbolStatus, SymbolTable,
};

/// A diff line placed on the new-version line axis
#[derive(Debug, Clone)]
struct PlacedLine {
    kind: DiffLineKind,
    text: String,
    /// New line number; for deletions, the new-line cursor they sit at
    pos: usize,
    /// Index of the run of consecutive deletions this line belongs to
    block: Option<usize>,
}

/// Line span shared by methods and constants
trait Span {
    fn name(&self) -> &str;
    fn start(&self) -> usize;
    fn end(&self) -> usize;
}

impl Span for MethodRecord {
    fn name(&self) -> &str {
        &self.name
    }
    fn start(&self) -> usize {
        self.start_line
    }
    fn end(&self) -> usize {
        self.end_line
    }
}

impl Span for ConstantRecord {
    fn name(&self) -> &str {
        &self.name
    }
    fn start(&self) -> usize {
        self.start_line
    }
    fn end(&self) -> usize {
        self.end_line
    }
}

/// Slices one changed file into per-symbol change records.
///
/// Surviving symbols come first in new-table order (methods, then constants),
/// followed by deleted symbols in old-table order. A surviving file without a
/// new table failed to parse and yields no symbols.
pub fn slice_file(change: &FileChange) -> Vec<ChangedSymbol> {
    if change.new_symbols.is_none() && !change.deleted {
        return Vec::new();
    }

    let empty = SymbolTable::default();
    let new_table = change.new_symbols.as_ref().unwrap_or(&empty);
    let old_table = change.old_symbols.as_ref();

    let placed = place_lines(change);
    let mut consumed = vec![false; placed.len()];
    let mut symbols = Vec::new();

    // Deletion blocks go to deleted symbols first so surviving neighbours
    // don't absorb them by cursor position.
    let deleted = old_table
        .map(|old| attribute_deleted(old, new_table, &placed, &mut consumed))
        .unwrap_or_default();

    for method in &new_table.methods {
        let old = old_table.and_then(|t| t.methods.iter().find(|m| m.name == method.name));
        let mut symbol = build_symbol(
            method,
            SymbolKind::Method,
            old_table.is_some(),
            old.is_some(),
            &placed,
            &mut consumed,
        );
        symbol.sig_changed =
            old.is_some_and(|o| normalize_line(&o.signature) != normalize_line(&method.signature));
        symbol.http_verb = method.http_verb.clone();
        symbols.push(symbol);
    }

    for constant in &new_table.constants {
        let existed = old_table.is_some_and(|t| t.constants.iter().any(|c| c.name == constant.name));
        let mut symbol = build_symbol(
            constant,
            SymbolKind::Constant,
            old_table.is_some(),
            existed,
            &placed,
            &mut consumed,
        );
        symbol.is_type = constant.is_type;
        symbols.push(symbol);
    }

    symbols.extend(deleted);
    symbols
}

/// Walks every hunk, giving each line a position on the new-version axis.
/// Deletions do not advance the cursor.
fn place_lines(change: &FileChange) -> Vec<PlacedLine> {
    let mut placed = Vec::new();
    let mut block_id = 0;

    for hunk in &change.hunks {
        let mut cursor = hunk.new_start;
        let mut in_block = false;

        for line in &hunk.lines {
            let (pos, block) = match line.kind {
                DiffLineKind::Del => {
                    if !in_block {
                        block_id += 1;
                        in_block = true;
                    }
                    (cursor, Some(block_id))
                }
                DiffLineKind::Add | DiffLineKind::Context => {
                    in_block = false;
                    let pos = line.new_line.unwrap_or(cursor);
                    cursor = pos + 1;
                    (pos, None)
                }
            };
            placed.push(PlacedLine {
                kind: line.kind,
                text: line.text.clone(),
                pos,
                block,
            });
        }
    }

    placed
}

fn build_symbol<S: Span>(
    span: &S,
    kind: SymbolKind,
    has_old_table: bool,
    existed: bool,
    placed: &[PlacedLine],
    consumed: &mut [bool],
) -> ChangedSymbol {
    let mut lines = Vec::new();
    let mut has_change = false;

    for (idx, line) in placed.iter().enumerate() {
        if line.pos < span.start() || line.pos > span.end() {
            continue;
        }
        if line.kind == DiffLineKind::Context {
            lines.push(SliceLine {
                kind: line.kind,
                text: line.text.clone(),
            });
            continue;
        }
        if consumed[idx] {
            continue;
        }
        consumed[idx] = true;
        has_change = true;
        lines.push(SliceLine {
            kind: line.kind,
            text: line.text.clone(),
        });
    }

    let status = if !has_old_table || !existed {
        SymbolStatus::New
    } else if !has_change || is_formatting_only(&lines) {
        lines.clear();
        SymbolStatus::Unch
    } else {
        SymbolStatus::Mod
    };

    if status == SymbolStatus::New && !has_change {
        lines.clear();
    }

    let mut symbol = ChangedSymbol::new(span.name(), kind, status);
    symbol.lines = lines;
    symbol
}

/// Attributes whole deletion blocks to symbols that no longer exist.
/// A block goes to the first deleted symbol whose name it contains; blocks
/// naming none are dropped.
fn attribute_deleted(
    old: &SymbolTable,
    new: &SymbolTable,
    placed: &[PlacedLine],
    consumed: &mut [bool],
) -> Vec<ChangedSymbol> {
    let new_methods: HashSet<&str> = new.methods.iter().map(|m| m.name.as_str()).collect();
    let new_constants: HashSet<&str> = new.constants.iter().map(|c| c.name.as_str()).collect();

    let mut deleted: Vec<ChangedSymbol> = Vec::new();
    for method in old.methods.iter().filter(|m| !new_methods.contains(m.name.as_str())) {
        let mut symbol = ChangedSymbol::new(&method.name, SymbolKind::Method, SymbolStatus::Del);
        symbol.http_verb = method.http_verb.clone();
        deleted.push(symbol);
    }
    for constant in old
        .constants
        .iter()
        .filter(|c| !new_constants.contains(c.name.as_str()))
    {
        let mut symbol =
            ChangedSymbol::new(&constant.name, SymbolKind::Constant, SymbolStatus::Del);
        symbol.is_type = constant.is_type;
        deleted.push(symbol);
    }

    if deleted.is_empty() {
        return deleted;
    }

    let mut block_ids: Vec<usize> = placed.iter().filter_map(|l| l.block).collect();
    block_ids.dedup();

    for block in block_ids {
        let members: Vec<usize> = placed
            .iter()
            .enumerate()
            .filter(|(_, l)| l.block == Some(block))
            .map(|(idx, _)| idx)
            .collect();
        let text: String = members
            .iter()
            .map(|&idx| placed[idx].text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if let Some(owner) = deleted.iter_mut().find(|s| text.contains(s.name.as_str())) {
            for idx in members {
                consumed[idx] = true;
                owner.lines.push(SliceLine {
                    kind: DiffLineKind::Del,
                    text: placed[idx].text.clone(),
                });
            }
        }
    }

    deleted
}

/// Canonical form used for formatting comparisons and signature equality:
/// trimmed, whitespace collapsed, trailing `;`/`,` stripped, quotes unified.
pub fn normalize_line(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let stripped = collapsed.trim_end_matches([';', ',']).trim_end();
    stripped.replace(['"', '`'], "'")
}

/// True when the added and deleted lines are the same multiset once normalized.
/// Blank lines are ignored on both sides.
pub fn is_formatting_only(lines: &[SliceLine]) -> bool {
    let collect = |kind: DiffLineKind| {
        let mut normalized: Vec<String> = lines
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| normalize_line(&l.text))
            .filter(|l| !l.is_empty())
            .collect();
        normalized.sort();
        normalized
    };

    collect(DiffLineKind::Add) == collect(DiffLineKind::Del)
}
