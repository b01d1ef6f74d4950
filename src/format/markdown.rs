//! Markdown review report for critmap

use anyhow::Result;
use std::io::Write;

use super::{Formatter, symbol_tags};
use crate::core::{FileNode, ScanReport};
use crate::utils::rank::crit_level;

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn write_header(&mut self, output: &mut dyn Write, report: &ScanReport) -> Result<()> {
        writeln!(output, "# Change Criticality")?;
        writeln!(output)?;
        writeln!(
            output,
            "> {} changed files, {} dependency edges, {} impacted callers",
            report.files.len(),
            report.edges.len(),
            report.impacted_files.len()
        )?;
        writeln!(output)?;

        if !report.files.is_empty() {
            writeln!(output, "| Crit | Level | File | Type | Dependents | +/- |")?;
            writeln!(output, "|-----:|-------|------|------|-----------:|-----|")?;
            for file in &report.files {
                writeln!(
                    output,
                    "| {:.1} | {} | `{}` | {} | {} | +{}/-{} |",
                    file.crit,
                    crit_level(file.crit),
                    file.path.display(),
                    file.file_type.as_str(),
                    file.dependency_count,
                    file.additions,
                    file.deletions
                )?;
            }
            writeln!(output)?;
        }
        Ok(())
    }

    fn write_file(&mut self, output: &mut dyn Write, file: &FileNode) -> Result<()> {
        let active: Vec<_> = file.symbols.iter().filter(|s| s.crit > 0.0).collect();
        if active.is_empty() {
            return Ok(());
        }

        writeln!(output, "## `{}` ({:.1})", file.path.display(), file.crit)?;
        writeln!(output)?;
        if file.tested {
            writeln!(output, "*Test file touched in the same change.*")?;
            writeln!(output)?;
        }
        writeln!(output, "| Crit | Symbol | Status | Usages | Flags |")?;
        writeln!(output, "|-----:|--------|--------|-------:|-------|")?;
        for symbol in active {
            writeln!(
                output,
                "| {:.1} | `{}` | {} | {} | {} |",
                symbol.crit,
                symbol.name,
                symbol.status.as_str(),
                symbol.usages,
                symbol_tags(symbol)
            )?;
        }
        writeln!(output)?;
        Ok(())
    }

    fn write_footer(&mut self, output: &mut dyn Write, report: &ScanReport) -> Result<()> {
        if !report.impacted_files.is_empty() {
            writeln!(output, "## Impacted Callers")?;
            writeln!(output)?;
            for path in &report.impacted_files {
                writeln!(output, "- `{}`", path.display())?;
            }
            writeln!(output)?;
        }

        if !report.blast_radius.is_empty() {
            writeln!(output, "## Blast Radius")?;
            writeln!(output)?;
            for entry in &report.blast_radius {
                writeln!(output, "- `{}` ({} hop)", entry.path.display(), entry.hops)?;
            }
            writeln!(output)?;
        }

        if !report.ambiguities.is_empty() {
            writeln!(output, "## Ambiguous Injections")?;
            writeln!(output)?;
            for a in &report.ambiguities {
                writeln!(
                    output,
                    "- `{}` in `{}` resolved to `{}` ({} candidates)",
                    a.type_name,
                    a.from.display(),
                    a.chosen.display(),
                    a.candidates.len()
                )?;
            }
            writeln!(output)?;
        }
        Ok(())
    }
}
