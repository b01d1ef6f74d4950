//! Plain terminal listing for critmap

use anyhow::Result;
use std::io::Write;

use super::{Formatter, symbol_tags};
use crate::core::{FileNode, ScanReport};
use crate::utils::rank::crit_level;

pub struct PlainFormatter;

impl Formatter for PlainFormatter {
    fn write_header(&mut self, output: &mut dyn Write, report: &ScanReport) -> Result<()> {
        writeln!(output, "=== CHANGE CRITICALITY ===")?;
        writeln!(
            output,
            "{} files, {} edges",
            report.files.len(),
            report.edges.len()
        )?;
        writeln!(output)?;
        Ok(())
    }

    fn write_file(&mut self, output: &mut dyn Write, file: &FileNode) -> Result<()> {
        writeln!(
            output,
            "[{:>4.1} {:<8}] {} ({}, {} dependents)",
            file.crit,
            crit_level(file.crit),
            file.path.display(),
            file.file_type.as_str(),
            file.dependency_count
        )?;
        for symbol in file.symbols.iter().filter(|s| s.crit > 0.0) {
            let tags = symbol_tags(symbol);
            write!(output, "    {:>4.1}  {}", symbol.crit, symbol.name)?;
            if !tags.is_empty() {
                write!(output, "  [{}]", tags)?;
            }
            writeln!(output)?;
        }
        Ok(())
    }

    fn write_footer(&mut self, output: &mut dyn Write, report: &ScanReport) -> Result<()> {
        if !report.impacted_files.is_empty() {
            writeln!(output)?;
            writeln!(output, "=== IMPACTED ===")?;
            for path in &report.impacted_files {
                writeln!(output, "- {}", path.display())?;
            }
        }
        if !report.blast_radius.is_empty() {
            writeln!(output)?;
            writeln!(output, "=== BLAST RADIUS ===")?;
            for entry in &report.blast_radius {
                writeln!(output, "{} {}", "-".repeat(entry.hops), entry.path.display())?;
            }
        }
        writeln!(output)?;
        writeln!(output, "=== END ===")?;
        Ok(())
    }
}
