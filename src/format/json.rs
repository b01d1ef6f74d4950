//! JSON output format for critmap

use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use super::Formatter;
use crate::core::{FileNode, ScanReport};

/// Streams pretty-printed `files` one at a time, then the report-level sections.
pub struct JsonFormatter {
    first_file: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self { first_file: true }
    }
}

impl Formatter for JsonFormatter {
    fn write_header(&mut self, output: &mut dyn Write, _report: &ScanReport) -> Result<()> {
        self.first_file = true;
        writeln!(output, "{{")?;
        write!(output, "  \"files\": [")?;
        Ok(())
    }

    fn write_file(&mut self, output: &mut dyn Write, file: &FileNode) -> Result<()> {
        if !self.first_file {
            write!(output, ",")?;
        }
        self.first_file = false;
        write!(output, "\n    {}", pretty(file, 4)?)?;
        Ok(())
    }

    fn write_footer(&mut self, output: &mut dyn Write, report: &ScanReport) -> Result<()> {
        if !self.first_file {
            writeln!(output)?;
            write!(output, "  ")?;
        }
        writeln!(output, "],")?;
        writeln!(output, "  \"edges\": {},", pretty(&report.edges, 2)?)?;
        writeln!(
            output,
            "  \"blast_radius\": {},",
            pretty(&report.blast_radius, 2)?
        )?;
        writeln!(
            output,
            "  \"impacted_files\": {},",
            pretty(&report.impacted_files, 2)?
        )?;
        writeln!(
            output,
            "  \"ambiguities\": {}",
            pretty(&report.ambiguities, 2)?
        )?;
        writeln!(output, "}}")?;
        Ok(())
    }
}

/// Pretty JSON whose continuation lines sit `indent` spaces deep.
fn pretty<T: Serialize + ?Sized>(value: &T, indent: usize) -> Result<String> {
    let text = serde_json::to_string_pretty(value)?;
    Ok(text.replace('\n', &format!("\n{}", " ".repeat(indent))))
}
