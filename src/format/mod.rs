//! Output format modules for critmap

pub mod json;
pub mod markdown;
pub mod plain;

use anyhow::Result;
use std::io::Write;

use crate::config::OutputFormat;
use crate::core::{FileNode, ScanReport};

/// Streams a report: one header, one call per scored file, one footer.
pub trait Formatter {
    fn write_header(&mut self, output: &mut dyn Write, report: &ScanReport) -> Result<()>;

    fn write_file(&mut self, output: &mut dyn Write, file: &FileNode) -> Result<()>;

    /// Edges, impacted callers, blast radius and ambiguities
    fn write_footer(&mut self, output: &mut dyn Write, report: &ScanReport) -> Result<()>;
}

pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Json => Box::new(json::JsonFormatter::new()),
        OutputFormat::Markdown => Box::new(markdown::MarkdownFormatter),
        OutputFormat::Plain => Box::new(plain::PlainFormatter),
    }
}

/// Writes the whole report through `formatter`.
pub fn write_report(
    formatter: &mut dyn Formatter,
    output: &mut dyn Write,
    report: &ScanReport,
) -> Result<()> {
    formatter.write_header(output, report)?;
    for file in &report.files {
        formatter.write_file(output, file)?;
    }
    formatter.write_footer(output, report)?;
    output.flush()?;
    Ok(())
}

/// Short status tag of a symbol, `sig` marking a changed signature
pub(crate) fn symbol_tags(symbol: &crate::core::ChangedSymbol) -> String {
    let mut tags = Vec::new();
    if symbol.sig_changed {
        tags.push("sig");
    }
    if symbol.impacted {
        tags.push("impacted");
    }
    if symbol.is_type {
        tags.push("type");
    }
    tags.join(",")
}
