use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::parser::extract::HookRecord;

const CSV_HEADER: &[&str] = &[
    "Post URL",
    "Section Title",
    "Title",
    "Framework",
    "Hook Score",
    "Why This Works",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Csv,
    Jsonl,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingLine<'a> {
    #[serde(flatten)]
    record: &'a HookRecord,
    embedding_text: String,
}

pub fn write_records(path: &Path, format: Format, records: &[HookRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    match format {
        Format::Csv => write_csv(&mut out, records)?,
        Format::Jsonl => write_jsonl(&mut out, records)?,
    }
    out.flush()?;
    Ok(())
}

fn write_csv<W: Write>(out: &mut W, records: &[HookRecord]) -> Result<()> {
    writeln!(out, "{}", CSV_HEADER.join(","))?;
    for r in records {
        let fields = [
            r.source_url.as_str(),
            r.section_title.as_str(),
            r.title.as_str(),
            r.framework.as_str(),
            r.hook_score.as_deref().unwrap_or(""),
            r.rationale.as_str(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        writeln!(out, "{}", line.join(","))?;
    }
    Ok(())
}

fn write_jsonl<W: Write>(out: &mut W, records: &[HookRecord]) -> Result<()> {
    for record in records {
        let line = EmbeddingLine {
            record,
            embedding_text: record.embedding_text(),
        };
        serde_json::to_writer(&mut *out, &line)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Always quoted; embedded quotes doubled.
fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
