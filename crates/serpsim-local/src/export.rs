//! CSV and JSON exports of a run.

use crate::aggregate::RunReport;
use serpsim_core::{AggregateRecord, Error, RawHtmlLink, Result};
use std::borrow::Cow;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const SIMILARITY_CSV: &str = "combined_similarity_matrix.csv";
pub const RAW_HTML_CSV: &str = "raw_html_files.csv";
pub const RAW_RESPONSES_JSON: &str = "raw_responses.json";

fn csv_field(s: &str) -> Cow<'_, str> {
    if s.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}

/// `keyword,location,similarity_1..similarity_M` where M is the widest record.
///
/// Narrower records leave their trailing cells empty (absent, not zero).
pub fn similarity_csv(records: &[AggregateRecord]) -> String {
    let width = records
        .iter()
        .map(|r| r.similarities.len())
        .max()
        .unwrap_or(0);

    let mut out = String::from("keyword,location");
    for k in 1..=width {
        let _ = write!(out, ",similarity_{k}");
    }
    out.push('\n');

    for r in records {
        out.push_str(&csv_field(&r.keyword));
        out.push(',');
        out.push_str(&csv_field(&r.location.to_string()));
        for k in 0..width {
            out.push(',');
            if let Some(v) = r.similarities.get(k) {
                let _ = write!(out, "{v:?}");
            }
        }
        out.push('\n');
    }
    out
}

pub fn raw_html_csv(links: &[RawHtmlLink]) -> String {
    let mut out = String::from("keyword,location,raw_html_file\n");
    for l in links {
        let _ = writeln!(
            out,
            "{},{},{}",
            csv_field(&l.keyword),
            csv_field(&l.location.to_string()),
            csv_field(&l.raw_html_file)
        );
    }
    out
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).map_err(|e| Error::Export(format!("{}: {e}", path.display())))
}

/// Write every non-empty export into `out_dir` and return the written paths.
///
/// An empty report writes nothing (and does not create `out_dir`).
pub fn write_exports(report: &RunReport, out_dir: &Path, export_raw: bool) -> Result<Vec<PathBuf>> {
    let raw_wanted = export_raw && !report.raw_responses.is_empty();
    if report.is_empty() && !raw_wanted {
        return Ok(Vec::new());
    }
    fs::create_dir_all(out_dir)
        .map_err(|e| Error::Export(format!("{}: {e}", out_dir.display())))?;

    let mut written = Vec::new();
    if !report.records.is_empty() {
        let p = out_dir.join(SIMILARITY_CSV);
        write_file(&p, similarity_csv(&report.records).as_bytes())?;
        written.push(p);
    }
    if !report.raw_html.is_empty() {
        let p = out_dir.join(RAW_HTML_CSV);
        write_file(&p, raw_html_csv(&report.raw_html).as_bytes())?;
        written.push(p);
    }
    if raw_wanted {
        let p = out_dir.join(RAW_RESPONSES_JSON);
        let body = serde_json::to_vec_pretty(&report.raw_responses)
            .map_err(|e| Error::Export(e.to_string()))?;
        write_file(&p, &body)?;
        written.push(p);
    }
    tracing::info!(files = written.len(), dir = %out_dir.display(), "exports written");
    Ok(written)
}
