use serpsim_local::{KeywordSummary, RunConfig, RunReport};
use std::fmt::Write as _;
use std::path::PathBuf;

pub(crate) fn notice_hint(code: &str) -> Option<&'static str> {
    match code {
        "network_failure" => Some(
            "The API call failed (connection error or non-2xx). Check credentials, account balance and SERPSIM_DATAFORSEO_ENDPOINT; remaining calls for this keyword were skipped.",
        ),
        "malformed_response" => Some(
            "The API answered with something that is not a SERP document. Re-run with --export-raw to inspect the payload.",
        ),
        "insufficient_corpus" => Some(
            "At least two snippets are needed for a comparison. Increase --calls or add locations.",
        ),
        "degenerate_corpus" => Some(
            "Every snippet reduced to an empty vocabulary (e.g. punctuation only); nothing to compare.",
        ),
        "no_snippets" => Some(
            "None of the responses contained the requested element. Try --mode ai-overview, or a different keyword.",
        ),
        _ => None,
    }
}

fn notices_json(ns: &[serpsim_local::Notice]) -> Vec<serde_json::Value> {
    ns.iter()
        .map(|n| {
            serde_json::json!({
                "code": n.code,
                "message": n.message,
                "hint": notice_hint(n.code).unwrap_or(""),
            })
        })
        .collect()
}

fn keyword_json(k: &KeywordSummary) -> serde_json::Value {
    serde_json::json!({
        "keyword": k.keyword,
        "ok": k.ok,
        "calls_requested": k.calls_requested,
        "corpus_size": k.corpus_size,
        "snippets": k.snippets,
        "missing": k.missing,
        "skipped": k.skipped,
        "similarity_matrix": k.similarity_matrix,
        "errors": notices_json(&k.errors),
        "notes": notices_json(&k.notes),
    })
}

pub(crate) fn run_json(
    report: &RunReport,
    cfg: &RunConfig,
    provider: &str,
    generated_at_epoch_s: u64,
    exports: &[PathBuf],
) -> serde_json::Value {
    serde_json::json!({
        "schema_version": 1,
        "kind": "run",
        "ok": report.keywords.iter().all(|k| k.ok),
        "provider": provider,
        "generated_at_epoch_s": generated_at_epoch_s,
        "inputs": {
            "keyword_count": cfg.keywords.len(),
            "location_count": cfg.locations.len(),
            "calls": cfg.calls,
            "mode": cfg.mode.as_str(),
            "request_shape": cfg.shape.as_str(),
        },
        "keywords": report.keywords.iter().map(keyword_json).collect::<Vec<_>>(),
        "record_count": report.records.len(),
        "raw_html_count": report.raw_html.len(),
        "nothing_to_export": exports.is_empty(),
        "exports": exports.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
    })
}

/// Human-readable rendering, one section per keyword.
pub(crate) fn run_text(report: &RunReport, cfg: &RunConfig, exports: &[PathBuf]) -> String {
    let label = match cfg.mode {
        serpsim_core::ExtractMode::AnswerBox => "Answer Box",
        serpsim_core::ExtractMode::AiOverview => "AI Overview",
    };
    let mut out = String::new();
    for k in &report.keywords {
        let _ = writeln!(out, "## {}", k.keyword);
        for (i, s) in k.snippets.iter().enumerate() {
            let _ = writeln!(out, "{label} {} ({}): {}", i + 1, s.location, s.text);
        }
        if let Some(m) = &k.similarity_matrix {
            let _ = writeln!(out, "### Similarity Matrix");
            for row in m {
                let cells: Vec<String> = row.iter().map(|v| format!("{v:.4}")).collect();
                let _ = writeln!(out, "  [{}]", cells.join(", "));
            }
        }
        if !k.missing.is_empty() {
            let _ = writeln!(out, "No {label} found in requests: {:?}", k.missing);
        }
        if !k.skipped.is_empty() {
            let _ = writeln!(out, "Skipped requests: {:?}", k.skipped);
        }
        for n in k.errors.iter().chain(k.notes.iter()) {
            let _ = writeln!(out, "[{}] {}", n.code, n.message);
        }
        out.push('\n');
    }
    if exports.is_empty() {
        out.push_str("Nothing to export.\n");
    } else {
        for p in exports {
            let _ = writeln!(out, "wrote {}", p.display());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serpsim_core::{ExtractMode, Location, RequestShape, SearchTarget};
    use serpsim_local::{KeywordOutcome, Notice, TfidfConfig};

    fn cfg() -> RunConfig {
        RunConfig {
            keywords: vec!["maldives".to_string()],
            locations: vec![Location::Code(2840)],
            target: SearchTarget::default(),
            calls: 2,
            mode: ExtractMode::AnswerBox,
            shape: RequestShape::SingleTask,
            keep_raw: false,
            tfidf: TfidfConfig::default(),
        }
    }

    #[test]
    fn every_keyword_notice_code_has_a_hint() {
        for code in [
            "network_failure",
            "malformed_response",
            "insufficient_corpus",
            "degenerate_corpus",
            "no_snippets",
        ] {
            assert!(notice_hint(code).is_some(), "missing hint for {code}");
        }
        assert!(notice_hint("unknown").is_none());
    }

    #[test]
    fn run_json_reports_failed_keyword_and_empty_exports() {
        let mut report = RunReport::default();
        report.push(KeywordOutcome {
            keyword: "maldives".to_string(),
            calls_requested: 2,
            skipped: vec![1, 2],
            errors: vec![Notice {
                code: "network_failure",
                message: "network failure: HTTP 500".to_string(),
            }],
            ..KeywordOutcome::default()
        });
        let v = run_json(&report, &cfg(), "dataforseo", 1_700_000_000, &[]);
        assert_eq!(v["kind"].as_str(), Some("run"));
        assert_eq!(v["ok"].as_bool(), Some(false));
        assert_eq!(v["nothing_to_export"].as_bool(), Some(true));
        assert_eq!(v["keywords"][0]["errors"][0]["code"].as_str(), Some("network_failure"));
        assert!(!v["keywords"][0]["errors"][0]["hint"].as_str().unwrap_or("").is_empty());

        let text = run_text(&report, &cfg(), &[]);
        assert!(text.contains("## maldives"));
        assert!(text.contains("Nothing to export."));
    }
}
