//! Per-keyword batch processing and the run-level fold.
//!
//! Calls are issued strictly one after another. A transport or parse failure stops
//! the current keyword's remaining calls but never the run: every keyword returns a
//! `KeywordOutcome` value and `run` folds them into one `RunReport`.

use crate::aggregate::{aggregate, KeywordOutcome, Notice, RunReport};
use crate::corpus::{build_corpus, Harvested};
use crate::extract::{extract_task, raw_html_file, task_status};
use crate::similarity::{similarity_matrix, TfidfConfig};
use serpsim_core::{
    Error, ExtractMode, Location, Query, RawHtmlLink, RequestShape, Result, SearchTarget,
    SerpProvider,
};
use tracing::Instrument;

pub const MAX_CALLS: usize = 10;

/// DataForSEO's "Ok." task status.
const TASK_OK: i64 = 20000;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub keywords: Vec<String>,
    pub locations: Vec<Location>,
    pub target: SearchTarget,
    /// Calls per keyword (1..=MAX_CALLS).
    pub calls: usize,
    pub mode: ExtractMode,
    pub shape: RequestShape,
    /// Keep every fetched document for the raw dump.
    pub keep_raw: bool,
    pub tfidf: TfidfConfig,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.keywords.is_empty() {
            return Err(Error::InvalidConfig("no keywords given".to_string()));
        }
        if self.locations.is_empty() {
            return Err(Error::InvalidConfig("no locations given".to_string()));
        }
        if !(1..=MAX_CALLS).contains(&self.calls) {
            return Err(Error::InvalidConfig(format!(
                "calls per keyword must be in 1..={MAX_CALLS}, got {}",
                self.calls
            )));
        }
        Ok(())
    }
}

fn read_task(
    doc: &serde_json::Value,
    task_index: usize,
    query: &Query,
    call_index: usize,
    mode: ExtractMode,
) -> Result<(Harvested, Option<RawHtmlLink>)> {
    if let Some((code, msg)) = task_status(doc, task_index) {
        if code != TASK_OK {
            tracing::warn!(call_index, status_code = code, status_message = %msg, "task not ok");
        }
    }
    let snippet = extract_task(doc, task_index, mode)?;
    tracing::debug!(call_index, present = snippet.present, "extracted");
    let link = raw_html_file(doc, task_index)?.map(|raw_html_file| RawHtmlLink {
        keyword: query.keyword.clone(),
        location: query.location.clone(),
        raw_html_file,
    });
    let harvested = Harvested {
        keyword: query.keyword.clone(),
        location: query.location.clone(),
        call_index,
        snippet,
    };
    Ok((harvested, link))
}

struct Batch {
    harvest: Vec<Harvested>,
    raw_html: Vec<RawHtmlLink>,
    raw_responses: Vec<serde_json::Value>,
    /// Call index at which the batch aborted, and why.
    aborted: Option<(usize, Error)>,
}

impl Batch {
    fn new() -> Self {
        Self {
            harvest: Vec::new(),
            raw_html: Vec::new(),
            raw_responses: Vec::new(),
            aborted: None,
        }
    }

    fn accept(&mut self, read: Result<(Harvested, Option<RawHtmlLink>)>, call_index: usize) -> bool {
        match read {
            Ok((h, link)) => {
                self.harvest.push(h);
                self.raw_html.extend(link);
                true
            }
            Err(e) => {
                self.aborted = Some((call_index, e));
                false
            }
        }
    }
}

async fn fetch_single<P: SerpProvider + ?Sized>(provider: &P, cfg: &RunConfig, queries: &[Query]) -> Batch {
    let mut batch = Batch::new();
    for (i, q) in queries.iter().enumerate() {
        let call_index = i + 1;
        tracing::debug!(call_index, location = %q.location, params = %q.to_task(), "api call");
        let read = match provider
            .post(std::slice::from_ref(q), RequestShape::SingleTask)
            .await
        {
            Ok(r) => {
                let read = read_task(&r.document, 0, q, call_index, cfg.mode);
                if cfg.keep_raw {
                    batch.raw_responses.push(r.document);
                }
                read
            }
            Err(e) => Err(e),
        };
        if !batch.accept(read, call_index) {
            break;
        }
    }
    batch
}

async fn fetch_multi<P: SerpProvider + ?Sized>(provider: &P, cfg: &RunConfig, queries: &[Query]) -> Batch {
    let mut batch = Batch::new();
    tracing::debug!(tasks = queries.len(), "api call (multi-task)");
    let r = match provider.post(queries, RequestShape::MultiTask).await {
        Ok(r) => r,
        Err(e) => {
            batch.aborted = Some((1, e));
            return batch;
        }
    };
    for (i, q) in queries.iter().enumerate() {
        let read = read_task(&r.document, i, q, i + 1, cfg.mode);
        if !batch.accept(read, i + 1) {
            break;
        }
    }
    if cfg.keep_raw {
        batch.raw_responses.push(r.document);
    }
    batch
}

/// Process one keyword: fetch, extract, build the corpus, compare, aggregate.
pub async fn run_keyword<P: SerpProvider + ?Sized>(
    provider: &P,
    cfg: &RunConfig,
    keyword: &str,
) -> KeywordOutcome {
    let span = tracing::info_span!("keyword", keyword = %keyword, provider = provider.name());
    process_keyword(provider, cfg, keyword).instrument(span).await
}

async fn process_keyword<P: SerpProvider + ?Sized>(
    provider: &P,
    cfg: &RunConfig,
    keyword: &str,
) -> KeywordOutcome {
    let mut out = KeywordOutcome {
        keyword: keyword.to_string(),
        calls_requested: cfg.calls,
        ..KeywordOutcome::default()
    };

    let queries: Option<Vec<Query>> = (0..cfg.calls)
        .map(|i| Query::for_call(keyword, &cfg.locations, i, &cfg.target))
        .collect();
    let Some(queries) = queries else {
        let e = Error::InvalidConfig("no locations given".to_string());
        out.errors.push(Notice::from(&e));
        out.skipped = (1..=cfg.calls).collect();
        return out;
    };

    let batch = match cfg.shape {
        RequestShape::SingleTask => fetch_single(provider, cfg, &queries).await,
        RequestShape::MultiTask => fetch_multi(provider, cfg, &queries).await,
    };
    let any_read = !batch.harvest.is_empty();
    if let Some((call_index, e)) = &batch.aborted {
        tracing::warn!(call_index, error = %e, "aborting remaining calls for keyword");
        out.errors.push(Notice::from(e));
        out.skipped = (*call_index..=cfg.calls).collect();
    }
    out.raw_html = batch.raw_html;
    out.raw_responses = batch.raw_responses;

    let corpus = build_corpus(batch.harvest);
    out.missing = corpus.missing.clone();

    if corpus.is_empty() {
        if any_read {
            out.notes.push(Notice {
                code: "no_snippets",
                message: format!("no {} found in the results", cfg.mode.as_str()),
            });
        }
    } else {
        match similarity_matrix(&corpus.texts(), &cfg.tfidf) {
            Ok(m) => {
                out.records = aggregate(keyword, &corpus.entries, &m);
                out.matrix = Some(m);
            }
            Err(e) => {
                tracing::info!(error = %e, "similarity skipped");
                out.notes.push(Notice::from(&e));
            }
        }
    }
    out.corpus = corpus.entries;

    tracing::info!(
        corpus = out.corpus.len(),
        missing = out.missing.len(),
        skipped = out.skipped.len(),
        records = out.records.len(),
        "keyword done"
    );
    out
}

/// Process every keyword in order and fold the outcomes.
pub async fn run<P: SerpProvider + ?Sized>(provider: &P, cfg: &RunConfig) -> RunReport {
    let mut report = RunReport::default();
    for keyword in &cfg.keywords {
        report.push(run_keyword(provider, cfg, keyword).await);
    }
    report
}
