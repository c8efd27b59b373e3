use crate::similarity::SimilarityMatrix;
use serde::Serialize;
use serpsim_core::{AggregateRecord, CorpusEntry, Error, RawHtmlLink};

/// One similarity record per matrix row, labelled with the batch keyword and the
/// location of the row's corpus entry.
pub fn aggregate(
    keyword: &str,
    entries: &[CorpusEntry],
    matrix: &SimilarityMatrix,
) -> Vec<AggregateRecord> {
    debug_assert_eq!(entries.len(), matrix.len());
    entries
        .iter()
        .zip(matrix.rows())
        .map(|(entry, row)| AggregateRecord {
            keyword: keyword.to_string(),
            location: entry.location.clone(),
            similarities: row.clone(),
        })
        .collect()
}

/// A reportable condition: `{code, message}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub code: &'static str,
    pub message: String,
}

impl From<&Error> for Notice {
    fn from(e: &Error) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

/// Everything one keyword batch produced.
#[derive(Debug, Clone, Default)]
pub struct KeywordOutcome {
    pub keyword: String,
    pub calls_requested: usize,
    pub corpus: Vec<CorpusEntry>,
    pub missing: Vec<usize>,
    /// Calls never attempted (or unreadable) because the batch aborted.
    pub skipped: Vec<usize>,
    pub matrix: Option<SimilarityMatrix>,
    pub records: Vec<AggregateRecord>,
    pub raw_html: Vec<RawHtmlLink>,
    pub raw_responses: Vec<serde_json::Value>,
    /// Failures that aborted the batch.
    pub errors: Vec<Notice>,
    /// Informational conditions (too few snippets, empty vocabulary).
    pub notes: Vec<Notice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordSummary {
    pub keyword: String,
    pub ok: bool,
    pub calls_requested: usize,
    pub corpus_size: usize,
    pub snippets: Vec<CorpusEntry>,
    pub missing: Vec<usize>,
    pub skipped: Vec<usize>,
    pub similarity_matrix: Option<Vec<Vec<f64>>>,
    pub errors: Vec<Notice>,
    pub notes: Vec<Notice>,
}

/// Accumulated results of a run, in keyword-processing order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub keywords: Vec<KeywordSummary>,
    pub records: Vec<AggregateRecord>,
    pub raw_html: Vec<RawHtmlLink>,
    pub raw_responses: Vec<serde_json::Value>,
}

impl RunReport {
    pub fn push(&mut self, outcome: KeywordOutcome) {
        self.keywords.push(KeywordSummary {
            ok: outcome.errors.is_empty(),
            corpus_size: outcome.corpus.len(),
            similarity_matrix: outcome.matrix.map(|m| m.rows().to_vec()),
            keyword: outcome.keyword,
            calls_requested: outcome.calls_requested,
            snippets: outcome.corpus,
            missing: outcome.missing,
            skipped: outcome.skipped,
            errors: outcome.errors,
            notes: outcome.notes,
        });
        self.records.extend(outcome.records);
        self.raw_html.extend(outcome.raw_html);
        self.raw_responses.extend(outcome.raw_responses);
    }

    /// Nothing worth a download: no similarity rows and no raw HTML links.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.raw_html.is_empty()
    }

    /// Widest record, i.e. the number of similarity columns in a combined table.
    pub fn max_arity(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.similarities.len())
            .max()
            .unwrap_or(0)
    }
}

impl FromIterator<KeywordOutcome> for RunReport {
    fn from_iter<I: IntoIterator<Item = KeywordOutcome>>(iter: I) -> Self {
        iter.into_iter().fold(RunReport::default(), |mut acc, o| {
            acc.push(o);
            acc
        })
    }
}
