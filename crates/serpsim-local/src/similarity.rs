//! TF-IDF vectors and all-pairs cosine similarity.
//!
//! Weighting follows the common smoothed variant:
//! `tf(t, d) * (ln((1 + n) / (1 + df(t))) + 1)`, then each document vector is
//! L2-normalized so the Gram matrix is exactly the cosine similarity.

use serde::Serialize;
use serpsim_core::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Fewer texts than this are not compared.
pub const MIN_CORPUS: usize = 2;

#[derive(Debug, Clone)]
pub struct TfidfConfig {
    /// Tokens shorter than this (in chars) are dropped.
    pub min_token_chars: usize,
    /// Lowercased tokens to ignore. Empty by default.
    pub stop_words: BTreeSet<String>,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            min_token_chars: 2,
            stop_words: BTreeSet::new(),
        }
    }
}

fn is_token_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn push_token(cur: &mut String, out: &mut Vec<String>, cfg: &TfidfConfig) {
    if cur.chars().count() >= cfg.min_token_chars && !cfg.stop_words.contains(cur.as_str()) {
        out.push(std::mem::take(cur));
    } else {
        cur.clear();
    }
}

pub fn tokenize(text: &str, cfg: &TfidfConfig) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    for ch in text.chars() {
        if is_token_char(ch) {
            for lc in ch.to_lowercase() {
                cur.push(lc);
            }
        } else if !cur.is_empty() {
            push_token(&mut cur, &mut out, cfg);
        }
    }
    if !cur.is_empty() {
        push_token(&mut cur, &mut out, cfg);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityMatrix {
    values: Vec<Vec<f64>>,
}

impl SimilarityMatrix {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i]
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i][j]
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.values
    }
}

/// L2-normalized TF-IDF vectors over the corpus vocabulary (sorted term order).
///
/// Fails with `DegenerateCorpus` when no text contributes a single token.
pub fn tfidf_vectors<S: AsRef<str>>(texts: &[S], cfg: &TfidfConfig) -> Result<Vec<Vec<f64>>> {
    let docs: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t.as_ref(), cfg)).collect();

    let mut df: BTreeMap<&str, usize> = BTreeMap::new();
    for doc in &docs {
        let uniq: BTreeSet<&str> = doc.iter().map(|s| s.as_str()).collect();
        for term in uniq {
            *df.entry(term).or_insert(0) += 1;
        }
    }
    if df.is_empty() {
        return Err(Error::DegenerateCorpus);
    }

    let n = docs.len() as f64;
    let vocab: BTreeMap<&str, usize> = df.keys().enumerate().map(|(i, t)| (*t, i)).collect();
    let idf: Vec<f64> = df
        .values()
        .map(|&d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
        .collect();

    let mut out = Vec::with_capacity(docs.len());
    for doc in &docs {
        let mut v = vec![0.0f64; vocab.len()];
        for term in doc {
            if let Some(&i) = vocab.get(term.as_str()) {
                v[i] += 1.0;
            }
        }
        for (w, idf) in v.iter_mut().zip(idf.iter()) {
            *w *= idf;
        }
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            for w in v.iter_mut() {
                *w /= norm;
            }
        }
        out.push(v);
    }
    Ok(out)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// All-pairs cosine similarity for `texts`, in input order.
///
/// The diagonal is 1.0 by definition. A text with no tokens (in a corpus where
/// others have some) scores 0.0 against every other text.
pub fn similarity_matrix<S: AsRef<str>>(texts: &[S], cfg: &TfidfConfig) -> Result<SimilarityMatrix> {
    if texts.len() < MIN_CORPUS {
        return Err(Error::InsufficientCorpus {
            available: texts.len(),
            required: MIN_CORPUS,
        });
    }
    let vecs = tfidf_vectors(texts, cfg)?;
    let n = vecs.len();
    let mut values = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        values[i][i] = 1.0;
        for j in (i + 1)..n {
            let s = dot(&vecs[i], &vecs[j]).clamp(0.0, 1.0);
            values[i][j] = s;
            values[j][i] = s;
        }
    }
    Ok(SimilarityMatrix { values })
}
