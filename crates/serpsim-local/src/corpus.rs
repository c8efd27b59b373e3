use serde::Serialize;
use serpsim_core::{CorpusEntry, Location, Snippet};

/// One extraction outcome from a keyword batch, in call order.
#[derive(Debug, Clone)]
pub struct Harvested {
    pub keyword: String,
    pub location: Location,
    /// 1-based.
    pub call_index: usize,
    pub snippet: Snippet,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Corpus {
    pub entries: Vec<CorpusEntry>,
    /// 1-based call indices with no usable snippet.
    pub missing: Vec<usize>,
}

impl Corpus {
    pub fn texts(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.text.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Order-preserving partition of a batch into corpus entries and missing call indices.
///
/// Absent snippets and present-but-blank ones both land in `missing`.
pub fn build_corpus(harvest: Vec<Harvested>) -> Corpus {
    let mut out = Corpus::default();
    for h in harvest {
        match h.snippet.usable_text() {
            Some(text) => out.entries.push(CorpusEntry {
                keyword: h.keyword,
                location: h.location,
                call_index: h.call_index,
                text: text.to_string(),
            }),
            None => out.missing.push(h.call_index),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn h(call_index: usize, snippet: Snippet) -> Harvested {
        Harvested {
            keyword: "maldives".to_string(),
            location: Location::Name(format!("loc-{call_index}")),
            call_index,
            snippet,
        }
    }

    #[test]
    fn absent_and_blank_go_to_missing() {
        let c = build_corpus(vec![
            h(1, Snippet::found("Maldives are atolls".to_string(), None)),
            h(2, Snippet::absent()),
            h(3, Snippet::found("   ".to_string(), None)),
            h(4, Snippet::found("Maldives".to_string(), None)),
        ]);
        assert_eq!(c.missing, vec![2, 3]);
        assert_eq!(
            c.entries.iter().map(|e| e.call_index).collect::<Vec<_>>(),
            vec![1, 4]
        );
        assert_eq!(c.entries[1].location, Location::Name("loc-4".to_string()));
        assert_eq!(c.texts(), vec!["Maldives are atolls", "Maldives"]);
    }

    #[test]
    fn empty_batch_is_empty_corpus() {
        let c = build_corpus(Vec::new());
        assert!(c.is_empty());
        assert!(c.missing.is_empty());
    }

    proptest! {
        #[test]
        fn partition_is_complete_and_order_preserving(
            flags in prop::collection::vec(prop::option::of("[a-z ]{0,12}"), 0..24),
        ) {
            let harvest: Vec<Harvested> = flags
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    let s = match f {
                        Some(t) => Snippet::found(t.clone(), None),
                        None => Snippet::absent(),
                    };
                    h(i + 1, s)
                })
                .collect();
            let n = harvest.len();
            let c = build_corpus(harvest);
            prop_assert_eq!(c.entries.len() + c.missing.len(), n);

            let kept: Vec<usize> = c.entries.iter().map(|e| e.call_index).collect();
            prop_assert!(kept.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(c.missing.windows(2).all(|w| w[0] < w[1]));
            for idx in &kept {
                prop_assert!(!c.missing.contains(idx));
            }
        }
    }
}
