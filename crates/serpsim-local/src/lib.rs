//! Local implementations for `serpsim`: the DataForSEO client and the
//! extract -> corpus -> similarity -> aggregate -> export pipeline.

pub mod aggregate;
pub mod canon;
pub mod corpus;
pub mod dataforseo;
pub mod export;
pub mod extract;
pub mod pipeline;
pub mod similarity;

pub use aggregate::{aggregate, KeywordOutcome, KeywordSummary, Notice, RunReport};
pub use corpus::{build_corpus, Corpus, Harvested};
pub use dataforseo::DataForSeoProvider;
pub use pipeline::{run, run_keyword, RunConfig, MAX_CALLS};
pub use similarity::{similarity_matrix, SimilarityMatrix, TfidfConfig};
