//! Structured payload extraction.
//!
//! Models are asked to end with a JSON object but wrap it in prose, fences,
//! `Finish[...]` actions or reasoning blocks, and sometimes break the JSON
//! itself. [`PayloadExtractor`] tries a fixed sequence of independent
//! [`ExtractionStrategy`] objects and returns the first object found, or an
//! [`ExtractionFailure`] with a diagnostic excerpt.
//!
//! ```
//! use sieve_extract::{ArticleDraft, PayloadExtractor};
//!
//! let text = "Thought: ready.\nFinish[{\"title\": \"Intro\", \"content\": \"Hello\"}]";
//! let record = PayloadExtractor::default().extract(text).unwrap();
//! let draft: ArticleDraft = record.deserialize().unwrap();
//! assert_eq!(draft.title, "Intro");
//! ```

pub mod candidate;
pub mod extractor;
pub mod reconstruct;
pub mod record;
pub mod repair;
pub mod strategy;

pub use candidate::{ExtractionCandidate, best_candidate, collect_candidates, rank_candidates};
pub use extractor::{PayloadExtractor, default_strategies};
pub use record::{ArticleDraft, ExtractionFailure, StructuredRecord};
pub use strategy::{ExtractContext, ExtractionStrategy};
