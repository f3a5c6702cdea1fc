//! The payload extractor: ordered strategies over finished text.

use crate::reconstruct::FieldReconstruction;
use crate::record::{ExtractionFailure, StructuredRecord};
use crate::repair::{excerpt, strip_reasoning};
use crate::strategy::{
    AnyFence, BalancedCandidates, DirectParse, ExtractContext, ExtractionStrategy, FinishWrapper,
    LabeledFence,
};
use sieve_config::ExtractorConfig;
use tracing::{debug, warn};

/// Turns a model's final text into a [`StructuredRecord`].
///
/// Strategies run in order and the first success wins:
/// `Finish[...]` unwrapping, direct parse, labelled fence, any fence,
/// ranked brace candidates, then field-level reconstruction.
pub struct PayloadExtractor {
    config: ExtractorConfig,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl PayloadExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let strategies = default_strategies(&config);
        Self::with_strategies(config, strategies)
    }

    /// Use a custom strategy list, e.g. without field reconstruction.
    pub fn with_strategies(
        config: ExtractorConfig,
        strategies: Vec<Box<dyn ExtractionStrategy>>,
    ) -> Self {
        Self { config, strategies }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Extract a record from `text`.
    ///
    /// Reasoning blocks (`<think>…</think>`) are removed first. On failure
    /// the error carries a bounded prefix of the original text.
    pub fn extract(&self, text: &str) -> Result<StructuredRecord, ExtractionFailure> {
        let cleaned = strip_reasoning(text);

        match self.extract_at(&cleaned, 0) {
            Some(record) => {
                debug!(
                    strategy = record.strategy,
                    fields = record.fields.len(),
                    "Extracted structured payload"
                );
                Ok(record)
            }
            None => {
                let failure = ExtractionFailure {
                    excerpt: excerpt(text, self.config.excerpt_chars),
                    attempted: self.strategy_names(),
                };
                warn!(
                    chars = text.chars().count(),
                    "No extraction strategy matched"
                );
                Err(failure)
            }
        }
    }

    /// Run the strategies at a given `Finish[...]` nesting depth.
    pub(crate) fn extract_at(&self, text: &str, depth: usize) -> Option<StructuredRecord> {
        let cx = ExtractContext {
            extractor: self,
            depth,
        };

        self.strategies.iter().find_map(|strategy| {
            strategy
                .try_extract(text, &cx)
                .map(|fields| StructuredRecord {
                    fields,
                    strategy: strategy.name(),
                })
        })
    }
}

impl Default for PayloadExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

/// The standard strategy order.
pub fn default_strategies(config: &ExtractorConfig) -> Vec<Box<dyn ExtractionStrategy>> {
    vec![
        Box::new(FinishWrapper),
        Box::new(DirectParse),
        Box::new(LabeledFence),
        Box::new(AnyFence),
        Box::new(BalancedCandidates),
        Box::new(FieldReconstruction::new(&config.reconstruction)),
    ]
}
