//! Offline web search tool.
//!
//! Returns deterministic canned results so directive round trips can be
//! exercised without network access. Results for the same query are always
//! identical, and every title and URL marks itself as offline so a model
//! reading them back cannot take them for real search hits.

use async_trait::async_trait;
use serde::Serialize;
use sieve_core::directive::ParameterMap;
use sieve_core::error::ToolError;
use sieve_core::tool::Tool;

const DEFAULT_RESULTS: u64 = 3;
const MAX_RESULTS: u64 = 5;
const URL_SCHEME: &str = "offline://web_search";

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Offline stand-in for web search. Parameters: `query` (string), \
         optional `num_results` (1-5, default 3)."
    }

    async fn run(&self, parameters: &ParameterMap) -> Result<String, ToolError> {
        let query = parameters
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'query' parameter".into()))?;

        let count = parameters
            .get("num_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_RESULTS)
            .clamp(1, MAX_RESULTS) as usize;

        let results = search(query, count);
        serde_json::to_string_pretty(&results).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Canned topics as `(topic, snippet)`.
fn topics(query: &str) -> &'static [(&'static str, &'static str)] {
    if query.contains("rust") {
        &[
            (
                "ownership and borrowing",
                "Each value has one owner; references borrow without taking ownership.",
            ),
            (
                "traits and generics",
                "Traits describe shared behavior; generics are monomorphized per type.",
            ),
            (
                "async and futures",
                "Futures are lazy state machines driven by an executor such as tokio.",
            ),
        ]
    } else if query.contains("json") {
        &[
            (
                "objects and arrays",
                "JSON text is built from objects, arrays, strings, numbers and literals.",
            ),
            (
                "lenient dialects",
                "Some dialects allow comments, trailing commas and single quotes.",
            ),
        ]
    } else {
        &[]
    }
}

fn search(query: &str, count: usize) -> Vec<SearchHit> {
    let slug = query.split_whitespace().collect::<Vec<_>>().join("+");
    let hit = |i: usize, topic: &str, snippet: String| SearchHit {
        title: format!("offline result for \"{query}\": {topic}"),
        url: format!("{URL_SCHEME}/{slug}/{i}"),
        snippet,
    };

    let canned = topics(&query.to_lowercase());
    if canned.is_empty() {
        return (1..=count)
            .map(|i| hit(i, &format!("result {i}"), format!("Placeholder text {i} for '{query}'.")))
            .collect();
    }

    canned
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, (topic, snippet))| hit(i + 1, topic, snippet.to_string()))
        .collect()
}
