//! A provider that plays back a fixed script.
//!
//! Used by the `replay` command and by tests. Each streamed call returns the
//! next scripted turn, cut into fixed-size chunks so that directives and
//! payloads straddle chunk boundaries the way real streams do.

use async_trait::async_trait;
use serde::Deserialize;
use sieve_core::error::ProviderError;
use sieve_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// The on-disk form of a script.
///
/// ```toml
/// chunk_chars = 7
/// fallback = "Finish[{\"content\": \"...\"}]"
///
/// [[turns]]
/// text = "Let me check. [TOOL_CALL:calculator:{\"expression\": \"6*7\"}]"
///
/// [[turns]]
/// text = "{\"title\": \"Answer\", \"content\": \"42\"}"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Script {
    /// Characters per streamed chunk; 0 sends each turn whole.
    #[serde(default)]
    pub chunk_chars: usize,

    /// Returned by non-streaming calls. Falls back to the next turn.
    #[serde(default)]
    pub fallback: Option<String>,

    /// Keep replaying the last turn once the script runs out.
    #[serde(default)]
    pub repeat_last: bool,

    #[serde(default)]
    pub turns: Vec<ScriptTurn>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptTurn {
    pub text: String,
}

/// Plays back scripted turns in order.
pub struct ScriptedProvider {
    turns: Vec<String>,
    fallback: Option<String>,
    chunk_chars: usize,
    repeat_last: bool,
    next_turn: AtomicUsize,
    stream_calls: AtomicUsize,
    complete_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new<I, S>(turns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            turns: turns.into_iter().map(Into::into).collect(),
            fallback: None,
            chunk_chars: 0,
            repeat_last: false,
            next_turn: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
        }
    }

    /// A provider that emits the same text on every call.
    pub fn repeating(text: impl Into<String>) -> Self {
        Self::new([text]).with_repeat_last(true)
    }

    pub fn from_script(script: Script) -> Self {
        let mut provider = Self::new(script.turns.into_iter().map(|t| t.text))
            .with_chunk_chars(script.chunk_chars)
            .with_repeat_last(script.repeat_last);
        provider.fallback = script.fallback;
        provider
    }

    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars;
        self
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn with_repeat_last(mut self, repeat_last: bool) -> Self {
        self.repeat_last = repeat_last;
        self
    }

    /// Number of streaming calls made so far.
    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Number of non-streaming calls made so far.
    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    fn next_text(&self) -> Result<String, ProviderError> {
        let index = self.next_turn.fetch_add(1, Ordering::SeqCst);
        let text = match self.turns.get(index) {
            Some(text) => Some(text),
            None if self.repeat_last => self.turns.last(),
            None => None,
        };
        text.cloned().ok_or(ProviderError::Exhausted { calls: index })
    }

    fn chunks(&self, text: &str) -> Vec<String> {
        if self.chunk_chars == 0 {
            return vec![text.to_string()];
        }
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.chunk_chars)
            .map(|c| c.iter().collect())
            .collect()
    }
}

fn usage_for(text: &str) -> Usage {
    let completion_tokens = text.split_whitespace().count() as u32;
    Usage {
        prompt_tokens: 0,
        completion_tokens,
        total_tokens: completion_tokens,
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let content = match &self.fallback {
            Some(text) => text.clone(),
            None => self.next_text()?,
        };
        Ok(ProviderResponse {
            usage: Some(usage_for(&content)),
            content,
            model: request.model,
        })
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let text = self.next_text()?;
        let chunks = self.chunks(&text);

        let (tx, rx) = mpsc::channel(chunks.len() + 1);
        for content in chunks {
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some(content),
                    done: false,
                    usage: None,
                }))
                .await;
        }
        let _ = tx
            .send(Ok(StreamChunk {
                content: None,
                done: true,
                usage: Some(usage_for(&text)),
            }))
            .await;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "scripted-model".into(),
            messages: vec![],
            temperature: 0.0,
            max_tokens: None,
            stream: true,
        }
    }

    async fn collect(provider: &ScriptedProvider) -> Vec<String> {
        let mut rx = provider.stream(request()).await.unwrap();
        let mut out = Vec::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            if let Some(content) = chunk.content {
                out.push(content);
            }
            if chunk.done {
                break;
            }
        }
        out
    }

    #[tokio::test]
    async fn turns_play_in_order_then_exhaust() {
        let provider = ScriptedProvider::new(["one", "two"]);
        assert_eq!(collect(&provider).await, vec!["one"]);
        assert_eq!(collect(&provider).await, vec!["two"]);

        let err = provider.stream(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted { calls: 2 }));
        assert_eq!(provider.stream_calls(), 3);
    }

    #[tokio::test]
    async fn chunking_respects_char_boundaries() {
        let provider = ScriptedProvider::new(["héllo wörld"]).with_chunk_chars(4);
        let chunks = collect(&provider).await;
        assert_eq!(chunks, vec!["héll", "o wö", "rld"]);
    }

    #[tokio::test]
    async fn repeating_never_runs_out() {
        let provider = ScriptedProvider::repeating("again");
        for _ in 0..5 {
            assert_eq!(collect(&provider).await, vec!["again"]);
        }
    }

    #[tokio::test]
    async fn complete_prefers_fallback() {
        let provider = ScriptedProvider::new(["turn"]).with_fallback("fallback");
        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.content, "fallback");
        assert_eq!(response.model, "scripted-model");
        assert_eq!(provider.complete_calls(), 1);
        assert_eq!(collect(&provider).await, vec!["turn"]);
    }

    #[test]
    fn script_from_toml_shape() {
        let script: Script = serde_json::from_value(serde_json::json!({
            "chunk_chars": 3,
            "turns": [{"text": "a"}, {"text": "b"}]
        }))
        .unwrap();
        assert_eq!(script.chunk_chars, 3);
        assert_eq!(script.turns.len(), 2);
        assert!(script.fallback.is_none());
    }
}
