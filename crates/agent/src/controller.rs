//! The iteration controller.
//!
//! One generation request runs as a sequence of rounds:
//!
//! ```text
//! ROUND_START -> STREAMING -> (no directives) -> DONE
//!                STREAMING -> (directives) -> DISPATCHING -> CONTEXT_APPEND -> ROUND_START
//! ```
//!
//! Once `max_iterations` rounds have dispatched tools without a clean
//! finish, exactly one non-streaming completion is requested against the
//! accumulated context and its text becomes the final output verbatim.

use crate::stream_event::AgentStreamEvent;
use chrono::Utc;
use sieve_config::SieveConfig;
use sieve_core::directive::{DirectiveCall, StreamSegment, ToolResult};
use sieve_core::error::{Error, Result};
use sieve_core::event::{DomainEvent, EventBus};
use sieve_core::message::{Conversation, Message};
use sieve_core::provider::{Provider, ProviderRequest, Usage};
use sieve_core::tool::ToolRegistry;
use sieve_extract::{ExtractionFailure, PayloadExtractor, StructuredRecord};
use sieve_stream::DirectiveScanner;
use sieve_tools::{Dispatcher, ParameterSanitizer};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One streaming pass and the tool results it produced.
#[derive(Debug, Clone)]
pub struct Round {
    pub round_index: u32,
    /// Directives found, in detection order, with sanitized parameters.
    pub calls: Vec<DirectiveCall>,
    pub results: Vec<ToolResult>,
    /// Display text of the pass, directive markers removed.
    pub transcript: String,
}

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// The latest round contained no directives.
    Done,
    /// The iteration bound was hit and a non-streaming completion was used.
    ForcedFallback,
}

/// The result of [`IterationController::run`].
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// Text of the final round, or of the fallback completion.
    pub final_text: String,
    /// Everything shown to the user across all rounds.
    pub transcript: String,
    pub rounds: Vec<Round>,
    pub terminal: Terminal,
    /// Usage reported by the last provider call.
    pub usage: Option<Usage>,
}

impl GenerationOutcome {
    pub fn tool_calls_made(&self) -> usize {
        self.rounds.iter().map(|r| r.calls.len()).sum()
    }

    /// Extract a record from the final text, falling back to history.
    ///
    /// Tries the final text, then the full transcript, then each round's
    /// transcript newest first. When all fail, the failure for the final
    /// text is returned.
    pub fn extract_with_history(
        &self,
        extractor: &PayloadExtractor,
    ) -> std::result::Result<StructuredRecord, ExtractionFailure> {
        let primary = match extractor.extract(&self.final_text) {
            Ok(record) => return Ok(record),
            Err(failure) => failure,
        };

        let history = std::iter::once(self.transcript.as_str())
            .chain(self.rounds.iter().rev().map(|r| r.transcript.as_str()));

        for text in history {
            if text.trim().is_empty() || text == self.final_text {
                continue;
            }
            if let Ok(record) = extractor.extract(text) {
                debug!(strategy = record.strategy, "Recovered payload from round history");
                return Ok(record);
            }
        }

        Err(primary)
    }
}

/// Drives rounds of streaming, scanning and dispatch for one conversation.
#[derive(Clone)]
pub struct IterationController {
    provider: Arc<dyn Provider>,
    dispatcher: Dispatcher,
    sanitizer: ParameterSanitizer,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_iterations: u32,
    event_bus: Arc<EventBus>,
}

impl IterationController {
    pub fn new(
        provider: Arc<dyn Provider>,
        dispatcher: Dispatcher,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            sanitizer: ParameterSanitizer::default(),
            model: "default".into(),
            temperature: 0.7,
            max_tokens: None,
            max_iterations: 3,
            event_bus,
        }
    }

    /// Build a controller, dispatcher and sanitizer from configuration.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        config: &SieveConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let dispatcher = Dispatcher::new(registry)
            .with_agent_name(config.agent.name.clone())
            .with_event_bus(event_bus.clone());

        Self::new(provider, dispatcher, event_bus)
            .with_sanitizer(ParameterSanitizer::new(config.sanitizer.clone()))
            .with_model(config.agent.model.clone())
            .with_temperature(config.agent.temperature)
            .with_max_tokens(config.agent.max_tokens)
            .with_max_iterations(config.agent.max_iterations)
    }

    pub fn with_sanitizer(mut self, sanitizer: ParameterSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the number of tool rounds allowed before the forced fallback.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run a request to completion against `conversation`.
    ///
    /// The conversation gains the assistant and tool-result turns of every
    /// round plus the final answer. Only provider failures are errors.
    pub async fn run(&self, conversation: &mut Conversation) -> Result<GenerationOutcome> {
        self.drive(conversation, None).await
    }

    /// Run a request in the background, reporting progress as events.
    ///
    /// The stream ends with `done` or `error`. Dropping the receiver stops
    /// the request at the next chunk boundary.
    pub fn run_stream(&self, mut conversation: Conversation) -> mpsc::Receiver<AgentStreamEvent> {
        let (tx, rx) = mpsc::channel::<AgentStreamEvent>(128);
        let controller = self.clone();

        tokio::spawn(async move {
            match controller.drive(&mut conversation, Some(&tx)).await {
                Ok(outcome) => {
                    let _ = tx
                        .send(AgentStreamEvent::Done {
                            conversation_id: conversation.id.to_string(),
                            usage: outcome.usage.clone(),
                            rounds: outcome.rounds.len(),
                            tool_calls_made: outcome.tool_calls_made(),
                            forced_fallback: outcome.terminal == Terminal::ForcedFallback,
                        })
                        .await;
                }
                Err(e) => {
                    debug!(error = %e, "Streaming request ended early");
                    let _ = tx
                        .send(AgentStreamEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        });

        rx
    }

    async fn drive(
        &self,
        conversation: &mut Conversation,
        sink: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<GenerationOutcome> {
        let conversation_id = conversation.id.to_string();
        info!(
            conversation = %conversation_id,
            max_iterations = self.max_iterations,
            "Starting generation"
        );

        let mut rounds: Vec<Round> = Vec::new();
        let mut transcript = String::new();
        let mut usage = None;
        let mut round_index: u32 = 0;

        while round_index < self.max_iterations {
            let (round_text, calls, round_usage) = self.stream_round(conversation, sink).await?;
            transcript.push_str(&round_text);
            usage = round_usage.or(usage);

            if calls.is_empty() {
                debug!(round = round_index, "Round finished without directives");
                conversation.push(Message::assistant(round_text.clone()));
                rounds.push(Round {
                    round_index,
                    calls,
                    results: Vec::new(),
                    transcript: round_text.clone(),
                });

                info!(conversation = %conversation_id, rounds = rounds.len(), "Generation done");
                return Ok(GenerationOutcome {
                    final_text: round_text,
                    transcript,
                    rounds,
                    terminal: Terminal::Done,
                    usage,
                });
            }

            debug!(round = round_index, directives = calls.len(), "Dispatching directives");
            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let id = format!("r{round_index}_c{}", call.sequence_index);
                emit(
                    sink,
                    AgentStreamEvent::ToolCall {
                        id: id.clone(),
                        name: call.tool_name.clone(),
                        input: serde_json::Value::Object(call.parsed_parameters.clone()),
                    },
                )
                .await?;

                let result = self.dispatcher.dispatch_call(call).await;
                emit(
                    sink,
                    AgentStreamEvent::ToolResult {
                        id,
                        name: call.tool_name.clone(),
                        output: result.output_text.clone(),
                        success: result.succeeded,
                    },
                )
                .await?;
                results.push(result);
            }

            conversation.push(Message::assistant(round_text.clone()));
            conversation.push(Message::user(tool_results_turn(&results)));

            self.event_bus.publish(DomainEvent::RoundCompleted {
                conversation_id: conversation_id.clone(),
                round_index,
                directives: calls.len(),
                timestamp: Utc::now(),
            });
            emit(
                sink,
                AgentStreamEvent::RoundCompleted {
                    round: round_index,
                    directives: calls.len(),
                },
            )
            .await?;

            rounds.push(Round {
                round_index,
                calls,
                results,
                transcript: round_text,
            });
            round_index += 1;
        }

        warn!(
            conversation = %conversation_id,
            rounds = round_index,
            "Iteration bound reached, forcing a non-streaming completion"
        );
        self.event_bus.publish(DomainEvent::FallbackForced {
            conversation_id: conversation_id.clone(),
            rounds: round_index,
            timestamp: Utc::now(),
        });

        let response = self.provider.complete(self.request(conversation, false)).await?;
        self.publish_response(&conversation_id, response.usage.as_ref());
        emit(
            sink,
            AgentStreamEvent::Chunk {
                content: response.content.clone(),
            },
        )
        .await?;

        transcript.push_str(&response.content);
        conversation.push(Message::assistant(response.content.clone()));

        info!(
            conversation = %conversation_id,
            rounds = rounds.len(),
            "Generation done after fallback"
        );
        Ok(GenerationOutcome {
            final_text: response.content,
            transcript,
            rounds,
            terminal: Terminal::ForcedFallback,
            usage: response.usage.or(usage),
        })
    }

    /// Stream one pass through the scanner.
    ///
    /// Returns the display text, the sanitized directives and the usage of
    /// the final chunk.
    async fn stream_round(
        &self,
        conversation: &Conversation,
        sink: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<(String, Vec<DirectiveCall>, Option<Usage>)> {
        let mut rx = self.provider.stream(self.request(conversation, true)).await?;
        let mut scanner = DirectiveScanner::new();
        let mut text = String::new();
        let mut calls = Vec::new();
        let mut usage = None;

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(content) = &chunk.content {
                for segment in scanner.feed(content) {
                    self.absorb(segment, &mut text, &mut calls, sink).await?;
                }
            }
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if chunk.done {
                break;
            }
        }

        for segment in scanner.flush() {
            self.absorb(segment, &mut text, &mut calls, sink).await?;
        }

        self.publish_response(&conversation.id.to_string(), usage.as_ref());
        Ok((text, calls, usage))
    }

    async fn absorb(
        &self,
        segment: StreamSegment,
        text: &mut String,
        calls: &mut Vec<DirectiveCall>,
        sink: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<()> {
        match segment {
            StreamSegment::Text { text: piece } => {
                text.push_str(&piece);
                emit(sink, AgentStreamEvent::Chunk { content: piece }).await
            }
            StreamSegment::Directive { call } => {
                let parameters = self.sanitizer.sanitize(&call.raw_parameters);
                calls.push(call.with_parameters(parameters));
                Ok(())
            }
        }
    }

    fn request(&self, conversation: &Conversation, stream: bool) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages: conversation.messages.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    fn publish_response(&self, conversation_id: &str, usage: Option<&Usage>) {
        self.event_bus.publish(DomainEvent::ResponseGenerated {
            conversation_id: conversation_id.to_string(),
            model: self.model.clone(),
            tokens_used: usage.map_or(0, |u| u.total_tokens),
            timestamp: Utc::now(),
        });
    }
}

/// The synthetic user turn carrying a round's tool output.
fn tool_results_turn(results: &[ToolResult]) -> String {
    let joined = results
        .iter()
        .map(|r| r.output_text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Tool results:\n{joined}\n\nPlease give a complete answer based on these results.")
}

/// Send to the live consumer, if any. A dropped receiver cancels the request.
async fn emit(
    sink: Option<&mpsc::Sender<AgentStreamEvent>>,
    event: AgentStreamEvent,
) -> Result<()> {
    let Some(tx) = sink else {
        return Ok(());
    };
    tx.send(event)
        .await
        .map_err(|_| Error::Internal("stream consumer went away".into()))
}
