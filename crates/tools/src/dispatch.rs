//! Directive dispatcher: runs a tool by name and always returns text.
//!
//! Lookup misses, tool errors and tool panics all become formatted strings
//! that are fed back to the model. Nothing raised by a tool, or by the
//! observability listener, escapes to the caller.

use futures::FutureExt;
use serde::Serialize;
use sieve_core::directive::{DirectiveCall, ParameterMap, ToolResult};
use sieve_core::error::ToolError;
use sieve_core::event::{DomainEvent, EventBus};
use sieve_core::tool::ToolRegistry;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Error type a listener may return. It is logged and dropped.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// What the observability listener sees for every dispatched call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub agent_name: String,
    pub tool_name: String,
    pub raw_parameters: String,
    pub parsed_parameters: ParameterMap,
    pub result: String,
}

/// Observer invoked after every dispatch.
pub trait ToolCallListener: Send + Sync {
    fn on_tool_call(&self, record: &ToolCallRecord) -> Result<(), ListenerError>;
}

impl<F> ToolCallListener for F
where
    F: Fn(&ToolCallRecord) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_tool_call(&self, record: &ToolCallRecord) -> Result<(), ListenerError> {
        self(record)
    }
}

/// Resolves directives against a shared [`ToolRegistry`].
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    agent_name: String,
    listener: Option<Arc<dyn ToolCallListener>>,
    event_bus: Option<Arc<EventBus>>,
}

struct Outcome {
    output_text: String,
    error_detail: Option<String>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            agent_name: "assistant".into(),
            listener: None,
            event_bus: None,
        }
    }

    /// Name reported to the listener as `agent_name`.
    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ToolCallListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run `name` with already-sanitized parameters and return the text to
    /// feed back into the conversation.
    pub async fn dispatch(&self, name: &str, parameters: &ParameterMap) -> String {
        let raw = serde_json::to_string(parameters).unwrap_or_default();
        let outcome = self.execute(name, parameters).await;
        self.notify(name, &raw, parameters, &outcome.output_text);
        outcome.output_text
    }

    /// Dispatch a scanned directive whose parameters have been sanitized.
    pub async fn dispatch_call(&self, call: &DirectiveCall) -> ToolResult {
        let outcome = self
            .execute(&call.tool_name, &call.parsed_parameters)
            .await;
        self.notify(
            &call.tool_name,
            &call.raw_parameters,
            &call.parsed_parameters,
            &outcome.output_text,
        );

        ToolResult {
            call: call.clone(),
            succeeded: outcome.error_detail.is_none(),
            output_text: outcome.output_text,
            error_detail: outcome.error_detail,
        }
    }

    async fn execute(&self, name: &str, parameters: &ParameterMap) -> Outcome {
        let Some(tool) = self.registry.get(name) else {
            warn!(tool = name, "Directive names an unknown tool");
            let err = ToolError::NotFound(name.to_string());
            return Outcome {
                output_text: format!("Error: tool '{name}' not found"),
                error_detail: Some(err.to_string()),
            };
        };

        let start = Instant::now();
        let result = match AssertUnwindSafe(tool.run(parameters)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(ToolError::Panicked {
                tool_name: name.to_string(),
                reason: panic_message(payload.as_ref()),
            }),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: name.to_string(),
                success: result.is_ok(),
                duration_ms,
                timestamp: chrono::Utc::now(),
            });
        }

        match result {
            Ok(output) => {
                debug!(tool = name, duration_ms, "Tool completed");
                Outcome {
                    output_text: format!("Tool {name} result:\n{output}"),
                    error_detail: None,
                }
            }
            Err(e) => {
                warn!(tool = name, error = %e, "Tool failed, reporting in-band");
                Outcome {
                    output_text: format!("Error: tool '{name}' failed: {e}"),
                    error_detail: Some(e.to_string()),
                }
            }
        }
    }

    fn notify(&self, tool_name: &str, raw: &str, parsed: &ParameterMap, result: &str) {
        let Some(listener) = &self.listener else {
            return;
        };

        let record = ToolCallRecord {
            agent_name: self.agent_name.clone(),
            tool_name: tool_name.to_string(),
            raw_parameters: raw.to_string(),
            parsed_parameters: parsed.clone(),
            result: result.to_string(),
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| listener.on_tool_call(&record))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(tool = tool_name, error = %e, "Tool call listener failed"),
            Err(payload) => warn!(
                tool = tool_name,
                panic = %panic_message(payload.as_ref()),
                "Tool call listener panicked"
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sieve_core::tool::Tool;
    use std::sync::Mutex;

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercases the text parameter"
        }
        async fn run(&self, parameters: &ParameterMap) -> Result<String, ToolError> {
            parameters
                .get("text")
                .and_then(|v| v.as_str())
                .map(str::to_uppercase)
                .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))
        }
    }

    struct PanickyTool;

    #[async_trait]
    impl Tool for PanickyTool {
        fn name(&self) -> &str {
            "panicky"
        }
        fn description(&self) -> &str {
            "Always panics"
        }
        async fn run(&self, _parameters: &ParameterMap) -> Result<String, ToolError> {
            panic!("index out of range")
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(UpperTool));
        registry.register(Box::new(PanickyTool));
        Dispatcher::new(Arc::new(registry))
    }

    fn params(json: serde_json::Value) -> ParameterMap {
        json.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn successful_dispatch_is_formatted() {
        let out = dispatcher()
            .dispatch("upper", &params(serde_json::json!({"text": "hi"})))
            .await;
        assert_eq!(out, "Tool upper result:\nHI");
    }

    #[tokio::test]
    async fn unknown_tool_is_in_band() {
        let out = dispatcher().dispatch("nope", &ParameterMap::new()).await;
        assert_eq!(out, "Error: tool 'nope' not found");
    }

    #[tokio::test]
    async fn tool_error_is_in_band() {
        let out = dispatcher().dispatch("upper", &ParameterMap::new()).await;
        assert!(out.starts_with("Error: tool 'upper' failed:"));
        assert!(out.contains("missing 'text'"));
    }

    #[tokio::test]
    async fn tool_panic_is_contained() {
        let call = DirectiveCall::new("panicky", "{}", "[TOOL_CALL:panicky:{}]", 0);
        let result = dispatcher().dispatch_call(&call).await;
        assert!(!result.succeeded);
        assert!(result.output_text.contains("index out of range"));
        assert!(result.error_detail.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn dispatch_call_keeps_originating_call() {
        let call = DirectiveCall::new("upper", r#"{"text": "x"}"#, "[TOOL_CALL:upper:{...}]", 2)
            .with_parameters(params(serde_json::json!({"text": "x"})));
        let result = dispatcher().dispatch_call(&call).await;
        assert!(result.succeeded);
        assert!(result.error_detail.is_none());
        assert_eq!(result.call, call);
    }

    #[tokio::test]
    async fn listener_sees_every_call() {
        let seen: Arc<Mutex<Vec<ToolCallRecord>>> = Arc::default();
        let sink = seen.clone();
        let listener = move |record: &ToolCallRecord| -> Result<(), ListenerError> {
            sink.lock().unwrap().push(record.clone());
            Ok(())
        };
        let dispatcher = dispatcher()
            .with_agent_name("writer")
            .with_listener(Arc::new(listener));

        let call = DirectiveCall::new("upper", "text=ok", "[TOOL_CALL:upper:text=ok]", 0)
            .with_parameters(params(serde_json::json!({"text": "ok"})));
        dispatcher.dispatch_call(&call).await;
        dispatcher.dispatch("missing", &ParameterMap::new()).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].agent_name, "writer");
        assert_eq!(seen[0].raw_parameters, "text=ok");
        assert_eq!(seen[0].result, "Tool upper result:\nOK");
        assert_eq!(seen[1].tool_name, "missing");
    }

    #[tokio::test]
    async fn failing_listener_is_swallowed() {
        let failing = |_: &ToolCallRecord| -> Result<(), ListenerError> {
            Err("sink offline".into())
        };
        let out = dispatcher()
            .with_listener(Arc::new(failing))
            .dispatch("upper", &params(serde_json::json!({"text": "a"})))
            .await;
        assert_eq!(out, "Tool upper result:\nA");
    }

    #[tokio::test]
    async fn panicking_listener_is_swallowed() {
        let panicking = |_: &ToolCallRecord| -> Result<(), ListenerError> {
            panic!("listener bug")
        };
        let out = dispatcher()
            .with_listener(Arc::new(panicking))
            .dispatch("upper", &params(serde_json::json!({"text": "a"})))
            .await;
        assert_eq!(out, "Tool upper result:\nA");
    }

    #[tokio::test]
    async fn tool_executed_events_are_published() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let dispatcher = dispatcher().with_event_bus(bus);

        dispatcher.dispatch("panicky", &ParameterMap::new()).await;

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted {
                tool_name, success, ..
            } => {
                assert_eq!(tool_name, "panicky");
                assert!(!success);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
