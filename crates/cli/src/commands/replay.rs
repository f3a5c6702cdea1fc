//! `sieve replay`: Run the iteration controller against a scripted model.

use super::read_input;
use sieve_agent::{
    AgentStreamEvent, GenerationOutcome, IterationController, Script, ScriptedProvider, Terminal,
};
use sieve_config::SieveConfig;
use sieve_core::event::EventBus;
use sieve_core::message::{Conversation, Message};
use sieve_extract::PayloadExtractor;
use std::sync::Arc;
use tracing::info;

/// Parse a TOML script.
pub fn parse_script(text: &str) -> Result<Script, Box<dyn std::error::Error>> {
    toml::from_str(text).map_err(|e| format!("Invalid replay script: {e}").into())
}

/// Build a controller over the scripted model and the built-in tools.
pub fn controller_for(config: &SieveConfig, script: Script) -> IterationController {
    IterationController::from_config(
        Arc::new(ScriptedProvider::from_script(script)),
        Arc::new(sieve_tools::default_registry()),
        config,
        Arc::new(EventBus::default()),
    )
}

pub async fn run(
    config: &SieveConfig,
    source: &str,
    prompt: &str,
    events: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let script = parse_script(&read_input(source)?)?;
    info!(
        turns = script.turns.len(),
        chunk_chars = script.chunk_chars,
        "Loaded replay script"
    );
    let controller = controller_for(config, script);

    let mut conversation = Conversation::new();
    conversation.push(Message::user(prompt));

    if events {
        let mut rx = controller.run_stream(conversation);
        while let Some(event) = rx.recv().await {
            println!("{}", serde_json::to_string(&event)?);
            if let AgentStreamEvent::Error { message } = event {
                return Err(message.into());
            }
        }
        return Ok(());
    }

    let outcome = controller.run(&mut conversation).await?;
    print_outcome(&outcome);

    let extractor = PayloadExtractor::new(config.extractor.clone());
    let record = outcome.extract_with_history(&extractor)?;
    println!();
    println!("Extracted ({}):", record.strategy);
    println!("{}", serde_json::to_string_pretty(&record.fields)?);
    Ok(())
}

fn print_outcome(outcome: &GenerationOutcome) {
    for round in &outcome.rounds {
        println!("── round {} ──", round.round_index);
        println!("{}", round.transcript);
        for result in &round.results {
            let status = if result.succeeded { "ok" } else { "failed" };
            println!("  [{}] {} -> {status}", result.call.sequence_index, result.call.tool_name);
        }
    }
    if outcome.terminal == Terminal::ForcedFallback {
        println!("── fallback ──");
        println!("{}", outcome.final_text);
    }
}
