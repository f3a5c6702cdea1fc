//! The iteration controller for Sieve.
//!
//! A generation request follows a **Stream → Scan → Dispatch** cycle:
//!
//! 1. **Stream** the model's output through the directive scanner
//! 2. **Show** text segments as soon as they are safe to display
//! 3. **If directives**: sanitize and dispatch them in order, append the
//!    round's text and the tool results to the conversation, loop to step 1
//! 4. **If none**: the round's text is the answer
//!
//! The loop is bounded by `max_iterations`. When the bound is reached, one
//! non-streaming completion produces the final output.

pub mod controller;
pub mod scripted;
pub mod stream_event;

pub use controller::{GenerationOutcome, IterationController, Round, Terminal};
pub use scripted::{Script, ScriptTurn, ScriptedProvider};
pub use stream_event::AgentStreamEvent;
