//! # Sieve Core
//!
//! Domain types, traits, and error definitions for the Sieve output
//! interpretation layer. Every other crate in the workspace builds on the
//! model defined here.
//!
//! ## Design Philosophy
//!
//! Collaborators that live outside the layer (the language-model client and
//! the tools behind the registry) are traits here. Implementations are
//! injected by the caller, which keeps the scanner, dispatcher, controller
//! and extractor testable with scripted stand-ins.

pub mod directive;
pub mod error;
pub mod event;
pub mod literal;
pub mod message;
pub mod provider;
pub mod scan;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use directive::{DirectiveCall, ParameterMap, StreamSegment, ToolResult};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use tool::{Tool, ToolRegistry};
