//! Directive parameter handling and tool dispatch for Sieve.
//!
//! - [`sanitize`] turns a directive's raw parameter text into typed values.
//! - [`dispatch`] resolves a tool by name, runs it, and converts every
//!   failure into text the model can read.
//! - [`calculator`] and [`web_search`] are small built-in tools used by the
//!   CLI and the tests.

pub mod calculator;
pub mod dispatch;
pub mod sanitize;
pub mod web_search;

pub use dispatch::{Dispatcher, ListenerError, ToolCallListener, ToolCallRecord};
pub use sanitize::ParameterSanitizer;

use sieve_core::tool::ToolRegistry;

/// Create a registry holding the built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(calculator::CalculatorTool));
    registry.register(Box::new(web_search::WebSearchTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_builtins() {
        let registry = default_registry();
        assert_eq!(registry.names(), vec!["calculator", "web_search"]);
    }
}
