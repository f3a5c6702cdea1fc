//! Streaming directive scanner.
//!
//! Splits a model's output stream into display text and complete
//! `[TOOL_CALL:<name>:<parameters>]` directives while the stream is still
//! arriving. Feed fragments with [`DirectiveScanner::feed`], then call
//! [`DirectiveScanner::flush`] once at end of stream.
//!
//! ```
//! use sieve_stream::DirectiveScanner;
//!
//! let mut scanner = DirectiveScanner::new();
//! let mut segments = scanner.feed("Looking it up [TOOL_CALL:sea");
//! segments.extend(scanner.feed("rch:{\"q\": \"rust\"}] now"));
//! segments.extend(scanner.flush());
//!
//! let calls: Vec<_> = segments.iter().filter_map(|s| s.as_directive()).collect();
//! assert_eq!(calls[0].tool_name, "search");
//! ```

pub mod scanner;

pub use scanner::{DirectiveScanner, scan_all, strip_directives};
