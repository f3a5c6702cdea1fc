//! The chunk buffer and directive scanner.
//!
//! Text arrives in arbitrary fragments. The scanner keeps a residual
//! buffer and, after every fragment, classifies as much of it as it safely
//! can:
//!
//! - text before a directive marker is emitted immediately;
//! - a complete, balanced directive is emitted as one segment;
//! - a trailing suffix that could still become a marker, or an open
//!   directive whose closing bracket has not arrived yet, stays buffered.
//!
//! Because nothing is classified until it is unambiguous, any chunking of
//! the same input yields the same directives and the same text (modulo how
//! text is split between segments, see [`sieve_core::directive::coalesce`]).

use sieve_core::directive::{DIRECTIVE_MARKER, DirectiveCall, StreamSegment};
use sieve_core::error::ScanIssue;
use sieve_core::scan::{SQUARE, find_balanced_close};
use tracing::{debug, warn};

/// Incremental scanner over one round of model output.
#[derive(Debug, Default)]
pub struct DirectiveScanner {
    /// Unclassified tail of the stream
    residual: String,
    /// Bytes of the stream already classified
    consumed: usize,
    /// Directives emitted so far in this round
    next_index: usize,
    issues: Vec<ScanIssue>,
}

enum Carve {
    /// A full directive spanning `len` bytes from the start of the residual
    Complete { call: DirectiveCall, len: usize },
    /// The marker has no name-terminating colon yet
    NoName,
    /// The body has not balanced yet
    Open,
}

impl DirectiveScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one fragment and return every segment that is safe to emit now.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamSegment> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.residual.push_str(chunk);
        self.drain(false)
    }

    /// End of stream: emit everything still buffered.
    ///
    /// An unterminated directive is abandoned and its span is returned as
    /// plain text.
    pub fn flush(&mut self) -> Vec<StreamSegment> {
        self.drain(true)
    }

    /// Diagnostics collected so far.
    pub fn issues(&self) -> &[ScanIssue] {
        &self.issues
    }

    /// Text held back waiting for more input.
    pub fn pending(&self) -> &str {
        &self.residual
    }

    /// Number of directives emitted so far.
    pub fn directives_found(&self) -> usize {
        self.next_index
    }

    fn drain(&mut self, final_pass: bool) -> Vec<StreamSegment> {
        let mut out = Vec::new();

        loop {
            let Some(start) = self.residual.find(DIRECTIVE_MARKER) else {
                let hold = if final_pass {
                    0
                } else {
                    partial_marker_len(&self.residual)
                };
                let safe = self.residual.len() - hold;
                if safe > 0 {
                    out.push(StreamSegment::text(self.take(safe)));
                }
                break;
            };

            if start > 0 {
                out.push(StreamSegment::text(self.take(start)));
                continue;
            }

            match self.carve() {
                Carve::Complete { call, len } => {
                    debug!(
                        tool = %call.tool_name,
                        sequence = call.sequence_index,
                        "Directive closed"
                    );
                    self.take(len);
                    self.next_index += 1;
                    out.push(StreamSegment::Directive { call });
                }
                Carve::NoName | Carve::Open if !final_pass => break,
                carve => {
                    let issue = match carve {
                        Carve::NoName => ScanIssue::MissingToolName {
                            offset: self.consumed,
                        },
                        _ => ScanIssue::UnterminatedDirective {
                            offset: self.consumed,
                        },
                    };
                    warn!(%issue, "Abandoning directive at end of stream");
                    self.issues.push(issue);
                    let len = self.residual.len();
                    out.push(StreamSegment::text(self.take(len)));
                    break;
                }
            }
        }

        out
    }

    /// Try to cut a directive starting at byte 0 of the residual.
    fn carve(&self) -> Carve {
        let text = self.residual.as_str();
        let name_start = DIRECTIVE_MARKER.len();
        let Some(colon_rel) = text[name_start..].find(':') else {
            return Carve::NoName;
        };
        let colon = name_start + colon_rel;
        let body_start = colon + 1;

        // The marker's own '[' is the one open bracket.
        match find_balanced_close(text, body_start, SQUARE, 1) {
            Some(close) => Carve::Complete {
                call: DirectiveCall::new(
                    text[name_start..colon].trim(),
                    text[body_start..close].trim(),
                    &text[..=close],
                    self.next_index,
                ),
                len: close + 1,
            },
            None => Carve::Open,
        }
    }

    fn take(&mut self, len: usize) -> String {
        self.consumed += len;
        self.residual.drain(..len).collect()
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of the marker.
fn partial_marker_len(text: &str) -> usize {
    (1..DIRECTIVE_MARKER.len())
        .rev()
        .find(|&k| text.ends_with(&DIRECTIVE_MARKER[..k]))
        .unwrap_or(0)
}

/// Scan a complete text in one pass.
pub fn scan_all(text: &str) -> Vec<StreamSegment> {
    let mut scanner = DirectiveScanner::new();
    let mut segments = scanner.feed(text);
    segments.extend(scanner.flush());
    segments
}

/// The text of `text` with every complete directive removed.
pub fn strip_directives(text: &str) -> String {
    scan_all(text)
        .iter()
        .filter_map(StreamSegment::as_text)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_core::directive::coalesce;

    fn feed_all(chunks: &[&str]) -> (Vec<StreamSegment>, DirectiveScanner) {
        let mut scanner = DirectiveScanner::new();
        let mut segments = Vec::new();
        for chunk in chunks {
            segments.extend(scanner.feed(chunk));
        }
        segments.extend(scanner.flush());
        (segments, scanner)
    }

    fn texts(segments: &[StreamSegment]) -> Vec<&str> {
        segments.iter().filter_map(StreamSegment::as_text).collect()
    }

    fn calls(segments: &[StreamSegment]) -> Vec<&DirectiveCall> {
        segments
            .iter()
            .filter_map(StreamSegment::as_directive)
            .collect()
    }

    #[test]
    fn scenario_split_marker_and_bracket_in_string() {
        let (segments, _) = feed_all(&[
            "Hello ",
            "[TOOL_CALL:",
            "search:{\"q\": \"a]b\"}]",
            " world",
        ]);
        assert_eq!(texts(&segments), vec!["Hello ", " world"]);

        let found = calls(&segments);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tool_name, "search");
        assert_eq!(found[0].raw_parameters, "{\"q\": \"a]b\"}");
        assert_eq!(found[0].source_span, "[TOOL_CALL:search:{\"q\": \"a]b\"}]");
        assert_eq!(found[0].sequence_index, 0);
    }

    #[test]
    fn every_chunking_matches_single_feed() {
        let text = "Intro [TOOL_CALL:search:{\"q\": \"[1,2]\", 'n': 3}] mid \
                    [TOOL_CALL: note :{\"tags\": [\"a\", [\"b\"]]}] tail [TOOL";
        let whole = coalesce(scan_all(text));

        let boundaries: Vec<usize> = (0..=text.len())
            .filter(|i| text.is_char_boundary(*i))
            .collect();

        // Every single split point
        for &split in &boundaries {
            let (segments, _) = feed_all(&[&text[..split], &text[split..]]);
            assert_eq!(coalesce(segments), whole, "split at {split}");
        }

        // Every chunk size
        for size in 1..=text.len() {
            let chunks: Vec<&str> = text
                .as_bytes()
                .chunks(size)
                .map(|c| std::str::from_utf8(c).unwrap())
                .collect();
            let (segments, _) = feed_all(&chunks);
            assert_eq!(coalesce(segments), whole, "chunk size {size}");
        }
    }

    #[test]
    fn text_concatenation_equals_input_without_directives() {
        let text = "a[TOOL_CALL:x:1]b[TOOL_CALL:y:[2]]c";
        let (segments, _) = feed_all(&["a[TOOL", "_CALL:x:1]b[TOOL_CALL:y:[", "2]]c"]);
        assert_eq!(texts(&segments).concat(), "abc");
        assert_eq!(strip_directives(text), "abc");

        let found = calls(&segments);
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].tool_name, "y");
        assert_eq!(found[1].raw_parameters, "[2]");
        assert_eq!(found[1].sequence_index, 1);
    }

    #[test]
    fn quoted_array_does_not_close_early() {
        let (segments, _) = feed_all(&["[TOOL_CALL:save:{\"ids\": \"[1,2]\"}] done"]);
        let found = calls(&segments);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw_parameters, "{\"ids\": \"[1,2]\"}");
        assert_eq!(texts(&segments), vec![" done"]);
    }

    #[test]
    fn unquoted_backslash_does_not_hide_closing_bracket() {
        let (segments, scanner) = feed_all(&[r"open [TOOL_CALL:read:path=C:\tmp\", "] after"]);
        let found = calls(&segments);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tool_name, "read");
        assert_eq!(found[0].raw_parameters, r"path=C:\tmp\");
        assert_eq!(texts(&segments).concat(), "open  after");
        assert!(scanner.issues().is_empty());
    }

    #[test]
    fn unterminated_directive_reverts_to_text() {
        let input = "Before [TOOL_CALL:search:{\"q\": [1, 2}";
        let (segments, scanner) = feed_all(&["Before [TOOL_CALL:sea", "rch:{\"q\": [1, 2}"]);
        assert!(calls(&segments).is_empty());
        assert_eq!(texts(&segments).concat(), input);
        assert_eq!(
            scanner.issues(),
            &[ScanIssue::UnterminatedDirective { offset: 7 }]
        );
    }

    #[test]
    fn marker_without_name_colon_is_inert() {
        let (segments, scanner) = feed_all(&["see [TOOL_CALL", ":search_only"]);
        assert!(calls(&segments).is_empty());
        assert_eq!(texts(&segments).concat(), "see [TOOL_CALL:search_only");
        assert_eq!(scanner.issues(), &[ScanIssue::MissingToolName { offset: 4 }]);
    }

    #[test]
    fn open_directive_is_held_back() {
        let mut scanner = DirectiveScanner::new();
        let emitted = scanner.feed("ok [TOOL_CALL:calc:{\"e\": \"1+1\"");
        assert_eq!(emitted, vec![StreamSegment::text("ok ")]);
        assert_eq!(scanner.pending(), "[TOOL_CALL:calc:{\"e\": \"1+1\"");

        let emitted = scanner.feed("}]");
        assert_eq!(emitted.len(), 1);
        assert!(emitted[0].as_directive().is_some());
        assert_eq!(scanner.pending(), "");
        assert_eq!(scanner.directives_found(), 1);
    }

    #[test]
    fn partial_marker_suffix_is_held_back() {
        let mut scanner = DirectiveScanner::new();
        assert_eq!(scanner.feed("abc[TOO"), vec![StreamSegment::text("abc")]);
        assert_eq!(scanner.pending(), "[TOO");
        // Not a marker after all
        assert_eq!(scanner.feed("K]"), vec![StreamSegment::text("[TOOK]")]);
    }

    #[test]
    fn plain_text_is_emitted_immediately() {
        let mut scanner = DirectiveScanner::new();
        assert_eq!(
            scanner.feed("just words"),
            vec![StreamSegment::text("just words")]
        );
        assert!(scanner.flush().is_empty());
    }

    #[test]
    fn empty_chunks_emit_nothing() {
        let mut scanner = DirectiveScanner::new();
        assert!(scanner.feed("").is_empty());
        assert!(scanner.flush().is_empty());
    }

    #[test]
    fn multibyte_text_around_directives() {
        let (segments, _) = feed_all(&["你好 [TOOL_CALL:搜索:{\"q\": \"é\"}] 世界"]);
        assert_eq!(texts(&segments), vec!["你好 ", " 世界"]);
        assert_eq!(calls(&segments)[0].tool_name, "搜索");
    }

    #[test]
    fn partial_marker_len_cases() {
        assert_eq!(partial_marker_len("abc"), 0);
        assert_eq!(partial_marker_len("abc["), 1);
        assert_eq!(partial_marker_len("abc[TOOL_CALL"), 10);
        assert_eq!(partial_marker_len("[TOOL_CALL:"), 0);
    }
}
