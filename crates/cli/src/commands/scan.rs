//! `sieve scan`: Split text into display segments and directives.

use super::{chunk_chars, read_input};
use serde::Serialize;
use sieve_config::SieveConfig;
use sieve_core::directive::{StreamSegment, coalesce};
use sieve_stream::DirectiveScanner;
use sieve_tools::ParameterSanitizer;

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub segments: Vec<StreamSegment>,
    pub issues: Vec<String>,
}

/// Scan `text` fed in `chunk_size` pieces, sanitizing each directive.
pub fn scan_text(config: &SieveConfig, text: &str, chunk_size: usize) -> ScanReport {
    let sanitizer = ParameterSanitizer::new(config.sanitizer.clone());
    let mut scanner = DirectiveScanner::new();
    let mut segments = Vec::new();

    for chunk in chunk_chars(text, chunk_size) {
        segments.extend(scanner.feed(&chunk));
    }
    segments.extend(scanner.flush());

    let segments = coalesce(segments.into_iter().map(|segment| match segment {
        StreamSegment::Directive { call } => {
            let parameters = sanitizer.sanitize(&call.raw_parameters);
            StreamSegment::Directive {
                call: call.with_parameters(parameters),
            }
        }
        text => text,
    }));

    ScanReport {
        segments,
        issues: scanner.issues().iter().map(ToString::to_string).collect(),
    }
}

pub fn run(
    config: &SieveConfig,
    file: &str,
    chunk_size: usize,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = read_input(file)?;
    let report = scan_text(config, &text, chunk_size);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let display: String = report.segments.iter().filter_map(StreamSegment::as_text).collect();
    println!("{display}");

    let calls: Vec<_> = report
        .segments
        .iter()
        .filter_map(StreamSegment::as_directive)
        .collect();
    if !calls.is_empty() {
        println!();
        println!("Directives:");
        for call in calls {
            println!(
                "  #{} {} {}",
                call.sequence_index,
                call.tool_name,
                serde_json::to_string(&call.parsed_parameters)?
            );
        }
    }

    for issue in &report.issues {
        eprintln!("warning: {issue}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn report_is_chunking_independent() {
        let text = "Hi [TOOL_CALL:web_search:query='rust, \"async\"', num_results=2] bye";
        let config = SieveConfig::default();
        let whole = scan_text(&config, text, 0);
        for size in 1..8 {
            assert_eq!(scan_text(&config, text, size).segments, whole.segments);
        }

        let call = whole.segments[1].as_directive().unwrap();
        assert_eq!(call.parsed_parameters["query"], json!("rust, \"async\""));
        assert_eq!(call.parsed_parameters["num_results"], json!(2));
    }

    #[test]
    fn unterminated_directive_is_reported() {
        let report = scan_text(&SieveConfig::default(), "Tail [TOOL_CALL:x:{", 3);
        assert_eq!(report.segments.len(), 1);
        assert_eq!(report.segments[0].as_text(), Some("Tail [TOOL_CALL:x:{"));
        assert_eq!(report.issues.len(), 1);
    }
}
