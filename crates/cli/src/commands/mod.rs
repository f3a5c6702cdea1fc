//! Subcommand implementations and the helpers they share.

pub mod extract;
pub mod replay;
pub mod sanitize;
pub mod scan;

use sieve_config::SieveConfig;
use std::io::Read;
use std::path::Path;

/// Load the explicit config file, or the default one with env overrides.
pub fn load_config(path: Option<&Path>) -> Result<SieveConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => SieveConfig::load_from(path),
        None => SieveConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

/// Read a file, or stdin when `source` is `-`.
pub fn read_input(source: &str) -> Result<String, Box<dyn std::error::Error>> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(source).map_err(|e| format!("Failed to read {source}: {e}").into())
}

/// Cut `text` into pieces of `size` characters; 0 keeps it whole.
pub fn chunk_chars(text: &str, size: usize) -> Vec<String> {
    if size == 0 {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn chunking() {
        assert_eq!(chunk_chars("abcde", 2), vec!["ab", "cd", "e"]);
        assert_eq!(chunk_chars("abc", 0), vec!["abc"]);
        assert!(chunk_chars("", 3).is_empty());
    }

    #[test]
    fn reads_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "hello").unwrap();
        let text = read_input(file.path().to_str().unwrap()).unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = read_input("/definitely/not/here.txt").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn explicit_config_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent]\nmax_iterations = 5").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.agent.max_iterations, 5);
    }
}
