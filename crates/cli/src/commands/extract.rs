//! `sieve extract`: Pull a structured record out of finished text.

use super::read_input;
use sieve_config::SieveConfig;
use sieve_extract::PayloadExtractor;

pub fn run(
    config: &SieveConfig,
    file: &str,
    required_field: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = read_input(file)?;

    let mut extractor_config = config.extractor.clone();
    if let Some(field) = required_field {
        extractor_config.required_field = field;
    }
    let extractor = PayloadExtractor::new(extractor_config);

    let record = extractor.extract(&text)?;
    eprintln!("strategy: {}", record.strategy);
    println!("{}", serde_json::to_string_pretty(&record.fields)?);
    Ok(())
}
