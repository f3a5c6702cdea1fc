//! `sieve sanitize`: Show the typed parameters for a raw directive body.

use sieve_config::SieveConfig;
use sieve_tools::ParameterSanitizer;

pub fn run(config: &SieveConfig, raw: &str) -> Result<(), Box<dyn std::error::Error>> {
    let parameters = ParameterSanitizer::new(config.sanitizer.clone()).sanitize(raw);
    println!("{}", serde_json::to_string_pretty(&parameters)?);
    Ok(())
}
