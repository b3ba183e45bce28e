use crate::cli::args::CliArgs;
use crate::matcher::MatchLocation;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(raw) = args.grep_location.as_deref() {
        raw.parse::<MatchLocation>().map_err(|e| e.to_string())?;
    }
    if let Some(raw) = args.grep.as_deref() {
        regex::Regex::new(raw).map_err(|e| format!("invalid --grep '{raw}': {e}"))?;
    }
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err("invalid workers, expected positive integer".to_string());
        }
    }
    if let Some(header) = args.grep_header.as_deref() {
        if header.trim().is_empty() {
            return Err("invalid --grep-header, expected a header name".to_string());
        }
    }
    Ok(())
}
