//! Output formatting for CLI

use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Print `data` as pretty JSON when requested, otherwise run `text`
pub fn emit<T: Serialize>(data: &T, format: &str, text: impl FnOnce(&T)) {
    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", to_json(data)),
        OutputFormat::Text => text(data),
    }
}

fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}
