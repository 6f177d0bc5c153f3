//! Document flavor detection and routing.
//!
//! A monitor document is recognized by its top-level `monitors` key, a rule
//! document by `rules`. Parsing is then routed to the matching front end.

use crate::parser::error::ParseError;
use crate::parser::monitor_schema::MonitorDocument;
use crate::parser::schema::UniversalDocument;
use crate::parser::universal::SoaParser;
use std::path::Path;

/// Input document flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// User-facing rule specification
    Universal,
    /// Lowered, backend-ready monitor specification
    Monitor,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Universal => "universal",
            DocumentFormat::Monitor => "monitor",
        }
    }
}

/// A parsed document of either flavor.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Universal(UniversalDocument),
    Monitor(MonitorDocument),
}

impl Document {
    pub fn format(&self) -> DocumentFormat {
        match self {
            Document::Universal(_) => DocumentFormat::Universal,
            Document::Monitor(_) => DocumentFormat::Monitor,
        }
    }
}

/// Detect the document flavor from its top-level keys.
pub fn detect_format(content: &str) -> Option<DocumentFormat> {
    let value: serde_yaml::Value = serde_yaml::from_str(content).ok()?;
    format_of(&value)
}

fn format_of(value: &serde_yaml::Value) -> Option<DocumentFormat> {
    let mapping = value.as_mapping()?;
    if mapping.contains_key("monitors") {
        Some(DocumentFormat::Monitor)
    } else if mapping.contains_key("rules") {
        Some(DocumentFormat::Universal)
    } else {
        None
    }
}

/// Detect the flavor and parse with the matching front end.
pub fn detect_and_parse(content: &str) -> Result<Document, ParseError> {
    if content.trim().is_empty() {
        return Err(ParseError::EmptyDocument);
    }
    let value: serde_yaml::Value = serde_yaml::from_str(content)?;
    let format = format_of(&value).ok_or(ParseError::UnknownFormat)?;
    tracing::debug!("Detected {} document", format.as_str());

    match format {
        DocumentFormat::Universal => SoaParser::parse_universal(content).map(Document::Universal),
        DocumentFormat::Monitor => SoaParser::parse_monitor(content).map(Document::Monitor),
    }
}

/// Detect and parse a file, rejecting anything that is not `.yaml`/`.yml`.
pub fn detect_and_parse_file(path: &Path) -> Result<Document, ParseError> {
    let content = read_yaml_source(path)?;
    detect_and_parse(&content)
}

/// Read a YAML source file. The extension is checked before touching the
/// filesystem.
pub fn read_yaml_source(path: &Path) -> Result<String, ParseError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "yaml" && ext != "yml" {
        return Err(ParseError::UnsupportedExtension(if ext.is_empty() {
            path.display().to_string()
        } else {
            format!(".{}", ext)
        }));
    }
    Ok(std::fs::read_to_string(path)?)
}
