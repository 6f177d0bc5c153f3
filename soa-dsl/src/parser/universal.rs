use crate::parser::error::ParseError;
use crate::parser::format_detector::read_yaml_source;
use crate::parser::schema::UniversalDocument;
use std::path::Path;

/// YAML front end for both document flavors.
pub struct SoaParser;

impl SoaParser {
    /// Parse a rule-flavor document. Absent sections default to empty.
    pub fn parse_universal(content: &str) -> Result<UniversalDocument, ParseError> {
        if content.trim().is_empty() {
            return Err(ParseError::EmptyDocument);
        }
        let document: UniversalDocument = serde_yaml::from_str(content)?;
        tracing::debug!(
            "Parsed universal document '{}' with {} rules",
            document.process,
            document.rules.len()
        );
        Ok(document)
    }

    pub fn parse_universal_file(path: &Path) -> Result<UniversalDocument, ParseError> {
        let content = read_yaml_source(path)?;
        Self::parse_universal(&content)
    }
}
