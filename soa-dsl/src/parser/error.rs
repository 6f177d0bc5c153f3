use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Unknown monitor type '{value}' in {field}")]
    UnknownMonitorType { field: String, value: String },
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("Document is empty")]
    EmptyDocument,
    #[error("Cannot tell whether document is a rule or monitor specification (no `rules` or `monitors` key)")]
    UnknownFormat,
    #[error("Only YAML format is supported. Got: {0}")]
    UnsupportedExtension(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
