pub mod error;
pub mod format_detector;
pub mod monitor;
pub mod monitor_schema;
pub mod schema;
pub mod universal;

// Re-export for convenience
pub use error::ParseError;
pub use format_detector::{
    detect_and_parse, detect_and_parse_file, detect_format, read_yaml_source, Document,
    DocumentFormat,
};
pub use monitor_schema::*;
pub use schema::*;
pub use universal::SoaParser;
