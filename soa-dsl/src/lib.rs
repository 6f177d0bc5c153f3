//! SOA DSL - Safe-Operating-Area rule compiler
//!
//! Compiles declarative device-limit rules written in YAML into a Spectre
//! netlist that instantiates Verilog-A checker models, one section per
//! monitored device.
//!
//! # Quick Start
//!
//! ```no_run
//! use soa_dsl::converter::{DeviceCatalog, MonitorCatalog};
//! use soa_dsl::{GeneratorOptions, Libraries, SoaDslCore, ValidationOptions};
//! use std::path::Path;
//!
//! let devices = DeviceCatalog::from_file(Path::new("devices.yaml")).unwrap();
//! let monitors = MonitorCatalog::from_file(Path::new("monitors.yaml")).unwrap();
//!
//! let output = SoaDslCore::compile_file(
//!     Path::new("rules.yaml"),
//!     Libraries::new(&devices, &monitors),
//!     &ValidationOptions::default(),
//!     &GeneratorOptions::default(),
//! ).unwrap();
//!
//! println!("{}", output.netlist);
//! ```
//!
//! # Pipeline
//!
//! - **Parser**: rule (universal) and monitor YAML flavors, with detection
//! - **Validator**: batch diagnostics, strict and non-strict modes
//! - **Converter**: rules lowered to one of six checker kinds per device
//! - **Generator**: deterministic netlist text

pub mod converter;
pub mod core;
pub mod expression;
pub mod generator;
pub mod parser;
pub mod validator;

// Re-export main types
pub use crate::core::{CompileOutput, Libraries, SoaDslCore, SoaDslError};
pub use converter::{ConversionError, Converter};
pub use expression::{Evaluator, ExpressionError};
pub use generator::{Generator, GeneratorOptions};
pub use parser::{MonitorDocument, ParseError, SoaParser, UniversalDocument};
pub use validator::{Diagnostic, ValidationOptions, ValidationReport, Validator};

/// Parse a rule document file (convenience wrapper).
pub fn parse_rules(path: &std::path::Path) -> Result<UniversalDocument, SoaDslError> {
    Ok(SoaParser::parse_universal_file(path)?)
}

/// Parse a monitor document file (convenience wrapper).
pub fn parse_monitors(path: &std::path::Path) -> Result<MonitorDocument, SoaDslError> {
    Ok(SoaParser::parse_monitor_file(path)?)
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        CompileOutput, Diagnostic, GeneratorOptions, Libraries, MonitorDocument, SoaDslCore,
        SoaDslError, UniversalDocument, ValidationOptions, ValidationReport,
    };
}
