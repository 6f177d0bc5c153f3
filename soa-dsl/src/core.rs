//! Compiler pipeline shared by the CLI and library users.
//! Text in, text out; no global state.

use std::path::Path;

use crate::converter::{self, ConversionError, DeviceLibrary, LibraryError, MonitorLibrary};
use crate::generator::{self, GeneratorOptions};
use crate::parser::format_detector::{detect_and_parse, detect_format, read_yaml_source};
use crate::parser::{Document, DocumentFormat, MonitorDocument, ParseError, SoaParser};
use crate::validator::{self, ValidationOptions, ValidationReport};

#[derive(Debug, thiserror::Error)]
pub enum SoaDslError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),
    #[error("{0}")]
    Library(#[from] LibraryError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "Validation failed with {} error(s) and {} warning(s)",
        .0.errors.len(),
        .0.warnings.len()
    )]
    ValidationFailed(ValidationReport),
    #[error("Rule documents need device and monitor libraries to be lowered")]
    LibrariesRequired,
}

/// Device and monitor metadata a rule document is lowered against.
#[derive(Clone, Copy)]
pub struct Libraries<'a> {
    pub devices: &'a dyn DeviceLibrary,
    pub monitors: &'a dyn MonitorLibrary,
}

impl<'a> Libraries<'a> {
    pub fn new(devices: &'a dyn DeviceLibrary, monitors: &'a dyn MonitorLibrary) -> Self {
        Self { devices, monitors }
    }
}

/// Everything a full compile run produces.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub report: ValidationReport,
    pub document: MonitorDocument,
    pub netlist: String,
}

/// Core compiler API used by the CLI.
pub struct SoaDslCore;

impl SoaDslCore {
    pub fn detect_format(content: &str) -> Option<DocumentFormat> {
        detect_format(content)
    }

    /// Validate a rule document. A report that did not pass is still `Ok`.
    pub fn validate(
        content: &str,
        options: &ValidationOptions,
    ) -> Result<ValidationReport, SoaDslError> {
        let document = SoaParser::parse_universal(content)?;
        Ok(validator::validate(&document, options))
    }

    pub fn validate_file(
        path: &Path,
        options: &ValidationOptions,
    ) -> Result<ValidationReport, SoaDslError> {
        let content = read_yaml_source(path)?;
        Self::validate(&content, options)
    }

    /// Lower a rule document into a monitor document.
    pub fn convert(content: &str, libraries: Libraries<'_>) -> Result<MonitorDocument, SoaDslError> {
        let document = SoaParser::parse_universal(content)?;
        Ok(converter::convert(&document, libraries.devices, libraries.monitors)?)
    }

    pub fn convert_file(
        path: &Path,
        libraries: Libraries<'_>,
    ) -> Result<MonitorDocument, SoaDslError> {
        let content = read_yaml_source(path)?;
        Self::convert(&content, libraries)
    }

    /// Generate a netlist from either flavor. Rule documents are lowered
    /// first, which requires `libraries`.
    pub fn generate(
        content: &str,
        libraries: Option<Libraries<'_>>,
        options: &GeneratorOptions,
    ) -> Result<String, SoaDslError> {
        let document = match detect_and_parse(content)? {
            Document::Monitor(doc) => doc,
            Document::Universal(doc) => {
                let libraries = libraries.ok_or(SoaDslError::LibrariesRequired)?;
                converter::convert(&doc, libraries.devices, libraries.monitors)?
            }
        };
        Ok(generator::generate(&document, options.clone()))
    }

    pub fn generate_file(
        path: &Path,
        libraries: Option<Libraries<'_>>,
        options: &GeneratorOptions,
    ) -> Result<String, SoaDslError> {
        let content = read_yaml_source(path)?;
        Self::generate(&content, libraries, options)
    }

    /// Validate, lower and generate. Stops with
    /// [`SoaDslError::ValidationFailed`] when the report does not pass.
    pub fn compile(
        content: &str,
        libraries: Libraries<'_>,
        validation: &ValidationOptions,
        generation: &GeneratorOptions,
    ) -> Result<CompileOutput, SoaDslError> {
        let document = SoaParser::parse_universal(content)?;

        let report = validator::validate(&document, validation);
        if !report.passed {
            return Err(SoaDslError::ValidationFailed(report));
        }

        let lowered = converter::convert(&document, libraries.devices, libraries.monitors)?;
        let netlist = generator::generate(&lowered, generation.clone());

        Ok(CompileOutput {
            report,
            document: lowered,
            netlist,
        })
    }

    pub fn compile_file(
        path: &Path,
        libraries: Libraries<'_>,
        validation: &ValidationOptions,
        generation: &GeneratorOptions,
    ) -> Result<CompileOutput, SoaDslError> {
        let content = read_yaml_source(path)?;
        Self::compile(&content, libraries, validation, generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{DeviceCatalog, MonitorCatalog};

    const RULES: &str = r#"
version: "1.0"
process: BCD90
date: "2024-12-16"
global:
  timing: {tmin: 0, tdelay: 0, vballmsg: 1, stop: 0}
  tmaxfrac: {level0: 0, level1: 0.01, level2: 0.1, level3: -1}
rules:
  - name: Core VDS
    device: nmos_core
    parameter: v[d,s]
    type: voltage
    severity: high
    constraint: {vhigh: 1.32, vlow: -0.1}
"#;

    fn catalogs() -> (DeviceCatalog, MonitorCatalog) {
        let devices = DeviceCatalog::from_yaml(
            "devices:\n  nmos_core: {type: nmos, terminals: [d, g, s, b]}\n",
        )
        .unwrap();
        let monitors = MonitorCatalog::from_yaml(
            "monitors:\n  ovcheck: {veriloga: ovcheck_mos_alt.va}\ntime_limit_mapping:\n  steady: tmaxfrac0\n",
        )
        .unwrap();
        (devices, monitors)
    }

    #[test]
    fn test_compile_produces_netlist() {
        let (devices, monitors) = catalogs();
        let output = SoaDslCore::compile(
            RULES,
            Libraries::new(&devices, &monitors),
            &ValidationOptions::default(),
            &GeneratorOptions::default(),
        )
        .unwrap();
        assert!(output.report.passed);
        assert_eq!(output.document.monitors.len(), 1);
        assert!(output.netlist.contains("model ovcheck_nmos_core_core_vds ovcheck"));
    }

    #[test]
    fn test_compile_stops_on_failed_validation() {
        let (devices, monitors) = catalogs();
        let broken = RULES.replace("vlow: -0.1", "vlow: 5").replace("vhigh: 1.32", "vhigh: 5");
        let err = SoaDslCore::compile(
            &broken,
            Libraries::new(&devices, &monitors),
            &ValidationOptions::default(),
            &GeneratorOptions::default(),
        )
        .unwrap_err();
        match err {
            SoaDslError::ValidationFailed(report) => assert!(report
                .errors
                .iter()
                .any(|e| e.message.contains("vhigh must be greater than vlow"))),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_generate_rule_document_needs_libraries() {
        let err = SoaDslCore::generate(RULES, None, &GeneratorOptions::default()).unwrap_err();
        assert!(matches!(err, SoaDslError::LibrariesRequired));
    }

    #[test]
    fn test_generate_lowers_rule_document() {
        let (devices, monitors) = catalogs();
        let netlist = SoaDslCore::generate(
            RULES,
            Some(Libraries::new(&devices, &monitors)),
            &GeneratorOptions::default(),
        )
        .unwrap();
        assert!(netlist.starts_with("simulator lang=spectre\n"));
        assert!(netlist.contains("+ tmaxfrac=tmaxfrac0"));
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(SoaDslCore::detect_format(RULES), Some(DocumentFormat::Universal));
        assert_eq!(SoaDslCore::detect_format("foo: 1"), None);
    }
}
