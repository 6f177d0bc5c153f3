//! Semantic validation of rule documents.
//!
//! Validation never stops at the first problem: every check runs over every
//! rule and all diagnostics are collected into a [`ValidationReport`].

pub mod checks;

use crate::parser::schema::{Rule, UniversalDocument};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

pub use checks::{is_known_device, tmaxfrac_order, KNOWN_DEVICES};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub rule_name: String,
    pub severity: DiagnosticSeverity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(rule_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule_name: rule_name.into(),
            severity: DiagnosticSeverity::Error,
            message: message.into(),
        }
    }

    pub fn warning(rule_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule_name: rule_name.into(),
            severity: DiagnosticSeverity::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            DiagnosticSeverity::Error => "ERROR",
            DiagnosticSeverity::Warning => "WARNING",
        };
        write!(f, "[{}] {}: {}", tag, self.rule_name, self.message)
    }
}

/// Options for validation runs (CLI or library).
#[derive(Clone, Debug, Default)]
pub struct ValidationOptions {
    /// Fail on warnings as well as errors.
    pub strict_mode: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub passed: bool,
}

impl ValidationReport {
    fn from_diagnostics(diagnostics: Vec<Diagnostic>, options: &ValidationOptions) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) = diagnostics
            .into_iter()
            .partition(|d| d.severity == DiagnosticSeverity::Error);
        let passed = if options.strict_mode {
            errors.is_empty() && warnings.is_empty()
        } else {
            errors.is_empty()
        };
        Self {
            errors,
            warnings,
            passed,
        }
    }

    pub fn total(&self) -> usize {
        self.errors.len() + self.warnings.len()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable report, errors first.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.errors.is_empty() {
            out.push_str(&format!("{} error(s):\n", self.errors.len()));
            for e in &self.errors {
                out.push_str(&format!("  {}\n", e));
            }
        }
        if !self.warnings.is_empty() {
            out.push_str(&format!("{} warning(s):\n", self.warnings.len()));
            for w in &self.warnings {
                out.push_str(&format!("  {}\n", w));
            }
        }
        if self.errors.is_empty() && self.warnings.is_empty() {
            out.push_str("Validation passed - no errors or warnings\n");
        }
        out
    }
}

/// Per-run data shared by the rule checks.
pub struct CheckContext {
    /// Names an expression may reference as globals.
    pub declared: BTreeSet<String>,
}

impl CheckContext {
    pub fn for_document(document: &UniversalDocument) -> Self {
        Self {
            declared: document.global_config.declared_names().into_iter().collect(),
        }
    }
}

/// A check applied to each rule independently.
pub trait RuleCheck: Send + Sync {
    fn id(&self) -> &str;
    fn check(&self, rule: &Rule, ctx: &CheckContext, out: &mut Vec<Diagnostic>);
}

pub struct Validator {
    checks: Vec<Arc<dyn RuleCheck>>,
}

impl Validator {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn with_default_checks() -> Self {
        let mut validator = Self::new();
        validator.add_check(Arc::new(checks::RequiredFieldsCheck));
        validator.add_check(Arc::new(checks::DeviceCheck));
        validator.add_check(Arc::new(checks::TypeAndSeverityCheck));
        validator.add_check(Arc::new(checks::ParameterShapeCheck));
        validator.add_check(Arc::new(checks::ConstraintCheck));
        validator.add_check(Arc::new(checks::BranchCheck));
        validator.add_check(Arc::new(checks::TmaxfracCheck));
        validator.add_check(Arc::new(checks::ExpressionCheck));
        validator.add_check(Arc::new(checks::StateDependentCheck));
        validator.add_check(Arc::new(checks::MultiBranchCheck));
        validator.add_check(Arc::new(checks::CurrentWithHeatingCheck));
        validator
    }

    pub fn add_check(&mut self, check: Arc<dyn RuleCheck>) {
        self.checks.push(check);
    }

    /// Run every check and collect diagnostics in document order.
    pub fn validate(&self, document: &UniversalDocument, options: &ValidationOptions) -> ValidationReport {
        let mut diagnostics = Vec::new();
        let ctx = CheckContext::for_document(document);

        checks::check_global_config(&document.global_config, &mut diagnostics);

        for rule in &document.rules {
            for check in &self.checks {
                tracing::trace!("Running check '{}' on rule '{}'", check.id(), rule.name);
                check.check(rule, &ctx, &mut diagnostics);
            }
        }

        check_duplicate_names(&document.rules, &mut diagnostics);

        let report = ValidationReport::from_diagnostics(diagnostics, options);
        tracing::info!(
            "Validated {} rules: {} errors, {} warnings",
            document.rules.len(),
            report.errors.len(),
            report.warnings.len()
        );
        report
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::with_default_checks()
    }
}

fn check_duplicate_names(rules: &[Rule], out: &mut Vec<Diagnostic>) {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    for (index, rule) in rules.iter().enumerate() {
        if rule.name.is_empty() {
            continue;
        }
        match first_seen.get(rule.name.as_str()) {
            Some(first) => out.push(Diagnostic::error(
                &rule.name,
                format!("Duplicate rule name (first defined at rule {})", first + 1),
            )),
            None => {
                first_seen.insert(&rule.name, index);
            }
        }
    }
}

/// Validate with the default checks.
pub fn validate(document: &UniversalDocument, options: &ValidationOptions) -> ValidationReport {
    Validator::with_default_checks().validate(document, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SoaParser;

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::error("Core VDS", "Rule type is required");
        assert_eq!(d.to_string(), "[ERROR] Core VDS: Rule type is required");
        let w = Diagnostic::warning("global", "Missing timing parameter: stop");
        assert_eq!(w.to_string(), "[WARNING] global: Missing timing parameter: stop");
    }

    #[test]
    fn test_duplicate_names_cite_first() {
        let doc = SoaParser::parse_universal(
            r#"
rules:
  - {name: a, device: nmos_core, parameter: "v[d,s]", type: voltage, severity: high, constraint: {vhigh: 1}}
  - {name: b, device: nmos_core, parameter: "v[d,s]", type: voltage, severity: high, constraint: {vhigh: 1}}
  - {name: a, device: nmos_core, parameter: "v[d,s]", type: voltage, severity: high, constraint: {vhigh: 1}}
"#,
        )
        .unwrap();
        let mut out = Vec::new();
        check_duplicate_names(&doc.rules, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rule_name, "a");
        assert!(out[0].message.contains("rule 1"));
    }

    #[test]
    fn test_strictness() {
        let diagnostics = vec![Diagnostic::warning("r", "w")];
        let lenient = ValidationReport::from_diagnostics(diagnostics.clone(), &ValidationOptions::default());
        assert!(lenient.passed);
        let strict = ValidationReport::from_diagnostics(
            diagnostics,
            &ValidationOptions { strict_mode: true },
        );
        assert!(!strict.passed);
    }

    #[test]
    fn test_report_json() {
        let report = ValidationReport::from_diagnostics(
            vec![Diagnostic::error("r", "bad")],
            &ValidationOptions::default(),
        );
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["passed"], false);
        assert_eq!(json["errors"][0]["severity"], "error");
        assert_eq!(json["errors"][0]["message"], "bad");
    }
}
