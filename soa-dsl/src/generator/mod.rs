//! Spectre netlist generation from monitor documents.
//!
//! Generation is pure serialization: values are rendered, never checked.
//! Expressions are translated to simulator syntax; branch names, messages and
//! probe-parameter names are quoted.

use crate::expression::Evaluator;
use crate::parser::monitor_schema::*;
use crate::parser::schema::{GlobalConfig, ParamValue, Timing};
use std::collections::{BTreeMap, BTreeSet};

/// Verilog-A sources every generated netlist includes.
pub const AHDL_INCLUDES: [&str; 5] = [
    "ovcheck_mos_alt.va",
    "ovcheck_pwl_alt.va",
    "ovcheck_ldmos_hci_tddb_alt.va",
    "parcheck3.va",
    "selfheating_monitor_nofeedback.va",
];

#[derive(Debug, Clone, Default)]
pub struct GeneratorOptions {
    /// Replace references to document parameters with their values inside
    /// monitor expressions.
    pub inline_globals: bool,
}

pub struct Generator<'a> {
    document: &'a MonitorDocument,
    options: GeneratorOptions,
    /// Holds the document parameters used for inlining.
    evaluator: Evaluator,
}

impl<'a> Generator<'a> {
    pub fn new(document: &'a MonitorDocument, options: GeneratorOptions) -> Self {
        let mut globals = document.global_config.limits.clone();
        globals.extend(document.parameters.clone());
        Self {
            document,
            options,
            evaluator: Evaluator::new(globals),
        }
    }

    /// Render the complete netlist.
    pub fn generate(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        self.write_header(&mut lines);
        self.write_base_section(&mut lines);
        for monitor in &self.document.monitors {
            self.write_monitor(&mut lines, monitor);
            lines.push(String::new());
        }

        tracing::info!(
            "Generated netlist for '{}' with {} monitors",
            self.document.process,
            self.document.monitors.len()
        );

        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    fn write_header(&self, lines: &mut Vec<String>) {
        lines.push("simulator lang=spectre".to_string());
        lines.push("// Generated from SOA DSL".to_string());
        lines.push(format!("// Process: {}", self.document.process));
        lines.push(format!("// Date: {}", self.document.date));
        lines.push(format!("// Version: {}", self.document.version));
        lines.push(String::new());
    }

    fn write_base_section(&self, lines: &mut Vec<String>) {
        lines.push("section base".to_string());
        for file in AHDL_INCLUDES {
            lines.push(format!("ahdl_include \"./veriloga/{}\"", file));
        }
        lines.push(String::new());

        let declarations = base_parameters(&self.document.global_config, &self.document.parameters);
        if !declarations.is_empty() {
            lines.push("parameters".to_string());
            for (name, value) in declarations {
                lines.push(format!("+ {}={}", name, Evaluator::to_backend_syntax(&value)));
            }
            lines.push(String::new());
        }

        lines.push("endsection base".to_string());
        lines.push(String::new());
    }

    fn write_monitor(&self, lines: &mut Vec<String>, monitor: &Monitor) {
        lines.push(format!("section {}", monitor.section));
        lines.push(format!("model {} {}", monitor.model_name, monitor.kind()));

        let common = &monitor.common;
        lines.push(format!(
            "+ tmin={} tdelay={} vballmsg={} stop={}",
            self.value(&common.tmin),
            self.value(&common.tdelay),
            self.value(&common.vballmsg),
            self.value(&common.stop)
        ));
        if let Some(alias) = &common.tmaxfrac {
            lines.push(format!("+ tmaxfrac={}", alias));
        }

        match &monitor.params {
            KindParams::Ovcheck(OvcheckParams::Branch(limits)) => {
                let mut parts = Vec::new();
                self.push_value(&mut parts, "vlow", limits.vlow.as_ref());
                self.push_value(&mut parts, "vhigh", limits.vhigh.as_ref());
                push_quoted(&mut parts, "branch1", limits.branch.as_deref());
                push_quoted(&mut parts, "message1", limits.message.as_deref());
                if !parts.is_empty() {
                    lines.push(format!("+ {}", parts.join(" ")));
                }
            }
            KindParams::Ovcheck(OvcheckParams::SelfHeating(sh)) => {
                lines.push(format!(
                    "+ dtmax={} theat={} monitor={}",
                    self.value(&sh.dtmax),
                    self.value(&sh.theat),
                    sh.monitor
                ));
                self.line(lines, "idc_high", sh.idc_high.as_ref());
                self.line(lines, "ipeak_high", sh.ipeak_high.as_ref());
                self.line(lines, "irms_high", sh.irms_high.as_ref());
            }
            KindParams::Ovcheck6(branches) => {
                for (i, branch) in branches.iter().enumerate() {
                    let n = i + 1;
                    let mut parts = Vec::new();
                    self.push_value(&mut parts, &format!("vlow{}", n), branch.vlow.as_ref());
                    self.push_value(&mut parts, &format!("vhigh{}", n), branch.vhigh.as_ref());
                    push_quoted(&mut parts, &format!("branch{}", n), Some(branch.branch.as_str()));
                    push_quoted(&mut parts, &format!("message{}", n), Some(branch.message.as_str()));
                    lines.push(format!("+ {}", parts.join(" ")));
                }
            }
            KindParams::StateDependent(sd) => {
                self.line(lines, "vhigh_on", sd.vhigh_on.as_ref());
                self.line(lines, "vhigh_off", sd.vhigh_off.as_ref());
                self.line(lines, "vhigh_gc", sd.vhigh_gc.as_ref());
                self.line(lines, "vlow_gc", sd.vlow_gc.as_ref());
                lines.push(format!("+ param={}", quote(&sd.param)));
                self.line(lines, "vgt", Some(&sd.vgt));
            }
            KindParams::Pwl(limits) => {
                self.line(lines, "vlow", limits.vlow.as_ref());
                self.line(lines, "vhigh", limits.vhigh.as_ref());
                if let Some(branch) = &limits.branch {
                    lines.push(format!("+ branch1={}", quote(branch)));
                }
                if let Some(message) = &limits.message {
                    lines.push(format!("+ message1={}", quote(message)));
                }
            }
            KindParams::Aging(aging) => {
                lines.push(format!("+ atype={}", AGING_MARKER));
                for (letter, value) in &aging.coefficients {
                    self.line(lines, &format!("soa_hcitddb_{}", letter), Some(value));
                }
            }
            KindParams::ParameterCheck(pc) => {
                lines.push(format!("+ param={}", quote(&pc.param)));
                self.line(lines, "vgt", pc.vgt.as_ref());
                self.line(lines, "vlow", pc.vlow.as_ref());
                self.line(lines, "vhigh", pc.vhigh.as_ref());
            }
        }

        for (key, value) in &monitor.extra {
            self.line(lines, key, Some(value));
        }

        lines.push(format!("endsection {}", monitor.section));
    }

    /// Render a monitor parameter value.
    fn value(&self, value: &ParamValue) -> String {
        if self.options.inline_globals {
            Evaluator::to_backend_syntax(&self.evaluator.substitute_globals(value))
        } else {
            Evaluator::to_backend_syntax(value)
        }
    }

    fn line(&self, lines: &mut Vec<String>, key: &str, value: Option<&ParamValue>) {
        if let Some(v) = value {
            lines.push(format!("+ {}={}", key, self.value(v)));
        }
    }

    fn push_value(&self, parts: &mut Vec<String>, key: &str, value: Option<&ParamValue>) {
        if let Some(v) = value {
            parts.push(format!("{}={}", key, self.value(v)));
        }
    }
}

fn push_quoted(parts: &mut Vec<String>, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        parts.push(format!("{}={}", key, quote(v)));
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Base-section declarations: timing, tmaxfrac levels, then document
/// parameters by name. Names already declared are not repeated.
fn base_parameters(
    config: &GlobalConfig,
    parameters: &BTreeMap<String, ParamValue>,
) -> Vec<(String, ParamValue)> {
    let mut out = Vec::new();
    let mut seen = BTreeSet::new();

    for key in Timing::KEYS {
        if let Some(v) = config.timing.get(key) {
            let name = format!("global_{}", key);
            seen.insert(name.clone());
            out.push((name, v.clone()));
        }
    }
    for (i, level) in GlobalConfig::TMAXFRAC_LEVELS.iter().enumerate() {
        if let Some(v) = config.tmaxfrac.get(*level) {
            let name = format!("tmaxfrac{}", i);
            seen.insert(name.clone());
            out.push((name, ParamValue::Number(*v)));
        }
    }
    for (name, value) in parameters {
        if seen.insert(name.clone()) {
            out.push((name.clone(), value.clone()));
        }
    }
    out
}

/// Generate a netlist (convenience wrapper).
pub fn generate(document: &MonitorDocument, options: GeneratorOptions) -> String {
    Generator::new(document, options).generate()
}
