use crate::expression::{free_identifiers, FUNCTIONS};
use crate::parser::schema::{GlobalConfig, Rule, Timing, CURRENT_KINDS};
use crate::parser::MAX_BRANCHES;
use crate::validator::{CheckContext, Diagnostic, RuleCheck};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Device names the rule set is written against. Matching is by prefix in
/// either direction, so `nmos_core_lvt` and `nmos` are both recognized.
pub const KNOWN_DEVICES: [&str; 30] = [
    "nmos_core",
    "pmos_core",
    "nmos_5v",
    "pmos_5v",
    "nmos90_10hv",
    "pmos90_10hv",
    "nmos90b_10hv",
    "pmos90b_10hv",
    "nmoshs45_10hv",
    "pmoshs45_10hv",
    "nmoshs45b_10hv",
    "pmoshs45b_10hv",
    "dz5",
    "npn_b",
    "pnp_b",
    "poly_10hv",
    "rm1_10hv",
    "rm2_10hv",
    "rm3_10hv",
    "rm4_10hv",
    "rulm_10hv",
    "ralcap_10hv",
    "rphv_10hv",
    "cap_low",
    "cap_mid",
    "cap_high",
    "diode_n",
    "diode_p",
    "bandgap_ref",
    "temp_sensor",
];

pub fn is_known_device(device: &str) -> bool {
    KNOWN_DEVICES
        .iter()
        .any(|known| device.starts_with(known) || known.starts_with(device))
}

static PARAMETER_SHAPES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^v\[\s*\w+\s*,\s*\w+\s*\]$",
        r"^v\[\s*\w+\s*\]$",
        r"^i\[\s*\w+\s*\]$",
        r"^i_rms\[\s*\w+\s*\]$",
        r"^T$",
        r"^temp$",
        r"^multi$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static BRANCH_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:V\(\s*\w+\s*(?:,\s*\w+\s*)?\)|v\[\s*\w+\s*(?:,\s*\w+\s*)?\])$")
        .expect("valid regex")
});

fn display_name(rule: &Rule) -> &str {
    if rule.name.is_empty() {
        "unnamed"
    } else {
        &rule.name
    }
}

/// Check that tmaxfrac levels are ordered. Entries are ordered by the numeric
/// suffix of their key (`level2` is 2). Non-negative values must then be
/// strictly ascending; negative values mean "disabled" and are skipped.
pub fn tmaxfrac_order(levels: &BTreeMap<String, f64>) -> Result<(), String> {
    let mut indexed = Vec::with_capacity(levels.len());
    for (key, value) in levels {
        let stem = key.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let index: u32 = key[stem..]
            .parse()
            .map_err(|_| format!("Invalid tmaxfrac level key: {}", key))?;
        indexed.push((index, *value));
    }
    indexed.sort_by_key(|(i, _)| *i);

    let mut previous: Option<f64> = None;
    for (_, value) in indexed {
        if value < 0.0 {
            continue;
        }
        if let Some(prev) = previous {
            if value <= prev {
                return Err("tmaxfrac levels must be in ascending order".to_string());
            }
        }
        previous = Some(value);
    }
    Ok(())
}

/// Presence warnings for the global block plus global tmaxfrac ordering.
pub fn check_global_config(config: &GlobalConfig, out: &mut Vec<Diagnostic>) {
    for key in Timing::KEYS {
        if config.timing.get(key).is_none() {
            out.push(Diagnostic::warning("global", format!("Missing timing parameter: {}", key)));
        }
    }
    for level in GlobalConfig::TMAXFRAC_LEVELS {
        if !config.tmaxfrac.contains_key(level) {
            out.push(Diagnostic::warning("global", format!("Missing tmaxfrac: {}", level)));
        }
    }
    if let Err(message) = tmaxfrac_order(&config.tmaxfrac) {
        out.push(Diagnostic::error("global", message));
    }
}

pub struct RequiredFieldsCheck;

impl RuleCheck for RequiredFieldsCheck {
    fn id(&self) -> &str {
        "required_fields"
    }

    fn check(&self, rule: &Rule, _ctx: &CheckContext, out: &mut Vec<Diagnostic>) {
        let name = display_name(rule);
        if rule.name.trim().is_empty() {
            out.push(Diagnostic::error(name, "Rule name is required"));
        }
        if rule.device.is_empty() {
            out.push(Diagnostic::error(name, "Device type is required"));
        }
        if rule.parameter.trim().is_empty() {
            out.push(Diagnostic::error(name, "Parameter is required"));
        }
        if rule.rule_type.is_empty() {
            out.push(Diagnostic::error(name, "Rule type is required"));
        }
        if rule.severity.is_empty() {
            out.push(Diagnostic::error(name, "Severity is required"));
        }
    }
}

pub struct DeviceCheck;

impl RuleCheck for DeviceCheck {
    fn id(&self) -> &str {
        "device"
    }

    fn check(&self, rule: &Rule, _ctx: &CheckContext, out: &mut Vec<Diagnostic>) {
        for device in rule.device.iter().filter(|d| !d.trim().is_empty()) {
            if !is_known_device(device) {
                out.push(Diagnostic::warning(
                    display_name(rule),
                    format!("Unknown device type: {}", device),
                ));
            }
        }
    }
}

pub struct TypeAndSeverityCheck;

impl RuleCheck for TypeAndSeverityCheck {
    fn id(&self) -> &str {
        "type_and_severity"
    }

    fn check(&self, rule: &Rule, _ctx: &CheckContext, out: &mut Vec<Diagnostic>) {
        if !rule.rule_type.is_empty() && !rule.rule_type.is_known() {
            out.push(Diagnostic::error(
                display_name(rule),
                format!("Invalid rule type: {}", rule.rule_type),
            ));
        }
        if !rule.severity.is_empty() && !rule.severity.is_known() {
            out.push(Diagnostic::error(
                display_name(rule),
                format!("Invalid severity: {}", rule.severity),
            ));
        }
    }
}

pub struct ParameterShapeCheck;

impl RuleCheck for ParameterShapeCheck {
    fn id(&self) -> &str {
        "parameter_shape"
    }

    fn check(&self, rule: &Rule, _ctx: &CheckContext, out: &mut Vec<Diagnostic>) {
        let parameter = rule.parameter.trim();
        if parameter.is_empty() {
            return;
        }
        if !PARAMETER_SHAPES.iter().any(|re| re.is_match(parameter)) {
            out.push(Diagnostic::warning(
                display_name(rule),
                format!("Unusual parameter format: {}", parameter),
            ));
        }
    }
}

pub struct ConstraintCheck;

impl RuleCheck for ConstraintCheck {
    fn id(&self) -> &str {
        "constraint"
    }

    fn check(&self, rule: &Rule, _ctx: &CheckContext, out: &mut Vec<Diagnostic>) {
        let Some(constraint) = &rule.constraint else {
            return;
        };
        if !constraint.has_any_bound() {
            out.push(Diagnostic::error(
                display_name(rule),
                "Constraint must specify at least one limit",
            ));
        }
        let high = constraint.vhigh.as_ref().and_then(|v| v.as_number());
        let low = constraint.vlow.as_ref().and_then(|v| v.as_number());
        if let (Some(high), Some(low)) = (high, low) {
            if high <= low {
                out.push(Diagnostic::error(
                    display_name(rule),
                    format!("vhigh must be greater than vlow (vhigh={}, vlow={})", high, low),
                ));
            }
        }
    }
}

pub struct BranchCheck;

impl RuleCheck for BranchCheck {
    fn id(&self) -> &str {
        "branches"
    }

    fn check(&self, rule: &Rule, _ctx: &CheckContext, out: &mut Vec<Diagnostic>) {
        let name = display_name(rule);
        for (i, branch) in rule.branches.iter().enumerate() {
            let id = branch.branch.trim();
            if id.is_empty() {
                out.push(Diagnostic::error(
                    name,
                    format!("Branch {} missing branch specification", i + 1),
                ));
                continue;
            }
            if !BRANCH_SHAPE.is_match(id) {
                out.push(Diagnostic::warning(name, format!("Unusual branch format: {}", id)));
            }
            if branch.vhigh.is_none() && branch.vlow.is_none() {
                out.push(Diagnostic::error(
                    name,
                    format!("Branch {} must specify vhigh or vlow", id),
                ));
            }
        }
        if rule.branches.len() > MAX_BRANCHES {
            out.push(Diagnostic::error(
                name,
                format!(
                    "Too many branches ({}), maximum is {}",
                    rule.branches.len(),
                    MAX_BRANCHES
                ),
            ));
        }
    }
}

pub struct TmaxfracCheck;

impl RuleCheck for TmaxfracCheck {
    fn id(&self) -> &str {
        "tmaxfrac"
    }

    fn check(&self, rule: &Rule, _ctx: &CheckContext, out: &mut Vec<Diagnostic>) {
        if let Err(message) = tmaxfrac_order(&rule.tmaxfrac) {
            out.push(Diagnostic::error(display_name(rule), message));
        }
    }
}

/// Undefined identifiers in constraint expressions.
pub struct ExpressionCheck;

impl RuleCheck for ExpressionCheck {
    fn id(&self) -> &str {
        "expressions"
    }

    fn check(&self, rule: &Rule, ctx: &CheckContext, out: &mut Vec<Diagnostic>) {
        let Some(constraint) = &rule.constraint else {
            return;
        };
        for (field, value) in constraint.bounds() {
            let Some(expr) = value.as_expr() else {
                continue;
            };
            for ident in free_identifiers(expr) {
                if is_reserved(&ident) || ctx.declared.contains(&ident) {
                    continue;
                }
                out.push(Diagnostic::warning(
                    display_name(rule),
                    format!("Undefined variable in {}: {}", field, ident),
                ));
            }
        }
    }
}

fn is_reserved(ident: &str) -> bool {
    FUNCTIONS.contains(&ident)
        || ident == "T"
        || ident == "temp"
        || ["if", "then", "else"]
            .iter()
            .any(|k| ident.eq_ignore_ascii_case(k))
}

pub struct StateDependentCheck;

impl RuleCheck for StateDependentCheck {
    fn id(&self) -> &str {
        "state_dependent"
    }

    fn check(&self, rule: &Rule, _ctx: &CheckContext, out: &mut Vec<Diagnostic>) {
        if !rule.is_state_dependent() {
            return;
        }
        let name = display_name(rule);
        match &rule.constraint {
            None => out.push(Diagnostic::error(name, "State-dependent rule must have constraint")),
            // An empty constraint is already reported by the constraint check.
            Some(c) if c.has_any_bound() && c.vhigh_on.is_none() && c.vhigh_off.is_none() => {
                out.push(Diagnostic::error(
                    name,
                    "State-dependent rule must specify vhigh_on or vhigh_off",
                ))
            }
            Some(_) => {}
        }
        if rule.gate_control.is_none() {
            out.push(Diagnostic::warning(name, "State-dependent rule should have gate_control"));
        }
    }
}

pub struct MultiBranchCheck;

impl RuleCheck for MultiBranchCheck {
    fn id(&self) -> &str {
        "multi_branch"
    }

    fn check(&self, rule: &Rule, _ctx: &CheckContext, out: &mut Vec<Diagnostic>) {
        if rule.is_multi_branch() && rule.branches.is_empty() {
            out.push(Diagnostic::error(
                display_name(rule),
                "Multi-branch rule must have branches",
            ));
        }
    }
}

pub struct CurrentWithHeatingCheck;

impl RuleCheck for CurrentWithHeatingCheck {
    fn id(&self) -> &str {
        "current_with_heating"
    }

    fn check(&self, rule: &Rule, _ctx: &CheckContext, out: &mut Vec<Diagnostic>) {
        if !rule.is_current_with_heating() {
            return;
        }
        let name = display_name(rule);
        if rule.constraints.is_empty() {
            out.push(Diagnostic::error(name, "Current with heating rule must have constraints"));
        }
        if rule.self_heating.is_none() {
            out.push(Diagnostic::warning(
                name,
                "Current with heating rule should have self_heating",
            ));
        }
        for constraint in &rule.constraints {
            if !CURRENT_KINDS.contains(&constraint.kind.as_str()) {
                out.push(Diagnostic::error(
                    name,
                    format!(
                        "Invalid current constraint type '{}' (expected one of {})",
                        constraint.kind,
                        CURRENT_KINDS.join(", ")
                    ),
                ));
            }
        }
    }
}
