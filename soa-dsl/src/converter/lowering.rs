//! Per-rule lowering: classification, naming and kind-specific parameters.

use crate::converter::library::DeviceInfo;
use crate::converter::ConversionError;
use crate::expression::{to_backend_syntax, Evaluator};
use crate::parser::monitor_schema::*;
use crate::parser::schema::{format_number, LimitSpec, ParamValue, Rule, TemperatureDependence};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static VOLTAGE_NODES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\bv\[\s*(\w+)\s*(?:,\s*(\w+)\s*)?\]|\bV\(\s*(\w+)\s*(?:,\s*(\w+)\s*)?\))")
        .expect("valid regex")
});

/// What a rule lowers to. Variants are listed in classification precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    StateDependent,
    TemperatureDependent,
    Aging,
    ParameterCheck,
    SelfHeating,
    MultiBranch,
    SingleBranch,
}

impl Classification {
    pub fn kind(&self) -> MonitorKind {
        match self {
            Classification::StateDependent => MonitorKind::OvcheckMos2,
            Classification::TemperatureDependent => MonitorKind::OvcheckPwl,
            Classification::Aging => MonitorKind::OvcheckHciTddb,
            Classification::ParameterCheck => MonitorKind::Parcheck3,
            Classification::SelfHeating | Classification::SingleBranch => MonitorKind::Ovcheck,
            Classification::MultiBranch => MonitorKind::Ovcheck6,
        }
    }
}

pub fn classify(rule: &Rule) -> Result<Classification, ConversionError> {
    use crate::parser::schema::RuleType;

    if rule.is_state_dependent() {
        return Ok(Classification::StateDependent);
    }
    if rule.is_temperature_dependent() {
        return Ok(Classification::TemperatureDependent);
    }
    if rule.has_aging_check() {
        return Ok(Classification::Aging);
    }
    if rule.rule_type == RuleType::Parameter {
        return Ok(Classification::ParameterCheck);
    }
    if rule.is_current_with_heating() {
        return Ok(Classification::SelfHeating);
    }
    if rule.is_multi_branch() {
        return Ok(Classification::MultiBranch);
    }
    let has_bound = rule
        .constraint
        .as_ref()
        .map(|c| c.low().is_some() || c.high().is_some())
        .unwrap_or(false);
    if rule.rule_type.is_simple_limit() && has_bound {
        return Ok(Classification::SingleBranch);
    }
    Err(ConversionError::Unclassifiable(rule.name.clone()))
}

/// Lower-case, with spaces and hyphens turned into underscores.
pub fn slugify(text: &str) -> String {
    text.to_lowercase().replace([' ', '-'], "_")
}

pub fn model_name(kind: MonitorKind, device: &str, rule_name: &str) -> String {
    format!("{}_{}_{}", kind, device, slugify(rule_name))
}

pub fn section_name(device: &str, rule_name: &str) -> String {
    format!("soacheck_{}_{}_shared", device, slugify(rule_name))
}

/// Fold pure constants to numbers; anything symbolic is kept as written.
pub fn fold(value: &ParamValue) -> ParamValue {
    match value {
        ParamValue::Number(_) => value.clone(),
        ParamValue::Expr(_) if Evaluator::can_evaluate(value) => {
            Evaluator::default().evaluate(value, &BTreeMap::new())
        }
        ParamValue::Expr(_) => value.clone(),
    }
}

fn fold_opt(value: Option<&ParamValue>) -> Option<ParamValue> {
    value.map(fold)
}

/// Render a current limit specification to a single value.
pub fn render_limit(spec: &LimitSpec) -> ParamValue {
    match spec {
        LimitSpec::Value(v) => fold(v),
        LimitSpec::Expression { expression } => fold(&ParamValue::expr(expression.as_str())),
        LimitSpec::Formula {
            formula,
            parameters,
            coefficients,
        } => {
            if formula != "linear" {
                tracing::warn!("Unsupported limit formula '{}'; using 0", formula);
                return ParamValue::Number(0.0);
            }
            let terms: Vec<String> = parameters
                .iter()
                .zip(coefficients)
                .map(|(p, c)| format!("${} * {}", p, format_number(*c)))
                .collect();
            if terms.is_empty() {
                ParamValue::Number(0.0)
            } else {
                ParamValue::Expr(terms.join(" + "))
            }
        }
    }
}

/// Symmetric temperature-dependent bounds: `(vlow, vhigh)`.
pub fn temperature_bounds(td: &TemperatureDependence) -> (ParamValue, ParamValue) {
    let reference = format_number(td.reference_value);
    let magnitude = format_number(td.temp_coefficient.abs());
    let tref = format_number(td.reference_temp);
    if td.temp_coefficient >= 0.0 {
        (
            ParamValue::Expr(format!("-{} - {} * (T - {})", reference, magnitude, tref)),
            ParamValue::Expr(format!("{} + {} * (T - {})", reference, magnitude, tref)),
        )
    } else {
        (
            ParamValue::Expr(format!("-{} + {} * (T - {})", reference, magnitude, tref)),
            ParamValue::Expr(format!("{} - {} * (T - {})", reference, magnitude, tref)),
        )
    }
}

fn rule_message(rule: &Rule) -> Option<String> {
    rule.message
        .clone()
        .or_else(|| (!rule.description.is_empty()).then(|| rule.description.clone()))
}

fn measured_branch(rule: &Rule) -> Option<String> {
    let parameter = rule.parameter.trim();
    (!parameter.is_empty()).then(|| to_backend_syntax(parameter))
}

fn single_branch(rule: &Rule) -> BranchLimits {
    let constraint = rule.constraint.clone().unwrap_or_default();
    BranchLimits {
        branch: measured_branch(rule),
        message: rule_message(rule),
        vlow: fold_opt(constraint.low()),
        vhigh: fold_opt(constraint.high()),
    }
}

/// Build the kind-specific parameters and any leftover parameters for `extra`.
pub fn kind_params(
    rule: &Rule,
    class: Classification,
) -> Result<(KindParams, BTreeMap<String, ParamValue>), ConversionError> {
    let mut extra = BTreeMap::new();
    let constraint = rule.constraint.clone().unwrap_or_default();

    let params = match class {
        Classification::SingleBranch => KindParams::Ovcheck(OvcheckParams::Branch(single_branch(rule))),
        Classification::SelfHeating => {
            let sh = rule.self_heating.clone().unwrap_or_default();
            let mut params = SelfHeatingParams {
                dtmax: sh.dtmax.as_ref().map(fold).unwrap_or(ParamValue::Number(5.0)),
                theat: sh.theat.as_ref().map(fold).unwrap_or(ParamValue::Number(1e-7)),
                monitor: sh
                    .monitor
                    .clone()
                    .unwrap_or_else(|| "shmonitor_nofeedback".to_string()),
                idc_high: None,
                ipeak_high: None,
                irms_high: None,
            };
            for current in &rule.constraints {
                let value = Some(render_limit(&current.ihigh));
                match current.kind.as_str() {
                    "idc" => params.idc_high = value,
                    "ipeak" => params.ipeak_high = value,
                    "irms" => params.irms_high = value,
                    other => tracing::warn!(
                        "Rule '{}': ignoring current constraint of unknown type '{}'",
                        rule.name,
                        other
                    ),
                }
            }
            KindParams::Ovcheck(OvcheckParams::SelfHeating(params))
        }
        Classification::MultiBranch => {
            if rule.branches.len() > MAX_BRANCHES {
                return Err(ConversionError::TooManyBranches {
                    rule: rule.name.clone(),
                    count: rule.branches.len(),
                });
            }
            let branches = rule
                .branches
                .iter()
                .enumerate()
                .map(|(i, b)| IndexedBranch {
                    branch: to_backend_syntax(b.branch.trim()),
                    message: b.message.clone().unwrap_or_else(|| format!("Branch{}", i + 1)),
                    vlow: fold_opt(b.vlow.as_ref().or(constraint.low())),
                    vhigh: fold_opt(b.vhigh.as_ref().or(constraint.high())),
                })
                .collect();
            KindParams::Ovcheck6(branches)
        }
        Classification::StateDependent => {
            let gate = rule.gate_control.clone().unwrap_or_default();
            let probe = rule.monitor_params.clone().unwrap_or_default();
            KindParams::StateDependent(StateDependentParams {
                vhigh_on: fold_opt(constraint.vhigh_on.as_ref()),
                vhigh_off: fold_opt(constraint.vhigh_off.as_ref()),
                vhigh_gc: fold_opt(gate.vhigh_gc.as_ref()),
                vlow_gc: fold_opt(gate.vlow_gc.as_ref()),
                param: probe.param,
                vgt: probe.vgt.as_ref().map(fold).unwrap_or(ParamValue::Number(0.0)),
            })
        }
        Classification::TemperatureDependent => {
            let mut limits = single_branch(rule);
            if let Some(td) = &rule.temperature_dependent {
                let (vlow, vhigh) = temperature_bounds(td);
                limits.vlow = Some(vlow);
                limits.vhigh = Some(vhigh);
            }
            KindParams::Pwl(limits)
        }
        Classification::Aging => {
            let aging = rule.aging_check.clone().unwrap_or_default();
            if !aging.kind.is_empty() {
                tracing::debug!("Rule '{}': aging model '{}'", rule.name, aging.kind);
            }
            let mut coefficients = BTreeMap::new();
            for (key, value) in aging.params {
                if AGING_COEFFICIENTS.contains(&key.as_str()) {
                    coefficients.insert(key, value);
                } else {
                    extra.insert(key, value);
                }
            }
            KindParams::Aging(AgingParams { coefficients })
        }
        Classification::ParameterCheck => {
            let probe = rule.monitor_params.clone().unwrap_or_default();
            KindParams::ParameterCheck(ParameterCheckParams {
                param: probe.param,
                vgt: fold_opt(probe.vgt.as_ref()),
                vlow: fold_opt(constraint.low()),
                vhigh: fold_opt(constraint.high()),
            })
        }
    };
    Ok((params, extra))
}

/// Node names referenced by voltage expressions in the rule's measured
/// parameter and branch identifiers.
pub fn referenced_terminals(rule: &Rule) -> Vec<String> {
    let mut sources = vec![rule.parameter.as_str()];
    sources.extend(rule.branches.iter().map(|b| b.branch.as_str()));

    let mut nodes: Vec<String> = Vec::new();
    for source in sources {
        for caps in VOLTAGE_NODES.captures_iter(source) {
            for group in 1..=4 {
                if let Some(m) = caps.get(group) {
                    if !nodes.iter().any(|n| n == m.as_str()) {
                        nodes.push(m.as_str().to_string());
                    }
                }
            }
        }
    }
    nodes
}

/// Warn about voltage references to terminals the device does not have.
pub fn check_terminals(rule: &Rule, device_name: &str, device: &DeviceInfo) {
    if device.terminals.is_empty() {
        return;
    }
    for node in referenced_terminals(rule) {
        if !device.has_terminal(&node) {
            tracing::warn!(
                "Rule '{}' references terminal '{}' not present on device '{}' ({})",
                rule.name,
                node,
                device_name,
                device.terminals.join(", ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::schema::{AgingCheck, Branch, Constraint, RuleType, SelfHeating};

    fn voltage_rule(name: &str) -> Rule {
        Rule {
            name: name.to_string(),
            parameter: "v[d,s]".to_string(),
            rule_type: RuleType::Voltage,
            constraint: Some(Constraint {
                vhigh: Some(ParamValue::Number(1.32)),
                vlow: Some(ParamValue::Number(-0.1)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_slug_and_names() {
        assert_eq!(slugify("Core VDS-max"), "core_vds_max");
        assert_eq!(
            model_name(MonitorKind::Ovcheck, "nmos_core", "Core VDS"),
            "ovcheck_nmos_core_core_vds"
        );
        assert_eq!(section_name("nmos_core", "Core VDS"), "soacheck_nmos_core_core_vds_shared");
    }

    #[test]
    fn test_classification_precedence() {
        let mut rule = voltage_rule("r");
        assert_eq!(classify(&rule).unwrap(), Classification::SingleBranch);

        rule.branches = vec![Branch {
            branch: "V(d,s)".to_string(),
            ..Default::default()
        }];
        assert_eq!(classify(&rule).unwrap(), Classification::MultiBranch);

        rule.rule_type = RuleType::Pwl;
        assert_eq!(classify(&rule).unwrap(), Classification::TemperatureDependent);

        rule.constraint = Some(Constraint {
            vhigh_on: Some(ParamValue::Number(1.0)),
            ..Default::default()
        });
        assert_eq!(classify(&rule).unwrap(), Classification::StateDependent);

        let unclassifiable = Rule {
            name: "lonely".to_string(),
            rule_type: RuleType::Voltage,
            ..Default::default()
        };
        assert!(matches!(
            classify(&unclassifiable),
            Err(ConversionError::Unclassifiable(ref n)) if n == "lonely"
        ));
    }

    #[test]
    fn test_linear_formula() {
        let spec = LimitSpec::Formula {
            formula: "linear".to_string(),
            parameters: vec!["w".to_string(), "l".to_string()],
            coefficients: vec![1e-3, 2.0],
        };
        assert_eq!(render_limit(&spec), ParamValue::expr("$w * 0.001 + $l * 2"));
        assert_eq!(
            render_limit(&LimitSpec::Expression {
                expression: "2 * 1e-3".to_string()
            }),
            ParamValue::Number(2e-3)
        );
    }

    #[test]
    fn test_temperature_bounds() {
        let td = TemperatureDependence {
            reference_temp: 25.0,
            reference_value: 1.2,
            temp_coefficient: -0.002,
        };
        let (vlow, vhigh) = temperature_bounds(&td);
        assert_eq!(vhigh, ParamValue::expr("1.2 - 0.002 * (T - 25)"));
        assert_eq!(vlow, ParamValue::expr("-1.2 + 0.002 * (T - 25)"));

        let td = TemperatureDependence {
            temp_coefficient: 0.003,
            ..td
        };
        let (vlow, vhigh) = temperature_bounds(&td);
        assert_eq!(vhigh, ParamValue::expr("1.2 + 0.003 * (T - 25)"));
        assert_eq!(vlow, ParamValue::expr("-1.2 - 0.003 * (T - 25)"));
    }

    #[test]
    fn test_multi_branch_fallbacks() {
        let mut rule = voltage_rule("m");
        rule.rule_type = RuleType::MultiBranch;
        rule.branches = vec![
            Branch {
                branch: "v[d,s]".to_string(),
                vhigh: Some(ParamValue::Number(5.0)),
                ..Default::default()
            },
            Branch {
                branch: "V(g,s)".to_string(),
                message: Some("gate".to_string()),
                ..Default::default()
            },
        ];
        let (params, extra) = kind_params(&rule, Classification::MultiBranch).unwrap();
        assert!(extra.is_empty());
        match params {
            KindParams::Ovcheck6(branches) => {
                assert_eq!(branches[0].branch, "V(d,s)");
                assert_eq!(branches[0].message, "Branch1");
                assert_eq!(branches[0].vhigh, Some(ParamValue::Number(5.0)));
                assert_eq!(branches[0].vlow, Some(ParamValue::Number(-0.1)));
                assert_eq!(branches[1].message, "gate");
                assert_eq!(branches[1].vhigh, Some(ParamValue::Number(1.32)));
            }
            other => panic!("Expected ovcheck6, got {:?}", other),
        }

        rule.branches = (0..7)
            .map(|_| Branch {
                branch: "V(d,s)".to_string(),
                ..Default::default()
            })
            .collect();
        assert!(matches!(
            kind_params(&rule, Classification::MultiBranch),
            Err(ConversionError::TooManyBranches { count: 7, .. })
        ));
    }

    #[test]
    fn test_self_heating_defaults() {
        let rule = Rule {
            name: "heat".to_string(),
            rule_type: RuleType::CurrentWithHeating,
            self_heating: Some(SelfHeating::default()),
            ..Default::default()
        };
        let (params, _) = kind_params(&rule, Classification::SelfHeating).unwrap();
        match params {
            KindParams::Ovcheck(OvcheckParams::SelfHeating(sh)) => {
                assert_eq!(sh.dtmax, ParamValue::Number(5.0));
                assert_eq!(sh.theat, ParamValue::Number(1e-7));
                assert_eq!(sh.monitor, "shmonitor_nofeedback");
            }
            other => panic!("Expected self-heating ovcheck, got {:?}", other),
        }
    }

    #[test]
    fn test_aging_splits_coefficients_from_extras() {
        let rule = Rule {
            name: "wear".to_string(),
            rule_type: RuleType::Aging,
            aging_check: Some(AgingCheck {
                kind: "tddb".to_string(),
                params: [
                    ("a".to_string(), ParamValue::Number(1.2)),
                    ("lifetime".to_string(), ParamValue::Number(10.0)),
                ]
                .into_iter()
                .collect(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let (params, extra) = kind_params(&rule, Classification::Aging).unwrap();
        match params {
            KindParams::Aging(aging) => {
                assert_eq!(aging.coefficients.len(), 1);
                assert_eq!(aging.coefficients.get("a"), Some(&ParamValue::Number(1.2)));
            }
            other => panic!("Expected aging, got {:?}", other),
        }
        assert_eq!(extra.get("lifetime"), Some(&ParamValue::Number(10.0)));
        assert!(!extra.contains_key("tddb"));
    }

    #[test]
    fn test_constant_folding() {
        assert_eq!(fold(&ParamValue::expr("1.2 * 1.1")), ParamValue::Number(1.2 * 1.1));
        assert_eq!(fold(&ParamValue::expr("vmax * 1.1")), ParamValue::expr("vmax * 1.1"));
    }

    #[test]
    fn test_referenced_terminals() {
        let mut rule = voltage_rule("r");
        rule.branches = vec![Branch {
            branch: "V(g, b)".to_string(),
            ..Default::default()
        }];
        assert_eq!(referenced_terminals(&rule), vec!["d", "s", "g", "b"]);
    }
}
