//! Universal (rule-flavor) document schema.
//!
//! These types mirror the YAML a user writes. Every field is defaulted so that
//! a structurally incomplete document still parses; the validator is the
//! place where missing or contradictory content gets reported.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A scalar that is either a literal number or an expression string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Expr(String),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Expr(_) => None,
        }
    }

    pub fn as_expr(&self) -> Option<&str> {
        match self {
            ParamValue::Expr(s) => Some(s),
            ParamValue::Number(_) => None,
        }
    }

    pub fn expr(s: impl Into<String>) -> Self {
        ParamValue::Expr(s.into())
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Expr(s.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{}", format_number(*n)),
            ParamValue::Expr(s) => write!(f, "{}", s),
        }
    }
}

/// Render a number the way the netlist expects it: plain decimal for
/// ordinary magnitudes, scientific notation for very small or large ones.
/// Formatting never depends on the process locale.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if (1e-4..1e6).contains(&n.abs()) {
        format!("{}", n)
    } else {
        format!("{:e}", n)
    }
}

/// Accepts a YAML string, number or bool and keeps its textual form, so that
/// `version: 1.0` and `date: 2024-12-16` both land in `String` fields.
pub(crate) fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!("expected a scalar, found {:?}", other))),
    }
}

pub(crate) fn opt_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = scalar_string(deserializer)?;
    Ok(Some(s))
}

/// Global timing parameters shared by every monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmin: Option<ParamValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tdelay: Option<ParamValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vballmsg: Option<ParamValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<ParamValue>,
}

impl Timing {
    pub const KEYS: [&'static str; 4] = ["tmin", "tdelay", "vballmsg", "stop"];

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        match key {
            "tmin" => self.tmin.as_ref(),
            "tdelay" => self.tdelay.as_ref(),
            "vballmsg" => self.vballmsg.as_ref(),
            "stop" => self.stop.as_ref(),
            _ => None,
        }
    }

    /// Keys that were not supplied, in declaration order.
    pub fn missing(&self) -> Vec<&'static str> {
        Self::KEYS
            .iter()
            .copied()
            .filter(|k| self.get(k).is_none())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Temperature {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcelsius0: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tref_soa: Option<f64>,
}

impl Temperature {
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        let mut out = Vec::new();
        if let Some(v) = self.tcelsius0 {
            out.push(("tcelsius0", v));
        }
        if let Some(v) = self.tref_soa {
            out.push(("tref_soa", v));
        }
        out
    }
}

/// The `global` block of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub timing: Timing,
    pub temperature: Temperature,
    pub tmaxfrac: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, ParamValue>,
}

impl GlobalConfig {
    pub const TMAXFRAC_LEVELS: [&'static str; 4] = ["level0", "level1", "level2", "level3"];

    pub fn get_limit(&self, name: &str) -> Option<&ParamValue> {
        self.limits.get(name)
    }

    pub fn get_tmaxfrac(&self, level: usize) -> f64 {
        self.tmaxfrac
            .get(&format!("level{}", level))
            .copied()
            .unwrap_or(0.0)
    }

    /// Every name an expression may legally reference as a global.
    pub fn declared_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.limits.keys().cloned().collect();
        for key in Timing::KEYS {
            if self.timing.get(key).is_some() {
                names.push(key.to_string());
            }
        }
        names.extend(self.temperature.entries().into_iter().map(|(k, _)| k.to_string()));
        names
    }

    /// Global parameters as expression bindings (limits plus temperature).
    pub fn bindings(&self) -> BTreeMap<String, ParamValue> {
        let mut out = self.limits.clone();
        for (k, v) in self.temperature.entries() {
            out.insert(k.to_string(), ParamValue::Number(v));
        }
        out
    }
}

/// The rule-type tag. Unknown tags are kept so the validator can report them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleType {
    Voltage,
    Current,
    Vhigh,
    Vlow,
    Ihigh,
    Ilow,
    Range,
    StateDependent,
    MultiBranch,
    CurrentWithHeating,
    Parameter,
    Pwl,
    Aging,
    Other(String),
}

impl RuleType {
    pub fn as_str(&self) -> &str {
        match self {
            RuleType::Voltage => "voltage",
            RuleType::Current => "current",
            RuleType::Vhigh => "vhigh",
            RuleType::Vlow => "vlow",
            RuleType::Ihigh => "ihigh",
            RuleType::Ilow => "ilow",
            RuleType::Range => "range",
            RuleType::StateDependent => "state_dependent",
            RuleType::MultiBranch => "multi_branch",
            RuleType::CurrentWithHeating => "current_with_heating",
            RuleType::Parameter => "parameter",
            RuleType::Pwl => "pwl",
            RuleType::Aging => "aging",
            RuleType::Other(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, RuleType::Other(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RuleType::Other(s) if s.is_empty())
    }

    /// Plain voltage/current limit tags that lower to a single-branch check.
    pub fn is_simple_limit(&self) -> bool {
        matches!(
            self,
            RuleType::Voltage
                | RuleType::Current
                | RuleType::Vhigh
                | RuleType::Vlow
                | RuleType::Ihigh
                | RuleType::Ilow
                | RuleType::Range
        )
    }
}

impl Default for RuleType {
    fn default() -> Self {
        RuleType::Other(String::new())
    }
}

impl From<String> for RuleType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "voltage" => RuleType::Voltage,
            "current" => RuleType::Current,
            "vhigh" => RuleType::Vhigh,
            "vlow" => RuleType::Vlow,
            "ihigh" => RuleType::Ihigh,
            "ilow" => RuleType::Ilow,
            "range" => RuleType::Range,
            "state_dependent" => RuleType::StateDependent,
            "multi_branch" => RuleType::MultiBranch,
            "current_with_heating" => RuleType::CurrentWithHeating,
            "parameter" => RuleType::Parameter,
            "pwl" => RuleType::Pwl,
            "aging" => RuleType::Aging,
            _ => RuleType::Other(s),
        }
    }
}

impl From<RuleType> for String {
    fn from(t: RuleType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule severity tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleSeverity {
    High,
    Medium,
    Low,
    Review,
    Other(String),
}

impl RuleSeverity {
    pub fn as_str(&self) -> &str {
        match self {
            RuleSeverity::High => "high",
            RuleSeverity::Medium => "medium",
            RuleSeverity::Low => "low",
            RuleSeverity::Review => "review",
            RuleSeverity::Other(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, RuleSeverity::Other(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RuleSeverity::Other(s) if s.is_empty())
    }
}

impl Default for RuleSeverity {
    fn default() -> Self {
        RuleSeverity::Other(String::new())
    }
}

impl From<String> for RuleSeverity {
    fn from(s: String) -> Self {
        match s.as_str() {
            "high" => RuleSeverity::High,
            "medium" => RuleSeverity::Medium,
            "low" => RuleSeverity::Low,
            "review" => RuleSeverity::Review,
            _ => RuleSeverity::Other(s),
        }
    }
}

impl From<RuleSeverity> for String {
    fn from(s: RuleSeverity) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for RuleSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One or more target device names. YAML may give a scalar or a list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "OneOrMany", into = "Vec<String>")]
pub struct DeviceTargets(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for DeviceTargets {
    fn from(v: OneOrMany) -> Self {
        match v {
            OneOrMany::One(s) if s.is_empty() => DeviceTargets(Vec::new()),
            OneOrMany::One(s) => DeviceTargets(vec![s]),
            OneOrMany::Many(v) => DeviceTargets(v),
        }
    }
}

impl From<DeviceTargets> for Vec<String> {
    fn from(t: DeviceTargets) -> Self {
        t.0
    }
}

impl DeviceTargets {
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|d| d.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraint {
    pub vhigh: Option<ParamValue>,
    pub vlow: Option<ParamValue>,
    pub ihigh: Option<ParamValue>,
    pub ilow: Option<ParamValue>,
    pub vhigh_on: Option<ParamValue>,
    pub vhigh_off: Option<ParamValue>,
    pub vlow_on: Option<ParamValue>,
    pub vlow_off: Option<ParamValue>,
}

impl Constraint {
    /// All bounds paired with their field name, skipping unset ones.
    pub fn bounds(&self) -> Vec<(&'static str, &ParamValue)> {
        [
            ("vhigh", &self.vhigh),
            ("vlow", &self.vlow),
            ("ihigh", &self.ihigh),
            ("ilow", &self.ilow),
            ("vhigh_on", &self.vhigh_on),
            ("vhigh_off", &self.vhigh_off),
            ("vlow_on", &self.vlow_on),
            ("vlow_off", &self.vlow_off),
        ]
        .into_iter()
        .filter_map(|(name, v)| v.as_ref().map(|v| (name, v)))
        .collect()
    }

    pub fn has_any_bound(&self) -> bool {
        !self.bounds().is_empty()
    }

    pub fn has_voltage(&self) -> bool {
        self.vhigh.is_some() || self.vlow.is_some() || self.is_state_dependent()
    }

    pub fn has_current(&self) -> bool {
        self.ihigh.is_some() || self.ilow.is_some()
    }

    pub fn is_state_dependent(&self) -> bool {
        self.vhigh_on.is_some()
            || self.vhigh_off.is_some()
            || self.vlow_on.is_some()
            || self.vlow_off.is_some()
    }

    /// Lower bound for a single-branch check: voltage first, then current.
    pub fn low(&self) -> Option<&ParamValue> {
        self.vlow.as_ref().or(self.ilow.as_ref())
    }

    pub fn high(&self) -> Option<&ParamValue> {
        self.vhigh.as_ref().or(self.ihigh.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Branch {
    pub branch: String,
    pub vhigh: Option<ParamValue>,
    pub vlow: Option<ParamValue>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateControl {
    pub vhigh_gc: Option<ParamValue>,
    pub vlow_gc: Option<ParamValue>,
}

/// Probe parameters for state detection and parameter checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorParams {
    pub param: String,
    pub vgt: Option<ParamValue>,
    pub pmosvthsign: i32,
    pub inst2probe: String,
}

impl Default for MonitorParams {
    fn default() -> Self {
        Self {
            param: "vth".to_string(),
            vgt: None,
            pmosvthsign: 1,
            inst2probe: "fet".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgingCheck {
    #[serde(rename = "type")]
    pub kind: String,
    pub variant: String,
    pub params: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfHeating {
    pub dtmax: Option<ParamValue>,
    pub theat: Option<ParamValue>,
    pub monitor: Option<String>,
}

/// A current limit: a literal, an expression, or a formula over device
/// parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LimitSpec {
    Value(ParamValue),
    Expression {
        expression: String,
    },
    Formula {
        formula: String,
        #[serde(default)]
        parameters: Vec<String>,
        #[serde(default)]
        coefficients: Vec<f64>,
    },
}

impl Default for LimitSpec {
    fn default() -> Self {
        LimitSpec::Value(ParamValue::Number(0.0))
    }
}

/// Current limit kinds accepted for current-with-heating rules.
pub const CURRENT_KINDS: [&str; 3] = ["idc", "ipeak", "irms"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentConstraint {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub ihigh: LimitSpec,
    pub message: String,
}

/// Linear temperature dependence of a symmetric voltage limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureDependence {
    pub reference_temp: f64,
    pub reference_value: f64,
    pub temp_coefficient: f64,
}

impl Default for TemperatureDependence {
    fn default() -> Self {
        Self {
            reference_temp: 25.0,
            reference_value: 0.0,
            temp_coefficient: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    pub name: String,
    pub device: DeviceTargets,
    pub parameter: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub severity: RuleSeverity,
    pub description: String,
    pub message: Option<String>,
    pub condition: Option<String>,
    /// Time-limit category used to pick a tmaxfrac alias.
    pub time_limit: Option<String>,

    pub constraint: Option<Constraint>,
    pub tmaxfrac: BTreeMap<String, f64>,

    pub branches: Vec<Branch>,

    pub gate_control: Option<GateControl>,
    pub monitor_params: Option<MonitorParams>,
    pub temperature_dependent: Option<TemperatureDependence>,

    pub aging_check: Option<AgingCheck>,

    pub constraints: Vec<CurrentConstraint>,
    pub self_heating: Option<SelfHeating>,
    pub device_params: BTreeMap<String, ParamValue>,
}

impl Rule {
    pub fn is_multi_branch(&self) -> bool {
        self.rule_type == RuleType::MultiBranch || !self.branches.is_empty()
    }

    pub fn is_state_dependent(&self) -> bool {
        self.rule_type == RuleType::StateDependent
            || self
                .constraint
                .as_ref()
                .map(Constraint::is_state_dependent)
                .unwrap_or(false)
    }

    pub fn is_temperature_dependent(&self) -> bool {
        self.rule_type == RuleType::Pwl || self.temperature_dependent.is_some()
    }

    pub fn is_current_with_heating(&self) -> bool {
        self.rule_type == RuleType::CurrentWithHeating
    }

    pub fn has_aging_check(&self) -> bool {
        self.rule_type == RuleType::Aging || self.aging_check.is_some()
    }

    pub fn time_limit_category(&self) -> &str {
        self.time_limit.as_deref().unwrap_or("steady")
    }
}

/// A parsed universal document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniversalDocument {
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(deserialize_with = "scalar_string")]
    pub process: String,
    #[serde(deserialize_with = "scalar_string")]
    pub date: String,
    #[serde(rename = "global")]
    pub global_config: GlobalConfig,
    pub rules: Vec<Rule>,
}

impl Default for UniversalDocument {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            process: String::new(),
            date: String::new(),
            global_config: GlobalConfig::default(),
            rules: Vec::new(),
        }
    }
}

impl UniversalDocument {
    pub fn rules_for_device(&self, device: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.device.iter().any(|d| d == device))
            .collect()
    }
}
