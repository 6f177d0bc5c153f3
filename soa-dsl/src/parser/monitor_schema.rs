//! Monitor (lowered) document schema.
//!
//! A monitor document is what the code generator consumes. It is produced by
//! the converter or parsed directly from monitor-flavor YAML.

use crate::parser::schema::{GlobalConfig, ParamValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The six Verilog-A checker models the backend provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MonitorKind {
    #[serde(rename = "ovcheck")]
    Ovcheck,
    #[serde(rename = "ovcheck6")]
    Ovcheck6,
    #[serde(rename = "ovcheckva_mos2")]
    OvcheckMos2,
    #[serde(rename = "ovcheckva_pwl")]
    OvcheckPwl,
    #[serde(rename = "ovcheckva_ldmos_hci_tddb")]
    OvcheckHciTddb,
    #[serde(rename = "parcheckva3")]
    Parcheck3,
}

impl MonitorKind {
    pub const ALL: [MonitorKind; 6] = [
        MonitorKind::Ovcheck,
        MonitorKind::Ovcheck6,
        MonitorKind::OvcheckMos2,
        MonitorKind::OvcheckPwl,
        MonitorKind::OvcheckHciTddb,
        MonitorKind::Parcheck3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorKind::Ovcheck => "ovcheck",
            MonitorKind::Ovcheck6 => "ovcheck6",
            MonitorKind::OvcheckMos2 => "ovcheckva_mos2",
            MonitorKind::OvcheckPwl => "ovcheckva_pwl",
            MonitorKind::OvcheckHciTddb => "ovcheckva_ldmos_hci_tddb",
            MonitorKind::Parcheck3 => "parcheckva3",
        }
    }
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MonitorKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Parameters every monitor carries. Values are normally symbolic references
/// to the global parameters declared in the base section.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonParams {
    pub tmin: ParamValue,
    pub tdelay: ParamValue,
    pub vballmsg: ParamValue,
    pub stop: ParamValue,
    pub tmaxfrac: Option<String>,
}

impl Default for CommonParams {
    fn default() -> Self {
        Self {
            tmin: ParamValue::expr("global_tmin"),
            tdelay: ParamValue::expr("global_tdelay"),
            vballmsg: ParamValue::expr("global_vballmsg"),
            stop: ParamValue::expr("global_stop"),
            tmaxfrac: None,
        }
    }
}

/// Single-branch voltage/current limits (ovcheck, ovcheckva_pwl).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchLimits {
    pub branch: Option<String>,
    pub message: Option<String>,
    pub vlow: Option<ParamValue>,
    pub vhigh: Option<ParamValue>,
}

/// Self-heating variant of ovcheck.
#[derive(Debug, Clone, PartialEq)]
pub struct SelfHeatingParams {
    pub dtmax: ParamValue,
    pub theat: ParamValue,
    pub monitor: String,
    pub idc_high: Option<ParamValue>,
    pub ipeak_high: Option<ParamValue>,
    pub irms_high: Option<ParamValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OvcheckParams {
    Branch(BranchLimits),
    SelfHeating(SelfHeatingParams),
}

/// One indexed branch of an ovcheck6 monitor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedBranch {
    pub branch: String,
    pub message: String,
    pub vlow: Option<ParamValue>,
    pub vhigh: Option<ParamValue>,
}

/// Maximum branch count of the ovcheck6 model.
pub const MAX_BRANCHES: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct StateDependentParams {
    pub vhigh_on: Option<ParamValue>,
    pub vhigh_off: Option<ParamValue>,
    pub vhigh_gc: Option<ParamValue>,
    pub vlow_gc: Option<ParamValue>,
    pub param: String,
    pub vgt: ParamValue,
}

/// Coefficient letters of the HCI/TDDB aging model.
pub const AGING_COEFFICIENTS: [&str; 14] = [
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n",
];

/// Value of the `atype` marker every aging monitor carries.
pub const AGING_MARKER: &str = "atype";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgingParams {
    /// Keyed by coefficient letter (`a`..`n`).
    pub coefficients: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterCheckParams {
    pub param: String,
    pub vgt: Option<ParamValue>,
    pub vlow: Option<ParamValue>,
    pub vhigh: Option<ParamValue>,
}

/// Kind-specific parameter set. The variant determines the monitor kind.
#[derive(Debug, Clone, PartialEq)]
pub enum KindParams {
    Ovcheck(OvcheckParams),
    Ovcheck6(Vec<IndexedBranch>),
    StateDependent(StateDependentParams),
    Pwl(BranchLimits),
    Aging(AgingParams),
    ParameterCheck(ParameterCheckParams),
}

impl KindParams {
    pub fn kind(&self) -> MonitorKind {
        match self {
            KindParams::Ovcheck(_) => MonitorKind::Ovcheck,
            KindParams::Ovcheck6(_) => MonitorKind::Ovcheck6,
            KindParams::StateDependent(_) => MonitorKind::OvcheckMos2,
            KindParams::Pwl(_) => MonitorKind::OvcheckPwl,
            KindParams::Aging(_) => MonitorKind::OvcheckHciTddb,
            KindParams::ParameterCheck(_) => MonitorKind::Parcheck3,
        }
    }
}

/// One generated checker instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Monitor {
    pub name: String,
    pub model_name: String,
    pub section: String,
    pub device_pattern: String,
    pub common: CommonParams,
    pub params: KindParams,
    /// Parameters not recognized for this kind, emitted verbatim.
    pub extra: BTreeMap<String, ParamValue>,
}

impl Monitor {
    pub fn kind(&self) -> MonitorKind {
        self.params.kind()
    }
}

/// A lowered, backend-ready document.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorDocument {
    pub version: String,
    pub process: String,
    pub date: String,
    pub global_config: GlobalConfig,
    /// Additional global parameter declarations for the base section.
    pub parameters: BTreeMap<String, ParamValue>,
    pub monitors: Vec<Monitor>,
}

impl MonitorDocument {
    pub fn monitors_for_device(&self, device: &str) -> Vec<&Monitor> {
        self.monitors
            .iter()
            .filter(|m| m.device_pattern == device)
            .collect()
    }
}
