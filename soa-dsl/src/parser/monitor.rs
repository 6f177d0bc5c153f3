//! Monitor-flavor front end.
//!
//! Unlike rule documents, monitor documents are strict: the document header,
//! global timing, the four tmaxfrac levels and every monitor's identifying
//! fields must be present. Kind-specific keys inside a monitor's `parameters`
//! map are lifted into the kind's typed variant; the remainder is preserved in
//! the monitor's `extra` bag.

use crate::parser::error::ParseError;
use crate::parser::format_detector::read_yaml_source;
use crate::parser::monitor_schema::*;
use crate::parser::schema::{opt_scalar_string, GlobalConfig, ParamValue, Temperature, Timing};
use crate::parser::universal::SoaParser;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Deserialize)]
struct RawMonitorDocument {
    #[serde(default, deserialize_with = "opt_scalar_string")]
    version: Option<String>,
    #[serde(default, deserialize_with = "opt_scalar_string")]
    process: Option<String>,
    #[serde(default, deserialize_with = "opt_scalar_string")]
    date: Option<String>,
    #[serde(default)]
    global: Option<RawGlobal>,
    #[serde(default)]
    parameters: BTreeMap<String, ParamValue>,
    #[serde(default)]
    monitors: Vec<RawMonitor>,
}

#[derive(Deserialize)]
struct RawGlobal {
    #[serde(default)]
    timing: Option<Timing>,
    #[serde(default)]
    temperature: Temperature,
    #[serde(default)]
    tmaxfrac: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    limits: BTreeMap<String, ParamValue>,
}

#[derive(Deserialize)]
struct RawMonitor {
    #[serde(default, deserialize_with = "opt_scalar_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "opt_scalar_string")]
    monitor_type: Option<String>,
    #[serde(default, deserialize_with = "opt_scalar_string")]
    model_name: Option<String>,
    #[serde(default, deserialize_with = "opt_scalar_string")]
    section: Option<String>,
    #[serde(default, deserialize_with = "opt_scalar_string")]
    device_pattern: Option<String>,
    #[serde(default)]
    parameters: Option<BTreeMap<String, Value>>,
}

fn required(value: Option<String>, field: &str) -> Result<String, ParseError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ParseError::MissingField(field.to_string())),
    }
}

impl SoaParser {
    /// Parse a monitor-flavor document. All-or-nothing: the first structural
    /// problem is returned with the offending field path.
    pub fn parse_monitor(content: &str) -> Result<MonitorDocument, ParseError> {
        if content.trim().is_empty() {
            return Err(ParseError::EmptyDocument);
        }
        let raw: RawMonitorDocument = serde_yaml::from_str(content)?;

        let process = required(raw.process, "process")?;
        let date = required(raw.date, "date")?;
        let global = raw
            .global
            .ok_or_else(|| ParseError::MissingField("global".to_string()))?;
        let timing = global
            .timing
            .ok_or_else(|| ParseError::MissingField("global.timing".to_string()))?;
        if let Some(key) = timing.missing().first() {
            return Err(ParseError::MissingField(format!("global.timing.{}", key)));
        }
        let tmaxfrac = global
            .tmaxfrac
            .ok_or_else(|| ParseError::MissingField("global.tmaxfrac".to_string()))?;
        for level in GlobalConfig::TMAXFRAC_LEVELS {
            if !tmaxfrac.contains_key(level) {
                return Err(ParseError::MissingField(format!("global.tmaxfrac.{}", level)));
            }
        }

        let monitors = raw
            .monitors
            .into_iter()
            .enumerate()
            .map(|(i, m)| parse_monitor_entry(i, m))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Parsed monitor document '{}' with {} monitors", process, monitors.len());

        Ok(MonitorDocument {
            version: raw
                .version
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "1.0".to_string()),
            process,
            date,
            global_config: GlobalConfig {
                timing,
                temperature: global.temperature,
                tmaxfrac,
                limits: global.limits,
            },
            parameters: raw.parameters,
            monitors,
        })
    }

    pub fn parse_monitor_file(path: &Path) -> Result<MonitorDocument, ParseError> {
        let content = read_yaml_source(path)?;
        Self::parse_monitor(&content)
    }
}

fn parse_monitor_entry(index: usize, raw: RawMonitor) -> Result<Monitor, ParseError> {
    let path = format!("monitors[{}]", index);
    let field = |name: &str| format!("{}.{}", path, name);

    let name = required(raw.name, &field("name"))?;
    let type_name = required(raw.monitor_type, &field("monitor_type"))?;
    let kind: MonitorKind = type_name
        .parse()
        .map_err(|value| ParseError::UnknownMonitorType {
            field: field("monitor_type"),
            value,
        })?;
    let model_name = required(raw.model_name, &field("model_name"))?;
    let section = required(raw.section, &field("section"))?;
    let device_pattern = required(raw.device_pattern, &field("device_pattern"))?;
    let parameters = raw
        .parameters
        .ok_or_else(|| ParseError::MissingField(field("parameters")))?;

    let mut bag = ParamBag {
        path: field("parameters"),
        entries: parameters,
    };

    let common = CommonParams {
        tmin: bag.require("tmin")?,
        tdelay: bag.require("tdelay")?,
        vballmsg: bag.require("vballmsg")?,
        stop: bag.require("stop")?,
        tmaxfrac: bag.text("tmaxfrac")?,
    };

    let params = match kind {
        MonitorKind::Ovcheck => KindParams::Ovcheck(ovcheck_params(&mut bag)?),
        MonitorKind::Ovcheck6 => KindParams::Ovcheck6(indexed_branches(&mut bag)?),
        MonitorKind::OvcheckMos2 => KindParams::StateDependent(StateDependentParams {
            vhigh_on: bag.value("vhigh_on")?,
            vhigh_off: bag.value("vhigh_off")?,
            vhigh_gc: bag.value("vhigh_gc")?,
            vlow_gc: bag.value("vlow_gc")?,
            param: bag.text("param")?.unwrap_or_else(|| "vth".to_string()),
            vgt: bag.value("vgt")?.unwrap_or(ParamValue::Number(0.0)),
        }),
        MonitorKind::OvcheckPwl => KindParams::Pwl(branch_limits(&mut bag)?),
        MonitorKind::OvcheckHciTddb => {
            // The marker is fixed; whatever the document says is not kept.
            bag.text("atype")?;
            let mut coefficients = BTreeMap::new();
            for letter in AGING_COEFFICIENTS {
                if let Some(v) = bag.value(&format!("soa_hcitddb_{}", letter))? {
                    coefficients.insert(letter.to_string(), v);
                }
            }
            KindParams::Aging(AgingParams { coefficients })
        }
        MonitorKind::Parcheck3 => KindParams::ParameterCheck(ParameterCheckParams {
            param: bag.text("param")?.unwrap_or_else(|| "vth".to_string()),
            vgt: bag.value("vgt")?,
            vlow: bag.value("vlow")?,
            vhigh: bag.value("vhigh")?,
        }),
    };

    let extra = bag.into_extra()?;

    Ok(Monitor {
        name,
        model_name,
        section,
        device_pattern,
        common,
        params,
        extra,
    })
}

const SELF_HEATING_KEYS: [&str; 6] = ["dtmax", "theat", "monitor", "idc_high", "ipeak_high", "irms_high"];

fn ovcheck_params(bag: &mut ParamBag) -> Result<OvcheckParams, ParseError> {
    if !SELF_HEATING_KEYS.iter().any(|k| bag.contains(k)) {
        return branch_limits(bag).map(OvcheckParams::Branch);
    }
    Ok(OvcheckParams::SelfHeating(SelfHeatingParams {
        dtmax: bag.value("dtmax")?.unwrap_or(ParamValue::Number(5.0)),
        theat: bag.value("theat")?.unwrap_or(ParamValue::Number(1e-7)),
        monitor: bag
            .text("monitor")?
            .unwrap_or_else(|| "shmonitor_nofeedback".to_string()),
        idc_high: bag.value("idc_high")?,
        ipeak_high: bag.value("ipeak_high")?,
        irms_high: bag.value("irms_high")?,
    }))
}

fn branch_limits(bag: &mut ParamBag) -> Result<BranchLimits, ParseError> {
    Ok(BranchLimits {
        vlow: bag.value("vlow")?,
        vhigh: bag.value("vhigh")?,
        branch: bag.text("branch1")?,
        message: bag.text("message1")?,
    })
}

/// Branches are numbered from 1 without gaps; the first index with no keys
/// ends the list.
fn indexed_branches(bag: &mut ParamBag) -> Result<Vec<IndexedBranch>, ParseError> {
    let mut branches = Vec::new();
    for i in 1..=MAX_BRANCHES {
        let keys = [
            format!("branch{}", i),
            format!("message{}", i),
            format!("vlow{}", i),
            format!("vhigh{}", i),
        ];
        if !keys.iter().any(|k| bag.contains(k)) {
            break;
        }
        let branch = bag
            .text(&keys[0])?
            .ok_or_else(|| ParseError::MissingField(format!("{}.{}", bag.path, keys[0])))?;
        branches.push(IndexedBranch {
            branch,
            message: bag.text(&keys[1])?.unwrap_or_else(|| format!("Branch{}", i)),
            vlow: bag.value(&keys[2])?,
            vhigh: bag.value(&keys[3])?,
        });
    }
    Ok(branches)
}

/// A monitor's flat `parameters` map, drained as keys are recognized.
struct ParamBag {
    path: String,
    entries: BTreeMap<String, Value>,
}

impl ParamBag {
    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn require(&mut self, key: &str) -> Result<ParamValue, ParseError> {
        self.value(key)?
            .ok_or_else(|| ParseError::MissingField(format!("{}.{}", self.path, key)))
    }

    fn value(&mut self, key: &str) -> Result<Option<ParamValue>, ParseError> {
        match self.entries.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => to_param_value(&format!("{}.{}", self.path, key), v).map(Some),
        }
    }

    fn text(&mut self, key: &str) -> Result<Option<String>, ParseError> {
        match self.entries.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(ParseError::InvalidValue {
                field: format!("{}.{}", self.path, key),
                reason: "expected a scalar".to_string(),
            }),
        }
    }

    fn into_extra(self) -> Result<BTreeMap<String, ParamValue>, ParseError> {
        let path = self.path;
        self.entries
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let value = to_param_value(&format!("{}.{}", path, k), v)?;
                Ok((k, value))
            })
            .collect()
    }
}

fn to_param_value(field: &str, value: Value) -> Result<ParamValue, ParseError> {
    match value {
        Value::Number(n) => n.as_f64().map(ParamValue::Number).ok_or_else(|| {
            ParseError::InvalidValue {
                field: field.to_string(),
                reason: format!("{} is not representable as a number", n),
            }
        }),
        Value::String(s) => Ok(ParamValue::Expr(s)),
        Value::Bool(b) => Ok(ParamValue::Expr(b.to_string())),
        _ => Err(ParseError::InvalidValue {
            field: field.to_string(),
            reason: "expected a number or expression".to_string(),
        }),
    }
}

fn put_opt(out: &mut Vec<(String, Value)>, key: &str, value: &Option<ParamValue>) {
    if let Some(v) = value {
        out.push((key.to_string(), yaml_value(v)));
    }
}

fn yaml_value(value: &ParamValue) -> Value {
    match value {
        ParamValue::Number(n) => Value::Number((*n).into()),
        ParamValue::Expr(s) => Value::String(s.clone()),
    }
}

impl Monitor {
    /// The monitor's parameters as the flat key/value list used by the YAML
    /// form: common parameters, then kind-specific ones, then extras.
    pub fn flat_parameters(&self) -> Vec<(String, Value)> {
        let mut out: Vec<(String, Value)> = vec![
            ("tmin".to_string(), yaml_value(&self.common.tmin)),
            ("tdelay".to_string(), yaml_value(&self.common.tdelay)),
            ("vballmsg".to_string(), yaml_value(&self.common.vballmsg)),
            ("stop".to_string(), yaml_value(&self.common.stop)),
        ];
        if let Some(alias) = &self.common.tmaxfrac {
            out.push(("tmaxfrac".to_string(), Value::String(alias.clone())));
        }

        match &self.params {
            KindParams::Ovcheck(OvcheckParams::Branch(limits)) | KindParams::Pwl(limits) => {
                put_opt(&mut out, "vlow", &limits.vlow);
                put_opt(&mut out, "vhigh", &limits.vhigh);
                if let Some(b) = &limits.branch {
                    out.push(("branch1".to_string(), Value::String(b.clone())));
                }
                if let Some(m) = &limits.message {
                    out.push(("message1".to_string(), Value::String(m.clone())));
                }
            }
            KindParams::Ovcheck(OvcheckParams::SelfHeating(sh)) => {
                out.push(("dtmax".to_string(), yaml_value(&sh.dtmax)));
                out.push(("theat".to_string(), yaml_value(&sh.theat)));
                out.push(("monitor".to_string(), Value::String(sh.monitor.clone())));
                put_opt(&mut out, "idc_high", &sh.idc_high);
                put_opt(&mut out, "ipeak_high", &sh.ipeak_high);
                put_opt(&mut out, "irms_high", &sh.irms_high);
            }
            KindParams::Ovcheck6(branches) => {
                for (i, b) in branches.iter().enumerate() {
                    let n = i + 1;
                    out.push((format!("branch{}", n), Value::String(b.branch.clone())));
                    out.push((format!("message{}", n), Value::String(b.message.clone())));
                    put_opt(&mut out, &format!("vlow{}", n), &b.vlow);
                    put_opt(&mut out, &format!("vhigh{}", n), &b.vhigh);
                }
            }
            KindParams::StateDependent(sd) => {
                put_opt(&mut out, "vhigh_on", &sd.vhigh_on);
                put_opt(&mut out, "vhigh_off", &sd.vhigh_off);
                put_opt(&mut out, "vhigh_gc", &sd.vhigh_gc);
                put_opt(&mut out, "vlow_gc", &sd.vlow_gc);
                out.push(("param".to_string(), Value::String(sd.param.clone())));
                out.push(("vgt".to_string(), yaml_value(&sd.vgt)));
            }
            KindParams::Aging(aging) => {
                out.push(("atype".to_string(), Value::String(AGING_MARKER.to_string())));
                for (letter, v) in &aging.coefficients {
                    out.push((format!("soa_hcitddb_{}", letter), yaml_value(v)));
                }
            }
            KindParams::ParameterCheck(pc) => {
                out.push(("param".to_string(), Value::String(pc.param.clone())));
                put_opt(&mut out, "vgt", &pc.vgt);
                put_opt(&mut out, "vlow", &pc.vlow);
                put_opt(&mut out, "vhigh", &pc.vhigh);
            }
        }

        for (k, v) in &self.extra {
            out.push((k.clone(), yaml_value(v)));
        }
        out
    }
}

impl MonitorDocument {
    /// Serialize to monitor-flavor YAML that [`SoaParser::parse_monitor`]
    /// accepts.
    pub fn to_yaml(&self) -> Result<String, ParseError> {
        let mut root = Mapping::new();
        root.insert("version".into(), Value::String(self.version.clone()));
        root.insert("process".into(), Value::String(self.process.clone()));
        root.insert("date".into(), Value::String(self.date.clone()));
        root.insert("global".into(), serde_yaml::to_value(&self.global_config)?);
        if !self.parameters.is_empty() {
            root.insert("parameters".into(), serde_yaml::to_value(&self.parameters)?);
        }

        let monitors: Vec<Value> = self
            .monitors
            .iter()
            .map(|m| {
                let mut entry = Mapping::new();
                entry.insert("name".into(), Value::String(m.name.clone()));
                entry.insert("monitor_type".into(), Value::String(m.kind().to_string()));
                entry.insert("model_name".into(), Value::String(m.model_name.clone()));
                entry.insert("section".into(), Value::String(m.section.clone()));
                entry.insert("device_pattern".into(), Value::String(m.device_pattern.clone()));
                let params: Mapping = m
                    .flat_parameters()
                    .into_iter()
                    .map(|(k, v)| (Value::String(k), v))
                    .collect();
                entry.insert("parameters".into(), Value::Mapping(params));
                Value::Mapping(entry)
            })
            .collect();
        root.insert("monitors".into(), Value::Sequence(monitors));

        Ok(serde_yaml::to_string(&Value::Mapping(root))?)
    }
}
