//! Lowering of rule documents into monitor documents.
//!
//! Each rule is classified into one of the backend monitor kinds and emitted
//! once per target device. Conversion is fail-fast: the first unknown device
//! or unclassifiable rule aborts the run.

pub mod library;
pub mod lowering;

use crate::parser::monitor_schema::{CommonParams, Monitor, MonitorDocument};
use crate::parser::schema::{GlobalConfig, ParamValue, Rule, UniversalDocument};
use thiserror::Error;

pub use library::{
    DeviceCatalog, DeviceInfo, DeviceLibrary, LibraryError, MonitorCatalog, MonitorInfo,
    MonitorLibrary,
};
pub use lowering::{classify, model_name, section_name, slugify, Classification};

#[derive(Debug, Error, PartialEq)]
pub enum ConversionError {
    #[error("Unknown device '{device}' in rule '{rule}'")]
    UnknownDevice { rule: String, device: String },
    #[error("Cannot determine monitor type for rule: {0}")]
    Unclassifiable(String),
    #[error("Rule '{rule}' has too many branches ({count}), maximum is 6")]
    TooManyBranches { rule: String, count: usize },
}

/// Timing values used when the rule document leaves them out.
pub const DEFAULT_TIMING: [(&str, f64); 4] = [
    ("tmin", 0.0),
    ("tdelay", 0.0),
    ("vballmsg", 1.0),
    ("stop", 0.0),
];

/// tmaxfrac levels used when the rule document leaves them out.
pub const DEFAULT_TMAXFRAC: [(&str, f64); 4] = [
    ("level0", 0.0),
    ("level1", 0.01),
    ("level2", 0.10),
    ("level3", -1.0),
];

pub struct Converter<'a> {
    devices: &'a dyn DeviceLibrary,
    monitors: &'a dyn MonitorLibrary,
}

impl<'a> Converter<'a> {
    pub fn new(devices: &'a dyn DeviceLibrary, monitors: &'a dyn MonitorLibrary) -> Self {
        Self { devices, monitors }
    }

    pub fn convert(&self, document: &UniversalDocument) -> Result<MonitorDocument, ConversionError> {
        let mut monitors = Vec::new();
        for rule in &document.rules {
            monitors.extend(self.convert_rule(rule)?);
        }

        tracing::info!(
            "Converted {} rules into {} monitors",
            document.rules.len(),
            monitors.len()
        );

        Ok(MonitorDocument {
            version: if document.version.is_empty() {
                "1.0".to_string()
            } else {
                document.version.clone()
            },
            process: if document.process.is_empty() {
                "UNKNOWN".to_string()
            } else {
                document.process.clone()
            },
            date: document.date.clone(),
            global_config: lowered_globals(&document.global_config),
            parameters: document.global_config.bindings(),
            monitors,
        })
    }

    /// One monitor per target device. Devices are resolved before the rule
    /// is classified.
    pub fn convert_rule(&self, rule: &Rule) -> Result<Vec<Monitor>, ConversionError> {
        let mut targets = Vec::with_capacity(rule.device.len());
        for device_name in rule.device.iter() {
            let device = self
                .devices
                .device(device_name)
                .ok_or_else(|| ConversionError::UnknownDevice {
                    rule: rule.name.clone(),
                    device: device_name.clone(),
                })?;
            targets.push((device_name, device));
        }

        let class = lowering::classify(rule)?;
        let kind = class.kind();
        tracing::debug!("Rule '{}' classified as {:?} ({})", rule.name, class, kind);

        if !self.monitors.has_kind(kind) {
            tracing::warn!("Monitor kind '{}' is not registered in the monitor library", kind);
        }

        let tmaxfrac = self
            .monitors
            .time_limit_alias(rule.time_limit_category())
            .map(str::to_string);
        let (params, extra) = lowering::kind_params(rule, class)?;

        let mut out = Vec::with_capacity(targets.len());
        for (device_name, device) in targets {
            lowering::check_terminals(rule, device_name, device);

            out.push(Monitor {
                name: rule.name.clone(),
                model_name: lowering::model_name(kind, device_name, &rule.name),
                section: lowering::section_name(device_name, &rule.name),
                device_pattern: device_name.clone(),
                common: CommonParams {
                    tmaxfrac: tmaxfrac.clone(),
                    ..CommonParams::default()
                },
                params: params.clone(),
                extra: extra.clone(),
            });
        }
        Ok(out)
    }
}

/// Global block of the lowered document, with defaults filled in.
fn lowered_globals(config: &GlobalConfig) -> GlobalConfig {
    let mut timing = config.timing.clone();
    let slots = [
        &mut timing.tmin,
        &mut timing.tdelay,
        &mut timing.vballmsg,
        &mut timing.stop,
    ];
    for (slot, (_, default)) in slots.into_iter().zip(DEFAULT_TIMING) {
        slot.get_or_insert(ParamValue::Number(default));
    }

    let mut tmaxfrac = config.tmaxfrac.clone();
    for (level, default) in DEFAULT_TMAXFRAC {
        tmaxfrac.entry(level.to_string()).or_insert(default);
    }

    GlobalConfig {
        timing,
        temperature: config.temperature.clone(),
        tmaxfrac,
        limits: config.limits.clone(),
    }
}

/// Convert with borrowed libraries (convenience wrapper).
pub fn convert(
    document: &UniversalDocument,
    devices: &dyn DeviceLibrary,
    monitors: &dyn MonitorLibrary,
) -> Result<MonitorDocument, ConversionError> {
    Converter::new(devices, monitors).convert(document)
}
