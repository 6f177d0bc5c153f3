//! Device and monitor metadata used during lowering.
//!
//! The converter only sees these through the [`DeviceLibrary`] and
//! [`MonitorLibrary`] traits; the YAML-backed catalogs below are the stock
//! implementations.

use crate::parser::error::ParseError;
use crate::parser::format_detector::read_yaml_source;
use crate::parser::monitor_schema::MonitorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Library YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Cannot read library: {0}")]
    Source(#[from] ParseError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    #[serde(rename = "type")]
    pub device_type: String,
    pub terminals: Vec<String>,
    pub description: String,
}

impl DeviceInfo {
    pub fn has_terminal(&self, name: &str) -> bool {
        self.terminals.iter().any(|t| t == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorInfo {
    pub description: String,
    /// Verilog-A source implementing the checker.
    pub veriloga: String,
}

/// Read-only lookup of device metadata by name.
pub trait DeviceLibrary {
    fn device(&self, name: &str) -> Option<&DeviceInfo>;
}

/// Read-only lookup of monitor kinds and time-limit aliases.
pub trait MonitorLibrary {
    fn has_kind(&self, kind: MonitorKind) -> bool;
    /// tmaxfrac alias for a time-limit category such as `steady`.
    fn time_limit_alias(&self, category: &str) -> Option<&str>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceCatalog {
    pub devices: BTreeMap<String, DeviceInfo>,
}

impl DeviceCatalog {
    pub fn from_yaml(content: &str) -> Result<Self, LibraryError> {
        let catalog: DeviceCatalog = serde_yaml::from_str(content)?;
        tracing::debug!("Loaded device library with {} devices", catalog.devices.len());
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, LibraryError> {
        let content = read_yaml_source(path)?;
        Self::from_yaml(&content)
    }
}

impl DeviceLibrary for DeviceCatalog {
    fn device(&self, name: &str) -> Option<&DeviceInfo> {
        self.devices.get(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorCatalog {
    pub monitors: BTreeMap<String, MonitorInfo>,
    pub time_limit_mapping: BTreeMap<String, String>,
}

impl MonitorCatalog {
    pub fn from_yaml(content: &str) -> Result<Self, LibraryError> {
        let catalog: MonitorCatalog = serde_yaml::from_str(content)?;
        tracing::debug!(
            "Loaded monitor library with {} monitors, {} time-limit aliases",
            catalog.monitors.len(),
            catalog.time_limit_mapping.len()
        );
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, LibraryError> {
        let content = read_yaml_source(path)?;
        Self::from_yaml(&content)
    }
}

impl MonitorLibrary for MonitorCatalog {
    fn has_kind(&self, kind: MonitorKind) -> bool {
        self.monitors.contains_key(kind.as_str())
    }

    fn time_limit_alias(&self, category: &str) -> Option<&str> {
        self.time_limit_mapping.get(category).map(String::as_str)
    }
}
