// ⚙️ Pipeline configuration
// Everything has a default, so the binary runs with no config file at all.
// A TOML file may override any subset of fields.

use crate::error::PipelineError;
use crate::matcher::DEFAULT_TOLERANCE_METERS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Date formats tried, in order, for the address registration date.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum geodesic distance, in meters, between an address and its
    /// reference point for the pairing to count as close.
    pub tolerance_meters: f64,

    /// chrono format strings for the registration date column
    pub date_formats: Vec<String>,

    pub columns: AddressColumns,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            tolerance_meters: DEFAULT_TOLERANCE_METERS,
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
            columns: AddressColumns::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn with_tolerance(mut self, tolerance_meters: f64) -> Self {
        self.tolerance_meters = tolerance_meters;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.tolerance_meters.is_finite() || self.tolerance_meters < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "tolerance_meters must be a non-negative number, got {}",
                self.tolerance_meters
            )));
        }

        if self.date_formats.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "date_formats must list at least one format".to_string(),
            ));
        }

        Ok(())
    }
}

/// Header names of the required address-list columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressColumns {
    pub identifier: String,
    pub registration_date: String,
    pub latitude: String,
    pub longitude: String,
    pub location: String,
}

impl Default for AddressColumns {
    fn default() -> Self {
        AddressColumns {
            identifier: "urn".to_string(),
            registration_date: "Registration Date".to_string(),
            latitude: "Latitude".to_string(),
            longitude: "Longitude".to_string(),
            location: "Location".to_string(),
        }
    }
}
