use std::{fs, path::PathBuf};

use anyhow::{Context, Result};

/// An untimestamped measurement produced by a `DeviceReader`.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub sensor: String,
    pub unit: String,
    pub value: f64,
}

/// A source of measurements sampled by the probe loop.
pub trait DeviceReader {
    fn read(&mut self) -> Result<Vec<Measurement>>;
}

/// Reads a Linux thermal zone, which reports millidegrees Celsius.
#[derive(Debug, Clone)]
pub struct ThermalZoneReader {
    path: PathBuf,
    sensor: String,
}

impl ThermalZoneReader {
    pub fn new(path: impl Into<PathBuf>, sensor: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sensor: sensor.into(),
        }
    }
}

impl DeviceReader for ThermalZoneReader {
    fn read(&mut self) -> Result<Vec<Measurement>> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let millis: i64 = raw
            .trim()
            .parse()
            .with_context(|| format!("unexpected thermal zone value: {raw:?}"))?;

        Ok(vec![Measurement {
            sensor: format!("{}_temp", self.sensor),
            unit: "C".to_owned(),
            value: millis as f64 / 1000.0,
        }])
    }
}
