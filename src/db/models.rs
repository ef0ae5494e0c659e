use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored reading, as returned by `ReadingStore::fetch`.
///
/// `(sensor, recorded_timestamp)` is the primary key of `sensor_readings`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor: String,
    pub unit: String,
    pub value: f64,
    /// Unix seconds, as reported by the probe.
    pub recorded_timestamp: i64,
    /// Unix seconds, stamped by the server at insert time.
    pub received_timestamp: i64,
}

/// A validated reading waiting to be inserted. Carries no
/// `received_timestamp`; the store assigns it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub sensor: String,
    pub unit: String,
    pub value: f64,
    pub recorded_timestamp: i64,
}

/// Arrival-time window `(start, start + period]`, capped at `limit` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub period: i64,
    pub limit: i64,
}

impl Window {
    /// Inclusive upper bound of the window.
    pub fn end(&self) -> i64 {
        self.start.saturating_add(self.period)
    }
}
