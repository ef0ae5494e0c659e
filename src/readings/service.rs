use chrono::Utc;
use tracing::{debug, info};

use super::{ReadParams, ReadingError, ReadingPayload};
use crate::db::{
    models::{NewReading, SensorReading, Window},
    store::ReadingStore,
};

/// Defaults and caps applied to `GET /read` parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryDefaults {
    pub period: i64,
    pub limit: i64,
    pub max_limit: i64,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            period: 600,
            limit: 100,
            max_limit: 1000,
        }
    }
}

/// Result of a windowed query.
#[derive(Debug)]
pub struct ReadingsPage {
    pub readings: Vec<SensorReading>,
    pub current_timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct ReadingService {
    store: ReadingStore,
    defaults: QueryDefaults,
}

impl ReadingService {
    pub fn new(store: ReadingStore, defaults: QueryDefaults) -> Self {
        Self { store, defaults }
    }

    /// Validates and stores a batch of probe readings.
    ///
    /// Returns the server's current Unix time so probes without a reliable
    /// clock can correct themselves.
    pub async fn submit(&self, payloads: Vec<ReadingPayload>) -> Result<i64, ReadingError> {
        let readings = validate(payloads)?;
        let received = self.store.insert(&readings).await?;

        info!(
            rows = readings.len(),
            received_timestamp = received,
            "Readings stored"
        );
        Ok(Utc::now().timestamp())
    }

    /// Fetches the readings that arrived inside the requested window.
    pub async fn query(&self, params: ReadParams) -> Result<ReadingsPage, ReadingError> {
        let window = window(&self.defaults, &params, Utc::now().timestamp())?;
        let readings = self.store.fetch(window).await?;

        debug!(
            start = window.start,
            period = window.period,
            limit = window.limit,
            rows = readings.len(),
            "Readings fetched"
        );
        Ok(ReadingsPage {
            readings,
            current_timestamp: Utc::now().timestamp(),
        })
    }
}

/// Resolves request parameters against `defaults`.
///
/// Without `start_timestamp` the window covers the last `period` seconds up to
/// `now`.
fn window(defaults: &QueryDefaults, params: &ReadParams, now: i64) -> Result<Window, ReadingError> {
    let period = params.period.unwrap_or(defaults.period);
    if period < 0 {
        return Err(ReadingError::Validation(format!(
            "period must not be negative, got {period}"
        )));
    }

    let limit = params.limit.unwrap_or(defaults.limit);
    if limit < 0 {
        return Err(ReadingError::Validation(format!(
            "limit must not be negative, got {limit}"
        )));
    }

    let start = params
        .start_timestamp
        .unwrap_or_else(|| now.saturating_sub(period));

    Ok(Window {
        start,
        period,
        limit: limit.min(defaults.max_limit),
    })
}

fn validate(payloads: Vec<ReadingPayload>) -> Result<Vec<NewReading>, ReadingError> {
    if payloads.is_empty() {
        return Err(ReadingError::Validation(
            "at least one reading is required".to_owned(),
        ));
    }

    payloads
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            if p.sensor.trim().is_empty() {
                return Err(ReadingError::Validation(format!(
                    "reading {i}: sensor must not be empty"
                )));
            }
            if !p.value.is_finite() {
                return Err(ReadingError::Validation(format!(
                    "reading {i}: value must be a finite number"
                )));
            }
            Ok(NewReading {
                sensor: p.sensor,
                unit: p.unit,
                value: p.value,
                recorded_timestamp: p.recorded_timestamp,
            })
        })
        .collect()
}
