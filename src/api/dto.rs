use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use crate::readings::{ReadParams, ReadingPayload};

use crate::db::models::SensorReading;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorReadingDto {
    pub sensor: String,
    pub unit: String,
    pub value: f64,
    pub recorded_timestamp: i64,
    pub received_timestamp: i64,
}

impl From<SensorReading> for SensorReadingDto {
    fn from(r: SensorReading) -> Self {
        Self {
            sensor: r.sensor,
            unit: r.unit,
            value: r.value,
            recorded_timestamp: r.recorded_timestamp,
            received_timestamp: r.received_timestamp,
        }
    }
}

/// Response for `POST /sense`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitResponse {
    /// Correlation id of the request.
    pub id: String,
    pub description: String,
    pub description_key: String,
    /// Server Unix time, for probes without a reliable clock.
    pub current_timestamp: i64,
}

/// Response for `GET /read`. Readings are ordered by `received_timestamp ASC`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadingsResponse {
    pub readings: Vec<SensorReadingDto>,
    pub current_timestamp: i64,
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Correlation id; matches the `X-Correlation-Id` header.
    pub id: String,
    pub description: String,
    pub description_key: String,
}
