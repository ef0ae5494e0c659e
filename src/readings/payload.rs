use serde::{de, Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// One reading as submitted by a probe to `POST /sense`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReadingPayload {
    pub sensor: String,
    /// Free-form unit label, e.g. `"C"`, `"%"`, `"lux"`, `"kPa"`.
    pub unit: String,
    pub value: f64,
    /// Unix seconds at which the probe took the measurement. Whole-number
    /// floats such as `1000.0` are accepted.
    #[serde(deserialize_with = "integer_like")]
    #[schema(value_type = i64)]
    pub recorded_timestamp: i64,
}

/// Query parameters for `GET /read`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

/// Accepts a JSON integer, or a float with no fractional part that fits in `i64`.
fn integer_like<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let n = serde_json::Number::deserialize(deserializer)?;
    if let Some(i) = n.as_i64() {
        return Ok(i);
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => Ok(f as i64),
        _ => Err(de::Error::custom(format!(
            "expected an integer timestamp, got {n}"
        ))),
    }
}
