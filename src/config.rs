use std::str::FromStr;

use anyhow::{Context, Result};

use crate::readings::QueryDefaults;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Service configuration. `DATABASE_URL` selects the instance, so test and
/// production databases are chosen purely by environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Defaults and cap for `GET /read`.
    pub query: QueryDefaults,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let query = QueryDefaults {
            period: parsed(&lookup, "READ_DEFAULT_PERIOD_SECS", 600)?,
            limit: parsed(&lookup, "READ_DEFAULT_LIMIT", 100)?,
            max_limit: parsed(&lookup, "READ_MAX_LIMIT", 1000)?,
        };
        if query.period < 0 || query.limit < 0 || query.max_limit < 0 {
            anyhow::bail!("READ_* settings must not be negative");
        }

        Ok(Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            server_host: optional(&lookup, "SERVER_HOST", "0.0.0.0"),
            server_port: parsed(&lookup, "SERVER_PORT", 5000)?,
            query,
        })
    }
}

// ---------------------------------------------------------------------------
// ProbeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Base URL of the monitor service, e.g. `http://monitor.local:5000`.
    pub backend_url: String,
    pub sensor_id: String,
    /// Linux thermal-zone file reporting millidegrees Celsius.
    pub thermal_zone: String,
    pub sample_secs: u64,
    pub upload_secs: u64,
    /// Temperature below which a falling reading is recorded as a dip.
    pub dip_threshold: f64,
    /// Readings kept for upload before the oldest are dropped.
    pub max_pending: usize,
}

impl ProbeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self {
            backend_url: required(&lookup, "PROBE_BACKEND_URL")?
                .trim_end_matches('/')
                .to_owned(),
            sensor_id: optional(&lookup, "PROBE_SENSOR_ID", "probe"),
            thermal_zone: optional(
                &lookup,
                "PROBE_THERMAL_ZONE",
                "/sys/class/thermal/thermal_zone0/temp",
            ),
            sample_secs: parsed(&lookup, "PROBE_SAMPLE_SECS", 294)?,
            upload_secs: parsed(&lookup, "PROBE_UPLOAD_SECS", 300)?,
            dip_threshold: parsed(&lookup, "PROBE_DIP_THRESHOLD", 5.0)?,
            max_pending: parsed(&lookup, "PROBE_MAX_PENDING", 1000)?,
        };
        if config.sample_secs == 0 || config.upload_secs == 0 {
            anyhow::bail!("PROBE_SAMPLE_SECS and PROBE_UPLOAD_SECS must be positive");
        }
        Ok(config)
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_owned())
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
