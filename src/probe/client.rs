use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::{
    db::models::SensorReading,
    readings::{ReadParams, ReadingPayload, ReadingsPage},
};

/// What the service said about a submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Stored. Carries the server's Unix time.
    Accepted { server_timestamp: i64 },
    /// Rejected as a possible duplicate; nothing from the batch was stored.
    Duplicate,
}

#[derive(Debug, Deserialize)]
struct SubmitAck {
    current_timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct ReadBody {
    readings: Vec<SensorReading>,
    current_timestamp: i64,
}

/// HTTP client for the service's `POST /sense` and `GET /read`.
#[derive(Debug, Clone)]
pub struct ProbeClient {
    http: Client,
    sense_url: String,
    read_url: String,
}

impl ProbeClient {
    pub fn new(backend_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        let base = backend_url.trim_end_matches('/');
        Ok(Self {
            http,
            sense_url: format!("{base}/sense"),
            read_url: format!("{base}/read"),
        })
    }

    pub async fn submit(&self, readings: &[ReadingPayload]) -> Result<UploadOutcome> {
        debug!(url = %self.sense_url, count = readings.len(), "Submitting readings");

        let resp = self
            .http
            .post(&self.sense_url)
            .json(readings)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.sense_url))?;

        match resp.status() {
            StatusCode::OK => {
                let ack: SubmitAck = resp
                    .json()
                    .await
                    .context("failed to decode /sense response")?;
                Ok(UploadOutcome::Accepted {
                    server_timestamp: ack.current_timestamp,
                })
            }
            StatusCode::CONFLICT => Ok(UploadOutcome::Duplicate),
            status => {
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("POST {} returned {status}: {body}", self.sense_url)
            }
        }
    }

    /// Fetches readings that arrived in the window described by `params`.
    pub async fn read(&self, params: &ReadParams) -> Result<ReadingsPage> {
        debug!(url = %self.read_url, ?params, "Fetching readings");

        let resp = self
            .http
            .get(&self.read_url)
            .query(params)
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.read_url))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET {} returned {status}: {body}", self.read_url);
        }

        let body: ReadBody = resp
            .json()
            .await
            .context("failed to decode /read response")?;
        Ok(ReadingsPage {
            readings: body.readings,
            current_timestamp: body.current_timestamp,
        })
    }
}
