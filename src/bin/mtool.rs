//! Manual test tool for a running monitor service.
//!
//! Usage:
//!   cargo run --bin mtool -- send
//!   cargo run --bin mtool -- receive --url http://127.0.0.1:5000
//!
//! `send` posts one reading for sensor `TEST`. `receive` prints the readings
//! that arrived during the last hour, sorted by recorded time.

use std::env;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use push_monitor::{
    db::models::SensorReading,
    probe::client::{ProbeClient, UploadOutcome},
    readings::{ReadParams, ReadingPayload},
};

const DEFAULT_URL: &str = "http://127.0.0.1:5000";
const RECEIVE_PERIOD_SECS: i64 = 60 * 60;
const RECEIVE_LIMIT: i64 = 100;

#[derive(Debug, Serialize)]
struct Listed {
    #[serde(flatten)]
    reading: SensorReading,
    recorded_time: String,
    received_time: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let url = args
        .windows(2)
        .find(|w| w[0] == "--url")
        .map_or(DEFAULT_URL, |w| w[1].as_str());
    let client = ProbeClient::new(url)?;

    match args.first().map(String::as_str) {
        Some("send") => send(&client).await,
        Some("receive") => receive(&client).await,
        _ => bail!("usage: mtool <send|receive> [--url <base url>]"),
    }
}

async fn send(client: &ProbeClient) -> Result<()> {
    let reading = ReadingPayload {
        sensor: "TEST".to_owned(),
        unit: "C".to_owned(),
        value: 20.1,
        recorded_timestamp: Utc::now().timestamp(),
    };
    println!("{}", serde_json::to_string(&reading)?);

    match client.submit(std::slice::from_ref(&reading)).await? {
        UploadOutcome::Accepted { server_timestamp } => {
            println!("accepted, server time {server_timestamp}")
        }
        UploadOutcome::Duplicate => println!("rejected as a possible duplicate"),
    }
    Ok(())
}

async fn receive(client: &ProbeClient) -> Result<()> {
    let params = ReadParams {
        start_timestamp: Some(Utc::now().timestamp() - RECEIVE_PERIOD_SECS),
        period: Some(RECEIVE_PERIOD_SECS),
        limit: Some(RECEIVE_LIMIT),
    };
    let page = client.read(&params).await?;

    let mut listed = page
        .readings
        .into_iter()
        .map(|reading| {
            Ok(Listed {
                recorded_time: iso(reading.recorded_timestamp)?,
                received_time: iso(reading.received_timestamp)?,
                reading,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    listed.sort_by_key(|l| l.reading.recorded_timestamp);

    println!("readings={}", serde_json::to_string_pretty(&listed)?);
    Ok(())
}

fn iso(timestamp: i64) -> Result<String> {
    let utc = DateTime::<Utc>::from_timestamp(timestamp, 0)
        .with_context(|| format!("timestamp {timestamp} is out of range"))?;
    Ok(utc.with_timezone(&Local).to_rfc3339())
}
