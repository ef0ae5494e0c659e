//! Probe side of the monitor: samples a `DeviceReader` and pushes readings to
//! `POST /sense`.
//!
//! Sampling and uploading run on independent intervals inside a single task,
//! so `ProbeState` is owned by the loop and needs no lock.

pub mod client;
pub mod reader;
pub mod stats;

use std::{
    collections::{BTreeMap, VecDeque},
    future::Future,
    slice,
    time::Duration,
};

use anyhow::Result;
use chrono::Utc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::readings::ReadingPayload;

use self::{
    client::{ProbeClient, UploadOutcome},
    reader::{DeviceReader, Measurement},
    stats::{Sample, SensorStats},
};

/// Clock drift the probe tolerates before adopting the server's time.
pub const DRIFT_TOLERANCE_SECS: i64 = 10;

// ---------------------------------------------------------------------------
// ProbeState
// ---------------------------------------------------------------------------

/// Everything shared between the sample and upload schedules.
#[derive(Debug, Clone)]
pub struct ProbeState {
    stats: BTreeMap<String, SensorStats>,
    pending: VecDeque<ReadingPayload>,
    max_pending: usize,
    dip_threshold: f64,
    /// Seconds added to the local clock to get server time.
    clock_offset: i64,
}

impl ProbeState {
    pub fn new(dip_threshold: f64, max_pending: usize) -> Self {
        Self {
            stats: BTreeMap::new(),
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
            dip_threshold,
            clock_offset: 0,
        }
    }

    /// Stamps `measurements` with the corrected clock, updates statistics and
    /// queues them for upload. Returns how many old readings were dropped to
    /// stay within `max_pending`.
    pub fn record(&mut self, measurements: Vec<Measurement>, local_now: i64) -> usize {
        let timestamp = local_now + self.clock_offset;
        let mut dropped = 0;

        for m in measurements {
            self.stats
                .entry(m.sensor.clone())
                .or_insert_with(|| SensorStats::new(self.dip_threshold))
                .record(Sample {
                    value: m.value,
                    timestamp,
                });

            if self.pending.len() == self.max_pending {
                self.pending.pop_front();
                dropped += 1;
            }
            self.pending.push_back(ReadingPayload {
                sensor: m.sensor,
                unit: m.unit,
                value: m.value,
                recorded_timestamp: timestamp,
            });
        }
        dropped
    }

    /// Snapshot of the readings waiting for upload, oldest first.
    pub fn batch(&self) -> Vec<ReadingPayload> {
        self.pending.iter().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drops the `n` oldest pending readings once the service has them.
    pub fn acknowledge(&mut self, n: usize) {
        let n = n.min(self.pending.len());
        self.pending.drain(..n);
    }

    /// Adopts the server clock when local time has drifted more than
    /// `DRIFT_TOLERANCE_SECS`. Returns the new offset if it changed.
    pub fn apply_server_time(&mut self, server_timestamp: i64, local_now: i64) -> Option<i64> {
        let drift = server_timestamp - (local_now + self.clock_offset);
        if drift.abs() <= DRIFT_TOLERANCE_SECS {
            return None;
        }
        self.clock_offset = server_timestamp - local_now;
        Some(self.clock_offset)
    }

    pub fn clock_offset(&self) -> i64 {
        self.clock_offset
    }

    pub fn stats(&self, sensor: &str) -> Option<&SensorStats> {
        self.stats.get(sensor)
    }
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

pub struct Probe<R> {
    reader: R,
    client: ProbeClient,
    state: ProbeState,
    sample_every: Duration,
    upload_every: Duration,
}

impl<R: DeviceReader> Probe<R> {
    pub fn new(
        reader: R,
        client: ProbeClient,
        state: ProbeState,
        sample_every: Duration,
        upload_every: Duration,
    ) -> Self {
        Self {
            reader,
            client,
            state,
            sample_every,
            upload_every,
        }
    }

    pub fn state(&self) -> &ProbeState {
        &self.state
    }

    /// Reads the device once and queues the result. Read errors are logged
    /// and the sample is skipped.
    pub fn sample(&mut self) {
        match self.reader.read() {
            Ok(measurements) => {
                let count = measurements.len();
                let dropped = self.state.record(measurements, local_now());
                if dropped > 0 {
                    warn!(dropped, "Pending queue full; dropped oldest readings");
                }
                debug!(count, pending = self.state.pending_len(), "Sampled device");
            }
            Err(e) => warn!(error = %e, "Failed to read device"),
        }
    }

    /// Uploads every pending reading.
    ///
    /// A rejected batch may mix readings the service already has with new
    /// ones, so on `Duplicate` each reading is resubmitted alone. Readings stay
    /// queued until the service has accepted them or reports them as
    /// duplicates.
    pub async fn upload(&mut self) -> Result<()> {
        let batch = self.state.batch();
        if batch.is_empty() {
            debug!("Nothing new to upload");
            return Ok(());
        }

        match self.client.submit(&batch).await? {
            UploadOutcome::Accepted { server_timestamp } => {
                self.state.acknowledge(batch.len());
                self.sync_clock(server_timestamp);
                info!(count = batch.len(), "Readings uploaded");
            }
            UploadOutcome::Duplicate if batch.len() == 1 => {
                self.state.acknowledge(1);
                info!("Reading already stored");
            }
            UploadOutcome::Duplicate => {
                info!(
                    count = batch.len(),
                    "Batch contains a stored reading; resubmitting individually"
                );
                let mut done = 0;
                let mut server_time = None;
                for reading in &batch {
                    match self.client.submit(slice::from_ref(reading)).await {
                        Ok(UploadOutcome::Accepted { server_timestamp }) => {
                            server_time = Some(server_timestamp);
                            done += 1;
                        }
                        Ok(UploadOutcome::Duplicate) => done += 1,
                        Err(e) => {
                            self.state.acknowledge(done);
                            return Err(e);
                        }
                    }
                }
                self.state.acknowledge(done);
                if let Some(ts) = server_time {
                    self.sync_clock(ts);
                }
            }
        }
        Ok(())
    }

    fn sync_clock(&mut self, server_timestamp: i64) {
        if let Some(offset) = self.state.apply_server_time(server_timestamp, local_now()) {
            warn!(offset, "Local clock drifted; adopting server time");
        }
    }

    /// Samples and uploads on their own intervals until `shutdown` resolves.
    /// Returns the final state.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> ProbeState {
        let mut sample_tick = time::interval(self.sample_every);
        let mut upload_tick = time::interval(self.upload_every);
        sample_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        upload_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            sample_secs = self.sample_every.as_secs_f64(),
            upload_secs = self.upload_every.as_secs_f64(),
            "Probe started"
        );

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,
                _ = sample_tick.tick() => self.sample(),
                _ = upload_tick.tick() => {
                    if let Err(e) = self.upload().await {
                        warn!(
                            error = %e,
                            pending = self.state.pending_len(),
                            "Upload failed; will retry"
                        );
                    }
                }
            }
        }

        info!(pending = self.state.pending_len(), "Probe stopped");
        self.state
    }
}

fn local_now() -> i64 {
    Utc::now().timestamp()
}
