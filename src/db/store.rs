use chrono::Utc;
use sqlx::PgPool;
use tracing::debug;

use crate::{
    db::models::{NewReading, SensorReading, Window},
    readings::ReadingError,
};

/// Postgres-backed store for `sensor_readings`.
///
/// Duplicate detection relies on the table's primary key: a batch is inserted
/// inside a single transaction and any unique violation rolls the whole batch
/// back.
#[derive(Debug, Clone)]
pub struct ReadingStore {
    pool: PgPool,
}

impl ReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts `readings` as one atomic batch stamped with the current time.
    /// Returns the `received_timestamp` given to every row of the batch.
    ///
    /// The stamp is taken once the transaction is open, so a batch that
    /// waited for a connection is not stamped earlier than batches that
    /// committed while it waited.
    pub async fn insert(&self, readings: &[NewReading]) -> Result<i64, ReadingError> {
        self.insert_batch(readings, || Utc::now().timestamp()).await
    }

    pub(crate) async fn insert_received_at(
        &self,
        readings: &[NewReading],
        received_timestamp: i64,
    ) -> Result<(), ReadingError> {
        self.insert_batch(readings, || received_timestamp).await?;
        Ok(())
    }

    async fn insert_batch(
        &self,
        readings: &[NewReading],
        stamp: impl FnOnce() -> i64,
    ) -> Result<i64, ReadingError> {
        if readings.is_empty() {
            return Err(ReadingError::Validation(
                "at least one reading is required".to_owned(),
            ));
        }

        // Dropping `tx` on an early return rolls the batch back.
        let mut tx = self.pool.begin().await?;
        let received_timestamp = stamp();

        for reading in readings {
            sqlx::query(
                r#"
                INSERT INTO sensor_readings
                    (sensor, recorded_timestamp, unit, value, received_timestamp)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&reading.sensor)
            .bind(reading.recorded_timestamp)
            .bind(&reading.unit)
            .bind(reading.value)
            .bind(received_timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            rows = readings.len(),
            received_timestamp, "Reading batch committed"
        );
        Ok(received_timestamp)
    }

    /// Readings that arrived within `(start, start + period]`, oldest arrival
    /// first, at most `limit` rows.
    pub async fn fetch(&self, window: Window) -> Result<Vec<SensorReading>, ReadingError> {
        let rows = sqlx::query_as::<_, SensorReading>(
            r#"
            SELECT sensor,
                   unit,
                   value,
                   recorded_timestamp,
                   received_timestamp
            FROM sensor_readings
            WHERE received_timestamp >  $1
              AND received_timestamp <= $2
            ORDER BY received_timestamp ASC, arrival_seq ASC
            LIMIT $3
            "#,
        )
        .bind(window.start)
        .bind(window.end())
        .bind(window.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
