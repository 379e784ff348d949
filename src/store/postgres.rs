use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{ReadingStore, WindowStats};
use crate::{
    db::models::{Reading, ReadingValue, SensorClass},
    error::{StoreError, StoreResult},
};

/// Numeric view of a row's value; flags count as 1.0 / 0.0.
const VALUE_EXPR: &str =
    "COALESCE(numeric_value, (CASE WHEN flag_value THEN 1.0 ELSE 0.0 END)::float8)";

/// Postgres-backed store: one table per sensor class.
///
/// Table names come from [`SensorClass::table_name`], never from user input.
#[derive(Debug, Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ReadingRow {
    id: Uuid,
    title: String,
    numeric_value: Option<f64>,
    flag_value: Option<bool>,
    recorded_at: DateTime<Utc>,
}

impl ReadingRow {
    fn into_reading(self, class: SensorClass) -> StoreResult<Reading> {
        let value = match (self.numeric_value, self.flag_value) {
            (Some(v), None) => ReadingValue::Numeric(v),
            (None, Some(v)) => ReadingValue::Flag(v),
            _ => {
                return Err(StoreError::Corrupt {
                    class,
                    reason: format!("row {} must carry exactly one value column", self.id),
                })
            }
        };

        Ok(Reading {
            id: self.id,
            sensor_class: class,
            title: self.title,
            value,
            timestamp: self.recorded_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct StatsRow {
    count: i64,
    min: Option<f64>,
    max: Option<f64>,
    sum: Option<f64>,
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn append(&self, reading: &Reading) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO {} (id, title, numeric_value, flag_value, recorded_at) \
             VALUES ($1, $2, $3, $4, $5)",
            reading.sensor_class.table_name()
        );

        sqlx::query(&sql)
            .bind(reading.id)
            .bind(&reading.title)
            .bind(reading.value.as_number())
            .bind(reading.value.as_bool())
            .bind(reading.timestamp)
            .execute(&self.pool)
            .await?;

        debug!(class = %reading.sensor_class, id = %reading.id, "Reading appended");
        Ok(())
    }

    async fn latest(&self, class: SensorClass) -> StoreResult<Option<Reading>> {
        let sql = format!(
            "SELECT id, title, numeric_value, flag_value, recorded_at \
             FROM {} ORDER BY recorded_at DESC, seq DESC LIMIT 1",
            class.table_name()
        );

        sqlx::query_as::<_, ReadingRow>(&sql)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.into_reading(class))
            .transpose()
    }

    async fn range(
        &self,
        class: SensorClass,
        since: DateTime<Utc>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Reading>> {
        // LIMIT NULL means no limit in Postgres.
        let sql = format!(
            "SELECT id, title, numeric_value, flag_value, recorded_at \
             FROM {} WHERE recorded_at >= $1 \
             ORDER BY recorded_at ASC, seq ASC LIMIT $2",
            class.table_name()
        );
        let limit = limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX));

        sqlx::query_as::<_, ReadingRow>(&sql)
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.into_reading(class))
            .collect()
    }

    async fn window_stats(
        &self,
        class: SensorClass,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<WindowStats>> {
        let sql = format!(
            "SELECT COUNT(*) AS count, MIN({VALUE_EXPR}) AS min, \
                    MAX({VALUE_EXPR}) AS max, SUM({VALUE_EXPR}) AS sum \
             FROM {} WHERE recorded_at >= $1",
            class.table_name()
        );

        let row = sqlx::query_as::<_, StatsRow>(&sql)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        Ok(match (row.min, row.max) {
            (Some(min), Some(max)) if row.count > 0 => Some(WindowStats {
                count: row.count as u64,
                min,
                max,
                sum: row.sum.unwrap_or(0.0),
            }),
            _ => None,
        })
    }

    async fn count(&self, class: SensorClass) -> StoreResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", class.table_name());
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn clear(&self, class: SensorClass) -> StoreResult<u64> {
        let sql = format!("DELETE FROM {}", class.table_name());
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
