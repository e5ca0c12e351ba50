//! Where parsed bookings, sync timestamps and telemetry end up.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::Mutex;
use tripsync_core::{BookingRecord, SyncTelemetry};
use tripsync_storage::ConfirmationHash;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("could not encode booking: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

impl SinkError {
    /// The sink itself is unreachable, as opposed to one bad row.
    pub fn is_systemic(&self) -> bool {
        match self {
            SinkError::Unavailable(_) | SinkError::Migrate(_) => true,
            SinkError::Database(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Configuration(_)
            ),
            SinkError::Encode(_) => false,
        }
    }
}

/// Persistence capability used by the sync engine.
///
/// `insert` must be idempotent per confirmation hash; the return value
/// reports whether a new booking was stored.
#[async_trait]
pub trait BookingSink: Send + Sync {
    async fn exists(&self, hash: &ConfirmationHash) -> Result<bool, SinkError>;

    async fn insert(
        &self,
        user_id: &str,
        hash: &ConfirmationHash,
        record: &BookingRecord,
    ) -> Result<bool, SinkError>;

    async fn last_sync_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, SinkError>;

    async fn set_last_sync_at(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), SinkError>;

    async fn append_telemetry(&self, telemetry: &SyncTelemetry) -> Result<(), SinkError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    bookings: BTreeMap<ConfirmationHash, (String, BookingRecord)>,
    last_sync: HashMap<String, DateTime<Utc>>,
    telemetry: Vec<SyncTelemetry>,
}

/// In-process sink for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBookingSink {
    state: Mutex<MemoryState>,
}

impl MemoryBookingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bookings(&self) -> Vec<BookingRecord> {
        let state = self.state.lock().await;
        state.bookings.values().map(|(_, r)| r.clone()).collect()
    }

    pub async fn telemetry(&self) -> Vec<SyncTelemetry> {
        self.state.lock().await.telemetry.clone()
    }
}

#[async_trait]
impl BookingSink for MemoryBookingSink {
    async fn exists(&self, hash: &ConfirmationHash) -> Result<bool, SinkError> {
        Ok(self.state.lock().await.bookings.contains_key(hash))
    }

    async fn insert(
        &self,
        user_id: &str,
        hash: &ConfirmationHash,
        record: &BookingRecord,
    ) -> Result<bool, SinkError> {
        let mut state = self.state.lock().await;
        if state.bookings.contains_key(hash) {
            return Ok(false);
        }
        state
            .bookings
            .insert(hash.clone(), (user_id.to_string(), record.clone()));
        Ok(true)
    }

    async fn last_sync_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, SinkError> {
        Ok(self.state.lock().await.last_sync.get(user_id).copied())
    }

    async fn set_last_sync_at(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), SinkError> {
        self.state
            .lock()
            .await
            .last_sync
            .insert(user_id.to_string(), at);
        Ok(())
    }

    async fn append_telemetry(&self, telemetry: &SyncTelemetry) -> Result<(), SinkError> {
        self.state.lock().await.telemetry.push(telemetry.clone());
        Ok(())
    }
}

/// Postgres sink. The `bookings.confirmation_hash` unique constraint is the
/// real at-most-once guarantee; `exists` is only a shortcut.
#[derive(Debug, Clone)]
pub struct PgBookingSink {
    pool: PgPool,
}

impl PgBookingSink {
    pub async fn connect(database_url: &str) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), SinkError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl BookingSink for PgBookingSink {
    async fn exists(&self, hash: &ConfirmationHash) -> Result<bool, SinkError> {
        let row = sqlx::query("SELECT 1 AS hit FROM bookings WHERE confirmation_hash = $1")
            .bind(hash.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert(
        &self,
        user_id: &str,
        hash: &ConfirmationHash,
        record: &BookingRecord,
    ) -> Result<bool, SinkError> {
        let record_json = serde_json::to_value(record)?;
        let result = sqlx::query(
            r#"
            INSERT INTO bookings (
                confirmation_hash, user_id, provider, booking_type, status,
                confirmation_number, title, start_date, end_date, total_price,
                currency, confidence, source_email_id, record_json
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (confirmation_hash) DO NOTHING
            "#,
        )
        .bind(hash.as_str())
        .bind(user_id)
        .bind(&record.provider)
        .bind(record.booking_type.as_str())
        .bind(record.status.as_str())
        .bind(record.confirmation_number.as_deref())
        .bind(&record.title)
        .bind(record.start_date)
        .bind(record.end_date)
        .bind(record.total_price)
        .bind(record.currency.as_deref())
        .bind(record.confidence())
        .bind(&record.source_email_id)
        .bind(record_json)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn last_sync_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, SinkError> {
        let row = sqlx::query("SELECT last_sync_at FROM sync_state WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("last_sync_at")?)),
            None => Ok(None),
        }
    }

    async fn set_last_sync_at(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), SinkError> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (user_id, last_sync_at)
            VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET last_sync_at = EXCLUDED.last_sync_at,
                          updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_telemetry(&self, telemetry: &SyncTelemetry) -> Result<(), SinkError> {
        sqlx::query(
            r#"
            INSERT INTO sync_telemetry (
                run_id, user_id, kind, phase, recorded_at, emails_fetched,
                emails_parsed, bookings_found, error_count, first_error, duration_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(telemetry.run_id)
        .bind(&telemetry.user_id)
        .bind(telemetry.kind.as_str())
        .bind(telemetry.phase.as_str())
        .bind(telemetry.recorded_at)
        .bind(telemetry.emails_fetched as i64)
        .bind(telemetry.emails_parsed as i64)
        .bind(telemetry.bookings_found as i64)
        .bind(telemetry.error_count as i64)
        .bind(telemetry.first_error.as_deref())
        .bind(telemetry.duration_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
