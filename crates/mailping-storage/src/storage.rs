use crate::StorageError;
use async_trait::async_trait;
use chrono::Utc;
use mailping_core::Watermark;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

/// Durable checkpoint of the last processed UID and badge, keyed by account.
///
/// Only one process should write a given key; concurrent writers can lose
/// updates.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn load(&self, account: &str) -> Result<Option<Watermark>, StorageError>;

    async fn save(&self, account: &str, watermark: &Watermark) -> Result<(), StorageError>;
}

#[derive(Clone)]
pub struct SqliteWatermarkStore {
    pool: SqlitePool,
}

impl SqliteWatermarkStore {
    pub async fn connect(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Full)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!(path = %db_path.display(), "watermark store ready");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl WatermarkStore for SqliteWatermarkStore {
    async fn load(&self, account: &str) -> Result<Option<Watermark>, StorageError> {
        let row = sqlx::query("SELECT last_uid, badge FROM watermarks WHERE account = ?1")
            .bind(account)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let last_uid: i64 = row.try_get("last_uid")?;
        let badge: i64 = row.try_get("badge")?;
        Ok(Some(Watermark {
            last_uid: to_u32("last_uid", last_uid)?,
            badge: to_u32("badge", badge)?,
        }))
    }

    async fn save(&self, account: &str, watermark: &Watermark) -> Result<(), StorageError> {
        // last_uid never moves backwards, whatever the caller passes.
        sqlx::query(
            r#"
            INSERT INTO watermarks (account, last_uid, badge, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(account) DO UPDATE SET
              last_uid = MAX(watermarks.last_uid, excluded.last_uid),
              badge = excluded.badge,
              updated_at = excluded.updated_at
            "#,
        )
        .bind(account)
        .bind(i64::from(watermark.last_uid))
        .bind(i64::from(watermark.badge))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn to_u32(column: &str, value: i64) -> Result<u32, StorageError> {
    u32::try_from(value)
        .map_err(|_| StorageError::Data(format!("{column} out of range: {value}")))
}
