//! SQLite-backed daily cache.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use genflow_core::OwnerId;

use super::store::{CacheError, CacheRecord, DailyCacheStore};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// `daily_cache` table with one row per `(owner_id, generated_date)`.
#[derive(Debug, Clone)]
pub struct SqliteDailyCacheStore {
    pool: SqlitePool,
}

impl SqliteDailyCacheStore {
    /// Connect to `url` (e.g. `sqlite://cache.db`), creating file and table.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options: SqliteConnectOptions = url
            .parse::<SqliteConnectOptions>()
            .with_context(|| format!("invalid SQLite url {url:?}"))?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("failed to create SQLite pool for daily cache at {url:?}"))?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database, for tests.
    pub async fn in_memory() -> anyhow::Result<Self> {
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory SQLite daily cache")?;
        Self::from_pool(pool).await
    }

    /// `{app_data_dir}/genflow/daily_cache.db`.
    pub async fn open_default() -> anyhow::Result<Self> {
        let path = default_db_path().context("failed to determine daily cache DB path")?;
        Self::connect(&format!("sqlite://{}", path.to_string_lossy())).await
    }

    pub async fn from_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_cache (
                owner_id       TEXT NOT NULL,
                generated_date TEXT NOT NULL,
                payload        TEXT NOT NULL,
                created_at     TEXT NOT NULL,
                UNIQUE (owner_id, generated_date)
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create daily_cache table")?;

        Ok(Self { pool })
    }

    async fn fetch(&self, owner: OwnerId, day: NaiveDate) -> anyhow::Result<Option<CacheRecord>> {
        let row = sqlx::query(
            r#"
            SELECT payload, created_at
            FROM daily_cache
            WHERE owner_id = ?1 AND generated_date = ?2
            "#,
        )
        .bind(owner.to_string())
        .bind(day.format(DAY_FORMAT).to_string())
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch daily cache row")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: String = row.try_get("payload")?;
        let created_at: String = row.try_get("created_at")?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .context("invalid created_at timestamp in daily cache")?
            .with_timezone(&Utc);
        let payload =
            serde_json::from_str(&payload).context("failed to deserialize cached artifact")?;

        Ok(Some(CacheRecord {
            owner,
            generated_date: day,
            payload,
            created_at,
        }))
    }

    async fn store(&self, record: &CacheRecord) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&record.payload)
            .context("failed to serialize artifact for cache")?;

        sqlx::query(
            r#"
            INSERT INTO daily_cache (owner_id, generated_date, payload, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(owner_id, generated_date)
            DO UPDATE SET
                payload = excluded.payload,
                created_at = excluded.created_at
            "#,
        )
        .bind(record.owner.to_string())
        .bind(record.generated_date.format(DAY_FORMAT).to_string())
        .bind(&payload)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to upsert daily cache row")?;

        Ok(())
    }

    async fn remove(&self, owner: OwnerId, day: NaiveDate) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "DELETE FROM daily_cache WHERE owner_id = ?1 AND generated_date = ?2",
        )
        .bind(owner.to_string())
        .bind(day.format(DAY_FORMAT).to_string())
        .execute(&self.pool)
        .await
        .context("failed to delete daily cache row")?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of rows for `owner`, across all days.
    pub async fn count_for(&self, owner: OwnerId) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM daily_cache WHERE owner_id = ?1")
            .bind(owner.to_string())
            .fetch_one(&self.pool)
            .await
            .context("failed to count daily cache rows")?;
        Ok(row.try_get("n")?)
    }
}

#[async_trait::async_trait]
impl DailyCacheStore for SqliteDailyCacheStore {
    async fn get(&self, owner: OwnerId, day: NaiveDate) -> Result<Option<CacheRecord>, CacheError> {
        self.fetch(owner, day)
            .await
            .map_err(|err| CacheError::Read(format!("{err:#}")))
    }

    async fn upsert(&self, record: CacheRecord) -> Result<(), CacheError> {
        self.store(&record)
            .await
            .map_err(|err| CacheError::Write(format!("{err:#}")))
    }

    async fn delete(&self, owner: OwnerId, day: NaiveDate) -> Result<bool, CacheError> {
        self.remove(owner, day)
            .await
            .map_err(|err| CacheError::Invalidate(format!("{err:#}")))
    }
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let mut dir = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory")?;
    dir.push("genflow");

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create cache directory at {:?}", dir))?;

    dir.push("daily_cache.db");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use genflow_ai::{NormalizedArtifact, Step};

    fn record(owner: OwnerId, day: NaiveDate, headline: &str) -> CacheRecord {
        CacheRecord {
            owner,
            generated_date: day,
            payload: NormalizedArtifact::new(vec![Step::script(headline)]),
            created_at: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    #[tokio::test]
    async fn upsert_get_delete_round_trip() {
        let store = SqliteDailyCacheStore::in_memory().await.unwrap();
        let owner = OwnerId::new();

        assert!(store.get(owner, day(1)).await.unwrap().is_none());

        store.upsert(record(owner, day(1), "first")).await.unwrap();
        let fetched = store.get(owner, day(1)).await.unwrap().unwrap();
        assert_eq!(fetched.payload.headline(), Some("first"));
        assert_eq!(fetched.generated_date, day(1));

        assert!(store.delete(owner, day(1)).await.unwrap());
        assert!(!store.delete(owner, day(1)).await.unwrap());
        assert!(store.get(owner, day(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn same_owner_day_keeps_one_row_last_write_wins() {
        let store = SqliteDailyCacheStore::in_memory().await.unwrap();
        let owner = OwnerId::new();

        store.upsert(record(owner, day(2), "older")).await.unwrap();
        store.upsert(record(owner, day(2), "newer")).await.unwrap();
        store.upsert(record(owner, day(3), "tomorrow")).await.unwrap();

        assert_eq!(store.count_for(owner).await.unwrap(), 2);
        let fetched = store.get(owner, day(2)).await.unwrap().unwrap();
        assert_eq!(fetched.payload.headline(), Some("newer"));
    }

    #[tokio::test]
    async fn owners_do_not_see_each_other() {
        let store = SqliteDailyCacheStore::in_memory().await.unwrap();
        let alice = OwnerId::new();
        let bob = OwnerId::new();

        store.upsert(record(alice, day(4), "alice")).await.unwrap();
        assert!(store.get(bob, day(4)).await.unwrap().is_none());
        assert!(!store.delete(bob, day(4)).await.unwrap());
        assert_eq!(store.count_for(alice).await.unwrap(), 1);
    }
}
