//! Result storage with upsert-by-key semantics.

use crate::connection;
use crate::error::{DatabaseError, Result};
use crate::migrations;
use crate::sink::ResultSink;
use sqlx::{Any, AnyPool, Executor, Row};
use std::sync::OnceLock;
use wosync_core::{DatabaseConfig, FieldMap, ItemKind, ScrapeResult};

/// Table and primary-key column for each record kind.
fn table(kind: ItemKind) -> (&'static str, &'static str) {
    match kind {
        ItemKind::Request => ("work_requests", "request_id"),
        ItemKind::Order => ("work_orders", "order_number"),
    }
}

fn build_upsert(kind: ItemKind) -> String {
    let (table, key) = table(kind);

    let mut columns = vec![key, "found"];
    columns.extend_from_slice(kind.field_names());
    columns.push("scraped_at");

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    let updates: Vec<String> = columns
        .iter()
        .skip(1)
        .map(|column| format!("{column} = EXCLUDED.{column}"))
        .collect();

    format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT ({key}) DO UPDATE SET {}",
        columns.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    )
}

/// Upsert statement for `kind`, built once.
fn upsert_sql(kind: ItemKind) -> &'static str {
    static REQUEST: OnceLock<String> = OnceLock::new();
    static ORDER: OnceLock<String> = OnceLock::new();

    match kind {
        ItemKind::Request => REQUEST.get_or_init(|| build_upsert(kind)),
        ItemKind::Order => ORDER.get_or_init(|| build_upsert(kind)),
    }
}

async fn upsert<'e, E>(executor: E, result: &ScrapeResult) -> Result<()>
where
    E: Executor<'e, Database = Any>,
{
    let mut query = sqlx::query(upsert_sql(result.kind))
        .bind(result.item_id.clone())
        .bind(i32::from(result.found));

    for name in result.kind.field_names() {
        query = query.bind(result.fields.get(*name).cloned().flatten());
    }

    query
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(executor)
        .await?;
    Ok(())
}

/// Result store backed by one exclusive database connection.
///
/// Each worker process opens its own store; stores never cross process
/// boundaries.
#[derive(Debug)]
pub struct ResultStore {
    pool: AnyPool,
}

impl ResultStore {
    /// Connect with the configured parameters and apply pending migrations.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the parameters are invalid, the database is
    /// unreachable, or migrations fail.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = connection::connection_url(config)?;
        Self::connect_url(&url).await
    }

    /// Connect to an explicit URL and apply pending migrations.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the database is unreachable or migrations fail.
    pub async fn connect_url(url: &str) -> Result<Self> {
        let pool = connection::connect(url).await?;
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Read back the stored result for an item.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the query fails or a column cannot be decoded.
    pub async fn fetch(&self, kind: ItemKind, item_id: &str) -> Result<Option<ScrapeResult>> {
        let (table, key) = table(kind);
        let sql = format!("SELECT * FROM {table} WHERE {key} = $1");

        let Some(row) = sqlx::query(&sql)
            .bind(item_id.to_string())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let decode = |e: sqlx::Error| DatabaseError::Decode(e.to_string());
        // Stored as an integer: the `Any` driver cannot decode SQLite booleans.
        let found = row.try_get::<i64, _>("found").map_err(decode)? != 0;

        let mut fields = FieldMap::new();
        for name in kind.field_names() {
            let value: Option<String> = row.try_get(*name).map_err(decode)?;
            fields.insert((*name).to_string(), value);
        }

        Ok(Some(ScrapeResult {
            item_id: item_id.to_string(),
            kind,
            fields,
            found,
        }))
    }

    /// Number of stored rows of `kind`.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the query fails.
    pub async fn count(&self, kind: ItemKind) -> Result<i64> {
        let (table, _) = table(kind);
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Close the connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::debug!("Result database connection closed");
    }
}

#[async_trait::async_trait]
impl ResultSink for ResultStore {
    async fn write(&self, result: &ScrapeResult) -> Result<()> {
        upsert(&self.pool, result).await?;
        tracing::debug!(item = %result.item_id, found = result.found, "Result stored");
        Ok(())
    }

    async fn write_batch(&self, results: &[ScrapeResult]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for result in results {
            upsert(&mut *tx, result).await?;
        }
        tx.commit().await?;
        tracing::debug!("Stored batch of {} results", results.len());
        Ok(())
    }
}
