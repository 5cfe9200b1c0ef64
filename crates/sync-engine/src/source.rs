use crate::{
    config::{MySqlConfig, SyncMode},
    error::ExtractError,
    retry::{RetryDisposition, RetryError, RetryPolicy},
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use model::{
    page::FetchPage,
    record::{FieldValue, SourceRecord},
    value::Value,
    watermark::Watermark,
};
use sqlx::{
    Row,
    mysql::{MySqlPool, MySqlPoolOptions, MySqlRow},
    types::BigDecimal,
};
use tracing::{debug, info};

/// Columns selected from the source table, in select-list order.
pub const SOURCE_COLUMNS: [&str; 10] = [
    "customer",
    "group_name",
    "entity",
    "job_id",
    "job_created",
    "quote",
    "quote_currency",
    "job_status",
    "gross_margin",
    "updated_at",
];

/// A lazy, finite, forward-only sequence of source pages. Not restartable
/// mid-stream: resuming means calling `fetch_page` again with the last
/// committed watermark.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_page(&self, cursor: &Watermark, limit: usize) -> Result<FetchPage, ExtractError>;
}

pub struct MySqlExtractor {
    pool: MySqlPool,
    mode: SyncMode,
    table: String,
    min_date: Option<NaiveDate>,
}

impl MySqlExtractor {
    /// Connects with a small bounded reconnect; anything past that is an
    /// `ExtractError` the orchestrator treats as fatal.
    pub async fn connect(
        config: &MySqlConfig,
        mode: SyncMode,
        min_date: Option<NaiveDate>,
    ) -> Result<Self, ExtractError> {
        let url = config.url();
        let retry = RetryPolicy::for_connect();

        let pool = retry
            .run(
                || {
                    let url = url.clone();
                    async move {
                        MySqlPoolOptions::new()
                            .max_connections(2)
                            .connect(&url)
                            .await
                    }
                },
                classify_connect_error,
            )
            .await
            .map_err(|e| match e {
                RetryError::Fatal(source) | RetryError::AttemptsExceeded(source) => {
                    ExtractError::Connect { source }
                }
            })?;

        info!(
            host = %config.host,
            database = %config.database,
            table = %config.table,
            "Connected to MySQL source"
        );

        Ok(Self {
            pool,
            mode,
            table: config.table.clone(),
            min_date,
        })
    }

    /// The page query for the configured mode. Both shapes use keyset
    /// pagination: the WHERE clause filters on the last-seen key instead of
    /// an offset, so per-page cost does not grow with table size.
    pub fn page_sql(mode: SyncMode, table: &str, with_min_date: bool) -> String {
        let select = format!("SELECT {} FROM {}", SOURCE_COLUMNS.join(", "), table);
        let min_date = if with_min_date {
            " AND job_created >= ?"
        } else {
            ""
        };

        match mode {
            SyncMode::Full => format!(
                "{select} WHERE job_id > ?{min_date} ORDER BY job_id LIMIT ?"
            ),
            SyncMode::Incremental => format!(
                "{select} WHERE (updated_at > ? OR (updated_at = ? AND job_id > ?)){min_date} \
                 ORDER BY updated_at, job_id LIMIT ?"
            ),
        }
    }
}

#[async_trait]
impl RecordSource for MySqlExtractor {
    async fn fetch_page(&self, cursor: &Watermark, limit: usize) -> Result<FetchPage, ExtractError> {
        let sql = Self::page_sql(self.mode, &self.table, self.min_date.is_some());
        let mut query = sqlx::query(&sql);

        match self.mode {
            SyncMode::Full => {
                let after = match cursor {
                    Watermark::Key { id } => *id,
                    _ => 0,
                };
                query = query.bind(after);
            }
            SyncMode::Incremental => {
                let (ts, id) = match cursor {
                    Watermark::Changed { ts_micros, id } => (micros_to_datetime(*ts_micros), *id),
                    _ => (NaiveDateTime::default(), 0),
                };
                query = query.bind(ts).bind(ts).bind(id);
            }
        }

        if let Some(min_date) = self.min_date {
            query = query.bind(min_date);
        }
        query = query.bind(limit as u64);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|source| ExtractError::Query {
                cursor: cursor.to_string(),
                source,
            })?;

        let records = rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;

        let reached_end = records.len() < limit;
        let next = records
            .last()
            .and_then(|rec| next_cursor(self.mode, rec))
            .unwrap_or(*cursor);

        debug!(rows = records.len(), next = %next, "Fetched source page");

        Ok(FetchPage {
            records,
            next,
            reached_end,
        })
    }
}

fn micros_to_datetime(ts_micros: i64) -> NaiveDateTime {
    chrono::DateTime::<chrono::Utc>::from_timestamp_micros(ts_micros)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

/// The source position a given record occupies in change order. Used for the
/// per-batch high-water mark.
pub fn record_watermark(record: &SourceRecord) -> Option<Watermark> {
    let ts = record.get("updated_at")?.as_datetime()?;
    let id = record.get("job_id")?.as_u64()?;
    Some(Watermark::changed(ts, id))
}

fn next_cursor(mode: SyncMode, record: &SourceRecord) -> Option<Watermark> {
    match mode {
        SyncMode::Full => {
            let id = record.get("job_id")?.as_u64()?;
            Some(Watermark::Key { id })
        }
        SyncMode::Incremental => record_watermark(record),
    }
}

fn decode_row(row: &MySqlRow) -> Result<SourceRecord, ExtractError> {
    fn col<'r, T>(row: &'r MySqlRow, name: &str) -> Result<T, ExtractError>
    where
        T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
    {
        row.try_get(name).map_err(|source| ExtractError::Decode {
            column: name.to_string(),
            source,
        })
    }

    fn opt_string(v: Option<String>) -> Value {
        v.map(Value::String).unwrap_or(Value::Null)
    }

    fn opt_decimal(v: Option<BigDecimal>) -> Value {
        v.map(Value::Decimal).unwrap_or(Value::Null)
    }

    fn opt_datetime(v: Option<NaiveDateTime>) -> Value {
        v.map(Value::DateTime).unwrap_or(Value::Null)
    }

    let fields = vec![
        FieldValue::new("customer", opt_string(col(row, "customer")?)),
        FieldValue::new("group_name", opt_string(col(row, "group_name")?)),
        FieldValue::new("entity", opt_string(col(row, "entity")?)),
        FieldValue::new("job_id", Value::Uint(col::<u64>(row, "job_id")?)),
        FieldValue::new("job_created", opt_datetime(col(row, "job_created")?)),
        FieldValue::new("quote", opt_decimal(col(row, "quote")?)),
        FieldValue::new("quote_currency", opt_string(col(row, "quote_currency")?)),
        FieldValue::new("job_status", opt_string(col(row, "job_status")?)),
        FieldValue::new("gross_margin", opt_decimal(col(row, "gross_margin")?)),
        FieldValue::new("updated_at", opt_datetime(col(row, "updated_at")?)),
    ];

    Ok(SourceRecord::new(fields))
}

fn classify_connect_error(err: &sqlx::Error) -> RetryDisposition {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_) => {
            RetryDisposition::Retry
        }
        _ => RetryDisposition::Stop,
    }
}
