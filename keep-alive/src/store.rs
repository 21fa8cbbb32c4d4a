use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Primary key of the one row this service maintains.
pub const SENTINEL_ID: i64 = 1;

/// Value written to the diagnostic column when the row is first created.
pub const READABLE_MARKER: &str = "Yes";

/// A row of the sentinel table as returned by the database.
///
/// Columns beyond the ones this service writes are kept in `extra` so the
/// response echoes the row exactly as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentinelRecord {
    pub id: i64,
    #[serde(rename = "Able to read DB", default)]
    pub able_to_read_db: Option<String>,
    #[serde(default)]
    pub last_ping: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Row written by the insert fallback.
#[derive(Debug, Clone, Serialize)]
pub struct NewSentinel {
    pub id: i64,
    #[serde(rename = "Able to read DB")]
    pub able_to_read_db: String,
    pub last_ping: String,
}

impl NewSentinel {
    pub fn at(last_ping: &str) -> Self {
        NewSentinel {
            id: SENTINEL_ID,
            able_to_read_db: READABLE_MARKER.to_string(),
            last_ping: last_ping.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write matched no row where exactly one was expected.
    #[error("no sentinel row matched")]
    NotFound,

    /// The database rejected the statement.
    #[error("{message}")]
    Database {
        code: Option<String>,
        message: String,
    },

    /// The database could not be reached or its reply could not be read.
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait SentinelStore: Send + Sync {
    /// Sets `last_ping` of row `id` to `at` and returns the updated row.
    async fn touch(&self, id: i64, at: &str) -> Result<SentinelRecord, StoreError>;

    /// Inserts `row` and returns it as stored.
    async fn create(&self, row: &NewSentinel) -> Result<SentinelRecord, StoreError>;
}
