//! Data origins: the live database backing a table, and the bus topic
//! names derived from it. Grounded in `microdb/dataorigin.go`, but the
//! lazily-cached single connection there becomes an explicit `OriginHandle`
//! dialed with a bounded retry budget instead of an unbounded retry loop.

use std::sync::Arc;
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{FabricError, Result};
use crate::schema::Schema;

/// Which database engine a data origin is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOriginType {
    Mysql,
    Sqlite3,
}

/// Everything needed to dial a data origin's live database.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct ConnectionCfg {
    #[serde(rename = "type")]
    pub origin_type: DataOriginType,
    pub dsn: String,
}

/// A live connection to a data origin, dialed on first use.
#[derive(Clone)]
pub enum OriginHandle {
    Mysql(mysql_async::Pool),
    Sqlite3(Arc<Mutex<rusqlite::Connection>>),
}

/// A table's live database plus the schema describing it. Replaces the
/// process-wide `dataOrigins` global of the original implementation.
pub struct DataOrigin {
    pub schema: Schema,
    pub connection: ConnectionCfg,
    handle: Mutex<Option<OriginHandle>>,
}

impl DataOrigin {
    pub fn new(schema: Schema, connection: ConnectionCfg) -> Self {
        DataOrigin {
            schema,
            connection,
            handle: Mutex::new(None),
        }
    }

    /// Returns the origin's live connection, dialing it on first call and
    /// caching the result for subsequent calls. Dialing retries with
    /// exponential backoff (500ms initial, 5s cap, 60s total budget)
    /// before giving up.
    pub async fn get_db(&self) -> Result<OriginHandle> {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.as_ref() {
            return Ok(handle.clone());
        }

        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..ExponentialBackoff::default()
        };

        let handle = retry(backoff, || async {
            self.dial().await.map_err(|e| {
                warn!(table = %self.schema.table, error = %e, "retrying data origin dial");
                backoff::Error::transient(e)
            })
        })
        .await
        .map_err(|e| FabricError::OriginDial(e.to_string()))?;

        *guard = Some(handle.clone());
        Ok(handle)
    }

    async fn dial(&self) -> Result<OriginHandle> {
        match self.connection.origin_type {
            DataOriginType::Mysql => {
                let pool = mysql_async::Pool::new(self.connection.dsn.as_str());
                pool.get_conn()
                    .await
                    .map_err(|e| FabricError::OriginDial(e.to_string()))?;
                Ok(OriginHandle::Mysql(pool))
            }
            DataOriginType::Sqlite3 => {
                let conn = rusqlite::Connection::open(&self.connection.dsn)
                    .map_err(|e| FabricError::OriginDial(e.to_string()))?;
                Ok(OriginHandle::Sqlite3(Arc::new(Mutex::new(conn))))
            }
        }
    }

    /// NATS subject a publisher emits row updates to for this table.
    pub fn read_topic(&self) -> String {
        format!("{}_table", self.schema.table)
    }

    /// NATS subject a client sends write statements to for this table.
    pub fn write_topic(&self) -> String {
        format!("{}_write", self.schema.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names_match_table() {
        let schema = Schema::new("users", "ddl", "ddl", "insert");
        let origin = DataOrigin::new(
            schema,
            ConnectionCfg {
                origin_type: DataOriginType::Sqlite3,
                dsn: ":memory:".to_string(),
            },
        );
        assert_eq!(origin.read_topic(), "users_table");
        assert_eq!(origin.write_topic(), "users_write");
    }

    #[tokio::test]
    async fn sqlite_dial_succeeds_and_caches() {
        let schema = Schema::new("users", "ddl", "ddl", "insert");
        let origin = DataOrigin::new(
            schema,
            ConnectionCfg {
                origin_type: DataOriginType::Sqlite3,
                dsn: ":memory:".to_string(),
            },
        );
        let first = origin.get_db().await.unwrap();
        let second = origin.get_db().await.unwrap();
        assert!(matches!(first, OriginHandle::Sqlite3(_)));
        assert!(matches!(second, OriginHandle::Sqlite3(_)));
    }
}
