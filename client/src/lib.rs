//! The MicroDB client runtime: a local SQLite replica kept current over
//! one durable read-topic subscription per table, plus a write path that
//! forwards statements to the table's querier. Grounded in
//! `client/client.go`'s `Client`.

pub mod conn;
pub mod driver;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mysql_async::prelude::*;
use prost::Message as _;
use rusqlite::Connection as SqliteConnection;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

use fabric::bus::MessageBus;
use fabric::dataorigin::OriginHandle;
use fabric::error::{FabricError, Result};
use fabric::query::{self, DestinationType, QueryType};
use fabric::registry::Registry;
use fabric::value::{self, Value};
use fabric::wire;

/// The local in-memory SQLite DSN MicroDB clients share across connections
/// in the same process, matching `file::memory:?cache=shared&...` in the
/// original implementation.
pub const LOCAL_DSN: &str =
    "file::memory:?cache=shared&mode=memory&_journal=memory&_cache_size=-64000";

const ERROR_CHANNEL_CAPACITY: usize = 64;
const WRITE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A failure applying a replicated row update, surfaced by
/// [`conn::subscribe_table`]'s handler.
#[derive(Debug)]
pub struct ReplicaError {
    pub table: String,
    pub error: FabricError,
}

/// A live MicroDB client: a local replica kept in sync for a fixed set of
/// tables, and a path to forward writes to their origins.
pub struct Client {
    bus: Arc<dyn MessageBus>,
    registry: Arc<Registry>,
    local: Arc<Mutex<SqliteConnection>>,
    tables: HashMap<String, JoinHandle<()>>,
    closed: Arc<std::sync::atomic::AtomicBool>,
    supervisor: JoinHandle<()>,
}

impl Client {
    /// Connects to `tables`' read topics and starts replicating them into
    /// a fresh local replica.
    pub async fn connect(
        bus: Arc<dyn MessageBus>,
        registry: Arc<Registry>,
        client_id: &str,
        tables: &[String],
    ) -> Result<Client> {
        let local = Arc::new(Mutex::new(
            SqliteConnection::open_with_flags(
                LOCAL_DSN,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI,
            )
            .map_err(|e| FabricError::LocalDb(e.to_string()))?,
        ));

        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let supervisor = spawn_supervisor(error_rx, closed.clone());

        let mut handles = HashMap::new();
        for table in tables {
            let origin = registry.origin(table)?;
            let handle = conn::subscribe_table(
                local.clone(),
                bus.clone(),
                origin,
                client_id.to_string(),
                error_tx.clone(),
            )
            .await?;
            handles.insert(table.clone(), handle);
        }

        Ok(Client {
            bus,
            registry,
            local,
            tables: handles,
            closed,
            supervisor,
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(FabricError::ReplicaChannelOverflow);
        }
        Ok(())
    }

    /// Reports healthy iff the underlying bus connection is in the
    /// `CONNECTED` state.
    pub fn ping(&self) -> Result<()> {
        self.check_open()?;
        if self.bus.is_connected() {
            Ok(())
        } else {
            Err(FabricError::BusDial("connection not in CONNECTED state".to_string()))
        }
    }

    /// Executes a query that returns rows, routed to the local replica
    /// when every table it needs is being replicated, or to the origin
    /// database otherwise.
    pub async fn query(&self, sql: &str) -> Result<Vec<Vec<Value>>> {
        self.check_open()?;
        let mut stmt = query::parse(sql)?;
        if stmt.query_type() != QueryType::Select {
            return Err(FabricError::UnsupportedQueryType(
                "query() only accepts SELECT statements".to_string(),
            ));
        }

        if self.has_all_tables(stmt.required_tables()) {
            stmt.on_local();
        } else {
            stmt.on_origin();
        }

        match stmt.destination_type() {
            DestinationType::Local => self.query_local(stmt.sql()).await,
            DestinationType::Origin => {
                let table = stmt.destination_table().ok_or_else(|| {
                    FabricError::Internal("origin query missing destination table".to_string())
                })?;
                self.query_origin(table, stmt.sql()).await
            }
        }
    }

    /// Executes a query that does not return rows (INSERT/UPDATE),
    /// forwarding it to the destination table's querier and waiting for
    /// the outcome.
    pub async fn execute(&self, sql: &str, args: &[Value]) -> Result<wire::DriverResult> {
        self.check_open()?;
        let stmt = query::parse(sql)?;
        if stmt.query_type() == QueryType::Select {
            return Err(FabricError::UnsupportedQueryType(
                "execute() does not accept SELECT statements, use query()".to_string(),
            ));
        }

        let table = stmt.destination_table().ok_or_else(|| {
            FabricError::Internal("write statement missing destination table".to_string())
        })?;
        let origin = self.registry.origin(table)?;

        let request = wire::QueryRequest {
            query: stmt.sql().to_string(),
            args: value::marshal_values(args),
        };

        let reply_bytes = self
            .bus
            .request(
                &origin.write_topic(),
                request.encode_to_vec(),
                WRITE_REQUEST_TIMEOUT,
            )
            .await?;
        let reply = wire::WriteQueryReply::decode(reply_bytes.as_slice())?;

        if !reply.ok {
            return Err(FabricError::OriginQuery(reply.msg));
        }

        reply
            .result
            .ok_or_else(|| FabricError::Internal("querier reply missing result".to_string()))
    }

    /// Unsubscribes every table and stops replication. The local replica
    /// is dropped with the client.
    pub async fn close(self) -> Result<()> {
        self.supervisor.abort();
        for (_, handle) in self.tables {
            handle.abort();
        }
        Ok(())
    }

    fn has_all_tables(&self, required: &[String]) -> bool {
        required.iter().all(|t| self.tables.contains_key(t))
    }

    async fn query_local(&self, sql: &str) -> Result<Vec<Vec<Value>>> {
        let conn = self.local.lock().await;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| FabricError::LocalDb(e.to_string()))?;
        let column_count = stmt.column_count();

        let rows = stmt
            .query_map([], |row| {
                (0..column_count)
                    .map(|i| row.get::<_, rusqlite::types::Value>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(|e| FabricError::LocalDb(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let row = row.map_err(|e| FabricError::LocalDb(e.to_string()))?;
            out.push(row.iter().map(from_sqlite_value).collect());
        }
        Ok(out)
    }

    async fn query_origin(&self, table: &str, sql: &str) -> Result<Vec<Vec<Value>>> {
        let origin = self.registry.origin(table)?;
        let handle = origin.get_db().await?;
        let OriginHandle::Mysql(pool) = handle else {
            return Err(FabricError::Internal(
                "origin fallback query only supports mysql origins".to_string(),
            ));
        };

        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| FabricError::OriginDial(e.to_string()))?;
        let rows: Vec<mysql_async::Row> = conn
            .query(sql)
            .await
            .map_err(|e| FabricError::OriginQuery(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| fabric::value::from_mysql(row.as_ref(i)))
                    .collect()
            })
            .collect())
    }
}

fn spawn_supervisor(
    mut errors: mpsc::Receiver<ReplicaError>,
    closed: Arc<std::sync::atomic::AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(err) = errors.recv().await {
            warn!(table = %err.table, error = %err.error, "client replication error");
        }
        closed.store(true, std::sync::atomic::Ordering::SeqCst);
    })
}

fn from_sqlite_value(v: &rusqlite::types::Value) -> Value {
    match v {
        rusqlite::types::Value::Null => Value::Null,
        rusqlite::types::Value::Integer(i) => Value::Integer(*i),
        rusqlite::types::Value::Real(r) => Value::Decimal(*r as f32),
        rusqlite::types::Value::Text(s) => Value::Varchar(s.clone()),
        rusqlite::types::Value::Blob(b) => {
            Value::Varchar(String::from_utf8_lossy(b).to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric::bus::in_memory::InMemoryBus;
    use fabric::dataorigin::{ConnectionCfg, DataOriginType};
    use fabric::schema::Schema;

    fn test_registry() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry.add_origin(
            Schema::new(
                "users",
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)",
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)",
                "INSERT OR REPLACE INTO users (id, name) VALUES (?1, ?2)",
            ),
            ConnectionCfg {
                origin_type: DataOriginType::Sqlite3,
                dsn: ":memory:".to_string(),
            },
        );
        Arc::new(registry)
    }

    #[tokio::test]
    async fn connect_creates_local_table_and_replicates_row() {
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::default());
        let registry = test_registry();
        let origin = registry.origin("users").unwrap();

        let update = wire::RowUpdate {
            row: value::marshal_values(&[Value::Integer(1), Value::Varchar("alice".to_string())]),
        };
        bus.publish(&origin.read_topic(), update.encode_to_vec())
            .await
            .unwrap();

        let client = Client::connect(bus, registry, "test-client", &["users".to_string()])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let rows = client.query("SELECT id, name FROM users").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Value::Integer(1));
        assert_eq!(rows[0][1], Value::Varchar("alice".to_string()));
    }

    /// The local insert template is a primary-key-keyed upsert, so a row
    /// update replayed twice (e.g. a publisher re-emitting after a crash
    /// before its next checkpoint) must not change the row count or values.
    #[tokio::test]
    async fn replaying_a_row_update_is_idempotent() {
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::default());
        let registry = test_registry();
        let origin = registry.origin("users").unwrap();

        let update = wire::RowUpdate {
            row: value::marshal_values(&[Value::Integer(1), Value::Varchar("alice".to_string())]),
        };
        bus.publish(&origin.read_topic(), update.encode_to_vec())
            .await
            .unwrap();
        bus.publish(&origin.read_topic(), update.encode_to_vec())
            .await
            .unwrap();

        let client = Client::connect(bus, registry, "test-client", &["users".to_string()])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let rows = client.query("SELECT id, name FROM users").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Value::Integer(1));
        assert_eq!(rows[0][1], Value::Varchar("alice".to_string()));
    }
}
