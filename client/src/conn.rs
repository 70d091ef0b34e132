//! Applies replicated row updates to the client's local replica.
//!
//! Grounded in `client/client.go`'s `tableHandler`, with one deliberate
//! change: the original panics the whole process when a row update fails
//! to decode or apply. Here a handler reports the failure on a bounded
//! channel instead, and a supervisor task closes the client once that
//! channel overflows, so one bad row can't bring down a process hosting
//! other clients.

use std::sync::Arc;

use prost::Message as _;
use rusqlite::Connection;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use fabric::bus::MessageBus;
use fabric::dataorigin::DataOrigin;
use fabric::error::{FabricError, Result};
use fabric::value;
use fabric::wire;

use crate::ReplicaError;

/// Creates `table`'s local replica and spawns the task that keeps it in
/// sync from its read topic. Returns the running task's handle so the
/// caller can track and later abort it.
pub async fn subscribe_table(
    local: Arc<Mutex<Connection>>,
    bus: Arc<dyn MessageBus>,
    origin: Arc<DataOrigin>,
    durable_name: String,
    errors: mpsc::Sender<ReplicaError>,
) -> Result<JoinHandle<()>> {
    {
        let conn = local.lock().await;
        conn.execute(&origin.schema.local_table_ddl, [])
            .map_err(|e| FabricError::LocalDb(e.to_string()))?;
    }

    let subject = origin.read_topic();
    let mut consumer = bus.subscribe_durable(&subject, &durable_name).await?;
    let table = origin.schema.table.clone();
    let insert_template = origin.schema.insert_template.clone();

    let handle = tokio::spawn(async move {
        loop {
            let msg = match consumer.next().await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(e) => {
                    report(&errors, &table, e);
                    continue;
                }
            };

            if let Err(e) = apply(&local, &insert_template, &table, &msg.payload).await {
                report(&errors, &table, e);
            }
        }
    });

    Ok(handle)
}

async fn apply(
    local: &Mutex<Connection>,
    insert_template: &str,
    table: &str,
    payload: &[u8],
) -> Result<()> {
    let update = wire::RowUpdate::decode(payload)?;
    let row = value::unmarshal_values(&update.row)?;
    let owned_params: Vec<rusqlite::types::Value> = row.iter().map(to_sqlite_value).collect();

    let mut conn = local.lock().await;
    let params: Vec<&dyn rusqlite::ToSql> = owned_params
        .iter()
        .map(|v| v as &dyn rusqlite::ToSql)
        .collect();
    let tx = conn
        .transaction()
        .map_err(|e| FabricError::LocalDb(e.to_string()))?;

    let affected = tx
        .execute(insert_template, params.as_slice())
        .map_err(|e| FabricError::LocalDb(format!("failed to update table {table}: {e}")))?;

    if affected == 0 {
        tx.rollback().ok();
        return Err(FabricError::LocalDb(format!(
            "no rows affected applying update to {table}"
        )));
    }

    tx.commit().map_err(|e| FabricError::LocalDb(e.to_string()))?;
    Ok(())
}

fn to_sqlite_value(v: &value::Value) -> rusqlite::types::Value {
    match v {
        value::Value::Varchar(s) => rusqlite::types::Value::Text(s.clone()),
        value::Value::Integer(i) => rusqlite::types::Value::Integer(*i),
        value::Value::Decimal(d) => rusqlite::types::Value::Real(*d as f64),
        value::Value::Boolean(b) => rusqlite::types::Value::Integer(*b as i64),
        value::Value::Timestamp(t) => rusqlite::types::Value::Text(t.to_rfc3339()),
        value::Value::Null => rusqlite::types::Value::Null,
    }
}

/// Reports a replication failure. A full channel means the client already
/// has 64 unconsumed errors outstanding, which the supervisor treats as
/// unrecoverable; `try_send` avoids blocking the handler loop on a stalled
/// supervisor.
fn report(errors: &mpsc::Sender<ReplicaError>, table: &str, error: FabricError) {
    warn!(table = %table, error = %error, "failed to apply replicated row");
    if let Err(mpsc::error::TrySendError::Full(_)) = errors.try_send(ReplicaError {
        table: table.to_string(),
        error,
    }) {
        error!(table = %table, "replica error channel overflowed");
    }
}
