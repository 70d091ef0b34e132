//! Querier role: receives write statements over a table's write topic and
//! executes them against the table's origin database, replying with the
//! outcome. Grounded in `querier/handler.go`'s `MySQLQuerier`/`tableHandler`.

use std::sync::Arc;

use mysql_async::prelude::*;
use prost::Message as _;
use tracing::{error, info};

use fabric::bus::{BusMessage, MessageBus};
use fabric::dataorigin::OriginHandle;
use fabric::error::{FabricError, Result};
use fabric::registry::Registry;
use fabric::value::Value;
use fabric::wire;

/// Subscribes to `table`'s write topic and answers every request until the
/// bus subscription ends.
pub async fn handle_table(
    table: String,
    registry: Arc<Registry>,
    bus: Arc<dyn MessageBus>,
) -> Result<()> {
    let origin = registry.origin(&table)?;
    let subject = origin.write_topic();
    let mut consumer = bus.subscribe(&subject).await?;

    info!(table = %table, subject = %subject, "querier listening for writes");

    while let Some(msg) = consumer.next().await? {
        let reply = process(&msg, &origin).await;
        if let Some(reply_to) = &msg.reply_to {
            let payload = reply.encode_to_vec();
            if let Err(e) = bus.reply(reply_to, payload).await {
                error!(table = %table, error = %e, "failed to send querier reply");
            }
        }
    }

    Ok(())
}

async fn process(msg: &BusMessage, origin: &fabric::dataorigin::DataOrigin) -> wire::WriteQueryReply {
    match process_inner(msg, origin).await {
        Ok(result) => wire::WriteQueryReply {
            ok: true,
            msg: String::new(),
            result: Some(result),
        },
        Err(e) => wire::WriteQueryReply {
            ok: false,
            msg: e.to_string(),
            result: None,
        },
    }
}

async fn process_inner(
    msg: &BusMessage,
    origin: &fabric::dataorigin::DataOrigin,
) -> Result<wire::DriverResult> {
    let request = wire::QueryRequest::decode(msg.payload.as_slice())?;
    let args = fabric::value::unmarshal_values(&request.args)?;

    match origin.get_db().await? {
        OriginHandle::Mysql(pool) => execute_mysql(&pool, &request.query, &args).await,
        OriginHandle::Sqlite3(conn) => execute_sqlite(&conn, &request.query, &args).await,
    }
}

async fn execute_mysql(
    pool: &mysql_async::Pool,
    query: &str,
    args: &[Value],
) -> Result<wire::DriverResult> {
    let mut conn = pool
        .get_conn()
        .await
        .map_err(|e| FabricError::OriginDial(e.to_string()))?;

    let params: Vec<mysql_async::Value> = args.iter().map(to_mysql_value).collect();
    let query_result = conn
        .exec_iter(query, params)
        .await
        .map_err(|e| FabricError::OriginQuery(e.to_string()))?;

    let affected_rows = query_result.affected_rows();
    let last_insert_id = query_result.last_insert_id().unwrap_or(0);

    if affected_rows == 0 {
        return Err(FabricError::OriginQuery("no rows affected".to_string()));
    }

    Ok(wire::DriverResult {
        rows_affected: affected_rows as i64,
        last_insert_id: last_insert_id as i64,
    })
}

async fn execute_sqlite(
    conn: &std::sync::Arc<tokio::sync::Mutex<rusqlite::Connection>>,
    query: &str,
    args: &[Value],
) -> Result<wire::DriverResult> {
    let owned_params: Vec<rusqlite::types::Value> = args.iter().map(to_sqlite_value).collect();
    let conn = conn.lock().await;
    let params: Vec<&dyn rusqlite::ToSql> = owned_params
        .iter()
        .map(|v| v as &dyn rusqlite::ToSql)
        .collect();

    let affected_rows = conn
        .execute(query, params.as_slice())
        .map_err(|e| FabricError::OriginQuery(e.to_string()))?;

    if affected_rows == 0 {
        return Err(FabricError::OriginQuery("no rows affected".to_string()));
    }

    Ok(wire::DriverResult {
        rows_affected: affected_rows as i64,
        last_insert_id: conn.last_insert_rowid(),
    })
}

fn to_sqlite_value(v: &Value) -> rusqlite::types::Value {
    match v {
        Value::Varchar(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Integer(i) => rusqlite::types::Value::Integer(*i),
        Value::Decimal(d) => rusqlite::types::Value::Real(*d as f64),
        Value::Boolean(b) => rusqlite::types::Value::Integer(*b as i64),
        Value::Timestamp(t) => rusqlite::types::Value::Text(t.to_rfc3339()),
        Value::Null => rusqlite::types::Value::Null,
    }
}

fn to_mysql_value(value: &Value) -> mysql_async::Value {
    match value {
        Value::Varchar(s) => mysql_async::Value::Bytes(s.clone().into_bytes()),
        Value::Integer(i) => mysql_async::Value::Int(*i),
        Value::Decimal(d) => mysql_async::Value::Double(*d as f64),
        Value::Boolean(b) => mysql_async::Value::Int(*b as i64),
        Value::Timestamp(t) => mysql_async::Value::Date(
            t.format("%Y").to_string().parse().unwrap_or(0),
            t.format("%m").to_string().parse().unwrap_or(0),
            t.format("%d").to_string().parse().unwrap_or(0),
            t.format("%H").to_string().parse().unwrap_or(0),
            t.format("%M").to_string().parse().unwrap_or(0),
            t.format("%S").to_string().parse().unwrap_or(0),
            0,
        ),
        Value::Null => mysql_async::Value::NULL,
    }
}
