//! Tails a MySQL binlog and republishes row changes onto the bus.
//! Grounded in `publisher/handler.go`'s `MySQLOrigin`, which wraps
//! `siddontang/go-mysql/canal`; the Rust ecosystem's nearest analogue,
//! `mysql_cdc`, exposes binlog replication as a blocking iterator rather
//! than an event-handler callback, so the tail loop runs on a blocking
//! thread and forwards row updates to the async bus publisher over a
//! channel.

use std::collections::{HashMap, HashSet};

use mysql_async::prelude::Queryable;
use mysql_cdc::binlog_client::BinlogClient;
use mysql_cdc::binlog_options::BinlogOptions;
use mysql_cdc::events::binlog_event::BinlogEvent;
use mysql_cdc::events::row_events::mysql_value::MySqlValue;
use mysql_cdc::events::row_events::row_data::RowData;
use mysql_cdc::events::table_map_event::TableMapEvent;
use mysql_cdc::replica_options::ReplicaOptions;
use mysql_cdc::ssl_mode::SslMode;
use prost::Message as _;
use tokio::sync::mpsc;
use tracing::{info, warn};

use fabric::error::{FabricError, Result};
use fabric::value::Value;
use fabric::wire;

#[derive(Debug, Clone)]
pub struct MysqlPublisherConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub server_id: u32,
}

/// A row update ready to publish: the table it belongs to and its
/// already-encoded wire payload.
pub struct TableRowUpdate {
    pub table: String,
    pub payload: Vec<u8>,
}

/// Publishes a full snapshot of `table` (`SELECT * FROM <table>`) as a
/// sequence of row updates, the "dump" half of dump+follow mode: a
/// late-starting publisher replays the origin's current contents before
/// tailing the binlog, so a newly connected client converges to the
/// origin's state instead of only seeing changes from here forward.
pub async fn snapshot_table(
    pool: &mysql_async::Pool,
    table: &str,
    tx: &mpsc::Sender<TableRowUpdate>,
) -> Result<()> {
    let mut conn = pool
        .get_conn()
        .await
        .map_err(|e| FabricError::OriginDial(e.to_string()))?;
    let rows: Vec<mysql_async::Row> = conn
        .query(format!("SELECT * FROM {table}"))
        .await
        .map_err(|e| FabricError::OriginQuery(e.to_string()))?;

    for row in rows {
        let values: Vec<Value> = (0..row.len())
            .map(|i| fabric::value::from_mysql(row.as_ref(i)))
            .collect();
        let update = wire::RowUpdate {
            row: values.iter().map(Value::to_wire).collect(),
        };
        if tx
            .send(TableRowUpdate {
                table: table.to_string(),
                payload: update.encode_to_vec(),
            })
            .await
            .is_err()
        {
            break;
        }
    }
    Ok(())
}

/// Runs the binlog tail loop on a blocking thread, forwarding updates for
/// every table in `known_tables` to `tx`. Returns once the replication
/// stream ends or errors; in `blocking: true` mode (the default) this
/// normally runs forever.
pub async fn tail(
    cfg: MysqlPublisherConfig,
    known_tables: HashSet<String>,
    tx: mpsc::Sender<TableRowUpdate>,
) -> Result<()> {
    tokio::task::spawn_blocking(move || tail_blocking(cfg, known_tables, tx))
        .await
        .map_err(|e| FabricError::Internal(format!("publisher task panicked: {e}")))?
}

fn tail_blocking(
    cfg: MysqlPublisherConfig,
    known_tables: HashSet<String>,
    tx: mpsc::Sender<TableRowUpdate>,
) -> Result<()> {
    let options = ReplicaOptions {
        hostname: cfg.host,
        port: cfg.port,
        username: cfg.user,
        password: cfg.password,
        database: Some(cfg.database),
        server_id: cfg.server_id,
        blocking: true,
        ssl_mode: SslMode::Disabled,
        binlog: BinlogOptions::from_end(),
        ..Default::default()
    };

    let mut client = BinlogClient::new(options);
    let mut table_map: HashMap<u64, TableMapEvent> = HashMap::new();

    for result in client
        .replicate()
        .map_err(|e| FabricError::OriginDial(format!("{e:?}")))?
    {
        let (header, event) = result.map_err(|e| FabricError::OriginQuery(format!("{e:?}")))?;

        match event {
            BinlogEvent::TableMapEvent(ref map_event) => {
                table_map.insert(map_event.table_id, map_event.clone());
            }
            BinlogEvent::WriteRowsEvent(ref write_event) => {
                emit_rows(
                    &table_map,
                    write_event.table_id,
                    &write_event.rows,
                    &known_tables,
                    &tx,
                )?;
            }
            BinlogEvent::UpdateRowsEvent(ref update_event) => {
                let rows: Vec<&RowData> = update_event
                    .rows
                    .iter()
                    .map(|r| &r.after_update)
                    .collect();
                emit_row_refs(&table_map, update_event.table_id, &rows, &known_tables, &tx)?;
            }
            _ => {}
        }

        client.commit(&header, &event);
    }

    Ok(())
}

fn emit_rows(
    table_map: &HashMap<u64, TableMapEvent>,
    table_id: u64,
    rows: &[RowData],
    known_tables: &HashSet<String>,
    tx: &mpsc::Sender<TableRowUpdate>,
) -> Result<()> {
    let refs: Vec<&RowData> = rows.iter().collect();
    emit_row_refs(table_map, table_id, &refs, known_tables, tx)
}

fn emit_row_refs(
    table_map: &HashMap<u64, TableMapEvent>,
    table_id: u64,
    rows: &[&RowData],
    known_tables: &HashSet<String>,
    tx: &mpsc::Sender<TableRowUpdate>,
) -> Result<()> {
    let Some(table_meta) = table_map.get(&table_id) else {
        warn!(table_id, "row event for unknown table id, dropping");
        return Ok(());
    };

    if !known_tables.contains(&table_meta.table_name) {
        warn!(
            table = %table_meta.table_name,
            "row event for table with no registered schema, skipping"
        );
        return Ok(());
    }

    for row in rows {
        let values: Vec<Value> = row.cells.iter().map(convert_cell).collect();
        let update = wire::RowUpdate {
            row: values.iter().map(Value::to_wire).collect(),
        };
        let payload = update.encode_to_vec();

        if tx
            .blocking_send(TableRowUpdate {
                table: table_meta.table_name.clone(),
                payload,
            })
            .is_err()
        {
            info!("publisher channel closed, stopping tail");
            return Ok(());
        }
    }

    Ok(())
}

fn convert_cell(cell: &Option<MySqlValue>) -> Value {
    match cell {
        None => Value::Null,
        Some(MySqlValue::TinyInt(v)) => Value::Integer(*v as i64),
        Some(MySqlValue::SmallInt(v)) => Value::Integer(*v as i64),
        Some(MySqlValue::MediumInt(v)) => Value::Integer(*v as i64),
        Some(MySqlValue::Int(v)) => Value::Integer(*v as i64),
        Some(MySqlValue::BigInt(v)) => Value::Integer(*v as i64),
        Some(MySqlValue::Year(v)) => Value::Integer(*v as i64),
        Some(MySqlValue::Enum(v)) => Value::Integer(*v as i64),
        Some(MySqlValue::Set(v)) => Value::Integer(*v as i64),
        Some(MySqlValue::Float(v)) => Value::Decimal(*v),
        Some(MySqlValue::Double(v)) => Value::Decimal(*v as f32),
        Some(MySqlValue::Decimal(s)) => Value::Decimal(s.parse().unwrap_or(0.0)),
        Some(MySqlValue::String(s)) => Value::Varchar(s.clone()),
        Some(MySqlValue::Blob(b)) => Value::Varchar(String::from_utf8_lossy(b).into_owned()),
        Some(MySqlValue::Bit(bits)) => Value::Boolean(bits.first().copied().unwrap_or(false)),
        Some(MySqlValue::Timestamp(millis)) => {
            chrono::DateTime::from_timestamp_millis(*millis as i64)
                .map(Value::Timestamp)
                .unwrap_or(Value::Null)
        }
        Some(MySqlValue::Date(d)) => Value::Varchar(format!("{}-{:02}-{:02}", d.year, d.month, d.day)),
        Some(MySqlValue::Time(t)) => {
            Value::Varchar(format!("{:02}:{:02}:{:02}", t.hour, t.minute, t.second))
        }
        Some(MySqlValue::DateTime(dt)) => Value::Varchar(format!(
            "{}-{:02}-{:02} {:02}:{:02}:{:02}",
            dt.year, dt.month, dt.day, dt.hour, dt.minute, dt.second
        )),
    }
}
