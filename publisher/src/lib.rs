//! Publisher role: tails a data origin's binlog and republishes row
//! updates onto each table's read topic. Grounded in
//! `publisher/handler.go`'s `MySQLOrigin.Handle`/`OnRow`.

pub mod mysql;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use fabric::bus::MessageBus;
use fabric::dataorigin::OriginHandle;
use fabric::error::Result;
use fabric::registry::Registry;

use mysql::{MysqlPublisherConfig, TableRowUpdate};

/// Runs the publisher until the bus connection or the binlog tail loop
/// ends. Starts in dump+follow mode (spec.md PURPOSE & SCOPE): every known
/// table is snapshotted in full before the binlog tail begins, so a
/// late-starting publisher's clients still converge to the origin's
/// current state. Unlike the original, which unconditionally drops row
/// updates for tables it doesn't recognize, unmapped tables are logged
/// (see `mysql::emit_row_refs`) rather than silently ignored.
///
/// The snapshot-then-tail producer runs on its own task, concurrently with
/// the publish/drain loop below: the channel is bounded at 256, and any
/// origin table with more rows than that would otherwise deadlock a
/// producer that sends before anything is draining the other end.
pub async fn run(
    cfg: MysqlPublisherConfig,
    registry: Arc<Registry>,
    bus: Arc<dyn MessageBus>,
) -> Result<()> {
    let known_tables: HashSet<String> = registry.tables().map(str::to_string).collect();
    let (tx, mut rx) = mpsc::channel::<TableRowUpdate>(256);

    let producer_registry = registry.clone();
    let producer_tables = known_tables.clone();
    let producer_handle = tokio::spawn(async move {
        for table in &producer_tables {
            let origin = producer_registry.origin(table)?;
            if let OriginHandle::Mysql(pool) = origin.get_db().await? {
                info!(table = %table, "snapshotting table before binlog tail");
                mysql::snapshot_table(&pool, table, &tx).await?;
            }
        }
        mysql::tail(cfg, producer_tables, tx).await
    });

    while let Some(update) = rx.recv().await {
        let origin = registry.origin(&update.table)?;
        let subject = origin.read_topic();
        bus.publish(&subject, update.payload).await?;
        info!(table = %update.table, "published row update");
    }

    producer_handle
        .await
        .map_err(|e| fabric::error::FabricError::Internal(format!("producer task panicked: {e}")))?
}
