//! DSN parsing for MicroDB client connection strings.
//!
//! Grounded in `client/driver.go`'s `parseDSNMap`/`parseDSN`: a DSN is a
//! space-separated list of `key=value` pairs, split on the pair's last
//! `=` so values containing `=` still parse. Key names follow spec §4.8/§6
//! (`natsClientID`), not the original Go source's `clientID`.

use std::collections::HashMap;
use std::sync::Arc;

use fabric::bus::nats::NatsBus;
use fabric::bus::MessageBus;
use fabric::error::{FabricError, Result};
use fabric::registry::Registry;

use crate::Client;

/// The fields a MicroDB client DSN must carry.
#[derive(Debug, Clone)]
pub struct Dsn {
    pub client_id: String,
    pub nats_cluster_id: String,
    pub nats_host: String,
    pub nats_port: String,
    pub tables: Vec<String>,
}

pub fn parse(dsn: &str) -> Result<Dsn> {
    let opts = parse_map(dsn)?;

    let field = |key: &str| -> Result<String> {
        opts.get(key)
            .cloned()
            .ok_or_else(|| FabricError::InvalidDsn(format!("missing {key}")))
    };

    let tables = field("tables")?
        .split(',')
        .map(str::to_string)
        .collect();

    Ok(Dsn {
        client_id: field("natsClientID")?,
        nats_cluster_id: field("natsClusterID")?,
        nats_host: field("natsHost")?,
        nats_port: field("natsPort")?,
        tables,
    })
}

/// Opens a client the way the original `Driver.Open` does: parse the DSN,
/// dial the bus, then connect to the listed tables. `registry` must already
/// carry the schema and data origin configuration for those tables, since
/// the DSN (like the original's) carries no such information itself.
pub async fn open(dsn: &str, registry: Arc<Registry>) -> Result<Client> {
    let opts = parse(dsn)?;
    let url = format!("nats://{}:{}", opts.nats_host, opts.nats_port);
    let bus: Arc<dyn MessageBus> = Arc::new(NatsBus::connect(&url).await?);
    Client::connect(bus, registry, &opts.client_id, &opts.tables).await
}

fn parse_map(dsn: &str) -> Result<HashMap<String, String>> {
    let mut opts = HashMap::new();
    for kv in dsn.split(' ') {
        let sep = kv
            .rfind('=')
            .ok_or_else(|| FabricError::InvalidDsn(format!("invalid key-value pair: {kv}")))?;
        let (k, v) = kv.split_at(sep);
        opts.insert(k.to_string(), v[1..].to_string());
    }
    Ok(opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_dsn() {
        let dsn = parse("natsClientID=c1 natsClusterID=test-cluster natsHost=127.0.0.1 natsPort=4222 tables=users,orders").unwrap();
        assert_eq!(dsn.client_id, "c1");
        assert_eq!(dsn.nats_cluster_id, "test-cluster");
        assert_eq!(dsn.nats_host, "127.0.0.1");
        assert_eq!(dsn.nats_port, "4222");
        assert_eq!(dsn.tables, vec!["users".to_string(), "orders".to_string()]);
    }

    #[test]
    fn missing_field_is_invalid_dsn() {
        let err = parse("natsClientID=c1 natsHost=127.0.0.1").unwrap_err();
        assert!(matches!(err, FabricError::InvalidDsn(_)));
    }

    #[test]
    fn malformed_pair_is_invalid_dsn() {
        let err = parse("natsClientID").unwrap_err();
        assert!(matches!(err, FabricError::InvalidDsn(_)));
    }
}
