use std::env;
use std::sync::Arc;

use fabric::bus::nats::NatsBus;
use fabric::registry::Registry;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let mysql_host = env::var("MYSQL_HOST").expect("MYSQL_HOST must be set");
    let mysql_port: u16 = env::var("MYSQL_PORT")
        .expect("MYSQL_PORT must be set")
        .parse()
        .expect("MYSQL_PORT must be a valid port number");
    let mysql_user = env::var("MYSQL_USER").expect("MYSQL_USER must be set");
    let mysql_password = env::var("MYSQL_PASSWORD").expect("MYSQL_PASSWORD must be set");
    let mysql_database = env::var("MYSQL_DATABASE").expect("MYSQL_DATABASE must be set");
    let server_id: u32 = env::var("PUBLISHER_ID")
        .unwrap_or_else(|_| "65535".to_string())
        .parse()
        .expect("PUBLISHER_ID must be a valid integer");

    let nats_host = env::var("NATS_HOST").expect("NATS_HOST must be set");
    let nats_port = env::var("NATS_PORT").expect("NATS_PORT must be set");
    let nats_url = format!("nats://{nats_host}:{nats_port}");
    let nats_cluster_id = env::var("NATS_CLUSTER_ID").expect("NATS_CLUSTER_ID must be set");
    let nats_client_id = env::var("NATS_CLIENT_ID").expect("NATS_CLIENT_ID must be set");
    let config_path = env::var("DATAORIGIN_CFG").expect("DATAORIGIN_CFG must be set");

    let mut registry = Registry::new();
    fabric::config::load_into(&mut registry, &config_path)
        .expect("failed to load data origin config");
    let registry = Arc::new(registry);

    let bus_name = format!("{nats_cluster_id}-{nats_client_id}");
    let bus = NatsBus::connect_as(&nats_url, Some(&bus_name))
        .await
        .expect("failed to connect to bus");

    let cfg = publisher::mysql::MysqlPublisherConfig {
        host: mysql_host,
        port: mysql_port,
        user: mysql_user,
        password: mysql_password,
        database: mysql_database,
        server_id,
    };

    if let Err(e) = publisher::run(cfg, registry, Arc::new(bus)).await {
        tracing::error!(error = %e, "publisher exited with error");
        std::process::exit(1);
    }
}
