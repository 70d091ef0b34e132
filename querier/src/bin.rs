use std::env;
use std::sync::Arc;

use fabric::bus::nats::NatsBus;
use fabric::registry::Registry;
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let mysql_table = env::var("MYSQL_TABLE").expect("MYSQL_TABLE must be set");
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
    let bus = Arc::new(
        NatsBus::connect_as(&nats_url, Some(&bus_name))
            .await
            .expect("failed to connect to bus"),
    );

    let handle = tokio::spawn(querier::handle_table(mysql_table, registry, bus));

    let mut sighup = signal(SignalKind::hangup()).expect("failed to register SIGHUP handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigquit = signal(SignalKind::quit()).expect("failed to register SIGQUIT handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sighup.recv() => {}
        _ = sigterm.recv() => {}
        _ = sigquit.recv() => {}
        result = handle => {
            if let Ok(Err(e)) = result {
                tracing::error!(error = %e, "querier exited with error");
                std::process::exit(1);
            }
        }
    }
}
