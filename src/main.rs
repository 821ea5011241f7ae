//! Demo binary: load config, connect to a hub, print whatever comes in.

use signalr_classic::{config, Client};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "signalr-classic.toml".to_owned());

    let cfg = match config::load_config_from_path(std::path::Path::new(&config_path)) {
        Ok(cfg) => {
            info!(host = %cfg.host, "config loaded");
            cfg
        }
        Err(e) => {
            error!(error = %e, path = %config_path, "falling back to defaults");
            config::Config::new()
        }
    };

    let hub_names: Vec<String> = std::env::args().skip(2).collect();
    let hub_names = if hub_names.is_empty() {
        vec!["c2".to_owned()]
    } else {
        hub_names
    };

    let client = Client::new(cfg);

    let mut errors = client.listen_errors().await.expect("errors sink already taken");
    let mut messages = client
        .listen_hub_responses()
        .await
        .expect("messages sink already taken");
    let mut heartbeats = client
        .listen_heartbeat()
        .await
        .expect("heartbeats sink already taken");
    let mut states = client
        .subscribe_state()
        .await
        .expect("state sink already taken");

    tokio::spawn(async move {
        while let Some(state) = states.recv().await {
            info!(%state, "connection state changed");
        }
    });
    tokio::spawn(async move {
        while let Some(err) = errors.recv().await {
            error!(%err, "signalr error");
        }
    });
    tokio::spawn(async move {
        while let Some(msg) = messages.recv().await {
            info!(hub = %msg.hub_name, method = %msg.method, "subscription event");
        }
    });
    tokio::spawn(async move {
        while let Some(hb) = heartbeats.recv().await {
            info!(%hb, "heartbeat");
        }
    });

    if let Err(e) = client.connect(hub_names).await {
        error!(error = %e, "connect terminated");
        std::process::exit(1);
    }
}
