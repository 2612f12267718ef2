use std::sync::Arc;

use idlink_rs::config::{AppConfig, ConfigOverrides, ServerOverrides, SnapshotOverrides};
use idlink_rs::{http, ContactStore, IdentityEngine, MemoryStore};
use tracing_subscriber::EnvFilter;

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path = parse_arg("--config");
    let overrides = ConfigOverrides {
        server: parse_arg("--listen").map(|listen| ServerOverrides {
            listen: listen.parse().ok(),
        }),
        snapshot: parse_arg("--snapshot").map(|path| SnapshotOverrides {
            path: Some(path.into()),
        }),
    };
    let config = AppConfig::load(config_path.as_deref(), overrides)?;

    let store = match config.snapshot.path.as_deref() {
        Some(path) if path.exists() => {
            let store = MemoryStore::restore(path)?;
            tracing::info!(path = %path.display(), contacts = store.len(), "restored snapshot");
            store
        }
        _ => MemoryStore::new(),
    };

    let engine = Arc::new(IdentityEngine::with_store(store));
    http::serve(engine.clone(), config.listing.clone(), config.server.listen).await?;

    if let Some(path) = config.snapshot.path.as_deref() {
        engine.checkpoint(path)?;
        tracing::info!(path = %path.display(), "snapshot written on shutdown");
    }
    Ok(())
}
