//! Tandem pairing server.
//!
//! Configuration comes from `TANDEM_*` environment variables; logging is
//! controlled with `RUST_LOG`.

use tandem::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), TandemError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem=info,tandem_pairing=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(?config, "starting tandem");

    let server = TandemServer::builder().config(config).build(TrustedToken).await?;

    server.run_until(shutdown_signal()).await?;
    tracing::info!("tandem stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
