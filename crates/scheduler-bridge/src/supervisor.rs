//! Process lifecycle: wire the client to the adapter and shut both down

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::adapter::McpAdapter;
use crate::client::{BridgeClient, Connector};
use crate::config::BridgeConfig;

/// Serve MCP on stdin/stdout until input ends or an interrupt arrives
pub async fn run(config: BridgeConfig) -> Result<()> {
    info!(
        socket = %config.socket_path.display(),
        conversation_id = config.conversation_id,
        "Starting scheduler bridge"
    );

    let client = Arc::new(BridgeClient::from_config(&config));
    let interrupt = async {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for interrupt")
    };

    supervise(client, tokio::io::stdin(), tokio::io::stdout(), interrupt).await
}

/// Serve MCP over `input`/`output` until input ends or `shutdown` resolves.
///
/// The client is closed on every exit path so no request is left hanging.
pub async fn supervise<C, R, W, F>(
    client: Arc<BridgeClient<C>>,
    input: R,
    output: W,
    shutdown: F,
) -> Result<()>
where
    C: Connector,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = Result<()>>,
{
    let adapter = McpAdapter::new(Arc::clone(&client));

    let outcome = tokio::select! {
        served = adapter.run(input, output) => served,
        signal = shutdown => {
            info!("Shutdown requested");
            signal
        }
    };

    client.close().await;
    outcome
}
