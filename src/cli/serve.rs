// MCP server initialization and main loop (spec.md §4.H, §7 exit codes).

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rmcp::model::Root;
use tracing::{info, warn};

use crate::config::Settings;
use crate::fleet::{Fleet, InMemoryTokenStore, RootsProvider};
use crate::meta::{DownstreamPeer, McpManServer};
use crate::runtime::Sandbox;
use crate::surface::Surface;

/// Answers the fleet's `listRoots` fan-out by calling back into whatever
/// downstream MCP client this process is currently serving (spec.md §4.C).
/// Empty until `on_initialized` populates the peer handle.
struct DownstreamRootsProvider {
    peer: DownstreamPeer,
}

#[async_trait]
impl RootsProvider for DownstreamRootsProvider {
    async fn list_roots(&self) -> Vec<Root> {
        let guard = self.peer.read().await;
        let Some(peer) = guard.as_ref() else {
            return Vec::new();
        };
        match peer.list_roots().await {
            Ok(result) => result.roots,
            Err(e) => {
                warn!(error = %e, "downstream client rejected listRoots");
                Vec::new()
            }
        }
    }
}

/// Load settings, build the fleet/surface/sandbox stack, register the
/// downstream stdio transport, and block until shutdown.
pub async fn run() -> Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    info!(
        servers = settings.servers.len(),
        "starting mcpman"
    );

    let token_store = Arc::new(InMemoryTokenStore::default());
    let on_redirect: Arc<dyn Fn(&str, &str) + Send + Sync> = Arc::new(|server, url| {
        warn!(server, url, "open this URL to authorize the upstream server");
    });
    let fleet = Arc::new(Fleet::new(settings, token_store, on_redirect));
    let surface = Arc::new(Surface::new(fleet.clone()));
    let sandbox = Sandbox::spawn(surface.clone(), tokio::runtime::Handle::current());

    let server = McpManServer::new(fleet.clone(), surface, sandbox);
    fleet.set_roots_provider(Arc::new(DownstreamRootsProvider {
        peer: server.downstream_peer(),
    }));

    let transport = rmcp::transport::io::stdio();
    let service = rmcp::serve_server(server.clone(), transport)
        .await
        .context("starting stdio transport")?;

    run_until_shutdown(service, &server).await;
    Ok(())
}

/// Block until the downstream connection closes normally, or until
/// SIGINT/SIGTERM request a graceful shutdown; either path disconnects
/// the fleet before returning (spec.md §4.H, idempotent).
async fn run_until_shutdown<S>(service: rmcp::service::RunningService<rmcp::service::RoleServer, S>, server: &McpManServer)
where
    S: rmcp::ServerHandler,
{
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = service.waiting().await;
                server.shutdown().await;
                return;
            }
        };
        tokio::select! {
            result = service.waiting() => {
                if let Err(e) = result {
                    warn!(error = %e, "downstream connection ended with an error");
                }
            }
            _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            result = service.waiting() => {
                if let Err(e) = result {
                    warn!(error = %e, "downstream connection ended with an error");
                }
            }
            _ = tokio::signal::ctrl_c() => info!("received ctrl-c, shutting down"),
        }
    }
    server.shutdown().await;
}
