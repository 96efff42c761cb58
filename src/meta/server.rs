// Process-wide MCP server: tool registration, the downstream
// `initialized` gate, and orderly shutdown (spec.md §4.H).

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::{NotificationContext, Peer, RequestContext, RoleServer};
use rmcp::{ErrorData, ServerHandler};
use tokio::sync::{RwLock, watch};
use tracing::{info, warn};

use crate::fleet::Fleet;
use crate::runtime::Sandbox;
use crate::surface::Surface;

/// Shared handle to the one downstream peer this process serves. Empty
/// until `on_initialized` fires; [`crate::fleet::Fleet::set_roots_provider`]
/// is wired against this same handle in `cli::serve::run` so upstream
/// `listRoots` requests reach the actual downstream client.
pub type DownstreamPeer = Arc<RwLock<Option<Peer<RoleServer>>>>;

/// Exactly one of these exists per process lifetime (spec.md §9 "Global
/// mutable state"). `initialized` gates every meta-tool handler on the
/// downstream client's `initialized` notification, closing the race
/// spec.md §9 calls out between a fast first tool call and `connectAll`.
#[derive(Clone)]
pub struct McpManServer {
    pub(super) fleet: Arc<Fleet>,
    pub(super) surface: Arc<Surface>,
    pub(super) sandbox: Sandbox,
    pub(super) tool_router: ToolRouter<Self>,
    initialized_tx: Arc<watch::Sender<bool>>,
    initialized_rx: watch::Receiver<bool>,
    downstream_peer: DownstreamPeer,
}

impl McpManServer {
    pub fn new(fleet: Arc<Fleet>, surface: Arc<Surface>, sandbox: Sandbox) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            fleet,
            surface,
            sandbox,
            tool_router: Self::tool_router(),
            initialized_tx: Arc::new(tx),
            initialized_rx: rx,
            downstream_peer: Arc::new(RwLock::new(None)),
        }
    }

    /// Await the downstream `initialized` gate. Every meta-tool handler
    /// calls this first (spec.md §4.G).
    pub(super) async fn wait_until_initialized(&self) {
        let mut rx = self.initialized_rx.clone();
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// The shared downstream-peer handle, installed into a
    /// [`crate::fleet::RootsProvider`] by `cli::serve::run` before serving.
    pub fn downstream_peer(&self) -> DownstreamPeer {
        self.downstream_peer.clone()
    }

    /// `disconnect()` + process exit path, called from the signal
    /// handler in `cli::serve`. Idempotent, per spec.md §4.H.
    pub async fn shutdown(&self) {
        self.fleet.disconnect().await;
    }
}

impl ServerHandler for McpManServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "mcpman".into(),
                title: Some("MCPMan".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Multiplexing proxy for the Model Context Protocol. Use list_servers/help to \
                 discover upstream tools, eval/code to script over them, invoke for direct \
                 batch calls."
                    .into(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let ctx = rmcp::handler::server::tool::ToolCallContext::new(self, request, context);
            self.tool_router.call(ctx).await
        }
    }

    /// On the downstream client's `initialized` notification: capture the
    /// peer, log its capabilities, connect the fleet, then open the gate
    /// every meta-tool handler waits on.
    fn on_initialized(
        &self,
        context: NotificationContext<RoleServer>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            let peer = context.peer.clone();
            if let Some(info) = peer.peer_info() {
                info!(
                    client = %info.client_info.name,
                    version = %info.client_info.version,
                    roots = info.capabilities.roots.is_some(),
                    sampling = info.capabilities.sampling.is_some(),
                    elicitation = info.capabilities.elicitation.is_some(),
                    "downstream client initialized"
                );
            } else {
                info!("downstream client initialized; no peer_info available");
            }
            *self.downstream_peer.write().await = Some(peer);

            let unauthorized = self.fleet.connect_all().await;
            if !unauthorized.is_empty() {
                warn!(
                    servers = ?unauthorized,
                    "one or more upstream servers require authorization; re-run the operator auth flow"
                );
            }
            let connected = self.fleet.get_connected_servers().await;
            info!(connected = connected.len(), "fleet connect settled");
            if self.initialized_tx.send(true).is_err() {
                warn!("no receivers left for the initialized gate");
            }
        }
    }
}
