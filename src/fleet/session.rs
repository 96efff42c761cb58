// A single upstream connection: stdio child process or streamable-HTTP
// session, with its roots-request handler (spec.md §4.C).

use std::process::Stdio;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, ClientInfo, Root};
use rmcp::service::{NotificationContext, Peer, RequestContext, RoleClient, RunningService};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::{ErrorData, ServiceExt, service};
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{McpManError, Result};
use crate::fleet::oauth::OAuthProvider;

/// A tool descriptor as ingested from an upstream `listTools` response
/// (spec.md §3). `(server, name)` is the stable identifier.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// Connection state of a [`Session`], per spec.md §3's invariant: a
/// session appears in the fleet's map iff `state == Connected`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

/// Anything able to answer "what roots is the downstream client exposing
/// right now" — installed fleet-wide, consulted by every session's
/// inbound `listRoots` handler.
#[async_trait]
pub trait RootsProvider: Send + Sync {
    async fn list_roots(&self) -> Vec<Root>;
}

type SharedRootsProvider = Arc<RwLock<Option<Arc<dyn RootsProvider>>>>;

/// `ClientHandler` installed on every upstream connection. Its only
/// inbound duty is answering `listRoots` by consulting the fleet-level
/// provider; everything else is a no-op (spec.md §4.C).
#[derive(Clone)]
struct UpstreamClientHandler {
    server_name: String,
    roots: SharedRootsProvider,
}

impl rmcp::handler::client::ClientHandler for UpstreamClientHandler {
    fn list_roots(
        &self,
        _context: RequestContext<RoleClient>,
    ) -> impl std::future::Future<Output = std::result::Result<rmcp::model::ListRootsResult, ErrorData>>
    + Send
    + '_ {
        async move {
            let provider = self.roots.read().unwrap().clone();
            let roots = match provider {
                Some(p) => p.list_roots().await,
                None => Vec::new(),
            };
            Ok(rmcp::model::ListRootsResult { roots })
        }
    }

    fn on_progress(
        &self,
        _params: rmcp::model::ProgressNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {}
    }

    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: Default::default(),
            capabilities: rmcp::model::ClientCapabilities::builder()
                .enable_roots()
                .enable_roots_list_changed()
                .build(),
            client_info: rmcp::model::Implementation {
                name: "mcpman".into(),
                title: Some("MCPMan".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
        }
    }
}

impl std::fmt::Debug for UpstreamClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClientHandler")
            .field("server_name", &self.server_name)
            .finish()
    }
}

struct Connected {
    peer: Peer<RoleClient>,
    tools: Vec<ToolDescriptor>,
    _service: RunningService<RoleClient, UpstreamClientHandler>,
}

/// One upstream server's live (or not-yet-live) connection.
pub struct Session {
    pub name: String,
    pub config: ServerConfig,
    state: ConnectionState,
    connected: Option<Connected>,
    oauth: Option<OAuthProvider>,
    roots: SharedRootsProvider,
}

impl Session {
    pub fn new(name: impl Into<String>, config: ServerConfig, roots: SharedRootsProvider) -> Self {
        Self {
            name: name.into(),
            config,
            state: ConnectionState::Disconnected,
            connected: None,
            oauth: None,
            roots,
        }
    }

    pub fn with_oauth(mut self, oauth: OAuthProvider) -> Self {
        self.oauth = Some(oauth);
        self
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Connect the transport and list its tools. On success the session
    /// transitions to `Connected`; on failure to `Failed(reason)` and the
    /// error is returned for the caller to log (spec.md §4.D: "log and
    /// swallow individual failures").
    pub async fn connect(&mut self) -> Result<()> {
        self.state = ConnectionState::Connecting;
        match self.do_connect().await {
            Ok(connected) => {
                let tool_count = connected.tools.len();
                self.connected = Some(connected);
                self.state = ConnectionState::Connected;
                info!(server = %self.name, tool_count, "connected to upstream server");
                if self.roots.read().unwrap().is_some() {
                    self.notify_roots_changed().await;
                }
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Failed(e.to_string());
                warn!(server = %self.name, error = %e, "failed to connect to upstream server");
                Err(e)
            }
        }
    }

    async fn do_connect(&self) -> Result<Connected> {
        let handler = UpstreamClientHandler {
            server_name: self.name.clone(),
            roots: self.roots.clone(),
        };

        let service = match &self.config {
            ServerConfig::Stdio {
                command, args, env, ..
            } => {
                let mut cmd = Command::new(command);
                cmd.args(args);
                for (k, v) in env {
                    cmd.env(k, v);
                }
                cmd.stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::null());

                let transport = TokioChildProcess::new(cmd).map_err(|e| {
                    McpManError::ConnectFailed(self.name.clone(), e.to_string())
                })?;

                handler.serve(transport).await.map_err(|e| {
                    McpManError::ConnectFailed(self.name.clone(), e.to_string())
                })?
            }
            ServerConfig::Http { url, headers, .. } => {
                let mut transport_config = StreamableHttpClientTransportConfig::with_uri(url.as_str());
                if let Some(token) = self.oauth.as_ref().and_then(OAuthProvider::bearer_token) {
                    transport_config = transport_config.auth_header(token);
                } else if let Some(auth) = headers.get("Authorization") {
                    transport_config = transport_config.auth_header(auth.clone());
                }
                let transport = StreamableHttpClientTransport::from_config(transport_config);

                service::serve_client(handler, transport).await.map_err(|e| {
                    let msg = e.to_string();
                    if msg.contains("401") || msg.to_lowercase().contains("unauthorized") {
                        McpManError::Unauthorized(self.name.clone(), msg)
                    } else {
                        McpManError::ConnectFailed(self.name.clone(), msg)
                    }
                })?
            }
        };

        let peer = service.peer().clone();
        let tools = peer
            .list_all_tools()
            .await
            .map_err(|e| McpManError::ConnectFailed(self.name.clone(), e.to_string()))?
            .into_iter()
            .map(|t| ToolDescriptor {
                name: t.name.to_string(),
                description: t.description.as_deref().map(String::from),
                input_schema: serde_json::Value::Object((*t.input_schema).clone()),
            })
            .collect();

        Ok(Connected {
            peer,
            tools,
            _service: service,
        })
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        self.connected
            .as_ref()
            .map(|c| c.tools.as_slice())
            .unwrap_or(&[])
    }

    /// Re-list tools from the live connection, refreshing the cache.
    pub async fn refresh_tools(&mut self) -> Result<()> {
        let Some(connected) = self.connected.as_mut() else {
            return Err(McpManError::ServerNotConnected(self.name.clone()));
        };
        let tools = connected
            .peer
            .list_all_tools()
            .await
            .map_err(|e| McpManError::Other(e.to_string()))?
            .into_iter()
            .map(|t| ToolDescriptor {
                name: t.name.to_string(),
                description: t.description.as_deref().map(String::from),
                input_schema: serde_json::Value::Object((*t.input_schema).clone()),
            })
            .collect();
        connected.tools = tools;
        Ok(())
    }

    pub async fn call_tool(
        &self,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<Vec<rmcp::model::Content>> {
        let connected = self
            .connected
            .as_ref()
            .ok_or_else(|| McpManError::ServerNotConnected(self.name.clone()))?;

        let arguments = match args {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        };

        let timeout = std::time::Duration::from_millis(self.config.timeout_ms());
        let result: CallToolResult = tokio::time::timeout(
            timeout,
            connected.peer.call_tool(CallToolRequestParam {
                name: tool_name.to_string().into(),
                arguments,
            }),
        )
        .await
        .map_err(|_| McpManError::ExecutionError(format!("tool call to '{tool_name}' timed out")))?
        .map_err(|e| McpManError::ExecutionError(e.to_string()))?;

        Ok(result.content)
    }

    /// Send `rootsListChanged` so the upstream can pull initial (or
    /// updated) roots. Failures are logged, not propagated (spec.md §4.D).
    pub async fn notify_roots_changed(&self) {
        if let Some(connected) = &self.connected {
            if let Err(e) = connected.peer.notify_roots_list_changed().await {
                warn!(server = %self.name, error = %e, "failed to notify roots changed");
            }
        }
    }

    /// Close the connection. Idempotent.
    pub async fn close(&mut self) {
        if self.connected.take().is_some() {
            info!(server = %self.name, "disconnecting from upstream server");
        }
        self.state = ConnectionState::Disconnected;
    }
}
