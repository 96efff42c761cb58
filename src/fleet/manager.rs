// Owns all upstream sessions: connect/disconnect, dynamic add, roots
// fan-out (spec.md §4.D).

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};

use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{info, warn};

use crate::config::{ServerConfig, Settings};
use crate::error::{McpManError, Result};
use crate::fleet::oauth::{OAuthProvider, TokenStore};
use crate::fleet::session::{RootsProvider, Session, ToolDescriptor};

/// Owns every configured server's live session. Only servers that are
/// currently connected appear in `clients` (spec.md §3's invariant);
/// `settings` is the independent source of truth for what is configured.
pub struct Fleet {
    settings: RwLock<Settings>,
    clients: RwLock<HashMap<String, Session>>,
    roots_provider: Arc<StdRwLock<Option<Arc<dyn RootsProvider>>>>,
    connecting: Mutex<HashMap<String, Arc<Notify>>>,
    token_store: Arc<dyn TokenStore>,
    on_redirect: Arc<dyn Fn(&str, &str) + Send + Sync>,
}

impl Fleet {
    pub fn new(
        settings: Settings,
        token_store: Arc<dyn TokenStore>,
        on_redirect: Arc<dyn Fn(&str, &str) + Send + Sync>,
    ) -> Self {
        Self {
            settings: RwLock::new(settings),
            clients: RwLock::new(HashMap::new()),
            roots_provider: Arc::new(StdRwLock::new(None)),
            connecting: Mutex::new(HashMap::new()),
            token_store,
            on_redirect,
        }
    }

    fn build_session(&self, name: &str, config: ServerConfig) -> Session {
        let session = Session::new(name, config.clone(), self.roots_provider.clone());
        if let ServerConfig::Http {
            oauth: Some(oauth), ..
        } = &config
        {
            let provider = OAuthProvider::new(
                name,
                oauth.clone(),
                self.token_store.clone(),
                self.on_redirect.clone(),
            );
            session.with_oauth(provider)
        } else {
            session
        }
    }

    /// Attempt each enabled configured server concurrently; a join that
    /// does not cancel on first failure. Returns once every attempt has
    /// settled. Ordinary failures are logged and swallowed; servers that
    /// rejected the connection for lack of authorization are returned so
    /// the caller can tell the operator to re-run auth (spec.md §7).
    pub async fn connect_all(self: &Arc<Self>) -> Vec<String> {
        let enabled: Vec<(String, ServerConfig)> = {
            let settings = self.settings.read().await;
            settings
                .enabled_servers()
                .map(|(n, c)| (n.clone(), c.clone()))
                .collect()
        };

        let mut set = tokio::task::JoinSet::new();
        for (name, config) in enabled {
            let fleet = self.clone();
            set.spawn(async move {
                let result = fleet.connect_server_inner(&name, config).await;
                (name, result)
            });
        }

        let mut unauthorized = Vec::new();
        while let Some(joined) = set.join_next().await {
            let Ok((name, result)) = joined else { continue };
            match result {
                Ok(()) => {}
                Err(e @ McpManError::Unauthorized(..)) => {
                    warn!(server = %name, error = %e, "upstream requires authorization; re-run the operator auth flow to reconnect");
                    unauthorized.push(name);
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "failed to connect during connectAll");
                }
            }
        }
        unauthorized
    }

    /// Connect a single already-configured server by name.
    pub async fn connect_server(&self, name: &str) -> Result<()> {
        let config = {
            let settings = self.settings.read().await;
            settings
                .servers
                .get(name)
                .cloned()
                .ok_or_else(|| McpManError::ConfigInvalid(format!("server '{name}' not configured")))?
        };
        self.connect_server_inner(name, config).await
    }

    async fn connect_server_inner(&self, name: &str, config: ServerConfig) -> Result<()> {
        // Fast path: already connected.
        if self.clients.read().await.contains_key(name) {
            return Ok(());
        }

        // Per-server guard against concurrent connects (mirrors the
        // fleet-manager double-connect guard pattern: a Notify per
        // in-flight attempt, waiters await it instead of polling).
        {
            let mut connecting = self.connecting.lock().await;
            if let Some(notify) = connecting.get(name) {
                let notify = notify.clone();
                drop(connecting);
                notify.notified().await;
                return if self.clients.read().await.contains_key(name) {
                    Ok(())
                } else {
                    Err(McpManError::ConnectFailed(
                        name.to_string(),
                        "concurrent connection attempt failed".to_string(),
                    ))
                };
            }
            connecting.insert(name.to_string(), Arc::new(Notify::new()));
        }

        let mut session = self.build_session(name, config);
        let result = session.connect().await;

        if result.is_ok() {
            self.clients.write().await.insert(name.to_string(), session);
        }

        let mut connecting = self.connecting.lock().await;
        if let Some(notify) = connecting.remove(name) {
            notify.notify_waiters();
        }

        result
    }

    /// Add a new server configuration and, if enabled, connect it.
    /// Adding a name that already exists is a caller error (surfaced by
    /// the `install` handler, not silently merged).
    pub async fn add_server(&self, name: &str, config: ServerConfig) -> Result<()> {
        {
            let mut settings = self.settings.write().await;
            if settings.servers.contains_key(name) {
                return Err(McpManError::ServerAlreadyExists(name.to_string()));
            }
            settings.servers.insert(name.to_string(), config.clone());
        }
        if !config.disabled() {
            self.connect_server_inner(name, config).await?;
        }
        Ok(())
    }

    /// List tools from every connected session, refreshing each session's
    /// cache. Per-session failures yield an empty list and a log line;
    /// this method never returns an error.
    pub async fn get_all_tools(&self) -> HashMap<String, Vec<ToolDescriptor>> {
        let names: Vec<String> = self.clients.read().await.keys().cloned().collect();
        let mut out = HashMap::new();
        for name in names {
            let mut clients = self.clients.write().await;
            let Some(session) = clients.get_mut(&name) else {
                continue;
            };
            if let Err(e) = session.refresh_tools().await {
                warn!(server = %name, error = %e, "failed to list tools");
                out.insert(name, Vec::new());
            } else {
                out.insert(name.clone(), session.tools().to_vec());
            }
        }
        out
    }

    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<Vec<rmcp::model::Content>> {
        let clients = self.clients.read().await;
        let session = clients
            .get(server)
            .ok_or_else(|| McpManError::ServerNotConnected(server.to_string()))?;
        session.call_tool(tool, args).await
    }

    pub fn set_roots_provider(&self, provider: Arc<dyn RootsProvider>) {
        *self.roots_provider.write().unwrap() = Some(provider);
    }

    /// Send `rootsListChanged` to every connected session; per-session
    /// failures are logged, not propagated.
    pub async fn notify_roots_changed(&self) {
        let clients = self.clients.read().await;
        for session in clients.values() {
            session.notify_roots_changed().await;
        }
    }

    /// Close every session and clear the map. Idempotent.
    pub async fn disconnect(&self) {
        let mut clients = self.clients.write().await;
        for (name, mut session) in clients.drain() {
            session.close().await;
            info!(server = %name, "session closed during fleet shutdown");
        }
    }

    pub async fn get_connected_servers(&self) -> Vec<String> {
        self.clients.read().await.keys().cloned().collect()
    }

    pub async fn get_configured_servers(&self) -> Vec<String> {
        self.settings
            .read()
            .await
            .enabled_servers()
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub async fn settings_snapshot(&self) -> Settings {
        self.settings.read().await.clone()
    }
}
