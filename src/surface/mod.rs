// Tool surface facade: proxies and globals for the script runtime, plus
// cached type-text generation for `help`/`eval`/`code` (spec.md §4.E).

pub mod proxy;
pub mod types;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{McpManError, Result};
use crate::fleet::Fleet;
pub use proxy::ServerProxy;

/// `listTools()` with no server filter groups by server; with a filter it
/// flattens to that server's tool names (spec.md §4.E `listTools`).
#[derive(Debug, Clone)]
pub enum ListToolsResult {
    ByServer(HashMap<String, Vec<String>>),
    Single(Vec<String>),
}

struct TypeCache {
    signature: String,
    definitions: String,
    descriptions: String,
}

/// The facade sitting between the fleet and everything that needs typed
/// access to it: the script runtime's globals and the `help`/`eval`/`code`
/// meta-tool handlers.
pub struct Surface {
    fleet: Arc<Fleet>,
    cache: Mutex<Option<TypeCache>>,
}

impl Surface {
    pub fn new(fleet: Arc<Fleet>) -> Self {
        Self {
            fleet,
            cache: Mutex::new(None),
        }
    }

    pub fn fleet(&self) -> &Arc<Fleet> {
        &self.fleet
    }

    pub async fn list_servers(&self) -> Vec<String> {
        self.fleet.get_connected_servers().await
    }

    pub async fn list_tools(&self, server: Option<&str>) -> ListToolsResult {
        let all = self.fleet.get_all_tools().await;
        match server {
            Some(name) => ListToolsResult::Single(
                all.get(name)
                    .map(|tools| tools.iter().map(|t| t.name.clone()).collect())
                    .unwrap_or_default(),
            ),
            None => ListToolsResult::ByServer(
                all.into_iter()
                    .map(|(server, tools)| (server, tools.into_iter().map(|t| t.name).collect()))
                    .collect(),
            ),
        }
    }

    pub async fn proxies(&self) -> HashMap<String, ServerProxy> {
        let all = self.fleet.get_all_tools().await;
        proxy::build_proxies(&all)
    }

    /// `help(server, tool?)`: the relevant generated declarations, or a
    /// text error enumerating connected servers / that server's tools.
    pub async fn help(&self, server: &str, tool: Option<&str>) -> Result<String> {
        let all = self.fleet.get_all_tools().await;
        let Some(tools) = all.get(server) else {
            let available = all.keys().cloned().collect::<Vec<_>>().join(", ");
            return Err(McpManError::ServerNotConnected(format!(
                "{server} (connected servers: {available})"
            )));
        };

        match tool {
            None => Ok(format!("```typescript\n{}```", types::render_server(server, tools))),
            Some(name) => {
                let proxy = ServerProxy::new(server, tools.clone());
                let resolved = proxy.resolve(name)?;
                Ok(format!(
                    "```typescript\n{}```",
                    types::render_server(server, std::slice::from_ref(resolved))
                ))
            }
        }
    }

    /// `getTypeDefinitions(servers?)`. The unfiltered call is memoized on
    /// the tool signature; a server filter is always recomputed (spec.md
    /// §4.E).
    pub async fn get_type_definitions(&self, servers: Option<&[String]>) -> String {
        let all = self.fleet.get_all_tools().await;
        match servers {
            Some(filter) => {
                let filtered: HashMap<_, _> = all
                    .iter()
                    .filter(|(name, _)| filter.contains(name))
                    .collect();
                types::render_all(filtered.into_iter())
            }
            None => self.cached(&all).definitions,
        }
    }

    pub async fn get_tool_descriptions(&self, servers: Option<&[String]>) -> String {
        let all = self.fleet.get_all_tools().await;
        match servers {
            Some(filter) => {
                let filtered: HashMap<_, _> = all
                    .iter()
                    .filter(|(name, _)| filter.contains(name))
                    .collect();
                types::render_descriptions(filtered.into_iter())
            }
            None => self.cached(&all).descriptions,
        }
    }

    fn cached(&self, all: &HashMap<String, Vec<crate::fleet::ToolDescriptor>>) -> CachedPair {
        let sig = types::signature(all);
        let mut cache = self.cache.lock().unwrap();
        if let Some(c) = cache.as_ref() {
            if c.signature == sig {
                return CachedPair {
                    definitions: c.definitions.clone(),
                    descriptions: c.descriptions.clone(),
                };
            }
        }
        let definitions = types::render_all(all.iter());
        let descriptions = types::render_descriptions(all.iter());
        *cache = Some(TypeCache {
            signature: sig,
            definitions: definitions.clone(),
            descriptions: descriptions.clone(),
        });
        CachedPair {
            definitions,
            descriptions,
        }
    }

    /// Resolve `tool` against `server`'s current proxy and delegate the
    /// call to the fleet, per spec.md §4.B attribute resolution.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<Vec<rmcp::model::Content>> {
        let all = self.fleet.get_all_tools().await;
        let tools = all
            .get(server)
            .ok_or_else(|| McpManError::ServerNotConnected(server.to_string()))?;
        let proxy = ServerProxy::new(server, tools.clone());
        let resolved = proxy.resolve(tool)?.name.clone();
        self.fleet.call_tool(server, &resolved, args).await
    }
}

struct CachedPair {
    definitions: String,
    descriptions: String,
}
