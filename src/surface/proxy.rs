// Per-server tool proxies: the attribute-resolution layer §4.B backs,
// built fresh from whatever `Fleet::get_all_tools` currently reports.

use std::collections::HashMap;

use crate::error::{McpManError, Result};
use crate::fleet::ToolDescriptor;
use crate::normalize;

/// The set of tools one connected server currently exposes, with
/// resolution from any of its three naming conventions back to the
/// tool's original identifier.
#[derive(Debug, Clone)]
pub struct ServerProxy {
    pub server: String,
    tools: HashMap<String, ToolDescriptor>,
    original_names: Vec<String>,
}

impl ServerProxy {
    pub fn new(server: impl Into<String>, tools: Vec<ToolDescriptor>) -> Self {
        let original_names = tools.iter().map(|t| t.name.clone()).collect();
        let tools = tools.into_iter().map(|t| (t.name.clone(), t)).collect();
        Self {
            server: server.into(),
            tools,
            original_names,
        }
    }

    /// The tool descriptor for `requested`, resolved per spec.md §4.B.
    /// Failing resolution raises `ToolNotFound` naming every tool this
    /// server actually exposes.
    pub fn resolve(&self, requested: &str) -> Result<&ToolDescriptor> {
        let original = normalize::resolve(requested, &self.original_names).ok_or_else(|| {
            McpManError::ToolNotFound(requested.to_string(), self.original_names.join(", "))
        })?;
        Ok(&self.tools[original])
    }

    pub fn tool_names(&self) -> &[String] {
        &self.original_names
    }
}

/// Build one [`ServerProxy`] per connected server from a fleet tool
/// snapshot (spec.md §4.E `createServerProxies`).
pub fn build_proxies(all_tools: &HashMap<String, Vec<ToolDescriptor>>) -> HashMap<String, ServerProxy> {
    all_tools
        .iter()
        .map(|(server, tools)| (server.clone(), ServerProxy::new(server.clone(), tools.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: None,
            input_schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn resolves_camel_case_request_against_snake_original() {
        let proxy = ServerProxy::new("filesystem", vec![tool("list_directory")]);
        let resolved = proxy.resolve("listDirectory").unwrap();
        assert_eq!(resolved.name, "list_directory");
    }

    #[test]
    fn unknown_tool_lists_available_names() {
        let proxy = ServerProxy::new("filesystem", vec![tool("list_directory")]);
        let err = proxy.resolve("deleteFile").unwrap_err();
        assert!(matches!(err, McpManError::ToolNotFound(_, ref available) if available.contains("list_directory")));
    }
}
