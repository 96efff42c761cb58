// Stub upstream MCP server for end-to-end tests: one tool,
// `list_directory({path}) -> string[]`, with "." -> ["a", "b"] and
// anything else -> [] (spec.md §8's literal end-to-end scenarios).

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ListToolsResult, PaginatedRequestParam,
    ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData, ServerHandler};

#[derive(Clone)]
struct FilesystemStub;

impl ServerHandler for FilesystemStub {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "filesystem-stub".into(),
                title: None,
                version: "0.0.0".into(),
                icons: None,
                website_url: None,
            },
            instructions: None,
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: vec![list_directory_tool()],
            next_cursor: None,
            meta: None,
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            if request.name != "list_directory" {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "unknown tool {}",
                    request.name
                ))]));
            }
            let path = request
                .arguments
                .as_ref()
                .and_then(|a| a.get("path"))
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let entries: Vec<&str> = if path == "." { vec!["a", "b"] } else { vec![] };
            Ok(CallToolResult::success(vec![Content::text(
                serde_json::to_string(&entries).unwrap(),
            )]))
        }
    }
}

fn list_directory_tool() -> Tool {
    let mut properties = serde_json::Map::new();
    properties.insert("path".to_string(), serde_json::json!({ "type": "string" }));
    let mut schema = serde_json::Map::new();
    schema.insert("type".to_string(), serde_json::json!("object"));
    schema.insert("properties".to_string(), serde_json::Value::Object(properties));
    schema.insert("required".to_string(), serde_json::json!(["path"]));

    Tool {
        name: Cow::Borrowed("list_directory"),
        title: None,
        description: Some(Cow::Borrowed("List entries in a directory")),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: None,
        execution: None,
        icons: None,
        meta: None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let transport = rmcp::transport::io::stdio();
    let service = rmcp::serve_server(FilesystemStub, transport).await?;
    service.waiting().await?;
    Ok(())
}
