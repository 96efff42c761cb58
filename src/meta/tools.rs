// The fixed set of six meta-tools exposed to the downstream client
// (spec.md §4.G).

use std::sync::Arc;

use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content};
use rmcp::{ErrorData, tool, tool_router};
use serde_json::{Value, json};
use sha1::{Digest, Sha1};

use crate::config::ServerConfig;
use crate::error::McpManError;
use crate::fleet::{Fleet, ToolDescriptor};
use crate::meta::format::format_result_line;
use crate::meta::requests::*;
use crate::meta::server::McpManServer;
use crate::meta::typecheck;
use crate::runtime::Sandbox;
use crate::schema;
use crate::surface::Surface;

fn ok_text(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

fn err_text(text: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(text.into())])
}

#[tool_router(vis = "pub")]
impl McpManServer {
    #[tool(description = "List connected upstream servers and their tools as JSON.")]
    async fn list_servers(&self) -> Result<CallToolResult, ErrorData> {
        self.wait_until_initialized().await;
        let all = self.fleet.get_all_tools().await;
        let configured = self.fleet.get_configured_servers().await;
        let connected: std::collections::HashSet<_> = all.keys().cloned().collect();
        let mut map = serde_json::Map::new();
        for name in configured {
            let tools = all.get(&name).cloned().unwrap_or_default();
            map.insert(
                name.clone(),
                json!({
                    "connected": connected.contains(&name),
                    "toolCount": tools.len(),
                    "tools": tools.iter().map(tool_descriptor_json).collect::<Vec<_>>(),
                }),
            );
        }
        Ok(ok_text(serde_json::to_string_pretty(&map).unwrap_or_default()))
    }

    #[tool(description = "Return generated TypeScript-flavored declarations for a server's tools, or one tool's signature.")]
    async fn help(
        &self,
        Parameters(req): Parameters<HelpRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.wait_until_initialized().await;
        match self.surface.help(&req.server, req.tool.as_deref()).await {
            Ok(markdown) => Ok(ok_text(markdown)),
            Err(e) => Ok(err_text(e.to_tool_text())),
        }
    }

    #[tool(description = "Execute a JavaScript function expression in the persistent sandbox. \
        `code` must be a zero- or one-argument function expression; `arg` becomes its argument.")]
    async fn eval(
        &self,
        Parameters(req): Parameters<EvalRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.wait_until_initialized().await;
        Ok(run_eval(&self.surface, &self.sandbox, &req.code, req.arg.unwrap_or(json!({}))).await)
    }

    #[tool(description = "Call one or more upstream tools directly by server/tool name, \
        validating each call's parameters against the tool's schema.")]
    async fn invoke(
        &self,
        Parameters(req): Parameters<InvokeRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.wait_until_initialized().await;
        let records = run_invoke(&self.fleet, &self.sandbox, req.calls, req.parallel).await;
        Ok(CallToolResult::success(
            records.into_iter().map(Content::text).collect(),
        ))
    }

    #[tool(description = "Generate and execute JavaScript against the current tool surface \
        from a natural-language description of the desired function.")]
    async fn code(
        &self,
        Parameters(req): Parameters<CodeRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.wait_until_initialized().await;
        Ok(run_code(&self.surface, &self.sandbox, &req.function_description, req.servers.as_deref()).await)
    }

    #[tool(description = "Register a new upstream server and attempt to connect it.")]
    async fn install(
        &self,
        Parameters(req): Parameters<InstallRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.wait_until_initialized().await;
        Ok(run_install(&self.fleet, req).await)
    }
}

fn tool_descriptor_json(t: &ToolDescriptor) -> Value {
    json!({
        "name": t.name,
        "description": t.description,
        "inputSchema": t.input_schema,
    })
}

async fn run_eval(surface: &Surface, sandbox: &Sandbox, code: &str, arg: Value) -> CallToolResult {
    // The type text itself isn't consulted by the structural check below
    // (see typecheck::check's doc comment); fetching it here still keeps
    // its cache warm for a following `help` call.
    let _ = surface.get_type_definitions(None).await;
    if let Err(e) = typecheck::check(code) {
        return err_text(render_type_check_error(&e));
    }

    let outcome = match sandbox.eval(code.to_string(), arg).await {
        Ok(o) => o,
        Err(e) => return err_text(e.to_tool_text()),
    };

    let combined = if outcome.output.is_empty() {
        outcome.result
    } else {
        json!({ "result": outcome.result, "output": outcome.output })
    };

    let index = match sandbox.append_result(combined.clone()).await {
        Ok(i) => i,
        Err(e) => return err_text(e.to_tool_text()),
    };

    ok_text(format_result_line(index, "eval", &combined))
}

fn render_type_check_error(e: &McpManError) -> String {
    if let McpManError::TypeCheckFailed {
        line,
        column,
        message,
    } = e
    {
        format!("Line {line}, Column {column}: {message}")
    } else {
        e.to_tool_text()
    }
}

async fn run_invoke(
    fleet: &Arc<Fleet>,
    sandbox: &Sandbox,
    calls: Vec<InvokeCall>,
    parallel: bool,
) -> Vec<String> {
    if calls.is_empty() {
        return Vec::new();
    }

    if !parallel {
        let mut records = Vec::with_capacity(calls.len());
        for call in calls {
            match invoke_one(fleet, sandbox, call).await {
                Ok(line) => records.push(line),
                Err(line) => {
                    records.push(line);
                    break;
                }
            }
        }
        records
    } else {
        let mut set = tokio::task::JoinSet::new();
        for (index, call) in calls.into_iter().enumerate() {
            let fleet = fleet.clone();
            let sandbox = sandbox.clone();
            set.spawn(async move {
                let line = match invoke_one(&fleet, &sandbox, call).await {
                    Ok(line) => line,
                    Err(line) => line,
                };
                (index, line)
            });
        }
        let mut slots: Vec<Option<String>> = vec![None; set.len()];
        while let Some(joined) = set.join_next().await {
            if let Ok((index, line)) = joined {
                slots[index] = Some(line);
            }
        }
        slots.into_iter().flatten().collect()
    }
}

async fn invoke_one(
    fleet: &Arc<Fleet>,
    sandbox: &Sandbox,
    call: InvokeCall,
) -> Result<String, String> {
    let all = fleet.get_all_tools().await;
    let Some(tools) = all.get(&call.server) else {
        return Err(format!("Server '{}' not found", call.server));
    };

    let descriptor = tools
        .iter()
        .find(|t| crate::normalize::resolve(&call.tool, std::slice::from_ref(&t.name)).is_some())
        .ok_or_else(|| format!("Tool '{}' not found on '{}'", call.tool, call.server))?;

    let compiled = schema::compile(&descriptor.input_schema);
    let parameters = call.parameters.unwrap_or(json!({}));
    if let Err(e) = schema::validate(&parameters, &compiled) {
        return Err(e.to_string());
    }

    let content = fleet
        .call_tool(&call.server, &descriptor.name, parameters)
        .await
        .map_err(|e| e.to_tool_text())?;

    let text = content.iter().find_map(|c| c.as_text().map(|t| t.text.clone()));
    let value: Value = match &text {
        Some(t) => serde_json::from_str(t).unwrap_or_else(|_| Value::String(t.clone())),
        None => Value::Null,
    };

    let index = sandbox
        .append_result(value.clone())
        .await
        .map_err(|e| e.to_tool_text())?;

    Ok(format_result_line(
        index,
        &format!("invoke {}.{}", call.server, call.tool),
        &value,
    ))
}

async fn run_code(
    surface: &Surface,
    sandbox: &Sandbox,
    function_description: &str,
    servers: Option<&[String]>,
) -> CallToolResult {
    let type_text = surface.get_type_definitions(servers).await;
    if let Err(e) = typecheck::check(&format!("() => {{ {type_text} return null; }}")) {
        return err_text(format!(
            "internal type surface bug: {}",
            render_type_check_error(&e)
        ));
    }

    let mut last_error = String::new();
    for _attempt in 1..=3u32 {
        let code = match generate_code(function_description) {
            Ok(code) => code,
            Err(e) => return err_text(e.to_tool_text()),
        };
        match typecheck::check(&code) {
            Ok(()) => {
                let outcome = match sandbox.eval(code.clone(), json!({})).await {
                    Ok(o) => o,
                    Err(e) => return err_text(e.to_tool_text()),
                };
                let combined = if outcome.output.is_empty() {
                    outcome.result
                } else {
                    json!({ "result": outcome.result, "output": outcome.output })
                };
                let index = match sandbox.append_result(combined.clone()).await {
                    Ok(i) => i,
                    Err(e) => return err_text(e.to_tool_text()),
                };
                return ok_text(format!(
                    "// Generated code:\n{code}\n// Execution result:\n{}",
                    format_result_line(index, "code", &combined)
                ));
            }
            Err(e) => last_error = render_type_check_error(&e),
        }
    }

    err_text(
        McpManError::CodeGenExhausted {
            attempts: 3,
            last_error,
        }
        .to_tool_text(),
    )
}

/// Obtain generated code for `function_description`. The only supported
/// path in this build is the deterministic test stub (spec.md §6
/// `MCPMAN_TEST_LLM_RESPONSE_DIR`); sampling over the downstream MCP
/// connection and the subordinate-agent fallback are out of scope here
/// (see DESIGN.md).
fn generate_code(function_description: &str) -> Result<String, McpManError> {
    let dir = std::env::var("MCPMAN_TEST_LLM_RESPONSE_DIR").map_err(|_| {
        McpManError::ExecutionError(
            "no code generation backend configured (set MCPMAN_TEST_LLM_RESPONSE_DIR)".into(),
        )
    })?;
    let mut hasher = Sha1::new();
    hasher.update(function_description.as_bytes());
    let hash = to_hex(&hasher.finalize());
    let path = std::path::Path::new(&dir).join(format!("response-{hash}.txt"));
    std::fs::read_to_string(&path).map_err(|_| {
        McpManError::ExecutionError(format!(
            "expected code generation response at {} (sha1 of function description: {hash})",
            path.display()
        ))
    })
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

async fn run_install(fleet: &Arc<Fleet>, req: InstallRequest) -> CallToolResult {
    if !ServerConfig::valid_name(&req.name) {
        return err_text(format!(
            "invalid server name '{}': must match [A-Za-z0-9_-]+",
            req.name
        ));
    }

    let config = match req.transport.as_str() {
        "stdio" => {
            let Some(command) = req.command else {
                return err_text("stdio transport requires 'command'");
            };
            ServerConfig::Stdio {
                command,
                args: req.args.unwrap_or_default(),
                env: req.env.unwrap_or_default(),
                disabled: req.disabled.unwrap_or(false),
                timeout_ms: 30_000,
            }
        }
        "http" => {
            let Some(url) = req.url else {
                return err_text("http transport requires 'url'");
            };
            ServerConfig::Http {
                url,
                headers: req.headers.unwrap_or_default(),
                disabled: req.disabled.unwrap_or(false),
                timeout_ms: 30_000,
                oauth: None,
            }
        }
        other => return err_text(format!("unknown transport '{other}'")),
    };

    match fleet.add_server(&req.name, config).await {
        Ok(()) => {
            let connected = fleet.get_connected_servers().await.contains(&req.name);
            ok_text(format!(
                "server '{}' installed; connected: {connected}",
                req.name
            ))
        }
        Err(e) => err_text(e.to_tool_text()),
    }
}
