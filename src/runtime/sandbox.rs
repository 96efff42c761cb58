// Persistent sandboxed interpreter for client-supplied function
// expressions (spec.md §4.F). Owns a `boa_engine::Context` on a
// dedicated OS thread — `Context` is not `Send`, so every interaction
// crosses a channel rather than moving the engine around.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use boa_engine::{Context, JsError, JsResult, JsValue, NativeFunction, Source, js_string};
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::{McpManError, Result};
use crate::normalize;
use crate::surface::Surface;

const EVAL_TIMEOUT: Duration = Duration::from_secs(30);

/// One executed `eval`: the function's return value plus everything its
/// per-call `console` captured, joined by newlines (spec.md §4.F step 5).
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub result: Value,
    pub output: String,
}

enum Job {
    Eval {
        code: String,
        arg: Value,
        respond: oneshot::Sender<Result<EvalOutcome>>,
    },
    AppendResult {
        value: Value,
        respond: oneshot::Sender<usize>,
    },
}

/// Handle to the background sandbox thread. Cheaply cloned; every clone
/// talks to the same persistent `Context` and the same `$results` log.
#[derive(Clone)]
pub struct Sandbox {
    tx: std_mpsc::Sender<Job>,
}

impl Sandbox {
    /// Spawn the sandbox thread. Construction is cheap; the `Context`
    /// itself is built lazily on the thread's first job, matching
    /// "lazily constructed on first use" in spec.md §4.F.
    pub fn spawn(surface: Arc<Surface>, handle: tokio::runtime::Handle) -> Self {
        let (tx, rx) = std_mpsc::channel::<Job>();
        std::thread::Builder::new()
            .name("mcpman-sandbox".into())
            .spawn(move || run_sandbox_thread(surface, handle, rx))
            .expect("failed to spawn sandbox thread");
        Self { tx }
    }

    /// `eval(code, arg)` per the execution contract in spec.md §4.F.
    /// Enforces the 30s wall-clock timeout at this boundary; the engine
    /// itself has no preemption hook, so a timed-out script keeps running
    /// on the sandbox thread to completion in the background.
    pub async fn eval(&self, code: String, arg: Value) -> Result<EvalOutcome> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(Job::Eval { code, arg, respond })
            .map_err(|_| McpManError::ExecutionError("sandbox thread is gone".into()))?;
        match tokio::time::timeout(EVAL_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpManError::ExecutionError("sandbox thread dropped the response".into())),
            Err(_) => Err(McpManError::TimedOut),
        }
    }

    /// `appendResult(value)`: push to `$results` and return the new index.
    pub async fn append_result(&self, value: Value) -> Result<usize> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(Job::AppendResult { value, respond })
            .map_err(|_| McpManError::ExecutionError("sandbox thread is gone".into()))?;
        rx.await
            .map_err(|_| McpManError::ExecutionError("sandbox thread dropped the response".into()))
    }
}

fn run_sandbox_thread(surface: Arc<Surface>, handle: tokio::runtime::Handle, rx: std_mpsc::Receiver<Job>) {
    let mut context = Context::default();
    let mut results: Vec<Value> = Vec::new();
    install_ambient_globals(&mut context, &surface, &handle);

    while let Ok(job) = rx.recv() {
        match job {
            Job::Eval { code, arg, respond } => {
                refresh_server_bindings(&mut context, &surface, &handle);
                let outcome = eval_once(&mut context, &code, arg);
                let _ = respond.send(outcome);
            }
            Job::AppendResult { value, respond } => {
                results.push(value.clone());
                let index = results.len() - 1;
                set_results_entry(&mut context, index, &value);
                let _ = respond.send(index);
            }
        }
    }
}

/// Bindings that never change across calls: `$results` (starts empty),
/// `listServers`/`listTools`/`help` stay bound to the same native
/// functions across the sandbox's lifetime; only the per-server proxies
/// are refreshed per call (see [`refresh_server_bindings`]).
fn install_ambient_globals(context: &mut Context, surface: &Arc<Surface>, handle: &tokio::runtime::Handle) {
    let results_array = boa_engine::object::builtins::JsArray::new(context);
    context
        .register_global_property(js_string!("$results"), results_array, Attribute::all())
        .expect("failed to register $results");

    {
        let surface = surface.clone();
        let handle = handle.clone();
        let func = unsafe { NativeFunction::from_closure_with_captures(
            move |_this, _args, (surface, handle), ctx| {
                let servers = handle.block_on(surface.list_servers());
                Ok(json_to_js(&Value::from(servers), ctx))
            },
            (surface, handle),
        ) };
        let _ = context.register_global_property(
            js_string!("listServers"),
            func.to_js_function(context.realm()),
            Attribute::all(),
        );
    }

    {
        let surface = surface.clone();
        let handle = handle.clone();
        let func = unsafe { NativeFunction::from_closure_with_captures(
            move |_this, args, (surface, handle), ctx| {
                let server = args.first().and_then(|v| v.as_string()).map(|s| s.to_std_string_escaped());
                let result = handle.block_on(surface.list_tools(server.as_deref()));
                let value = match result {
                    crate::surface::ListToolsResult::Single(names) => Value::from(names),
                    crate::surface::ListToolsResult::ByServer(map) => {
                        serde_json::to_value(map).unwrap_or(Value::Null)
                    }
                };
                Ok(json_to_js(&value, ctx))
            },
            (surface, handle),
        ) };
        let _ = context.register_global_property(
            js_string!("listTools"),
            func.to_js_function(context.realm()),
            Attribute::all(),
        );
    }

    {
        let surface = surface.clone();
        let handle = handle.clone();
        let func = unsafe { NativeFunction::from_closure_with_captures(
            move |_this, args, (surface, handle), ctx| {
                let server = args
                    .first()
                    .and_then(|v| v.as_string())
                    .map(|s| s.to_std_string_escaped())
                    .unwrap_or_default();
                let tool = args
                    .get(1)
                    .and_then(|v| v.as_string())
                    .map(|s| s.to_std_string_escaped());
                let result = handle.block_on(surface.help(&server, tool.as_deref()));
                let value = match result {
                    Ok(markdown) => Value::String(markdown),
                    Err(e) => Value::String(e.to_string()),
                };
                Ok(json_to_js(&value, ctx))
            },
            (surface, handle),
        ) };
        let _ = context.register_global_property(
            js_string!("help"),
            func.to_js_function(context.realm()),
            Attribute::all(),
        );
    }
}

fn set_results_entry(context: &mut Context, index: usize, value: &Value) {
    let Ok(array_value) = context.global_object().get(js_string!("$results"), context) else {
        return;
    };
    if let Some(obj) = array_value.as_object() {
        let js_value = json_to_js(value, context);
        let _ = obj.set(index as u32, js_value, true, context);
    }
}

/// Rebuild the per-server proxy bindings from the fleet's current tool
/// set. Cheap and idempotent; called at the top of every `eval` so a
/// server added mid-process via `install` becomes visible immediately.
fn refresh_server_bindings(context: &mut Context, surface: &Arc<Surface>, handle: &tokio::runtime::Handle) {
    let proxies = handle.block_on(surface.proxies());
    for (server, proxy) in &proxies {
        let mut builder = ObjectInitializer::new(context);
        for tool_name in proxy.tool_names() {
            let camel = normalize::camel(tool_name);
            let surface = surface.clone();
            let server_name = server.clone();
            let tool_name = tool_name.clone();
            let handle = handle.clone();
            let func = unsafe { NativeFunction::from_closure_with_captures(
                move |_this, args, captures, ctx| call_upstream_tool(args, captures, ctx),
                (surface, server_name, tool_name, handle),
            ) };
            builder.function(func, js_string!(camel), 1);
        }
        let proxy_obj = builder.build();
        let _ = context.register_global_property(
            js_string!(server.clone()),
            proxy_obj.clone(),
            Attribute::all(),
        );
        let camel_name = normalize::camel(server);
        if camel_name != *server {
            let _ = context.register_global_property(js_string!(camel_name), proxy_obj, Attribute::all());
        }
    }
}

type ToolCallCaptures = (Arc<Surface>, String, String, tokio::runtime::Handle);

fn call_upstream_tool(
    args: &[JsValue],
    captures: &ToolCallCaptures,
    ctx: &mut Context,
) -> JsResult<JsValue> {
    let (surface, server, tool, handle) = captures;
    let input = match args.first() {
        Some(v) => js_to_json(v, ctx)?,
        None => Value::Object(Default::default()),
    };

    let content = handle
        .block_on(surface.call_tool(server, tool, input))
        .map_err(|e| JsError::from_opaque(js_string!(e.to_string()).into()))?;

    let text = content.iter().find_map(|c| c.as_text().map(|t| t.text.clone()));
    let resolved_value: Value = match &text {
        Some(t) => serde_json::from_str(t).unwrap_or_else(|_| Value::String(t.clone())),
        None => Value::Null,
    };

    let js_value = json_to_js(&resolved_value, ctx);
    if let Some(obj) = js_value.as_object() {
        let text_for_closure = (text.clone(), tool.clone());
        let text_fn = unsafe { NativeFunction::from_closure_with_captures(
            move |_this, _args, (captured_text, tool_name), ctx| match captured_text {
                Some(t) => Ok(js_string!(t.as_str()).into()),
                None => Err(JsError::from_opaque(
                    js_string!(McpManError::NoTextContent(tool_name.clone()).to_string().as_str()).into(),
                )),
            },
            text_for_closure,
        ) };
        let _ = obj.set(
            js_string!("text"),
            text_fn.to_js_function(ctx.realm()),
            false,
            ctx,
        );
        let json_for_closure = resolved_value.clone();
        let json_fn = unsafe { NativeFunction::from_closure_with_captures(
            move |_this, _args, captured, ctx| Ok(json_to_js(captured, ctx)),
            json_for_closure,
        ) };
        let _ = obj.set(
            js_string!("json"),
            json_fn.to_js_function(ctx.realm()),
            false,
            ctx,
        );
    }
    Ok(js_value)
}

/// Evaluate one `eval(code, arg)` call per the execution contract in
/// spec.md §4.F: install a fresh per-call console, run the wrapped
/// function expression, auto-unwrap one level of thenable.
fn eval_once(context: &mut Context, code: &str, arg: Value) -> Result<EvalOutcome> {
    let output = install_call_console(context);

    let arg_js = json_to_js(&arg, context);
    context
        .register_global_property(js_string!("__arg"), arg_js, Attribute::all())
        .map_err(|e| McpManError::ExecutionError(e.to_string()))?;

    let wrapped = format!("(async () => {{ const fn = {code}; return await fn(__arg); }})()");
    let source = Source::from_bytes(wrapped.as_bytes());

    let promise_value = context
        .eval(source)
        .map_err(|e| McpManError::ExecutionError(e.to_string()))?;
    context.run_jobs();

    let resolved = resolve_promise(&promise_value, context)?;
    let result = js_to_json(&resolved, context)
        .map_err(|e| McpManError::ExecutionError(e.to_string()))?;

    let lines = output.lock().unwrap().clone();
    Ok(EvalOutcome {
        result,
        output: lines.join("\n"),
    })
}

/// Unwrap a (possibly-pending, one level of) promise value to its
/// settled value, or surface a rejection as an `ExecutionError`.
fn resolve_promise(value: &JsValue, context: &mut Context) -> Result<JsValue> {
    let Some(promise) = value
        .as_object()
        .and_then(|o| boa_engine::object::builtins::JsPromise::from_object(o.clone()).ok())
    else {
        return Ok(value.clone());
    };

    context.run_jobs();
    match promise.state() {
        boa_engine::builtins::promise::PromiseState::Fulfilled(v) => {
            if v.as_object()
                .and_then(|o| boa_engine::object::builtins::JsPromise::from_object(o.clone()).ok())
                .is_some()
            {
                resolve_promise(&v, context)
            } else {
                Ok(v)
            }
        }
        boa_engine::builtins::promise::PromiseState::Rejected(e) => Err(McpManError::ExecutionError(
            e.display().to_string(),
        )),
        boa_engine::builtins::promise::PromiseState::Pending => {
            Err(McpManError::ExecutionError("promise never settled".into()))
        }
    }
}

/// Swap in a fresh `console` whose `log`/`error`/`warn`/`info` append
/// `[LEVEL] <joined args>` to a shared buffer, returned so the caller
/// can read it back once the call completes.
fn install_call_console(context: &mut Context) -> Arc<std::sync::Mutex<Vec<String>>> {
    let output = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut builder = ObjectInitializer::new(context);
    for level in ["log", "error", "warn", "info"] {
        let buffer = output.clone();
        let level_name = level.to_uppercase();
        let func = unsafe { NativeFunction::from_closure_with_captures(
            move |_this, args, (buffer, level_name), ctx| {
                let joined = args
                    .iter()
                    .map(|a| a.display().to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                buffer
                    .lock()
                    .unwrap()
                    .push(format!("[{level_name}] {joined}"));
                let _ = ctx;
                Ok(JsValue::undefined())
            },
            (buffer, level_name),
        ) };
        builder.function(func, js_string!(level), 0);
    }
    let console_obj = builder.build();
    let _ = context.register_global_property(js_string!("console"), console_obj, Attribute::all());
    output
}

fn json_to_js(value: &Value, context: &mut Context) -> JsValue {
    JsValue::from_json(value, context).unwrap_or(JsValue::null())
}

fn js_to_json(value: &JsValue, context: &mut Context) -> JsResult<Value> {
    value.to_json(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_buffer_collects_joined_levels() {
        let mut context = Context::default();
        let output = install_call_console(&mut context);
        context
            .eval(Source::from_bytes(b"console.log('a', 1); console.warn('b');"))
            .unwrap();
        let lines = output.lock().unwrap().clone();
        assert_eq!(lines, vec!["[LOG] a 1", "[WARN] b"]);
    }

    #[test]
    fn json_round_trips_through_js_values() {
        let mut context = Context::default();
        let value = serde_json::json!({"a": 1, "b": [true, null]});
        let js = json_to_js(&value, &mut context);
        let back = js_to_json(&js, &mut context).unwrap();
        assert_eq!(value, back);
    }
}
