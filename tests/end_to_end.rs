// End-to-end coverage against a real (subprocess) upstream stub, driving
// the fleet/surface/sandbox stack the way `cli::serve::run` wires it up.
// Mirrors spec.md §8's literal scenario list.

use std::collections::HashMap;
use std::sync::Arc;

use mcpman::config::{ServerConfig, Settings};
use mcpman::fleet::{Fleet, InMemoryTokenStore};
use mcpman::runtime::Sandbox;
use mcpman::surface::Surface;
use serde_json::json;

fn fixture_settings() -> Settings {
    let mut servers = HashMap::new();
    servers.insert(
        "filesystem".to_string(),
        ServerConfig::Stdio {
            command: env!("CARGO_BIN_EXE_mcpman-fixture-filesystem").to_string(),
            args: vec![],
            env: HashMap::new(),
            disabled: false,
            timeout_ms: 5_000,
        },
    );
    Settings {
        version: "1.0".to_string(),
        servers,
        logging: Default::default(),
    }
}

async fn connected_stack() -> (Arc<Fleet>, Arc<Surface>, Sandbox) {
    let fleet = Arc::new(Fleet::new(
        fixture_settings(),
        Arc::new(InMemoryTokenStore::default()),
        Arc::new(|_server: &str, _url: &str| {}),
    ));
    fleet.connect_all().await;
    assert_eq!(fleet.get_connected_servers().await, vec!["filesystem".to_string()]);

    let surface = Arc::new(Surface::new(fleet.clone()));
    let sandbox = Sandbox::spawn(surface.clone(), tokio::runtime::Handle::current());
    (fleet, surface, sandbox)
}

/// Scenario 1: a variable set in one `eval` call is visible in the next.
#[tokio::test]
async fn eval_persists_globals_across_calls() {
    let (_fleet, _surface, sandbox) = connected_stack().await;

    let first = sandbox
        .eval("() => { globalThis.x = 42; return x; }".to_string(), json!({}))
        .await
        .unwrap();
    assert_eq!(first.result, json!(42));

    let second = sandbox.eval("() => x + 8".to_string(), json!({})).await.unwrap();
    assert_eq!(second.result, json!(50));
}

/// Scenario 2: the `arg` passed to `eval` becomes the function's argument.
#[tokio::test]
async fn eval_passes_arg_through() {
    let (_fleet, _surface, sandbox) = connected_stack().await;

    let outcome = sandbox
        .eval("(a) => a.value * 2".to_string(), json!({ "value": 21 }))
        .await
        .unwrap();
    assert_eq!(outcome.result, json!(42));
}

/// Scenario 3: a tool call routed through a server proxy reaches the
/// actual upstream tool and its result is usable in the sandbox.
#[tokio::test]
async fn eval_calls_upstream_tool_through_proxy() {
    let (_fleet, _surface, sandbox) = connected_stack().await;

    let outcome = sandbox
        .eval(
            "async () => { const r = await filesystem.list_directory({path: '.'}); return r.length; }".to_string(),
            json!({}),
        )
        .await
        .unwrap();
    assert_eq!(outcome.result, json!(2));
}

/// Scenario 3's underlying content: the stub resolves "." to exactly
/// `["a", "b"]`, and an unrelated path resolves to nothing.
#[tokio::test]
async fn surface_call_tool_reaches_the_configured_upstream() {
    let (_fleet, surface, _sandbox) = connected_stack().await;

    let content = surface
        .call_tool("filesystem", "list_directory", json!({ "path": "." }))
        .await
        .unwrap();
    let text = content[0].as_text().unwrap().text.clone();
    let entries: Vec<String> = serde_json::from_str(&text).unwrap();
    assert_eq!(entries, vec!["a".to_string(), "b".to_string()]);

    let content = surface
        .call_tool("filesystem", "list_directory", json!({ "path": "/nowhere" }))
        .await
        .unwrap();
    let text = content[0].as_text().unwrap().text.clone();
    let entries: Vec<String> = serde_json::from_str(&text).unwrap();
    assert!(entries.is_empty());
}

/// Scenario 4's error half: calling an unconfigured server surfaces
/// `ServerNotConnected`, and the fleet never attempts to resolve a tool
/// against it.
#[tokio::test]
async fn call_tool_on_unknown_server_is_server_not_connected() {
    let (_fleet, surface, _sandbox) = connected_stack().await;

    let err = surface.call_tool("nope", "x", json!({})).await.unwrap_err();
    assert!(matches!(err, mcpman::McpManError::ServerNotConnected(_)));
}

/// `help(server)` renders the camelCase tool binding and the original
/// tool's declared shape.
#[tokio::test]
async fn help_renders_declarations_for_a_connected_server() {
    let (_fleet, surface, _sandbox) = connected_stack().await;

    let markdown = surface.help("filesystem", None).await.unwrap();
    assert!(markdown.contains("listDirectory"));
    assert!(markdown.contains("path"));
}

/// `getTypeDefinitions()` is stable across repeated calls while the
/// fleet's tool set hasn't changed (spec.md §8's idempotence invariant).
#[tokio::test]
async fn type_definitions_are_cached_and_stable() {
    let (_fleet, surface, _sandbox) = connected_stack().await;

    let first = surface.get_type_definitions(None).await;
    let second = surface.get_type_definitions(None).await;
    assert_eq!(first, second);
    assert!(first.contains("filesystem"));
}

/// `eval` on an empty fleet still succeeds for pure arithmetic — no
/// upstream is required for globals-only scripts.
#[tokio::test]
async fn eval_works_without_any_connected_servers() {
    let fleet = Arc::new(Fleet::new(
        Settings {
            version: "1.0".to_string(),
            servers: HashMap::new(),
            logging: Default::default(),
        },
        Arc::new(InMemoryTokenStore::default()),
        Arc::new(|_: &str, _: &str| {}),
    ));
    fleet.connect_all().await;
    let surface = Arc::new(Surface::new(fleet));
    let sandbox = Sandbox::spawn(surface, tokio::runtime::Handle::current());

    let outcome = sandbox.eval("() => 1 + 1".to_string(), json!({})).await.unwrap();
    assert_eq!(outcome.result, json!(2));
}
