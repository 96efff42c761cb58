// Type-text generation: per-tool Input/Output interfaces and the
// server object's method signatures (spec.md §4.E "Type text generation").

use std::collections::HashMap;

use crate::fleet::ToolDescriptor;
use crate::normalize;
use crate::schema;

/// Render the full declaration block for one server: an `Input`
/// interface per tool plus a `server` object whose camelCased methods
/// carry those signatures.
pub fn render_server(server: &str, tools: &[ToolDescriptor]) -> String {
    let mut out = String::new();
    for tool in tools {
        out.push_str(&render_tool_interfaces(server, tool));
        out.push('\n');
    }
    out.push_str(&render_server_object(server, tools));
    out.push('\n');
    out
}

fn interface_name(server: &str, tool: &str) -> String {
    format!("{}{}", normalize::pascal(server), normalize::pascal(tool))
}

fn render_tool_interfaces(server: &str, tool: &ToolDescriptor) -> String {
    let compiled = schema::compile(&tool.input_schema);
    let name = interface_name(server, &tool.name);
    format!(
        "interface {name}Input {}\ninterface {name}Output {{ content: unknown[]; text(): Promise<string>; json(): Promise<unknown>; }}\n",
        schema::type_text(&compiled),
    )
}

fn render_server_object(server: &str, tools: &[ToolDescriptor]) -> String {
    let methods: Vec<String> = tools
        .iter()
        .map(|t| {
            let camel = normalize::camel(&t.name);
            let name = interface_name(server, &t.name);
            format!("  {camel}(input: {name}Input): Promise<{name}Output>;")
        })
        .collect();
    format!(
        "declare const {}: {{\n{}\n}};\n",
        normalize::camel(server),
        methods.join("\n")
    )
}

/// Declarations that are always present regardless of which servers are
/// in scope (spec.md §4.E "Appended: ambient declarations").
pub const AMBIENT_DECLARATIONS: &str = "declare function listServers(): string[];\n\
declare function listTools(server?: string): string[] | Record<string, string[]>;\n\
declare function help(server: string, tool?: string): Promise<unknown>;\n\
declare const $results: unknown[];\n";

/// Full type text for a set of `(server, tools)` pairs, in the caller's
/// iteration order (the cache in [`crate::surface`] is responsible for
/// ordering deterministically before calling this).
pub fn render_all<'a>(servers: impl Iterator<Item = (&'a String, &'a Vec<ToolDescriptor>)>) -> String {
    let mut out = String::new();
    for (server, tools) in servers {
        out.push_str(&render_server(server, tools));
    }
    out.push_str(AMBIENT_DECLARATIONS);
    out
}

/// The lightweight `- server.tool: description` counterpart to
/// [`render_all`] (spec.md §4.E `getToolDescriptions`).
pub fn render_descriptions<'a>(
    servers: impl Iterator<Item = (&'a String, &'a Vec<ToolDescriptor>)>,
) -> String {
    let mut lines = Vec::new();
    for (server, tools) in servers {
        for tool in tools {
            let desc = tool.description.as_deref().unwrap_or("(no description)");
            lines.push(format!("- {server}.{}: {desc}", tool.name));
        }
    }
    lines.join("\n")
}

/// The deterministic signature §3 defines: sorted `server.tool:schemaJSON`
/// entries concatenated. Two tool sets with the same signature are
/// considered to generate identical type text.
pub fn signature(all_tools: &HashMap<String, Vec<ToolDescriptor>>) -> String {
    let mut entries: Vec<String> = all_tools
        .iter()
        .flat_map(|(server, tools)| {
            tools.iter().map(move |t| {
                format!("{server}.{}:{}", t.name, t.input_schema)
            })
        })
        .collect();
    entries.sort();
    entries.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tools() -> HashMap<String, Vec<ToolDescriptor>> {
        HashMap::from([(
            "filesystem".to_string(),
            vec![ToolDescriptor {
                name: "list_directory".to_string(),
                description: Some("lists a directory".to_string()),
                input_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
            }],
        )])
    }

    #[test]
    fn render_all_includes_camel_method_and_ambient_declarations() {
        let tools = tools();
        let text = render_all(tools.iter());
        assert!(text.contains("listDirectory(input: FilesystemListDirectoryInput)"));
        assert!(text.contains("path: string"));
        assert!(text.contains("declare const $results: unknown[];"));
    }

    #[test]
    fn descriptions_are_one_line_per_tool() {
        let tools = tools();
        let text = render_descriptions(tools.iter());
        assert_eq!(text, "- filesystem.list_directory: lists a directory");
    }

    #[test]
    fn signature_is_order_independent() {
        let tools = tools();
        let sig_a = signature(&tools);
        let sig_b = signature(&tools);
        assert_eq!(sig_a, sig_b);
    }
}
