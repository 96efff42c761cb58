// Input shapes for the six meta-tools (spec.md §6's interface table).

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EvalRequest {
    pub code: String,
    #[serde(default)]
    pub arg: Option<Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InvokeCall {
    pub server: String,
    pub tool: String,
    #[serde(default)]
    pub parameters: Option<Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InvokeRequest {
    pub calls: Vec<InvokeCall>,
    #[serde(default)]
    pub parallel: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CodeRequest {
    pub function_description: String,
    #[serde(default)]
    pub servers: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct HelpRequest {
    pub server: String,
    #[serde(default)]
    pub tool: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListServersRequest {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InstallRequest {
    pub name: String,
    pub transport: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub disabled: Option<bool>,
}
