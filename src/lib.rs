//! MCPMan: a multiplexing proxy for the Model Context Protocol.
//!
//! Presents a fixed set of meta-tools to a single downstream client while
//! fanning out to many upstream MCP servers, with a persistent JavaScript
//! sandbox for scripting across their combined tool surface.

pub mod cli;
pub mod config;
pub mod error;
pub mod fleet;
pub mod meta;
pub mod normalize;
pub mod runtime;
pub mod schema;
pub mod surface;

pub use error::McpManError;
