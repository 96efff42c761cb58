// Meta-tool handlers and the process-wide server they're registered on
// (spec.md §4.G / §4.H).

mod format;
mod requests;
mod server;
mod tools;
mod typecheck;

pub use server::{DownstreamPeer, McpManServer};
