//! MCP surface for model-relay.
//!
//! The binary reads JSON-RPC requests from stdin and answers on stdout. Each configured
//! backend becomes one MCP tool; calling it runs a single gateway call from
//! `model-relay-forward` and hands the text (or `Error: ...` text) back to the client.

pub mod handler;
pub mod logging;
pub mod stdio;
pub mod tools;
