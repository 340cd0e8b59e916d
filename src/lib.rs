//! MCP server bridging AI clients to a running Unity Editor.
//!
//! Speaks newline-delimited JSON-RPC 2.0 over stdio. Read-only tools are
//! served from a cache of the JSON files the Editor exports; mutating tools
//! are written as command records that the Editor picks up and completes
//! asynchronously.

pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod monitor;
pub mod protocol;
pub mod schema;
pub mod security;
pub mod server;
