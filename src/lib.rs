//! toolmesh: an MCP server that federates tools
//!
//! Tools registered in-process and tools exposed by other MCP endpoints are
//! merged into one catalog and served over JSON-RPC 2.0.
//!
//! # Architecture
//!
//! - **Local tools**: declared with a parameter tree, compiled to JSON
//!   Schema once, validated on every call
//! - **Remote tools**: fetched from other endpoints, namespaced as
//!   `ns/tool`, exposed according to their endpoint's visibility tier
//! - **Sessions**: signed self-verifying tokens by default, or revocable
//!   in-memory sessions
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol implementation

pub mod config;
pub mod error;
pub mod mcp;
