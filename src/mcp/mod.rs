//! Model Context Protocol (MCP) server and client.
//!
//! Local tools and tools of remote MCP endpoints are merged into one catalog
//! and served over stdio or HTTP using JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          toolmesh                             │
//! │                                                               │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────────┐   │
//! │   │  Transport  │───▶│ Dispatcher  │───▶│   Federation    │   │
//! │   │ (stdio/http)│    │ (envelope,  │    │ (routing, cache)│   │
//! │   └─────────────┘    │  version,   │    └────────┬────────┘   │
//! │                      │  session)   │        ┌────┴─────┐      │
//! │                      └──────┬──────┘        ▼          ▼      │
//! │                             │         ┌──────────┐ ┌────────┐ │
//! │                             ▼         │ Registry │ │ Remote │ │
//! │                      ┌─────────────┐  │ (local)  │ │ client │ │
//! │                      │  Sessions   │  └──────────┘ └────────┘ │
//! │                      └─────────────┘                          │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! Revisions 2024-11-05, 2025-03-26 and 2025-06-18 are understood; see
//! [`protocol`] for how a version is chosen.

pub mod auth;
pub mod dispatcher;
pub mod federation;
pub mod protocol;
pub mod registry;
pub mod remote;
pub mod schema;
pub mod session;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use federation::{Federation, Visibility};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION_LATEST};
pub use registry::{Arguments, CallScope, ToolCallResult, ToolHandler};
pub use transport::StdioTransport;
