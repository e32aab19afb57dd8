//! Host transports carrying protocol messages to the dispatcher.
//!
//! - [`stdio`]: newline-delimited JSON-RPC over stdin/stdout
//! - [`http`]: streamable HTTP, one message per `POST`

pub mod http;
pub mod stdio;

pub use stdio::StdioTransport;
