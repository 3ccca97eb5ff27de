//! Library half of the gateway binary: the HTTP router, the stdio JSON-RPC
//! bridge, shared state, and the tool registry all live here so integration
//! tests (`tests/`) can drive them directly without spawning a process.

pub mod http;
pub mod mcp_bridge;
pub mod state;
pub mod tools;
