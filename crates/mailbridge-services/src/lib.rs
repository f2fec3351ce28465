//! Worker-facing services for mailbridge.
//!
//! Provides the MCP client that owns the mailbox worker subprocess:
//! stdout framing, request correlation, process supervision and the
//! [`ToolCaller`](mcp::ToolCaller) seam the channel layer builds on.

pub mod error;
pub mod mcp;
