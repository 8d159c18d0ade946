// SPDX-License-Identifier: MIT OR Apache-2.0
//! mew-tool
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The MCP-style tool/proposal sub-protocol carried by `mcp/request`,
//! `mcp/response`, and `mcp/proposal` envelopes (§4.6, §6): JSON-RPC-shaped
//! payload parsing, tool manifest types, and the small documented
//! capability-descriptor projection the gateway core logs decisions
//! against (§4.4.2 ¶3).

pub mod descriptor;
pub mod rpc;

pub use descriptor::{capability_descriptor, required_capability_label};
pub use rpc::{
    error_result, tools_call_result, tools_list_result, RpcError, ToolCallRequest, ToolDescriptor,
    ToolMethod,
};
