// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON-RPC-shaped payload types carried by `mcp/request`, `mcp/response`,
//! and `mcp/proposal` envelopes (spec §6): `method`, `params.name` (for
//! `tools/call`), `params.arguments`, `id`.

use serde_json::Value;

/// Errors raised while parsing or dispatching an `mcp/*` payload.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RpcError {
    /// `method` was missing or not a string.
    #[error("mcp payload is missing a `method` field")]
    MissingMethod,

    /// `method` named something other than `tools/list` or `tools/call`.
    #[error("unsupported mcp method `{method}`")]
    MethodUnsupported {
        /// The offending method name.
        method: String,
    },

    /// `tools/call` was missing `params.name`.
    #[error("tools/call payload is missing `params.name`")]
    MissingToolName,

    /// A required field was absent from the payload.
    #[error("mcp payload is missing `{field}`")]
    MissingField {
        /// Name of the missing field.
        field: String,
    },

    /// `tools/call` named a tool the registry has no entry for.
    #[error("unknown tool `{name}`")]
    UnknownTool {
        /// The requested tool name.
        name: String,
    },

    /// The tool's handler returned an error while executing the call.
    #[error("tool handler failed: {message}")]
    HandlerFailed {
        /// The handler's error message.
        message: String,
    },
}

/// The two methods the tool surface answers, per spec §4.6 / §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolMethod {
    /// List every tool the participant currently offers.
    ToolsList,
    /// Invoke a named tool with arguments.
    ToolsCall,
}

impl ToolMethod {
    /// Parse the `method` field of an `mcp/request` payload.
    pub fn parse(method: &str) -> Result<Self, RpcError> {
        match method {
            "tools/list" => Ok(Self::ToolsList),
            "tools/call" => Ok(Self::ToolsCall),
            other => Err(RpcError::MethodUnsupported {
                method: other.to_string(),
            }),
        }
    }

    /// The wire method name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
        }
    }
}

/// A parsed `tools/call` invocation: `params.name` and `params.arguments`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    /// Tool name being invoked.
    pub name: String,
    /// Arguments passed to the tool, or `Value::Null` if omitted.
    pub arguments: Value,
}

impl ToolCallRequest {
    /// Parse `{method: "tools/call", params: {name, arguments}}` out of a
    /// raw `mcp/request` payload.
    pub fn from_payload(payload: &Value) -> Result<Self, RpcError> {
        let method = payload
            .get("method")
            .and_then(Value::as_str)
            .ok_or(RpcError::MissingMethod)?;
        if ToolMethod::parse(method)? != ToolMethod::ToolsCall {
            return Err(RpcError::MethodUnsupported {
                method: method.to_string(),
            });
        }
        let default_params = Value::Null;
        let params = payload.get("params").unwrap_or(&default_params);
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or(RpcError::MissingToolName)?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        Ok(Self { name, arguments })
    }
}

/// A single tool's manifest entry, as returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ToolDescriptor {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema describing the tool's input shape.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Build the `tools/list` result body: `{tools: [...]}`.
#[must_use]
pub fn tools_list_result(tools: &[ToolDescriptor]) -> Value {
    serde_json::json!({ "tools": tools })
}

/// Build the `tools/call` result body: `{content: ...}`.
#[must_use]
pub fn tools_call_result(content: Value) -> Value {
    serde_json::json!({ "content": content })
}

/// Build an error body for a failed `mcp/request`, in the shape an
/// `mcp/response` payload carries on failure: `{error: {code, message}}`.
#[must_use]
pub fn error_result(err: &RpcError) -> Value {
    serde_json::json!({
        "error": {
            "code": error_code(err),
            "message": err.to_string(),
        }
    })
}

fn error_code(err: &RpcError) -> &'static str {
    match err {
        RpcError::MissingMethod => "missing_method",
        RpcError::MethodUnsupported { .. } => "method_unsupported",
        RpcError::MissingToolName => "missing_tool_name",
        RpcError::MissingField { .. } => "missing_field",
        RpcError::UnknownTool { .. } => "unknown_tool",
        RpcError::HandlerFailed { .. } => "handler_failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_methods() {
        assert_eq!(ToolMethod::parse("tools/list").unwrap(), ToolMethod::ToolsList);
        assert_eq!(ToolMethod::parse("tools/call").unwrap(), ToolMethod::ToolsCall);
    }

    #[test]
    fn rejects_unknown_method() {
        assert!(matches!(
            ToolMethod::parse("tools/delete"),
            Err(RpcError::MethodUnsupported { .. })
        ));
    }

    #[test]
    fn tool_call_request_parses_name_and_arguments() {
        let payload = serde_json::json!({
            "method": "tools/call",
            "params": {"name": "add", "arguments": {"a": 5, "b": 3}},
        });
        let req = ToolCallRequest::from_payload(&payload).unwrap();
        assert_eq!(req.name, "add");
        assert_eq!(req.arguments, serde_json::json!({"a": 5, "b": 3}));
    }

    #[test]
    fn tool_call_request_defaults_arguments_to_null() {
        let payload = serde_json::json!({"method": "tools/call", "params": {"name": "ping"}});
        let req = ToolCallRequest::from_payload(&payload).unwrap();
        assert_eq!(req.arguments, Value::Null);
    }

    #[test]
    fn tool_call_request_rejects_missing_name() {
        let payload = serde_json::json!({"method": "tools/call", "params": {}});
        assert_eq!(
            ToolCallRequest::from_payload(&payload).unwrap_err(),
            RpcError::MissingToolName
        );
    }

    #[test]
    fn tool_call_request_rejects_list_method() {
        let payload = serde_json::json!({"method": "tools/list"});
        assert!(matches!(
            ToolCallRequest::from_payload(&payload).unwrap_err(),
            RpcError::MethodUnsupported { .. }
        ));
    }

    #[test]
    fn error_result_carries_stable_code() {
        let body = error_result(&RpcError::MissingToolName);
        assert_eq!(body["error"]["code"], "missing_tool_name");
    }
}
