// SPDX-License-Identifier: MIT OR Apache-2.0
//! The tool surface a participant offers to its peers: a name-keyed map of
//! callable handlers, answering `mcp/request` with methods `tools/list` and
//! `tools/call`.

use async_trait::async_trait;
use mew_tool::rpc::{error_result, tools_call_result, tools_list_result, RpcError, ToolCallRequest, ToolDescriptor, ToolMethod};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::ParticipantError;

/// A single invocable tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Invoke the tool with the given `tools/call` arguments.
    async fn call(&self, arguments: Value) -> Result<Value, ParticipantError>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, ParticipantError>> + Send,
{
    async fn call(&self, arguments: Value) -> Result<Value, ParticipantError> {
        (self)(arguments).await
    }
}

/// Metadata plus handler for one registered tool.
pub struct ToolSpec {
    /// The tool's `tools/list` manifest entry.
    pub descriptor: ToolDescriptor,
    /// The handler invoked on `tools/call`.
    pub handler: Arc<dyn ToolHandler>,
}

/// A name-keyed registry of [`ToolSpec`]s, answering the `tools/list` and
/// `tools/call` `mcp/request` methods.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Mutex<HashMap<String, Arc<ToolSpec>>>,
}

impl ToolRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any previous entry under the same name.
    pub fn register(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: impl ToolHandler + 'static,
    ) {
        let name = name.into();
        let spec = Arc::new(ToolSpec {
            descriptor: ToolDescriptor {
                name: name.clone(),
                description: description.into(),
                input_schema,
            },
            handler: Arc::new(handler),
        });
        self.tools.lock().expect("tool registry lock poisoned").insert(name, spec);
    }

    /// Remove a tool by name.
    pub fn remove(&self, name: &str) -> bool {
        self.tools.lock().expect("tool registry lock poisoned").remove(name).is_some()
    }

    /// `true` if a tool with the given name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.lock().expect("tool registry lock poisoned").contains_key(name)
    }

    /// Every registered tool's manifest entry, sorted by name for
    /// deterministic `tools/list` output.
    #[must_use]
    pub fn manifest(&self) -> Vec<ToolDescriptor> {
        let tools = self.tools.lock().expect("tool registry lock poisoned");
        let mut names: Vec<&String> = tools.keys().collect();
        names.sort();
        names.into_iter().map(|n| tools[n].descriptor.clone()).collect()
    }

    fn get(&self, name: &str) -> Option<Arc<ToolSpec>> {
        self.tools.lock().expect("tool registry lock poisoned").get(name).cloned()
    }

    /// Dispatch a raw `mcp/request` payload (`{method, params}`) through the
    /// canonical JSON-RPC-shaped parsing in [`mew_tool::rpc`], and return
    /// the JSON-RPC `result` or `error` body to carry back in `mcp/response`.
    pub async fn dispatch(&self, payload: &Value) -> Value {
        let method = match payload.get("method").and_then(Value::as_str) {
            Some(method) => method,
            None => return error_result(&RpcError::MissingMethod),
        };
        match ToolMethod::parse(method) {
            Ok(ToolMethod::ToolsList) => tools_list_result(&self.manifest()),
            Ok(ToolMethod::ToolsCall) => self.dispatch_call(payload).await,
            Err(err) => error_result(&err),
        }
    }

    async fn dispatch_call(&self, payload: &Value) -> Value {
        let request = match ToolCallRequest::from_payload(payload) {
            Ok(request) => request,
            Err(err) => return error_result(&err),
        };
        let Some(spec) = self.get(&request.name) else {
            return error_result(&RpcError::UnknownTool { name: request.name });
        };
        match spec.handler.call(request.arguments).await {
            Ok(result) => tools_call_result(result),
            Err(err) => error_result(&RpcError::HandlerFailed { message: err.to_string() }),
        }
    }
}
