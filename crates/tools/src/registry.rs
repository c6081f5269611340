use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use rl_domain::error::Result;
use rl_domain::message::{ToolCall, ToolDefinition};

use crate::finalize::FINALIZE_TOOL_NAME;

/// One callable tool.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// The schema advertised to the model.
    fn definition(&self) -> ToolDefinition;

    /// Run the tool with already-parsed arguments. Errors here are turned
    /// into `success = false` executions by the registry.
    async fn execute(&self, arguments: &Value) -> Result<String>;
}

/// Outcome of one dispatched tool call.
#[derive(Debug, Clone)]
pub struct ToolExecution {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: String,
    pub success: bool,
    pub error: Option<String>,
}

impl ToolExecution {
    fn failure(call: &ToolCall, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result: error.clone(),
            success: false,
            error: Some(error),
        }
    }
}

/// Tool name → tool. Built once at startup, then read-only.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Registration order, so definitions reach the model deterministically.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// Schemas handed to the provider when building a request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch one tool call. Never errors across this boundary.
    ///
    /// The finalize sentinel is declared so the model learns it exists, but
    /// the registry refuses to run it — the orchestrator intercepts calls
    /// to that name before dispatch ever happens.
    pub async fn execute(&self, call: &ToolCall) -> ToolExecution {
        if call.name == FINALIZE_TOOL_NAME {
            return ToolExecution::failure(
                call,
                "finalize_answer is handled by the orchestrator, not executed as a tool",
            );
        }

        let Some(tool) = self.get(&call.name) else {
            return ToolExecution::failure(call, format!("unknown tool: {}", call.name));
        };

        let arguments: Value = match serde_json::from_str(&call.arguments) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool arguments are not valid JSON");
                return ToolExecution::failure(call, "invalid arguments");
            }
        };

        match tool.execute(&arguments).await {
            Ok(result) => ToolExecution {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                result,
                success: true,
                error: None,
            },
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool execution failed");
                ToolExecution::failure(call, e.to_string())
            }
        }
    }
}
