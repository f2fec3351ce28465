//! Scripted [`ToolCaller`] for mailbox and poller tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use mailbridge_services::error::{Result, ServiceError};
use mailbridge_services::mcp::ToolCaller;

/// Returns queued results per tool name and records every call.
///
/// A tool with an empty queue answers with a transport error.
#[derive(Default)]
pub(crate) struct ScriptedCaller {
    responses: Mutex<HashMap<String, VecDeque<Result<Value>>>>,
    calls: Mutex<Vec<(String, Value)>>,
    shutdowns: AtomicUsize,
}

impl ScriptedCaller {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a plain-text result for `tool`.
    pub(crate) async fn push_text(&self, tool: &str, text: &str) {
        self.push(tool, Ok(text_result(text))).await;
    }

    pub(crate) async fn push(&self, tool: &str, result: Result<Value>) {
        self.responses
            .lock()
            .await
            .entry(tool.to_string())
            .or_default()
            .push_back(result);
    }

    pub(crate) async fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().await.clone()
    }

    pub(crate) async fn calls_to(&self, tool: &str) -> Vec<Value> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|(name, _)| name == tool)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub(crate) fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolCaller for ScriptedCaller {
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        self.calls
            .lock()
            .await
            .push((name.to_string(), arguments));
        self.responses
            .lock()
            .await
            .get_mut(name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(ServiceError::Transport(format!("no scripted result for {name}"))))
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// MCP tool result carrying one text fragment.
pub(crate) fn text_result(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}
