//! OpenAI-compatible chat-completions adapter.
//!
//! Covers every endpoint this system talks to: the Qwen service hosting
//! the thinking and instruct models, and the DeepSeek-style chat model.
//! Reasoning arrives either on the dedicated `reasoning_content` field
//! (surfaced as [`StreamEvent::Thinking`]) or embedded in the content
//! stream, in which case the thinking strategy recovers the split.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use rl_domain::config::{DeepseekConfig, LlmConfig, QwenConfig};
use rl_domain::error::{Error, Result};
use rl_domain::message::{ChatMessage, Role, ToolCall, ToolDefinition};
use rl_domain::stream::{BoxStream, ProviderInfo, ProviderMessage, StreamEvent};

use crate::sse::{decode_sse_response, SseParser};
use crate::traits::{ChatRequest, LlmProvider};
use crate::util::{backoff_delay, from_reqwest, retryable_status};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Model ids one endpoint serves. The request's [`crate::LlmOptions`]
/// select between them; `default` is used when neither switch is set.
#[derive(Debug, Clone)]
struct ModelTable {
    default: String,
    thinking: Option<String>,
    instruct: Option<String>,
}

/// An adapter for any OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    models: ModelTable,
    max_retries: u32,
    info: ProviderInfo,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// The Qwen endpoint: one base URL serving a thinking and an instruct
    /// model, selected per request.
    pub fn qwen(cfg: &QwenConfig, llm: &LlmConfig) -> Result<Self> {
        Self::build(
            "qwen",
            &cfg.base_url,
            cfg.api_key.clone(),
            ModelTable {
                default: cfg.instruct_model.clone(),
                thinking: Some(cfg.thinking_model.clone()),
                instruct: Some(cfg.instruct_model.clone()),
            },
            llm,
            // reasoning_content deltas are produced by the thinking model
            true,
        )
    }

    /// The DeepSeek-style chat endpoint (single model, no reasoning surface).
    pub fn deepseek(cfg: &DeepseekConfig, llm: &LlmConfig) -> Result<Self> {
        Self::build(
            "deepseek",
            &cfg.base_url,
            cfg.api_key.clone(),
            ModelTable {
                default: cfg.model.clone(),
                thinking: None,
                instruct: None,
            },
            llm,
            false,
        )
    }

    fn build(
        name: &str,
        base_url: &str,
        api_key: Option<String>,
        models: ModelTable,
        llm: &LlmConfig,
        supports_reasoning_stream: bool,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(llm.request_timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            name: name.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            models,
            max_retries: llm.max_retries,
            info: ProviderInfo {
                name: name.to_owned(),
                supports_streaming: true,
                supports_reasoning_stream,
                supports_tool_calling: true,
            },
            client,
        })
    }

    // ── Request building ──────────────────────────────────────────

    fn effective_model(&self, req: &ChatRequest) -> &str {
        if req.options.use_thinking_model {
            if let Some(m) = &self.models.thinking {
                return m;
            }
        }
        if req.options.use_instruct_model {
            if let Some(m) = &self.models.instruct {
                return m;
            }
        }
        &self.models.default
    }

    fn build_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_wire).collect();

        let mut body = serde_json::json!({
            "model": self.effective_model(req),
            "messages": messages,
            "stream": stream,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_wire).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if req.options.enable_thinking {
            body["enable_thinking"] = Value::Bool(true);
        }
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        body
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// POST with the retry budget applied to transport failures and 5xx.
    /// A response that arrived — even an error one — is never replayed
    /// once its status is below 500.
    async fn post_with_retry(&self, body: &Value) -> Result<reqwest::Response> {
        let url = self.chat_url();
        let mut attempt = 0u32;

        loop {
            let mut rb = self
                .client
                .post(&url)
                .header("Content-Type", "application/json");
            if let Some(key) = &self.api_key {
                rb = rb.header("Authorization", format!("Bearer {key}"));
            }

            let outcome = rb.json(body).send().await;
            match outcome {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if retryable_status(resp.status()) && attempt < self.max_retries => {
                    tracing::warn!(
                        provider = %self.name,
                        status = resp.status().as_u16(),
                        attempt,
                        "upstream 5xx, retrying"
                    );
                }
                Ok(resp) => {
                    let status = resp.status();
                    let detail = resp.text().await.unwrap_or_default();
                    return Err(Error::Provider {
                        provider: self.name.clone(),
                        message: format!("HTTP {} - {}", status.as_u16(), detail),
                    });
                }
                Err(e) if e.is_timeout() => return Err(from_reqwest(e)),
                Err(e) if attempt < self.max_retries => {
                    tracing::warn!(provider = %self.name, error = %e, attempt, "transport error, retrying");
                }
                Err(e) => return Err(from_reqwest(e)),
            }

            tokio::time::sleep(backoff_delay(attempt)).await;
            attempt += 1;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_wire(msg: &ChatMessage) -> Value {
    match msg.role {
        Role::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.as_deref().unwrap_or(""),
            "content": msg.content,
        }),
        Role::Assistant if !msg.tool_calls.is_empty() => {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "type": "function",
                        "function": { "name": tc.name, "arguments": tc.arguments },
                    })
                })
                .collect();
            let content = if msg.content.is_empty() {
                Value::Null
            } else {
                Value::String(msg.content.clone())
            };
            serde_json::json!({
                "role": "assistant",
                "content": content,
                "tool_calls": calls,
            })
        }
        role => serde_json::json!({
            "role": role.as_str(),
            "content": msg.content,
        }),
    }
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Blocking response parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(provider: &str, body: &Value) -> Result<ProviderMessage> {
    let message = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| Error::Provider {
            provider: provider.to_owned(),
            message: "response has no choices[0].message".into(),
        })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from);

    let reasoning_content = message
        .get("reasoning_content")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from);

    let tool_calls = message
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    let func = tc.get("function")?;
                    Some(ToolCall {
                        id: tc.get("id")?.as_str()?.to_owned(),
                        name: func.get("name")?.as_str()?.to_owned(),
                        // Raw JSON text, preserved verbatim.
                        arguments: func
                            .get("arguments")
                            .and_then(|v| v.as_str())
                            .unwrap_or("{}")
                            .to_owned(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let tokens_used = total_tokens(body.get("usage")).unwrap_or(0);

    Ok(ProviderMessage {
        content,
        reasoning_content,
        tool_calls,
        tokens_used,
    })
}

fn total_tokens(usage: Option<&Value>) -> Option<u32> {
    usage?.get("total_tokens")?.as_u64().map(|n| n as u32)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Frame parser for one streaming completion.
///
/// Tool-call argument fragments are concatenated per tool-call index and
/// surfaced as one [`StreamEvent::ToolCallsReady`] when `finish_reason`
/// arrives (or when the body ends without one — implicit completion).
struct ChunkParser {
    pending: BTreeMap<u64, PartialCall>,
    flushed: bool,
}

impl ChunkParser {
    fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            flushed: false,
        }
    }

    /// Drain the assembled calls, dropping fragments that never got a name
    /// (nothing could be dispatched for them).
    fn take_calls(&mut self) -> Vec<ToolCall> {
        self.flushed = true;
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_values()
            .enumerate()
            .filter_map(|(i, pc)| {
                if pc.name.is_empty() {
                    tracing::warn!(call_id = %pc.id, "dropping tool call with no name");
                    return None;
                }
                let id = if pc.id.is_empty() {
                    format!("call_{i}")
                } else {
                    pc.id
                };
                let arguments = if pc.arguments.trim().is_empty() {
                    "{}".to_owned()
                } else {
                    pc.arguments
                };
                Some(ToolCall {
                    id,
                    name: pc.name,
                    arguments,
                })
            })
            .collect()
    }

    fn absorb_tool_deltas(&mut self, deltas: &[Value]) {
        for tc in deltas {
            let index = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            let slot = self.pending.entry(index).or_default();

            if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                slot.id = id.to_owned();
            }
            if let Some(func) = tc.get("function") {
                if let Some(name) = func.get("name").and_then(|v| v.as_str()) {
                    if !name.is_empty() {
                        slot.name = name.to_owned();
                    }
                }
                if let Some(args) = func.get("arguments").and_then(|v| v.as_str()) {
                    slot.arguments.push_str(args);
                }
            }
        }
    }
}

impl SseParser for ChunkParser {
    fn data(&mut self, payload: &str) -> Vec<rl_domain::error::Result<StreamEvent>> {
        if payload == "[DONE]" {
            let mut events = Vec::new();
            if !self.pending.is_empty() {
                let calls = self.take_calls();
                if !calls.is_empty() {
                    events.push(Ok(StreamEvent::ToolCallsReady { calls }));
                }
            }
            events.push(Ok(StreamEvent::Done {
                tokens_used: None,
                finish_reason: Some("stop".into()),
            }));
            return events;
        }

        let v: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => return vec![Err(Error::Json(e))],
        };

        let choice = v
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first());

        // Usage-only chunk (stream_options.include_usage).
        let Some(choice) = choice else {
            if let Some(tokens) = total_tokens(v.get("usage")) {
                return vec![Ok(StreamEvent::Done {
                    tokens_used: Some(tokens),
                    finish_reason: None,
                })];
            }
            return Vec::new();
        };

        let mut events = Vec::new();
        let delta = choice.get("delta").unwrap_or(&Value::Null);

        if let Some(text) = delta.get("reasoning_content").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                events.push(Ok(StreamEvent::Thinking {
                    text: text.to_owned(),
                }));
            }
        }

        if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                events.push(Ok(StreamEvent::Token {
                    text: text.to_owned(),
                }));
            }
        }

        if let Some(deltas) = delta.get("tool_calls").and_then(|v| v.as_array()) {
            self.absorb_tool_deltas(deltas);
        }

        if let Some(reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
            let calls = self.take_calls();
            if !calls.is_empty() {
                events.push(Ok(StreamEvent::ToolCallsReady { calls }));
            }
            events.push(Ok(StreamEvent::Done {
                tokens_used: total_tokens(v.get("usage")),
                finish_reason: Some(reason.to_owned()),
            }));
        }

        events
    }

    fn finish(&mut self) -> Vec<rl_domain::error::Result<StreamEvent>> {
        // Implicit completion: the body ended without a finish_reason.
        if self.flushed || self.pending.is_empty() {
            return Vec::new();
        }
        let calls = self.take_calls();
        if calls.is_empty() {
            Vec::new()
        } else {
            vec![Ok(StreamEvent::ToolCallsReady { calls })]
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ProviderMessage> {
        let body = self.build_body(req, false);
        tracing::debug!(provider = %self.name, model = %self.effective_model(req), "chat request");

        let resp = self.post_with_retry(&body).await?;
        let text = resp.text().await.map_err(from_reqwest)?;
        let json: Value = serde_json::from_str(&text)?;
        parse_chat_response(&self.name, &json)
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let body = self.build_body(req, true);
        tracing::debug!(provider = %self.name, model = %self.effective_model(req), "stream request");

        let resp = self.post_with_retry(&body).await?;
        Ok(decode_sse_response(resp, ChunkParser::new()))
    }

    fn info(&self) -> &ProviderInfo {
        &self.info
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
