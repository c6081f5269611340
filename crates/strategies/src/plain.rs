//! The plain single-model strategy: one streamed (or blocking) completion,
//! no reasoning surface. A `ReasoningChunk` is never emitted, whatever the
//! endpoint sends — reasoning deltas are dropped, not forwarded.
//!
//! Covers both the chat configuration (DeepSeek-shaped) and the instruct
//! configuration, whose content stream is guaranteed free of thinking
//! tags — which is exactly why the finalize phase uses the instruct model.

use std::sync::Arc;

use futures_util::StreamExt;

use rl_domain::error::Result;
use rl_domain::message::{ChatMessage, ToolDefinition};
use rl_domain::stream::{BoxStream, StreamEvent};
use rl_providers::{ChatRequest, LlmOptions, LlmProvider};

use crate::{IterationContext, Strategy, StrategyEvent, StrategySettings, StreamingMode};

pub struct PlainChatStrategy {
    name: &'static str,
    provider: Arc<dyn LlmProvider>,
    options: LlmOptions,
    settings: StrategySettings,
}

impl PlainChatStrategy {
    /// The `deepseek_single` configuration.
    pub fn deepseek(provider: Arc<dyn LlmProvider>, settings: StrategySettings) -> Self {
        Self {
            name: "deepseek_single",
            provider,
            options: LlmOptions::default(),
            settings,
        }
    }

    /// The `qwen_single_instruct` configuration.
    pub fn qwen_instruct(provider: Arc<dyn LlmProvider>, settings: StrategySettings) -> Self {
        Self {
            name: "qwen_single_instruct",
            provider,
            options: LlmOptions {
                use_instruct_model: true,
                ..LlmOptions::default()
            },
            settings,
        }
    }

    fn request(&self, messages: Vec<ChatMessage>, tools: Vec<ToolDefinition>) -> ChatRequest {
        ChatRequest {
            messages,
            tools,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            options: self.options,
        }
    }
}

#[async_trait::async_trait]
impl Strategy for PlainChatStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute_iteration(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        ctx: IterationContext,
    ) -> Result<BoxStream<'static, Result<StrategyEvent>>> {
        tracing::debug!(
            strategy = self.name,
            conversation_id = %ctx.conversation_id,
            iteration = ctx.iteration,
            "executing iteration"
        );

        let req = self.request(messages, tools);

        if ctx.streaming_mode == StreamingMode::FinalOnly {
            let msg = self.provider.chat(&req).await?;
            let mut events = Vec::new();

            let has_tools = !msg.tool_calls.is_empty();
            if has_tools {
                events.push(Ok(StrategyEvent::ToolCallsComplete {
                    calls: msg.tool_calls,
                    assistant_content: msg.content.clone().unwrap_or_default(),
                }));
            } else if let Some(content) = msg.content.filter(|c| !c.is_empty()) {
                events.push(Ok(StrategyEvent::FinalResponse {
                    content,
                    tokens_used: msg.tokens_used,
                }));
            }
            events.push(Ok(StrategyEvent::IterationComplete {
                tokens_used: msg.tokens_used,
                should_continue: has_tools,
            }));
            return Ok(Box::pin(futures_util::stream::iter(events)));
        }

        let mut upstream = self.provider.chat_stream(&req).await?;
        let mode = ctx.streaming_mode;
        let strategy_name = self.name;

        let stream = async_stream::stream! {
            let mut content = String::new();
            let mut calls = Vec::new();
            let mut tokens_used = 0u32;

            while let Some(event) = upstream.next().await {
                match event {
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                    Ok(StreamEvent::Token { text }) => {
                        content.push_str(&text);
                        if mode.streams_content() {
                            yield Ok(StrategyEvent::ContentChunk { content: text });
                        }
                    }
                    Ok(StreamEvent::Thinking { text }) => {
                        // Plain strategies have no reasoning surface: a
                        // `ReasoningChunk` is never emitted here, even when
                        // the endpoint turns out to serve an R1-style model
                        // that streams `reasoning_content` deltas.
                        tracing::debug!(
                            strategy = strategy_name,
                            chars = text.len(),
                            "dropping reasoning delta"
                        );
                    }
                    Ok(StreamEvent::ToolCallsReady { calls: ready }) => {
                        calls.extend(ready);
                    }
                    Ok(StreamEvent::Done { tokens_used: t, .. }) => {
                        if let Some(t) = t {
                            tokens_used = t;
                        }
                    }
                }
            }

            let has_tools = !calls.is_empty();
            if has_tools {
                yield Ok(StrategyEvent::ToolCallsComplete {
                    calls,
                    assistant_content: content.clone(),
                });
            } else if !content.is_empty() {
                yield Ok(StrategyEvent::FinalResponse {
                    content,
                    tokens_used,
                });
            }

            yield Ok(StrategyEvent::IterationComplete {
                tokens_used,
                should_continue: has_tools,
            });
        };

        Ok(Box::pin(stream))
    }
}
