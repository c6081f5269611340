//! The default strategy: Qwen's thinking model with inline reasoning.
//!
//! Reasoning reaches us two ways at once: a native `reasoning_content`
//! delta when the serving layer extracts it, and `<think>…</think>` text
//! embedded in the content stream when it does not. Both surface as
//! `ReasoningChunk`s; only cleaned answer text ever reaches `ContentChunk`
//! or the final response.

use std::sync::Arc;

use futures_util::StreamExt;

use rl_domain::error::Result;
use rl_domain::message::{ChatMessage, ToolDefinition};
use rl_domain::stream::{BoxStream, StreamEvent};
use rl_providers::{ChatRequest, LlmOptions, LlmProvider};

use crate::parser::{split_reasoning, ThinkingTagParser};
use crate::{
    IterationContext, ReasoningSource, Strategy, StrategyEvent, StrategySettings, StreamingMode,
};

pub struct ThinkingStrategy {
    provider: Arc<dyn LlmProvider>,
    settings: StrategySettings,
}

impl ThinkingStrategy {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: StrategySettings) -> Self {
        Self { provider, settings }
    }

    fn request(&self, messages: Vec<ChatMessage>, tools: Vec<ToolDefinition>) -> ChatRequest {
        ChatRequest {
            messages,
            tools,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            options: LlmOptions {
                use_thinking_model: true,
                enable_thinking: true,
                ..LlmOptions::default()
            },
        }
    }
}

#[async_trait::async_trait]
impl Strategy for ThinkingStrategy {
    fn name(&self) -> &'static str {
        "qwen_single_thinking"
    }

    async fn execute_iteration(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        ctx: IterationContext,
    ) -> Result<BoxStream<'static, Result<StrategyEvent>>> {
        tracing::debug!(
            strategy = self.name(),
            conversation_id = %ctx.conversation_id,
            iteration = ctx.iteration,
            max_iterations = ctx.max_iterations,
            "executing iteration"
        );

        let req = self.request(messages, tools);

        if ctx.streaming_mode == StreamingMode::FinalOnly {
            return self.blocking_iteration(&req).await;
        }

        let mut upstream = self.provider.chat_stream(&req).await?;
        let mode = ctx.streaming_mode;
        let show_reasoning = self.settings.show_reasoning;

        let stream = async_stream::stream! {
            yield Ok(StrategyEvent::StatusUpdate {
                status: "Qwen model thinking...".into(),
                phase: "planning".into(),
            });

            let mut parser = ThinkingTagParser::new();
            let mut cleaned = String::new();
            let mut calls = Vec::new();
            let mut tokens_used = 0u32;

            while let Some(event) = upstream.next().await {
                match event {
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                    Ok(StreamEvent::Token { text }) => {
                        for (segment, is_reasoning) in parser.process_chunk(&text) {
                            if is_reasoning {
                                if show_reasoning && mode.streams_reasoning() {
                                    yield Ok(StrategyEvent::ReasoningChunk {
                                        content: segment,
                                        source: ReasoningSource::ThinkTag,
                                    });
                                }
                            } else {
                                cleaned.push_str(&segment);
                                if mode.streams_content() {
                                    yield Ok(StrategyEvent::ContentChunk { content: segment });
                                }
                            }
                        }
                    }
                    Ok(StreamEvent::Thinking { text }) => {
                        if show_reasoning && mode.streams_reasoning() {
                            yield Ok(StrategyEvent::ReasoningChunk {
                                content: text,
                                source: ReasoningSource::ReasoningContent,
                            });
                        }
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

            // The stream may end mid-segment; whatever the parser still
            // holds belongs to the turn.
            if let Some((segment, is_reasoning)) = parser.flush() {
                if is_reasoning {
                    if show_reasoning && mode.streams_reasoning() {
                        yield Ok(StrategyEvent::ReasoningChunk {
                            content: segment,
                            source: ReasoningSource::ThinkTag,
                        });
                    }
                } else {
                    cleaned.push_str(&segment);
                    if mode.streams_content() {
                        yield Ok(StrategyEvent::ContentChunk { content: segment });
                    }
                }
            }

            let has_tools = !calls.is_empty();
            if has_tools {
                yield Ok(StrategyEvent::ToolCallsComplete {
                    calls,
                    assistant_content: cleaned.clone(),
                });
            } else if !cleaned.is_empty() {
                yield Ok(StrategyEvent::FinalResponse {
                    content: cleaned,
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

impl ThinkingStrategy {
    /// Blocking variant: one `chat` call, reasoning recovered with the
    /// whole-content split (the opening `<think>` tag is present here).
    async fn blocking_iteration(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StrategyEvent>>> {
        let msg = self.provider.chat(req).await?;

        let (_, answer) = match msg.content.as_deref() {
            Some(content) => split_reasoning(content),
            None => (None, String::new()),
        };

        let mut events = Vec::new();
        let has_tools = !msg.tool_calls.is_empty();
        if has_tools {
            events.push(Ok(StrategyEvent::ToolCallsComplete {
                calls: msg.tool_calls,
                assistant_content: answer,
            }));
        } else if !answer.is_empty() {
            events.push(Ok(StrategyEvent::FinalResponse {
                content: answer,
                tokens_used: msg.tokens_used,
            }));
        }
        events.push(Ok(StrategyEvent::IterationComplete {
            tokens_used: msg.tokens_used,
            should_continue: has_tools,
        }));

        Ok(Box::pin(futures_util::stream::iter(events)))
    }
}
