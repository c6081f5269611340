//! Emission-discipline tests for the concrete strategies, driven by a
//! scripted provider.

use std::sync::Arc;

use futures_util::StreamExt;

use rl_domain::error::{Error, Result};
use rl_domain::message::{ChatMessage, ToolCall};
use rl_domain::stream::{BoxStream, ProviderInfo, ProviderMessage, StreamEvent};
use rl_providers::{ChatRequest, LlmProvider};
use rl_strategies::{
    IterationContext, PlainChatStrategy, ReasoningSource, Strategy, StrategyEvent,
    StrategySettings, StreamingMode, ThinkingStrategy,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replays a fixed list of stream events (and a fixed blocking response).
struct ScriptedProvider {
    info: ProviderInfo,
    stream_script: Vec<Result<StreamEvent>>,
    chat_response: ProviderMessage,
}

impl ScriptedProvider {
    fn streaming(script: Vec<Result<StreamEvent>>) -> Self {
        Self {
            info: ProviderInfo {
                name: "scripted".into(),
                supports_streaming: true,
                supports_reasoning_stream: true,
                supports_tool_calling: true,
            },
            stream_script: script,
            chat_response: ProviderMessage::default(),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, _req: &ChatRequest) -> Result<ProviderMessage> {
        Ok(self.chat_response.clone())
    }

    async fn chat_stream(
        &self,
        _req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let script: Vec<Result<StreamEvent>> = self
            .stream_script
            .iter()
            .map(|e| match e {
                Ok(ev) => Ok(ev.clone()),
                Err(err) => Err(Error::Internal(err.to_string())),
            })
            .collect();
        Ok(Box::pin(futures_util::stream::iter(script)))
    }

    fn info(&self) -> &ProviderInfo {
        &self.info
    }
}

fn token(text: &str) -> Result<StreamEvent> {
    Ok(StreamEvent::Token { text: text.into() })
}

fn done(tokens: u32) -> Result<StreamEvent> {
    Ok(StreamEvent::Done {
        tokens_used: Some(tokens),
        finish_reason: Some("stop".into()),
    })
}

fn ctx(mode: StreamingMode) -> IterationContext {
    IterationContext {
        conversation_id: "conv-1".into(),
        iteration: 1,
        max_iterations: 10,
        streaming_mode: mode,
    }
}

fn settings() -> StrategySettings {
    StrategySettings {
        temperature: None,
        max_tokens: None,
        show_reasoning: true,
    }
}

async fn collect(strategy: &dyn Strategy, mode: StreamingMode) -> Vec<StrategyEvent> {
    let stream = strategy
        .execute_iteration(vec![ChatMessage::user("hi")], Vec::new(), ctx(mode))
        .await
        .unwrap();
    stream.map(|e| e.unwrap()).collect().await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Thinking strategy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn thinking_separates_reasoning_from_answer() {
    let provider = Arc::new(ScriptedProvider::streaming(vec![
        token("Let me think…</think>The answer is 4."),
        done(12),
    ]));
    let strategy = ThinkingStrategy::new(provider, settings());

    let events = collect(&strategy, StreamingMode::Progressive).await;

    let reasoning: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StrategyEvent::ReasoningChunk { content, source } => Some((content.clone(), *source)),
            _ => None,
        })
        .collect();
    assert_eq!(reasoning.len(), 1);
    assert_eq!(reasoning[0].0, "Let me think…");
    assert_eq!(reasoning[0].1, ReasoningSource::ThinkTag);

    let final_response = events
        .iter()
        .find_map(|e| match e {
            StrategyEvent::FinalResponse { content, tokens_used } => {
                Some((content.clone(), *tokens_used))
            }
            _ => None,
        })
        .expect("final response");
    assert_eq!(final_response.0, "The answer is 4.");
    assert_eq!(final_response.1, 12);

    // Reasoning strictly precedes the first content chunk.
    let reasoning_idx = events
        .iter()
        .position(|e| matches!(e, StrategyEvent::ReasoningChunk { .. }))
        .unwrap();
    let content_idx = events
        .iter()
        .position(|e| matches!(e, StrategyEvent::ContentChunk { .. }))
        .unwrap();
    assert!(reasoning_idx < content_idx);
}

#[tokio::test]
async fn thinking_flushes_parser_when_stream_ends_abruptly() {
    // No finish_reason and the closing tag never arrives: all reasoning.
    let provider = Arc::new(ScriptedProvider::streaming(vec![token("half a thought")]));
    let strategy = ThinkingStrategy::new(provider, settings());

    let events = collect(&strategy, StreamingMode::Progressive).await;

    assert!(events
        .iter()
        .any(|e| matches!(e, StrategyEvent::ReasoningChunk { content, .. } if content == "half a thought")));
    // No answer text was produced, so no FinalResponse.
    assert!(!events
        .iter()
        .any(|e| matches!(e, StrategyEvent::FinalResponse { .. })));
    assert!(matches!(
        events.last().unwrap(),
        StrategyEvent::IterationComplete {
            should_continue: false,
            ..
        }
    ));
}

#[tokio::test]
async fn thinking_surfaces_native_reasoning_deltas() {
    let provider = Arc::new(ScriptedProvider::streaming(vec![
        Ok(StreamEvent::Thinking {
            text: "native thought".into(),
        }),
        token("</think>done"),
        done(5),
    ]));
    let strategy = ThinkingStrategy::new(provider, settings());

    let events = collect(&strategy, StreamingMode::Progressive).await;
    assert!(events.iter().any(|e| matches!(
        e,
        StrategyEvent::ReasoningChunk { source: ReasoningSource::ReasoningContent, .. }
    )));
}

#[tokio::test]
async fn thinking_tool_calls_suppress_final_response() {
    let provider = Arc::new(ScriptedProvider::streaming(vec![
        token("planning</think>"),
        Ok(StreamEvent::ToolCallsReady {
            calls: vec![ToolCall {
                id: "call_1".into(),
                name: "rag_search".into(),
                arguments: r#"{"query":"q"}"#.into(),
            }],
        }),
        done(30),
    ]));
    let strategy = ThinkingStrategy::new(provider, settings());

    let events = collect(&strategy, StreamingMode::Progressive).await;

    assert!(events
        .iter()
        .any(|e| matches!(e, StrategyEvent::ToolCallsComplete { calls, .. } if calls.len() == 1)));
    assert!(!events
        .iter()
        .any(|e| matches!(e, StrategyEvent::FinalResponse { .. })));
    assert!(matches!(
        events.last().unwrap(),
        StrategyEvent::IterationComplete {
            should_continue: true,
            tokens_used: 30,
        }
    ));
}

#[tokio::test]
async fn thinking_hides_reasoning_when_disabled() {
    let provider = Arc::new(ScriptedProvider::streaming(vec![
        token("secret</think>visible"),
        done(3),
    ]));
    let strategy = ThinkingStrategy::new(
        provider,
        StrategySettings {
            show_reasoning: false,
            ..settings()
        },
    );

    let events = collect(&strategy, StreamingMode::Progressive).await;
    assert!(!events
        .iter()
        .any(|e| matches!(e, StrategyEvent::ReasoningChunk { .. })));
    // The answer is still cleaned of the tag.
    assert!(events
        .iter()
        .any(|e| matches!(e, StrategyEvent::FinalResponse { content, .. } if content == "visible")));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plain strategies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn plain_streams_content_and_finishes() {
    let provider = Arc::new(ScriptedProvider::streaming(vec![
        token("Hello"),
        token(" there"),
        done(7),
    ]));
    let strategy = PlainChatStrategy::deepseek(provider, settings());

    let events = collect(&strategy, StreamingMode::Progressive).await;

    let chunks: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StrategyEvent::ContentChunk { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec!["Hello", " there"]);

    assert!(events
        .iter()
        .any(|e| matches!(e, StrategyEvent::FinalResponse { content, .. } if content == "Hello there")));
    assert!(matches!(
        events.last().unwrap(),
        StrategyEvent::IterationComplete {
            should_continue: false,
            tokens_used: 7,
        }
    ));
}

#[tokio::test]
async fn final_only_mode_suppresses_progressive_chunks() {
    let provider = Arc::new(ScriptedProvider {
        info: ProviderInfo {
            name: "scripted".into(),
            supports_streaming: true,
            supports_reasoning_stream: false,
            supports_tool_calling: true,
        },
        stream_script: Vec::new(),
        chat_response: ProviderMessage {
            content: Some("sync answer".into()),
            reasoning_content: None,
            tool_calls: Vec::new(),
            tokens_used: 9,
        },
    });
    let strategy = PlainChatStrategy::deepseek(provider, settings());

    let events = collect(&strategy, StreamingMode::FinalOnly).await;

    assert!(!events
        .iter()
        .any(|e| matches!(e, StrategyEvent::ContentChunk { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, StrategyEvent::FinalResponse { content, .. } if content == "sync answer")));
    assert!(matches!(
        events.last().unwrap(),
        StrategyEvent::IterationComplete {
            should_continue: false,
            tokens_used: 9,
        }
    ));
}

#[tokio::test]
async fn chat_strategy_never_emits_reasoning_chunk() {
    // An R1-style deployment behind the chat endpoint streams a dedicated
    // reasoning delta; the plain strategies must drop it, not forward it.
    let script = || {
        vec![
            Ok(StreamEvent::Thinking {
                text: "chain of thought".into(),
            }),
            token("The answer is 4."),
            done(8),
        ]
    };

    let strategies: Vec<Box<dyn Strategy>> = vec![
        Box::new(PlainChatStrategy::deepseek(
            Arc::new(ScriptedProvider::streaming(script())),
            settings(),
        )),
        Box::new(PlainChatStrategy::qwen_instruct(
            Arc::new(ScriptedProvider::streaming(script())),
            settings(),
        )),
    ];

    for strategy in strategies {
        let events = collect(strategy.as_ref(), StreamingMode::Progressive).await;

        assert!(
            !events
                .iter()
                .any(|e| matches!(e, StrategyEvent::ReasoningChunk { .. })),
            "{} leaked a reasoning chunk",
            strategy.name()
        );
        // The answer itself is unaffected.
        assert!(events.iter().any(|e| {
            matches!(e, StrategyEvent::FinalResponse { content, .. } if content == "The answer is 4.")
        }));
    }
}

#[tokio::test]
async fn exactly_one_iteration_complete_and_it_is_last() {
    let provider = Arc::new(ScriptedProvider::streaming(vec![
        token("text"),
        done(1),
    ]));
    let strategy = PlainChatStrategy::qwen_instruct(provider, settings());

    let events = collect(&strategy, StreamingMode::Progressive).await;

    let completes = events
        .iter()
        .filter(|e| matches!(e, StrategyEvent::IterationComplete { .. }))
        .count();
    assert_eq!(completes, 1);
    assert!(matches!(
        events.last().unwrap(),
        StrategyEvent::IterationComplete { .. }
    ));
}

#[tokio::test]
async fn mid_stream_error_propagates_without_iteration_complete() {
    let provider = Arc::new(ScriptedProvider::streaming(vec![
        token("partial"),
        Err(Error::Provider {
            provider: "scripted".into(),
            message: "connection reset".into(),
        }),
    ]));
    let strategy = PlainChatStrategy::deepseek(provider, settings());

    let stream = strategy
        .execute_iteration(
            vec![ChatMessage::user("hi")],
            Vec::new(),
            ctx(StreamingMode::Progressive),
        )
        .await
        .unwrap();
    let events: Vec<Result<StrategyEvent>> = stream.collect().await;

    assert!(events.last().unwrap().is_err());
    assert!(!events.iter().any(|e| matches!(
        e,
        Ok(StrategyEvent::IterationComplete { .. })
    )));
}
