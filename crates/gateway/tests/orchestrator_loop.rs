//! End-to-end loop tests: orchestrator + strategies + tools + context,
//! with scripted provider and vector-store doubles.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rl_context::{ContextManager, InMemoryConversationStore};
use rl_domain::config::Config;
use rl_domain::conversation::MessageMetadata;
use rl_domain::error::{Error, Result};
use rl_domain::event::TurnEvent;
use rl_domain::message::{Role, ToolCall};
use rl_domain::stream::{BoxStream, ProviderInfo, ProviderMessage, StreamEvent};
use rl_gateway::runtime::Orchestrator;
use rl_providers::{ChatRequest, LlmProvider};
use rl_retrieval::{ScoredDocument, VectorStore};
use rl_strategies::{PlainChatStrategy, Strategy, StrategySettings, ThinkingStrategy};
use rl_tools::{FinalizeTool, RagSearchTool, ToolRegistry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Doubles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One scripted stream item; `Fail` becomes a mid-stream provider error.
#[derive(Clone)]
enum Scripted {
    Ev(StreamEvent),
    Fail(String),
}

/// Pops one script per `chat_stream` call; the last script repeats so a
/// bounded loop can exercise "always requests a tool".
struct ScriptedProvider {
    info: ProviderInfo,
    scripts: Mutex<VecDeque<Vec<Scripted>>>,
    repeat_last: bool,
    chat_response: ProviderMessage,
}

impl ScriptedProvider {
    fn new(scripts: Vec<Vec<Scripted>>) -> Self {
        Self {
            info: ProviderInfo {
                name: "scripted".into(),
                supports_streaming: true,
                supports_reasoning_stream: true,
                supports_tool_calling: true,
            },
            scripts: Mutex::new(scripts.into()),
            repeat_last: false,
            chat_response: ProviderMessage::default(),
        }
    }

    fn repeating(script: Vec<Scripted>) -> Self {
        let mut p = Self::new(vec![script]);
        p.repeat_last = true;
        p
    }

    fn with_chat_response(mut self, response: ProviderMessage) -> Self {
        self.chat_response = response;
        self
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
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if self.repeat_last {
                scripts.front().cloned()
            } else {
                scripts.pop_front()
            }
        }
        .unwrap_or_default();

        let items: Vec<Result<StreamEvent>> = script
            .into_iter()
            .map(|s| match s {
                Scripted::Ev(ev) => Ok(ev),
                Scripted::Fail(msg) => Err(Error::Provider {
                    provider: "scripted".into(),
                    message: msg,
                }),
            })
            .collect();
        Ok(Box::pin(futures_util::stream::iter(items)))
    }

    fn info(&self) -> &ProviderInfo {
        &self.info
    }
}

struct FixedVectorStore(Vec<ScoredDocument>);

#[async_trait::async_trait]
impl VectorStore for FixedVectorStore {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<ScoredDocument>> {
        Ok(self.0.iter().take(max_results).cloned().collect())
    }
}

// ── script helpers ─────────────────────────────────────────────────

fn token(text: &str) -> Scripted {
    Scripted::Ev(StreamEvent::Token { text: text.into() })
}

fn tool_calls(calls: Vec<ToolCall>) -> Scripted {
    Scripted::Ev(StreamEvent::ToolCallsReady { calls })
}

fn done(tokens: u32) -> Scripted {
    Scripted::Ev(StreamEvent::Done {
        tokens_used: Some(tokens),
        finish_reason: Some("stop".into()),
    })
}

fn rag_call(id: &str) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: "rag_search".into(),
        arguments: r#"{"query":"password reset"}"#.into(),
    }
}

fn finalize_call(id: &str) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: "finalize_answer".into(),
        arguments: r#"{"context":"reset docs","user_question":"explain password reset"}"#.into(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Harness {
    orchestrator: Arc<Orchestrator>,
    context: Arc<ContextManager>,
}

fn settings() -> StrategySettings {
    StrategySettings {
        temperature: None,
        max_tokens: None,
        show_reasoning: true,
    }
}

fn build_harness(
    config: Config,
    strategy: Arc<dyn Strategy>,
    instruct: Arc<dyn LlmProvider>,
    docs: Vec<ScoredDocument>,
) -> Harness {
    let config = Arc::new(config);
    let context = Arc::new(ContextManager::new(
        Arc::new(InMemoryConversationStore::new()),
        config.conversation.rolling_window_size,
    ));
    let rag = Arc::new(RagSearchTool::new(Arc::new(FixedVectorStore(docs))));

    let mut registry = ToolRegistry::new();
    registry.register(rag.clone());
    registry.register(Arc::new(FinalizeTool));

    let orchestrator = Arc::new(Orchestrator::new(
        config,
        context.clone(),
        Arc::new(registry),
        strategy,
        instruct,
        rag,
    ));

    Harness {
        orchestrator,
        context,
    }
}

impl Harness {
    async fn new_conversation(&self) -> String {
        self.context
            .create_conversation("a@b", None, None, None)
            .await
            .unwrap()
            .conversation_id
    }

    async fn run(&self, conversation_id: &str, message: &str) -> Vec<TurnEvent> {
        let mut rx = self.orchestrator.process_message_stream(
            conversation_id.to_owned(),
            message.to_owned(),
            None,
        );
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }
}

/// Every stream terminates with exactly one Completed/Error, last.
fn assert_terminal(events: &[TurnEvent]) {
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "expected exactly one terminal event");
    assert!(events.last().unwrap().is_terminal());
}

fn final_answer(events: &[TurnEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::ResponseChunk {
                content,
                is_final_answer: true,
                ..
            } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Simple Q&A, no tool call
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn simple_question_answers_in_one_iteration() {
    let provider = Arc::new(ScriptedProvider::new(vec![vec![
        token("The answer is 4."),
        done(10),
    ]]));
    let harness = build_harness(
        Config::default(),
        Arc::new(PlainChatStrategy::deepseek(provider.clone(), settings())),
        provider,
        Vec::new(),
    );

    let id = harness.new_conversation().await;
    let events = harness.run(&id, "What is 2+2?").await;

    // Opening statuses, in order.
    let statuses: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::StatusUpdate { status, .. } => Some(status.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(statuses[0], "Loading conversation...");
    assert_eq!(statuses[1], "Performing initial knowledge search...");
    assert_eq!(statuses[2], "Iteration 1 of 10");

    assert_eq!(final_answer(&events), "The answer is 4.");
    assert!(matches!(
        events.last().unwrap(),
        TurnEvent::Completed {
            iterations_used: 1,
            ..
        }
    ));
    assert_terminal(&events);

    let conversation = harness.context.conversation(&id).await.unwrap();
    assert_eq!(conversation.message_count, 2);
    assert!(conversation.last_message_at.is_some());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// One RAG round trip, then finalize
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn rag_round_trip_then_finalize() {
    let loop_provider = Arc::new(ScriptedProvider::new(vec![
        vec![tool_calls(vec![rag_call("call_1")]), done(20)],
        vec![tool_calls(vec![finalize_call("call_2")]), done(15)],
    ]));
    let instruct = Arc::new(ScriptedProvider::new(vec![vec![
        token("Reset your password "),
        token("from the account page."),
        done(30),
    ]]));

    let harness = build_harness(
        Config::default(),
        Arc::new(PlainChatStrategy::deepseek(loop_provider, settings())),
        instruct,
        vec![ScoredDocument {
            content: "Password resets happen on the account page.".into(),
            distance: 0.1,
        }],
    );

    let id = harness.new_conversation().await;
    let events = harness.run(&id, "explain password reset").await;

    // Exactly one rag_search start/result pair, in iteration 1.
    let rag_starts: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::ToolCallStart {
                tool_name,
                iteration,
                ..
            } if tool_name == "rag_search" => Some(*iteration),
            _ => None,
        })
        .collect();
    assert_eq!(rag_starts, vec![1]);
    let rag_results = events
        .iter()
        .filter(|e| {
            matches!(e, TurnEvent::ToolCallResult { tool_name, success, .. }
                if tool_name == "rag_search" && *success)
        })
        .count();
    assert_eq!(rag_results, 1);

    // Finalize intercepted in iteration 2 and streamed as the answer.
    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::ToolCallStart { tool_name, iteration: 2, .. } if tool_name == "finalize_answer"
    )));
    assert_eq!(
        final_answer(&events),
        "Reset your password from the account page."
    );
    assert!(matches!(
        events.last().unwrap(),
        TurnEvent::Completed {
            iterations_used: 2,
            ..
        }
    ));
    assert_terminal(&events);

    // Metadata carries both tool records; finalize's context is dropped.
    let history = harness.context.history(&id).await.unwrap();
    assert_eq!(history.len(), 2);
    let assistant = &history[1];
    assert_eq!(assistant.role, Role::Assistant);
    let metadata: MessageMetadata =
        serde_json::from_str(assistant.metadata.as_deref().unwrap()).unwrap();
    let names: Vec<&str> = metadata.tool_calls.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["rag_search", "finalize_answer"]);
    assert!(metadata.tool_calls[1].arguments.get("context").is_none());
    assert!(metadata.tool_calls[0]
        .result
        .summary
        .starts_with("Retrieved 1 document chunks"));
    let iterations: Vec<u32> = metadata.iteration_data.iter().map(|d| d.iteration).collect();
    assert_eq!(iterations, vec![1, 2]);

    // The rag round trip is counted on the conversation.
    let conversation = harness.context.conversation(&id).await.unwrap();
    assert_eq!(conversation.tool_calls_count, 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Thinking strategy separates reasoning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn reasoning_trace_precedes_answer_chunks() {
    let provider = Arc::new(ScriptedProvider::new(vec![vec![
        token("Let me think…</think>The answer is 4."),
        done(5),
    ]]));

    let mut config = Config::default();
    config.agent_loop.show_reasoning_traces = true;

    let harness = build_harness(
        config,
        Arc::new(ThinkingStrategy::new(provider.clone(), settings())),
        provider,
        Vec::new(),
    );

    let id = harness.new_conversation().await;
    let events = harness.run(&id, "What is 2+2?").await;

    let trace_idx = events
        .iter()
        .position(|e| {
            matches!(e, TurnEvent::ReasoningTrace { content, .. } if content == "Let me think…")
        })
        .expect("reasoning trace");
    let answer_idx = events
        .iter()
        .position(|e| {
            matches!(e, TurnEvent::ResponseChunk { content, .. } if content == "The answer is 4.")
        })
        .expect("answer chunk");
    assert!(trace_idx < answer_idx);

    // The stored reasoning survives in metadata, not in the message text.
    let history = harness.context.history(&id).await.unwrap();
    let assistant = &history[1];
    assert_eq!(assistant.content, "The answer is 4.");
    let metadata: MessageMetadata =
        serde_json::from_str(assistant.metadata.as_deref().unwrap()).unwrap();
    assert_eq!(metadata.reasoning.as_deref(), Some("Let me think…"));
    assert_terminal(&events);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Iteration bound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn tool_hungry_model_hits_the_iteration_cap() {
    // Every iteration requests another search; the loop must stop at 10.
    let provider = Arc::new(ScriptedProvider::repeating(vec![
        tool_calls(vec![rag_call("call_n")]),
        done(5),
    ]));
    let harness = build_harness(
        Config::default(),
        Arc::new(PlainChatStrategy::deepseek(provider.clone(), settings())),
        provider,
        vec![ScoredDocument {
            content: "doc".into(),
            distance: 0.2,
        }],
    );

    let id = harness.new_conversation().await;
    let events = harness.run(&id, "loop forever").await;

    let starts = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::ToolCallStart { .. }))
        .count();
    let results = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::ToolCallResult { .. }))
        .count();
    assert_eq!(starts, 10);
    assert_eq!(results, 10);
    assert!(matches!(
        events.last().unwrap(),
        TurnEvent::Completed {
            iterations_used: 10,
            ..
        }
    ));
    assert_terminal(&events);

    let conversation = harness.context.conversation(&id).await.unwrap();
    assert_eq!(conversation.tool_calls_count, 10);
    // User message plus the (empty) fallback assistant message.
    assert_eq!(conversation.message_count, 2);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider failure mid-stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn provider_failure_terminates_with_error() {
    let provider = Arc::new(ScriptedProvider::new(vec![vec![
        token("partial"),
        Scripted::Fail("connection reset".into()),
    ]]));
    let harness = build_harness(
        Config::default(),
        Arc::new(PlainChatStrategy::deepseek(provider.clone(), settings())),
        provider,
        Vec::new(),
    );

    let id = harness.new_conversation().await;
    let events = harness.run(&id, "hello").await;

    assert!(events.iter().any(|e| {
        matches!(e, TurnEvent::ResponseChunk { content, is_final_answer: false, .. } if content == "partial")
    }));
    assert!(matches!(events.last().unwrap(), TurnEvent::Error { .. }));
    assert_terminal(&events);

    // Only the user message was persisted.
    let conversation = harness.context.conversation(&id).await.unwrap();
    assert_eq!(conversation.message_count, 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client disconnect cancels the turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn dropping_the_receiver_cancels_without_persisting() {
    // Enough tokens that the bounded channel fills and the loop blocks on
    // the (gone) consumer before it can finish.
    let mut script: Vec<Scripted> = (0..500).map(|i| token(&format!("t{i} "))).collect();
    script.push(done(5));
    let provider = Arc::new(ScriptedProvider::new(vec![script]));

    let harness = build_harness(
        Config::default(),
        Arc::new(PlainChatStrategy::deepseek(provider.clone(), settings())),
        provider,
        Vec::new(),
    );

    let id = harness.new_conversation().await;
    let mut rx = harness
        .orchestrator
        .process_message_stream(id.clone(), "stream a lot".into(), None);

    // Read a couple of events, then walk away.
    let _ = rx.recv().await;
    let _ = rx.recv().await;
    drop(rx);

    // Give the turn task a moment to observe the closed channel.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let conversation = harness.context.conversation(&id).await.unwrap();
    assert_eq!(conversation.message_count, 1, "no assistant message after cancel");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Blocking path
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn sync_path_runs_the_same_loop_without_chunks() {
    let provider = Arc::new(
        ScriptedProvider::new(Vec::new()).with_chat_response(ProviderMessage {
            content: Some("sync answer".into()),
            reasoning_content: None,
            tool_calls: Vec::new(),
            tokens_used: 9,
        }),
    );
    let harness = build_harness(
        Config::default(),
        Arc::new(PlainChatStrategy::deepseek(provider.clone(), settings())),
        provider,
        Vec::new(),
    );

    let id = harness.new_conversation().await;
    let result = harness
        .orchestrator
        .process_message_sync(&id, "What is 2+2?")
        .await
        .unwrap();

    assert_eq!(result.content, "sync answer");
    assert_eq!(result.iterations_used, 1);
    assert_eq!(result.conversation_id, id);

    let conversation = harness.context.conversation(&id).await.unwrap();
    assert_eq!(conversation.message_count, 2);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Boundary: failing tool feeds back, loop recovers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn unknown_tool_failure_is_recoverable() {
    let bad_call = ToolCall {
        id: "call_1".into(),
        name: "no_such_tool".into(),
        arguments: "{}".into(),
    };
    let provider = Arc::new(ScriptedProvider::new(vec![
        vec![tool_calls(vec![bad_call]), done(5)],
        vec![token("Recovered."), done(5)],
    ]));
    let harness = build_harness(
        Config::default(),
        Arc::new(PlainChatStrategy::deepseek(provider.clone(), settings())),
        provider,
        Vec::new(),
    );

    let id = harness.new_conversation().await;
    let events = harness.run(&id, "try a bad tool").await;

    assert!(events.iter().any(|e| {
        matches!(e, TurnEvent::ToolCallResult { success: false, .. })
    }));
    assert_eq!(final_answer(&events), "Recovered.");
    assert!(matches!(
        events.last().unwrap(),
        TurnEvent::Completed {
            iterations_used: 2,
            ..
        }
    ));
    assert_terminal(&events);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Boundary: maxIterations = 1
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn single_iteration_budget_is_honoured() {
    let provider = Arc::new(ScriptedProvider::repeating(vec![
        tool_calls(vec![rag_call("call_1")]),
        done(5),
    ]));
    let mut config = Config::default();
    config.agent_loop.max_iterations = 1;

    let harness = build_harness(
        config,
        Arc::new(PlainChatStrategy::deepseek(provider.clone(), settings())),
        provider,
        Vec::new(),
    );

    let id = harness.new_conversation().await;
    let events = harness.run(&id, "go").await;

    assert!(matches!(
        events.last().unwrap(),
        TurnEvent::Completed {
            iterations_used: 1,
            ..
        }
    ));
    assert_terminal(&events);
}
