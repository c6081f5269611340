//! The agentic loop.
//!
//! [`Orchestrator::run_turn`] turns one user message into a persisted
//! final assistant message and a totally ordered stream of [`TurnEvent`]s:
//! pre-retrieval, bounded iteration over the active strategy, tool
//! dispatch with finalize interception, metadata aggregation, and counter
//! persistence. Every stream terminates with exactly one `Completed` or
//! `Error`; a client disconnect surfaces as a failed event send and
//! cancels the turn.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, OwnedSemaphorePermit};

use rl_context::ContextManager;
use rl_domain::config::Config;
use rl_domain::conversation::StoredMessage;
use rl_domain::error::{Error, Result};
use rl_domain::event::{ReasoningStage, TurnEvent};
use rl_domain::message::{ChatMessage, Role, ToolCall};
use rl_providers::LlmProvider;
use rl_strategies::{IterationContext, Strategy, StrategyEvent, StreamingMode};
use rl_tools::{RagSearchTool, ToolRegistry, FINALIZE_TOOL_NAME};

use super::finalize;
use super::metadata::TurnRecorder;
use super::{window_to_messages, trim_working, ORCHESTRATOR_SYSTEM_PROMPT, PRE_RETRIEVED_HEADER};

/// How many documents the initial knowledge search asks for.
const PRE_RETRIEVAL_MAX_RESULTS: usize = 5;

/// Capacity of the turn event channel. Small on purpose: a slow SSE
/// client exerts backpressure on the loop instead of buffering the turn.
const TURN_CHANNEL_CAPACITY: usize = 64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Abort + sinks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why a turn stopped before completing.
pub(crate) enum TurnAbort {
    /// The client went away; stop quietly, emit nothing further.
    Cancelled,
    /// A real failure; becomes the terminal `Error` event.
    Failed(Error),
}

impl From<Error> for TurnAbort {
    fn from(e: Error) -> Self {
        TurnAbort::Failed(e)
    }
}

/// Where turn events go. The channel-backed sink blocks on a slow
/// consumer and reports cancellation when the consumer is gone.
#[async_trait::async_trait]
pub(crate) trait EventSink: Send {
    async fn emit(&mut self, event: TurnEvent) -> std::result::Result<(), TurnAbort>;
}

struct ChannelSink {
    tx: mpsc::Sender<TurnEvent>,
}

#[async_trait::async_trait]
impl EventSink for ChannelSink {
    async fn emit(&mut self, event: TurnEvent) -> std::result::Result<(), TurnAbort> {
        self.tx.send(event).await.map_err(|_| TurnAbort::Cancelled)
    }
}

/// Swallows events; used by the blocking path, which only needs the turn
/// summary and cannot disconnect.
struct DiscardSink;

#[async_trait::async_trait]
impl EventSink for DiscardSink {
    async fn emit(&mut self, _event: TurnEvent) -> std::result::Result<(), TurnAbort> {
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event constructors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn status_event(
    conversation_id: &str,
    status: impl Into<String>,
    details: Option<String>,
    iteration: Option<u32>,
) -> TurnEvent {
    TurnEvent::StatusUpdate {
        conversation_id: conversation_id.to_owned(),
        timestamp: Utc::now(),
        status: status.into(),
        details,
        iteration,
    }
}

pub(crate) fn response_chunk(
    conversation_id: &str,
    content: impl Into<String>,
    iteration: u32,
    is_final_answer: bool,
) -> TurnEvent {
    TurnEvent::ResponseChunk {
        conversation_id: conversation_id.to_owned(),
        timestamp: Utc::now(),
        content: content.into(),
        iteration,
        is_final_answer,
    }
}

pub(crate) fn tool_result_event(
    conversation_id: &str,
    tool_name: &str,
    tool_call_id: &str,
    result: impl Into<String>,
    success: bool,
    iteration: u32,
) -> TurnEvent {
    TurnEvent::ToolCallResult {
        conversation_id: conversation_id.to_owned(),
        timestamp: Utc::now(),
        tool_name: tool_name.to_owned(),
        tool_call_id: tool_call_id.to_owned(),
        result: result.into(),
        success,
        iteration,
    }
}

fn error_event(conversation_id: &str, error: impl Into<String>, details: Option<String>) -> TurnEvent {
    TurnEvent::Error {
        conversation_id: conversation_id.to_owned(),
        timestamp: Utc::now(),
        error: error.into(),
        details,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Mutable state threaded through one turn.
pub(crate) struct TurnState {
    /// In-memory working list; only the final assistant message persists.
    pub working: Vec<ChatMessage>,
    pub recorder: TurnRecorder,
    pub final_content: String,
    pub total_tokens: u64,
    pub continue_loop: bool,
    pub persisted_final: bool,
    pub tools_run: u32,
}

impl TurnState {
    fn new() -> Self {
        Self {
            working: Vec::new(),
            recorder: TurnRecorder::new(),
            final_content: String::new(),
            total_tokens: 0,
            continue_loop: true,
            persisted_final: false,
            tools_run: 0,
        }
    }
}

struct TurnSummary {
    content: String,
    iterations_used: u32,
    tokens_used: u64,
}

/// Result of the blocking (non-streaming) path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub content: String,
    pub iterations_used: u32,
    pub tokens_used: u64,
    pub conversation_id: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Orchestrator {
    pub(crate) config: Arc<Config>,
    pub(crate) context: Arc<ContextManager>,
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) strategy: Arc<dyn Strategy>,
    /// The instruct configuration, used by the finalize phase because its
    /// content stream carries no thinking tags.
    pub(crate) instruct: Arc<dyn LlmProvider>,
    pub(crate) rag: Arc<RagSearchTool>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        context: Arc<ContextManager>,
        registry: Arc<ToolRegistry>,
        strategy: Arc<dyn Strategy>,
        instruct: Arc<dyn LlmProvider>,
        rag: Arc<RagSearchTool>,
    ) -> Self {
        Self {
            config,
            context,
            registry,
            strategy,
            instruct,
            rag,
        }
    }

    // ── public operations ────────────────────────────────────────

    /// Run one turn on its own task, streaming events through the
    /// returned receiver. Dropping the receiver cancels the turn; the
    /// optional permit (the conversation's turn lock) is released when
    /// the turn actually finishes.
    pub fn process_message_stream(
        self: &Arc<Self>,
        conversation_id: String,
        user_message: String,
        permit: Option<OwnedSemaphorePermit>,
    ) -> mpsc::Receiver<TurnEvent> {
        let (tx, rx) = mpsc::channel(TURN_CHANNEL_CAPACITY);
        let orchestrator = Arc::clone(self);

        tokio::spawn(async move {
            let _permit = permit;
            let mut sink = ChannelSink { tx };
            let budget = Duration::from_millis(orchestrator.config.agent_loop.turn_timeout_ms);

            let outcome = tokio::time::timeout(
                budget,
                orchestrator.run_turn(
                    &conversation_id,
                    &user_message,
                    StreamingMode::Progressive,
                    &mut sink,
                ),
            )
            .await;

            match outcome {
                Ok(Ok(_)) => {}
                Ok(Err(TurnAbort::Cancelled)) => {
                    tracing::debug!(conversation_id = %conversation_id, "client disconnected, turn cancelled");
                }
                Ok(Err(TurnAbort::Failed(e))) => {
                    if e.is_upstream() {
                        tracing::warn!(conversation_id = %conversation_id, error = %e, "turn failed upstream");
                    } else {
                        tracing::error!(conversation_id = %conversation_id, error = %e, "turn failed");
                    }
                    let _ = sink
                        .emit(error_event(&conversation_id, e.to_string(), None))
                        .await;
                }
                Err(_) => {
                    tracing::warn!(conversation_id = %conversation_id, "turn timed out");
                    let _ = sink
                        .emit(error_event(&conversation_id, "turn timed out", None))
                        .await;
                }
            }
        });

        rx
    }

    /// Same loop, blocking: progressive events suppressed, the final
    /// answer returned whole.
    pub async fn process_message_sync(
        &self,
        conversation_id: &str,
        user_message: &str,
    ) -> Result<SyncResult> {
        let mut sink = DiscardSink;
        let budget = Duration::from_millis(self.config.agent_loop.turn_timeout_ms);

        let summary = tokio::time::timeout(
            budget,
            self.run_turn(
                conversation_id,
                user_message,
                StreamingMode::FinalOnly,
                &mut sink,
            ),
        )
        .await
        .map_err(|_| Error::Timeout("turn timed out".into()))?
        .map_err(|abort| match abort {
            TurnAbort::Failed(e) => e,
            TurnAbort::Cancelled => Error::Internal("turn cancelled".into()),
        })?;

        Ok(SyncResult {
            content: summary.content,
            iterations_used: summary.iterations_used,
            tokens_used: summary.tokens_used,
            conversation_id: conversation_id.to_owned(),
        })
    }

    // ── the per-turn algorithm ───────────────────────────────────

    async fn run_turn(
        &self,
        conversation_id: &str,
        user_message: &str,
        mode: StreamingMode,
        sink: &mut dyn EventSink,
    ) -> std::result::Result<TurnSummary, TurnAbort> {
        sink.emit(status_event(conversation_id, "Loading conversation...", None, None))
            .await?;

        let user_row = StoredMessage::new(conversation_id, Role::User, user_message);
        let ctx = self.context.add_message(conversation_id, user_row).await?;

        sink.emit(status_event(
            conversation_id,
            "Performing initial knowledge search...",
            None,
            None,
        ))
        .await?;

        // Pre-retrieval is best-effort: a dead vector store downgrades the
        // turn instead of killing it (the model can still call rag_search
        // and see the failure).
        let retrieved = match self.rag.search(user_message, PRE_RETRIEVAL_MAX_RESULTS).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "pre-retrieval failed");
                String::new()
            }
        };

        let mut state = TurnState::new();
        state.working.push(ChatMessage::system(ORCHESTRATOR_SYSTEM_PROMPT));
        state.working.extend(window_to_messages(&ctx.messages));
        if !retrieved.is_empty() {
            state
                .working
                .push(ChatMessage::system(format!("{PRE_RETRIEVED_HEADER}:\n\n{retrieved}")));
        }

        let max_iterations = self.config.agent_loop.max_iterations;
        let mut iteration = 0u32;

        while state.continue_loop && iteration < max_iterations {
            iteration += 1;
            state.recorder.begin_iteration(iteration);

            sink.emit(status_event(
                conversation_id,
                format!("Iteration {iteration} of {max_iterations}"),
                None,
                Some(iteration),
            ))
            .await?;

            self.enforce_context_bound(&mut state)?;

            let iter_ctx = IterationContext {
                conversation_id: conversation_id.to_owned(),
                iteration,
                max_iterations,
                streaming_mode: mode,
            };
            let mut events = self
                .strategy
                .execute_iteration(state.working.clone(), self.registry.definitions(), iter_ctx)
                .await
                .map_err(TurnAbort::Failed)?;

            while let Some(event) = events.next().await {
                let event = event.map_err(TurnAbort::Failed)?;
                self.handle_strategy_event(&mut state, conversation_id, iteration, event, sink)
                    .await?;
            }
        }

        // Loop exhausted without a final response (iteration cap, or a
        // model that stopped without text): whatever accumulated is the
        // answer, possibly empty.
        if !state.persisted_final {
            let metadata = state.recorder.snapshot_json(iteration, state.total_tokens);
            self.context
                .add_message_with_metadata(
                    conversation_id,
                    StoredMessage::new(conversation_id, Role::Assistant, state.final_content.clone()),
                    metadata,
                )
                .await?;
        }

        let mut conversation = self.context.conversation(conversation_id).await?;
        conversation.tool_calls_count += state.tools_run;
        self.context.save_conversation(&conversation).await?;

        sink.emit(TurnEvent::Completed {
            conversation_id: conversation_id.to_owned(),
            timestamp: Utc::now(),
            iterations_used: iteration,
            tokens_used: state.total_tokens,
        })
        .await?;

        Ok(TurnSummary {
            content: state.final_content,
            iterations_used: iteration,
            tokens_used: state.total_tokens,
        })
    }

    async fn handle_strategy_event(
        &self,
        state: &mut TurnState,
        conversation_id: &str,
        iteration: u32,
        event: StrategyEvent,
        sink: &mut dyn EventSink,
    ) -> std::result::Result<(), TurnAbort> {
        match event {
            StrategyEvent::ReasoningChunk { content, .. } => {
                state.recorder.add_reasoning(iteration, &content);
                if self.config.agent_loop.show_reasoning_traces {
                    sink.emit(TurnEvent::ReasoningTrace {
                        conversation_id: conversation_id.to_owned(),
                        timestamp: Utc::now(),
                        content,
                        stage: ReasoningStage::Planning,
                        iteration,
                    })
                    .await?;
                }
            }

            StrategyEvent::ContentChunk { content } => {
                state.final_content.push_str(&content);
                sink.emit(response_chunk(conversation_id, content, iteration, false))
                    .await?;
            }

            StrategyEvent::ToolCallDetected { call } => {
                state
                    .working
                    .push(ChatMessage::assistant_with_tools(String::new(), vec![call.clone()]));
                self.dispatch_tool(state, conversation_id, iteration, call, sink)
                    .await?;
            }

            StrategyEvent::ToolCallsComplete {
                calls,
                assistant_content,
            } => {
                state
                    .working
                    .push(ChatMessage::assistant_with_tools(assistant_content, calls.clone()));
                for call in calls {
                    self.dispatch_tool(state, conversation_id, iteration, call, sink)
                        .await?;
                }
            }

            StrategyEvent::FinalResponse {
                content,
                tokens_used,
            } => {
                state.final_content = content;
                let metadata = state
                    .recorder
                    .snapshot_json(iteration, state.total_tokens + u64::from(tokens_used));
                self.context
                    .add_message_with_metadata(
                        conversation_id,
                        StoredMessage::new(conversation_id, Role::Assistant, state.final_content.clone()),
                        metadata,
                    )
                    .await?;
                state.persisted_final = true;

                let formatted = finalize::apply_response_format(
                    self.config.agent_loop.response_format,
                    &state.final_content,
                );
                sink.emit(response_chunk(conversation_id, formatted, iteration, true))
                    .await?;
            }

            StrategyEvent::StatusUpdate { status, phase } => {
                sink.emit(status_event(conversation_id, status, Some(phase), Some(iteration)))
                    .await?;
            }

            StrategyEvent::IterationComplete {
                tokens_used,
                should_continue,
            } => {
                state.total_tokens += u64::from(tokens_used);
                // An earlier finalize already cleared the flag; a later
                // iteration must not resurrect it.
                state.continue_loop = state.continue_loop && should_continue;
            }
        }
        Ok(())
    }

    // ── tool dispatch ────────────────────────────────────────────

    async fn dispatch_tool(
        &self,
        state: &mut TurnState,
        conversation_id: &str,
        iteration: u32,
        call: ToolCall,
        sink: &mut dyn EventSink,
    ) -> std::result::Result<(), TurnAbort> {
        let parsed_args: serde_json::Value =
            serde_json::from_str(&call.arguments).unwrap_or_else(|_| serde_json::json!({}));

        sink.emit(TurnEvent::ToolCallStart {
            conversation_id: conversation_id.to_owned(),
            timestamp: Utc::now(),
            tool_name: call.name.clone(),
            tool_call_id: call.id.clone(),
            arguments: parsed_args.clone(),
            iteration,
        })
        .await?;

        if call.name == FINALIZE_TOOL_NAME {
            return finalize::run_finalize(self, state, conversation_id, iteration, &call, sink)
                .await;
        }

        let execution = self.registry.execute(&call).await;

        sink.emit(tool_result_event(
            conversation_id,
            &call.name,
            &call.id,
            execution.result.clone(),
            execution.success,
            iteration,
        ))
        .await?;

        state
            .working
            .push(ChatMessage::tool_result(call.id.clone(), execution.result.clone()));
        state.tools_run += 1;
        state.recorder.record_tool(iteration, &call, parsed_args, &execution);
        Ok(())
    }

    // ── context bound ────────────────────────────────────────────

    /// The working list must not grow without bound across iterations.
    /// Past the soft bound the window is re-applied at half size; if even
    /// that cannot get under the bound the turn aborts.
    fn enforce_context_bound(&self, state: &mut TurnState) -> Result<()> {
        let window = self.config.conversation.rolling_window_size;
        let soft_bound = window.saturating_mul(6).max(12);
        if state.working.len() <= soft_bound {
            return Ok(());
        }

        tracing::warn!(
            len = state.working.len(),
            soft_bound,
            "working list over bound, re-applying window"
        );
        trim_working(&mut state.working, (window / 2).max(1));

        if state.working.len() > soft_bound {
            return Err(Error::ContextOverflow(format!(
                "working list still holds {} messages after trimming",
                state.working.len()
            )));
        }
        Ok(())
    }
}
