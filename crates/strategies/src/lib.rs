//! Iteration strategies.
//!
//! A strategy encapsulates how one iteration of the agentic loop is
//! performed against one model configuration. Strategies are stateless —
//! everything they need arrives per call — and isolated: the orchestrator
//! never branches on which strategy is active, it just consumes the
//! canonical [`StrategyEvent`] stream.

pub mod factory;
pub mod parser;
pub mod plain;
pub mod thinking;

pub use factory::build_strategy;
pub use parser::{split_reasoning, ThinkingTagParser};
pub use plain::PlainChatStrategy;
pub use thinking::ThinkingStrategy;

use rl_domain::error::Result;
use rl_domain::message::{ChatMessage, ToolCall, ToolDefinition};
use rl_domain::stream::BoxStream;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where a reasoning chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningSource {
    /// The provider's dedicated `reasoning_content` channel.
    ReasoningContent,
    /// Recovered from the content stream by the thinking-tag parser.
    ThinkTag,
}

/// Events a strategy emits while performing one iteration.
///
/// Emission discipline, for any strategy:
/// 1. Exactly one `IterationComplete`, always last.
/// 2. `should_continue` is true iff the iteration produced at least one
///    tool call and no `FinalResponse` was emitted.
/// 3. `ContentChunk`/`ReasoningChunk` only appear in progressive modes.
/// 4. When no tool calls were requested and the model produced text, a
///    `FinalResponse` carries the full text, reasoning stripped.
#[derive(Debug, Clone)]
pub enum StrategyEvent {
    ReasoningChunk {
        content: String,
        source: ReasoningSource,
    },
    ContentChunk {
        content: String,
    },
    /// A single tool call surfaced as soon as it was assembled. Strategies
    /// that batch (all of the ones in this crate) use `ToolCallsComplete`
    /// instead; the orchestrator honours both.
    ToolCallDetected {
        call: ToolCall,
    },
    ToolCallsComplete {
        calls: Vec<ToolCall>,
        assistant_content: String,
    },
    FinalResponse {
        content: String,
        tokens_used: u32,
    },
    StatusUpdate {
        status: String,
        phase: String,
    },
    IterationComplete {
        tokens_used: u32,
        should_continue: bool,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Iteration context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How much of the iteration the caller wants streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamingMode {
    /// Stream content and reasoning as the provider yields.
    #[default]
    Progressive,
    /// Suppress progressive chunks; only batched/terminal events.
    FinalOnly,
    /// Stream reasoning, suppress content chunks.
    ReasoningOnly,
}

impl StreamingMode {
    pub fn streams_content(self) -> bool {
        matches!(self, StreamingMode::Progressive)
    }

    pub fn streams_reasoning(self) -> bool {
        matches!(self, StreamingMode::Progressive | StreamingMode::ReasoningOnly)
    }
}

#[derive(Debug, Clone)]
pub struct IterationContext {
    pub conversation_id: String,
    pub iteration: u32,
    pub max_iterations: u32,
    pub streaming_mode: StreamingMode,
}

/// Tuning shared by all strategies, resolved once at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategySettings {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// When false, strategies emit no `ReasoningChunk` at all (reasoning is
    /// still stripped from content).
    pub show_reasoning: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Strategy trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One concrete plan for performing a single iteration.
#[async_trait::async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one iteration against the model. The returned sequence is
    /// finite and single-pass; the caller consumes it in order.
    async fn execute_iteration(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        ctx: IterationContext,
    ) -> Result<BoxStream<'static, Result<StrategyEvent>>>;
}
