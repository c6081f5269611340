use rl_domain::error::Result;
use rl_domain::message::{ChatMessage, ToolDefinition};
use rl_domain::stream::{BoxStream, ProviderInfo, ProviderMessage, StreamEvent};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Extra options steering which model configuration handles a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmOptions {
    /// Route to the provider's thinking model id.
    pub use_thinking_model: bool,
    /// Route to the provider's instruct model id.
    pub use_instruct_model: bool,
    /// Ask the endpoint to produce reasoning (Qwen `enable_thinking`).
    pub enable_thinking: bool,
}

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The working message list to send.
    pub messages: Vec<ChatMessage>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// Model-configuration switches.
    pub options: LlmOptions,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every LLM adapter must implement.
///
/// Implementations are created once at startup and shared read-only. The
/// streaming sequence is finite, single-pass, and not restartable: retries
/// apply only to establishing a call, never to a stream that has begun.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: &ChatRequest) -> Result<ProviderMessage>;

    /// Send a chat completion request and return a stream of events.
    async fn chat_stream(&self, req: &ChatRequest)
        -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// Static capability descriptor for this provider configuration.
    fn info(&self) -> &ProviderInfo;
}
