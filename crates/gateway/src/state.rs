//! Shared application state.
//!
//! Everything here is built once at startup, before the first request, and
//! read-only afterwards. The only shared mutable resource is the
//! conversation store behind the [`ContextManager`], whose per-conversation
//! writes are serialised by the turn locks.

use std::sync::Arc;

use rl_context::{
    ContextManager, ConversationStore, InMemoryConversationStore, SqliteConversationStore,
};
use rl_domain::config::{Config, StorageMode};
use rl_domain::stream::ProviderInfo;
use rl_providers::{LlmProvider, OpenAiCompatProvider};
use rl_retrieval::{RestVectorStoreClient, VectorStore};
use rl_strategies::{build_strategy, StrategySettings};
use rl_tools::{FinalizeTool, RagSearchTool, ToolRegistry};

use crate::runtime::{Orchestrator, TurnLockMap};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub context: Arc<ContextManager>,
    pub registry: Arc<ToolRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub turn_locks: Arc<TurnLockMap>,
    /// Name of the strategy selected at startup (diagnostics).
    pub strategy_name: &'static str,
    /// Capability descriptors of the configured providers (diagnostics).
    pub providers: Vec<ProviderInfo>,
}

impl AppState {
    /// Wire the whole process up from configuration. Called exactly once,
    /// before the server accepts its first request.
    pub fn initialise(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        // ── storage ───────────────────────────────────────────────
        let store: Arc<dyn ConversationStore> = match config.conversation.storage_mode {
            StorageMode::InMemory => Arc::new(InMemoryConversationStore::new()),
            StorageMode::Database => Arc::new(SqliteConversationStore::new(
                &config.conversation.database_path,
            )?),
        };
        let context = Arc::new(ContextManager::new(
            store,
            config.conversation.rolling_window_size,
        ));

        // ── retrieval ─────────────────────────────────────────────
        let vector_store: Arc<dyn VectorStore> =
            Arc::new(RestVectorStoreClient::new(&config.retrieval)?);
        let rag = Arc::new(RagSearchTool::new(vector_store));

        // ── providers ─────────────────────────────────────────────
        let qwen: Arc<dyn LlmProvider> =
            Arc::new(OpenAiCompatProvider::qwen(&config.llm.qwen, &config.llm)?);
        let deepseek: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatProvider::deepseek(
            &config.llm.deepseek,
            &config.llm,
        )?);
        let providers = vec![qwen.info().clone(), deepseek.info().clone()];

        // ── tools ─────────────────────────────────────────────────
        let mut registry = ToolRegistry::new();
        registry.register(rag.clone());
        registry.register(Arc::new(FinalizeTool));
        let registry = Arc::new(registry);

        // ── strategy ──────────────────────────────────────────────
        let settings = StrategySettings {
            temperature: config.agent_loop.temperature,
            max_tokens: config.agent_loop.max_tokens,
            show_reasoning: config.agent_loop.show_reasoning,
        };
        let strategy = build_strategy(
            config.agent_loop.strategy,
            qwen.clone(),
            deepseek,
            settings,
        );
        let strategy_name = strategy.name();

        // ── orchestrator ──────────────────────────────────────────
        // The finalize phase always goes through the instruct model on
        // the qwen endpoint, whatever the loop strategy is.
        let orchestrator = Arc::new(Orchestrator::new(
            config.clone(),
            context.clone(),
            registry.clone(),
            strategy,
            qwen,
            rag,
        ));

        tracing::info!(
            strategy = strategy_name,
            storage = ?config.conversation.storage_mode,
            tools = registry.len(),
            "application state initialised"
        );

        Ok(Self {
            config,
            context,
            registry,
            orchestrator,
            turn_locks: Arc::new(TurnLockMap::new()),
            strategy_name,
            providers,
        })
    }
}
