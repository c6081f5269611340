//! Startup-time strategy selection.
//!
//! The mapping from configuration value to strategy instance is computed
//! exactly once; switching strategies requires a restart. Adding a model
//! is: add a provider, add a strategy, add an enum value, add config.

use std::sync::Arc;

use rl_domain::config::StrategyKind;
use rl_providers::LlmProvider;

use crate::plain::PlainChatStrategy;
use crate::thinking::ThinkingStrategy;
use crate::{Strategy, StrategySettings};

/// Resolve the configured strategy against the process-wide providers.
pub fn build_strategy(
    kind: StrategyKind,
    qwen: Arc<dyn LlmProvider>,
    deepseek: Arc<dyn LlmProvider>,
    settings: StrategySettings,
) -> Arc<dyn Strategy> {
    let strategy: Arc<dyn Strategy> = match kind {
        StrategyKind::QwenSingleThinking => Arc::new(ThinkingStrategy::new(qwen, settings)),
        StrategyKind::QwenSingleInstruct => {
            Arc::new(PlainChatStrategy::qwen_instruct(qwen, settings))
        }
        StrategyKind::DeepseekSingle => Arc::new(PlainChatStrategy::deepseek(deepseek, settings)),
    };

    tracing::info!(strategy = strategy.name(), "loop strategy selected");
    strategy
}
