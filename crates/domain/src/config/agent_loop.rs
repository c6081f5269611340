use serde::{Deserialize, Serialize};

use super::{env_bool, env_parse, env_parse_opt, env_str};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Strategy selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which single-model strategy drives the loop. Resolved once at startup;
/// switching requires a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    QwenSingleThinking,
    QwenSingleInstruct,
    DeepseekSingle,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::QwenSingleThinking => "qwen_single_thinking",
            StrategyKind::QwenSingleInstruct => "qwen_single_instruct",
            StrategyKind::DeepseekSingle => "deepseek_single",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "qwen_single_thinking" => Some(StrategyKind::QwenSingleThinking),
            "qwen_single_instruct" => Some(StrategyKind::QwenSingleInstruct),
            "deepseek_single" => Some(StrategyKind::DeepseekSingle),
            _ => None,
        }
    }

    /// Read `LOOP_MODEL_STRATEGY`; unknown values log a warning and fall
    /// back to the default rather than failing startup.
    pub fn from_env() -> Self {
        match env_str("LOOP_MODEL_STRATEGY") {
            None => Self::default(),
            Some(raw) => Self::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(
                    value = %raw,
                    default = Self::default().as_str(),
                    "unknown LOOP_MODEL_STRATEGY, falling back"
                );
                Self::default()
            }),
        }
    }
}

/// Post-processing applied to the final answer text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormatMode {
    /// Return the answer as-is.
    #[default]
    Direct,
    /// Prepend a `## Response` markdown heading.
    Structured,
}

impl ResponseFormatMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(ResponseFormatMode::Direct),
            "structured" => Some(ResponseFormatMode::Structured),
            _ => None,
        }
    }

    pub fn from_env() -> Self {
        match env_str("LOOP_RESPONSE_FORMAT") {
            None => Self::default(),
            Some(raw) => Self::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "unknown LOOP_RESPONSE_FORMAT, using direct");
                Self::default()
            }),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loop config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    pub strategy: StrategyKind,
    pub max_iterations: u32,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Whether strategies emit reasoning events at all. Disabling this
    /// removes reasoning from metadata too.
    pub show_reasoning: bool,
    /// Whether the orchestrator forwards reasoning to clients. Separate
    /// from `show_reasoning` so "log but don't show" and "show but don't
    /// log" are both expressible.
    pub show_reasoning_traces: bool,
    pub response_format: ResponseFormatMode,
    /// Deadline for a whole turn, across all iterations.
    pub turn_timeout_ms: u64,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            max_iterations: 10,
            temperature: None,
            max_tokens: None,
            show_reasoning: true,
            show_reasoning_traces: false,
            response_format: ResponseFormatMode::default(),
            turn_timeout_ms: 600_000,
        }
    }
}

impl AgentLoopConfig {
    pub fn from_env() -> Self {
        Self {
            strategy: StrategyKind::from_env(),
            max_iterations: env_parse("LOOP_MAX_ITERATIONS", 10),
            temperature: env_parse_opt("LOOP_TEMPERATURE"),
            max_tokens: env_parse_opt("LOOP_MAX_TOKENS"),
            show_reasoning: env_bool("LOOP_THINKING_SHOW_REASONING", true),
            show_reasoning_traces: env_bool("LOOP_STREAMING_SHOW_REASONING_TRACES", false),
            response_format: ResponseFormatMode::from_env(),
            turn_timeout_ms: env_parse("LOOP_TURN_TIMEOUT_MS", 600_000),
        }
    }
}
