//! The finalize sentinel.
//!
//! `finalize_answer` is a model-facing contract, not a real tool: its
//! declaration teaches the model it can end the loop, but invocations are
//! intercepted by the orchestrator before dispatch and drive the
//! finalization phase (a direct streamed answer from the instruct model).

use serde::Deserialize;
use serde_json::Value;

use rl_domain::error::{Error, Result};
use rl_domain::message::ToolDefinition;

use crate::registry::Tool;

pub const FINALIZE_TOOL_NAME: &str = "finalize_answer";

/// Declared-but-never-executed. The registry refuses this name outright;
/// this implementation only exists so the sentinel appears in the schema
/// list like any other tool.
pub struct FinalizeTool;

#[async_trait::async_trait]
impl Tool for FinalizeTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: FINALIZE_TOOL_NAME.into(),
            description: "Produce the final answer for the user. Call this once you have \
                          gathered enough information; pass everything the answer should \
                          be based on in `context`."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "context": {
                        "type": "string",
                        "description": "All gathered information the answer should draw on"
                    },
                    "user_question": {
                        "type": "string",
                        "description": "The user's question, restated"
                    },
                    "answer_style": {
                        "type": "string",
                        "enum": ["concise", "detailed", "step_by_step"],
                        "description": "Presentation style for the answer (default: detailed)"
                    }
                },
                "required": ["context", "user_question"]
            }),
        }
    }

    async fn execute(&self, _arguments: &Value) -> Result<String> {
        Err(Error::Internal(
            "finalize_answer must be intercepted before dispatch".into(),
        ))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Arguments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Presentation style requested for the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnswerStyle {
    Concise,
    #[default]
    Detailed,
    StepByStep,
}

/// Parsed `finalize_answer` arguments, as consumed by the orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct FinalizeArgs {
    pub context: String,
    pub user_question: String,
    #[serde(default)]
    answer_style: Option<String>,
}

impl FinalizeArgs {
    pub fn parse(raw_json: &str) -> Result<Self> {
        serde_json::from_str(raw_json)
            .map_err(|e| Error::InvalidRequest(format!("finalize_answer arguments: {e}")))
    }

    /// The style mapping is exhaustive: anything that is not a known
    /// variant falls back to detailed.
    pub fn style(&self) -> AnswerStyle {
        match self.answer_style.as_deref() {
            Some("concise") => AnswerStyle::Concise,
            Some("step_by_step") => AnswerStyle::StepByStep,
            _ => AnswerStyle::Detailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_arguments() {
        let args = FinalizeArgs::parse(
            r#"{"context":"gathered facts","user_question":"how?","answer_style":"concise"}"#,
        )
        .unwrap();
        assert_eq!(args.context, "gathered facts");
        assert_eq!(args.style(), AnswerStyle::Concise);
    }

    #[test]
    fn unknown_style_falls_back_to_detailed() {
        let args = FinalizeArgs::parse(
            r#"{"context":"c","user_question":"q","answer_style":"poetic"}"#,
        )
        .unwrap();
        assert_eq!(args.style(), AnswerStyle::Detailed);
    }

    #[test]
    fn missing_style_is_detailed() {
        let args = FinalizeArgs::parse(r#"{"context":"c","user_question":"q"}"#).unwrap();
        assert_eq!(args.style(), AnswerStyle::Detailed);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        assert!(FinalizeArgs::parse(r#"{"context":"c"}"#).is_err());
    }

    #[tokio::test]
    async fn direct_execution_always_fails() {
        let tool = FinalizeTool;
        assert!(tool.execute(&serde_json::json!({})).await.is_err());
    }
}
