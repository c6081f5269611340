//! Per-turn metadata aggregation.
//!
//! The recorder accumulates what the loop did — tool calls, reasoning,
//! per-iteration slices — and renders the [`MessageMetadata`] blob that is
//! persisted next to the final assistant message. Large tool payloads are
//! never inlined; results are reduced to short summaries.

use std::collections::BTreeMap;

use serde_json::Value;

use rl_domain::conversation::{
    IterationData, MessageMetadata, ToolCallRecord, ToolResultSummary, TurnMetrics,
};
use rl_domain::message::ToolCall;
use rl_tools::{ToolExecution, FINALIZE_TOOL_NAME, RAG_TOOL_NAME};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result summarisation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// First `max` characters of `s`, cut on a char boundary.
fn head(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_owned()
}

/// Reduce a tool result to what metadata may carry: retrieval results
/// become a count-and-size line, everything else keeps its first 200
/// characters.
pub(crate) fn summarize_result(tool_name: &str, result: &str, success: bool) -> ToolResultSummary {
    let summary = if tool_name == RAG_TOOL_NAME && success && !result.is_empty() {
        let chunks = result
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .count();
        format!("Retrieved {chunks} document chunks ({} chars)", result.len())
    } else {
        head(result, 200)
    };

    ToolResultSummary {
        kind: tool_name.to_owned(),
        summary,
        success,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recorder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct IterationSlot {
    reasoning: String,
    tool_call_ids: Vec<String>,
}

/// Accumulates the turn's metadata while the loop runs.
#[derive(Default)]
pub(crate) struct TurnRecorder {
    tool_calls: Vec<ToolCallRecord>,
    reasoning: String,
    iterations: BTreeMap<u32, IterationSlot>,
}

impl TurnRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure an iteration slice exists; keeps `iterationData` contiguous
    /// from 1 even for iterations that produced nothing.
    pub fn begin_iteration(&mut self, iteration: u32) {
        self.iterations.entry(iteration).or_default();
    }

    pub fn add_reasoning(&mut self, iteration: u32, text: &str) {
        self.reasoning.push_str(text);
        self.iterations
            .entry(iteration)
            .or_default()
            .reasoning
            .push_str(text);
    }

    pub fn record_tool(
        &mut self,
        iteration: u32,
        call: &ToolCall,
        arguments: Value,
        execution: &ToolExecution,
    ) {
        self.tool_calls.push(ToolCallRecord {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
            result: summarize_result(&call.name, &execution.result, execution.success),
            success: execution.success,
            iteration,
        });
        self.iterations
            .entry(iteration)
            .or_default()
            .tool_call_ids
            .push(call.id.clone());
    }

    /// The finalize sentinel gets a synthetic record. Its large `context`
    /// argument is deliberately not persisted.
    pub fn record_finalize(&mut self, iteration: u32, call_id: &str, user_question: &str) {
        self.tool_calls.push(ToolCallRecord {
            id: call_id.to_owned(),
            name: FINALIZE_TOOL_NAME.to_owned(),
            arguments: serde_json::json!({ "user_question": user_question }),
            result: ToolResultSummary {
                kind: FINALIZE_TOOL_NAME.to_owned(),
                summary: "Final answer streamed successfully".to_owned(),
                success: true,
            },
            success: true,
            iteration,
        });
        self.iterations
            .entry(iteration)
            .or_default()
            .tool_call_ids
            .push(call_id.to_owned());
    }

    /// Render the metadata blob for persistence.
    pub fn snapshot(&self, iterations_used: u32, total_tokens: u64) -> MessageMetadata {
        MessageMetadata {
            tool_calls: self.tool_calls.clone(),
            reasoning: if self.reasoning.is_empty() {
                None
            } else {
                Some(self.reasoning.clone())
            },
            iteration_data: self
                .iterations
                .iter()
                .map(|(iteration, slot)| IterationData {
                    iteration: *iteration,
                    reasoning: if slot.reasoning.is_empty() {
                        None
                    } else {
                        Some(slot.reasoning.clone())
                    },
                    tool_call_ids: slot.tool_call_ids.clone(),
                })
                .collect(),
            metrics: TurnMetrics {
                iterations: iterations_used,
                total_tokens,
            },
        }
    }

    pub fn snapshot_json(&self, iterations_used: u32, total_tokens: u64) -> String {
        serde_json::to_string(&self.snapshot(iterations_used, total_tokens))
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to serialize turn metadata");
                "{}".to_owned()
            })
    }
}
