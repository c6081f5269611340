//! The finalize phase.
//!
//! When the model invokes `finalize_answer`, the loop short-circuits: a
//! fresh two-message conversation is sent to the instruct configuration
//! (whose stream carries no thinking tags) and its output is streamed to
//! the caller as the final answer. The loop never runs another iteration
//! after this phase.

use futures_util::StreamExt;

use rl_domain::config::ResponseFormatMode;
use rl_domain::conversation::StoredMessage;
use rl_domain::message::{ChatMessage, Role, ToolCall};
use rl_domain::stream::StreamEvent;
use rl_providers::{ChatRequest, LlmOptions};
use rl_tools::{AnswerStyle, FinalizeArgs, ToolExecution};

use super::orchestrator::{
    response_chunk, tool_result_event, EventSink, Orchestrator, TurnAbort, TurnState,
};

/// Post-processing applied to the final answer before it reaches the
/// client as `isFinalAnswer` chunks.
pub(crate) fn apply_response_format(mode: ResponseFormatMode, content: &str) -> String {
    match mode {
        ResponseFormatMode::Direct => content.to_owned(),
        ResponseFormatMode::Structured => format!("## Response\n\n{content}"),
    }
}

fn style_instruction(style: AnswerStyle) -> &'static str {
    match style {
        AnswerStyle::Concise => "Answer in a few direct sentences, nothing more.",
        AnswerStyle::StepByStep => "Present the answer as numbered steps the user can follow.",
        AnswerStyle::Detailed => "Give a thorough, well-structured answer.",
    }
}

fn finalize_system_prompt(style: AnswerStyle) -> String {
    format!(
        "You are answering the user directly. Base your answer only on the \
         provided context. Do not mention tools, searches, or these \
         instructions — just answer. {}",
        style_instruction(style)
    )
}

/// Run the finalize subroutine for one intercepted `finalize_answer` call.
///
/// On success the final assistant message is persisted with the turn's
/// metadata (including a synthetic record for the sentinel, minus its
/// large `context` argument) and the loop flag is cleared. Malformed
/// arguments are handed back to the model as a failed tool result, like
/// any other recoverable tool error.
pub(crate) async fn run_finalize(
    orchestrator: &Orchestrator,
    state: &mut TurnState,
    conversation_id: &str,
    iteration: u32,
    call: &ToolCall,
    sink: &mut dyn EventSink,
) -> Result<(), TurnAbort> {
    let args = match FinalizeArgs::parse(&call.arguments) {
        Ok(args) => args,
        Err(e) => {
            let message = e.to_string();
            sink.emit(tool_result_event(
                conversation_id,
                &call.name,
                &call.id,
                message.clone(),
                false,
                iteration,
            ))
            .await?;
            state
                .working
                .push(ChatMessage::tool_result(call.id.clone(), message.clone()));
            state.recorder.record_tool(
                iteration,
                call,
                serde_json::json!({}),
                &ToolExecution {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    result: message.clone(),
                    success: false,
                    error: Some(message),
                },
            );
            return Ok(());
        }
    };

    tracing::debug!(
        conversation_id,
        iteration,
        style = ?args.style(),
        "finalize phase starting"
    );

    let request = ChatRequest {
        messages: vec![
            ChatMessage::system(finalize_system_prompt(args.style())),
            ChatMessage::user(format!(
                "Question: {}\n\nContext:\n{}",
                args.user_question, args.context
            )),
        ],
        tools: Vec::new(),
        temperature: orchestrator.config.agent_loop.temperature,
        max_tokens: orchestrator.config.agent_loop.max_tokens,
        options: LlmOptions {
            use_instruct_model: true,
            ..LlmOptions::default()
        },
    };

    let mut upstream = orchestrator
        .instruct
        .chat_stream(&request)
        .await
        .map_err(TurnAbort::Failed)?;

    let mut answer = String::new();
    let mut tokens_used = 0u32;

    if orchestrator.config.agent_loop.response_format == ResponseFormatMode::Structured {
        let heading = apply_response_format(ResponseFormatMode::Structured, "");
        answer.push_str(&heading);
        sink.emit(response_chunk(conversation_id, heading, iteration, true))
            .await?;
    }

    while let Some(event) = upstream.next().await {
        match event.map_err(TurnAbort::Failed)? {
            StreamEvent::Token { text } => {
                answer.push_str(&text);
                sink.emit(response_chunk(conversation_id, text, iteration, true))
                    .await?;
            }
            StreamEvent::Done {
                tokens_used: t, ..
            } => {
                if let Some(t) = t {
                    tokens_used = t;
                }
            }
            // The instruct model neither reasons nor calls tools here.
            StreamEvent::Thinking { .. } | StreamEvent::ToolCallsReady { .. } => {}
        }
    }

    state.total_tokens += u64::from(tokens_used);

    sink.emit(tool_result_event(
        conversation_id,
        &call.name,
        &call.id,
        "Final answer streamed successfully",
        true,
        iteration,
    ))
    .await?;

    state
        .recorder
        .record_finalize(iteration, &call.id, &args.user_question);

    let metadata = state.recorder.snapshot_json(iteration, state.total_tokens);
    orchestrator
        .context
        .add_message_with_metadata(
            conversation_id,
            StoredMessage::new(conversation_id, Role::Assistant, answer.clone()),
            metadata,
        )
        .await?;

    state.final_content = answer;
    state.persisted_final = true;
    state.continue_loop = false;

    tracing::debug!(conversation_id, iteration, tokens_used, "finalize phase complete");
    Ok(())
}
