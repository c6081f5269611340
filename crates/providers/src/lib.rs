//! LLM provider adapters.
//!
//! A provider translates between the domain message/tool vocabulary and one
//! vendor's wire protocol, exposing both a blocking and a streaming call.
//! All three model configurations of this system (chat, thinking, instruct)
//! speak the OpenAI chat-completions dialect, so one adapter covers them —
//! the request options select which concrete model id is used.

pub mod openai_compat;
pub mod sse;
pub mod traits;
pub mod util;

pub use openai_compat::OpenAiCompatProvider;
pub use traits::{ChatRequest, LlmOptions, LlmProvider};
