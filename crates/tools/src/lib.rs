//! Callable tools and the registry that holds them.
//!
//! The registry is initialised once at startup and read-only afterwards.
//! [`ToolRegistry::execute`] never returns an error across the component
//! boundary: any failure — unknown tool, unparseable arguments, a tool
//! that errored — comes back as a [`ToolExecution`] with `success = false`
//! so the loop can feed it to the model and recover.

pub mod finalize;
pub mod rag;
pub mod registry;

pub use finalize::{AnswerStyle, FinalizeArgs, FinalizeTool, FINALIZE_TOOL_NAME};
pub use rag::{RagSearchTool, RAG_TOOL_NAME};
pub use registry::{Tool, ToolExecution, ToolRegistry};
