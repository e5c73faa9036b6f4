//! Externally triggered tools that search and push results to viewers.

mod dispatcher;

pub use dispatcher::{
    MANUAL_SOURCE, TOOL_CALL_SOURCE, ToolCallRequest, ToolDispatcher, ToolName, ToolOutput,
    ToolStatus,
};
