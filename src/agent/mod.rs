//! Response generation and inline tool commands

mod commands;
mod context;
mod responder;

pub use commands::{EMPTY_REPLY, ToolCommand, extract_tool_commands, resolve_inline_tools};
pub use context::{ConversationContext, Exchange};
pub use responder::{
    ChatResponder, DEFAULT_SYSTEM_PROMPT, OFFLINE_REPLY, OfflineResponder, Responder,
};
