//! Inline tool commands embedded in responder output
//!
//! A reply such as `Sure! [TOOL: lights.on room="kitchen"]` carries an action
//! for the dispatcher. Markers are removed from the spoken text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::actions::{Action, ActionDispatcher, ActionResult, Params};

static TOOL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[TOOL:\s*([^\s\]]+)([^\]]*)\]").expect("valid regex")
});

static TOOL_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="([^"]*)""#).expect("valid regex"));

/// Spoken when a reply consisted only of tool markers
pub const EMPTY_REPLY: &str = "Done!";

/// One `[TOOL: ...]` marker
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    pub tool: String,
    pub params: Params,
}

/// Split a reply into its spoken text and the tool commands it contains
///
/// Text without markers is returned unchanged.
#[must_use]
pub fn extract_tool_commands(reply: &str) -> (String, Vec<ToolCommand>) {
    let commands: Vec<ToolCommand> = TOOL_MARKER
        .captures_iter(reply)
        .map(|caps| ToolCommand {
            tool: caps[1].to_string(),
            params: TOOL_PARAM
                .captures_iter(&caps[2])
                .map(|p| (p[1].to_string(), Value::String(p[2].to_string())))
                .collect(),
        })
        .collect();

    if commands.is_empty() {
        return (reply.to_string(), commands);
    }

    let stripped = TOOL_MARKER.replace_all(reply, " ");
    let spoken = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let spoken = if spoken.is_empty() {
        EMPTY_REPLY.to_string()
    } else {
        spoken
    };
    (spoken, commands)
}

/// Run every inline command synchronously, in order
///
/// Returns the spoken text and one result per command. Failures are
/// reported in the results and never abort the remaining commands.
pub async fn resolve_inline_tools(
    dispatcher: &ActionDispatcher,
    reply: &str,
    client_id: &str,
) -> (String, Vec<ActionResult>) {
    let (spoken, commands) = extract_tool_commands(reply);
    let mut results = Vec::with_capacity(commands.len());

    for command in commands {
        let mut meta = Map::new();
        meta.insert("user_id".to_string(), json!(client_id));
        let action = Action::new(command.tool, command.params).with_meta(meta);

        tracing::info!(client_id, action_id = %action.id, kind = %action.kind, "executing inline tool command");
        results.push(dispatcher.execute_sync(&action).await);
    }

    (spoken, results)
}
