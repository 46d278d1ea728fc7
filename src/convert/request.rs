//! Translate Anthropic Messages API requests into `OpenAI` Chat Completions requests.
//!
//! Pure functions, no I/O. The model id is copied verbatim; backend model
//! mapping and the `stream` flag are the forwarding layer's concern.

use super::anthropic::{
    ContentBlock, Message, MessageContent, MessagesRequest, Role, ToolResultContent,
};
use super::openai::{
    ChatCompletionRequest, ChatFunction, ChatMessage, ChatTool, ChatToolCall,
    ChatToolCallFunction,
};

/// Translate a Messages request into a Chat Completions request.
pub fn messages_to_chat(req: &MessagesRequest) -> ChatCompletionRequest {
    let mut messages = Vec::new();

    if let Some(ref system) = req.system {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: Some(system.resolve()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for msg in &req.messages {
        messages.push(translate_message(msg));
    }

    let tools = req.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|t| ChatTool {
                tool_type: "function".to_string(),
                function: ChatFunction {
                    name: t.name.clone(),
                    description: t.description.clone().unwrap_or_default(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect()
    });

    ChatCompletionRequest {
        model: req.model.clone(),
        messages,
        max_tokens: req.max_tokens,
        temperature: req.temperature,
        stream: None,
        tools,
        tool_choice: req.tool_choice.clone(),
    }
}

/// Translate a single Messages message.
///
/// A `tool`-role message becomes an OpenAI tool message. A message whose
/// block array contains `tool_result` blocks yields only the first of them,
/// converted to a tool message; any further tool results in the same message
/// are dropped. Callers that need one tool message per result must split the
/// blocks across messages themselves.
fn translate_message(msg: &Message) -> ChatMessage {
    if msg.role == Role::Tool {
        return ChatMessage {
            role: "tool".to_string(),
            content: Some(msg.content.as_tool_output()),
            tool_calls: None,
            tool_call_id: Some(msg.tool_use_id.clone().unwrap_or_default()),
        };
    }

    let blocks = match &msg.content {
        MessageContent::Text(text) => {
            return ChatMessage {
                role: msg.role.as_str().to_string(),
                content: Some(text.clone()),
                tool_calls: None,
                tool_call_id: None,
            };
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<ChatToolCall> = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => text_parts.push(text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ChatToolCall {
                    id: id.clone(),
                    call_type: "function".to_string(),
                    function: ChatToolCallFunction {
                        name: name.clone(),
                        arguments: serde_json::to_string(input).unwrap_or_default(),
                    },
                });
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                return tool_result_message(tool_use_id, content.as_ref(), *is_error);
            }
        }
    }

    ChatMessage {
        role: msg.role.as_str().to_string(),
        content: Some(text_parts.join("\n")),
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        tool_call_id: None,
    }
}

fn tool_result_message(
    tool_use_id: &str,
    content: Option<&ToolResultContent>,
    is_error: Option<bool>,
) -> ChatMessage {
    let text = content.map(ToolResultContent::as_text).unwrap_or_default();
    let text = if is_error == Some(true) {
        format!("[ERROR] {text}")
    } else {
        text
    };

    ChatMessage {
        role: "tool".to_string(),
        content: Some(text),
        tool_calls: None,
        tool_call_id: Some(tool_use_id.to_string()),
    }
}
