//! Translate buffered `OpenAI` Chat Completion responses into Anthropic
//! Messages responses, plus the finish-reason lookup shared with the
//! streaming translator.

use crate::error::{ProxyError, Result};

use super::anthropic::{ErrorResponse, MessagesResponse, ResponseContentBlock, Usage};
use super::openai::{ChatCompletionResponse, ChatErrorResponse};

/// Translate a complete Chat Completion response into a Messages response.
///
/// Only the first choice is considered. A tool call whose `arguments` string
/// is not valid JSON fails the whole translation: a structurally invalid
/// tool call cannot be honored downstream.
pub fn chat_to_messages(
    resp: &ChatCompletionResponse,
    request_id: Option<&str>,
) -> Result<MessagesResponse> {
    let choice = resp.choices.first().ok_or_else(|| ProxyError::Provider {
        message: "backend response carried no choices".to_string(),
    })?;

    let mut content: Vec<ResponseContentBlock> = Vec::new();

    if let Some(ref text) = choice.message.content {
        if !text.is_empty() {
            content.push(ResponseContentBlock::Text { text: text.clone() });
        }
    }

    if let Some(ref tool_calls) = choice.message.tool_calls {
        for tc in tool_calls {
            let input: serde_json::Value = serde_json::from_str(&tc.function.arguments)
                .map_err(|source| ProxyError::ToolArguments {
                    tool: tc.function.name.clone(),
                    source,
                })?;

            content.push(ResponseContentBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.function.name.clone(),
                input,
            });
        }
    }

    let id = match request_id {
        Some(id) => id.to_string(),
        None => fresh_message_id(),
    };

    let usage = resp.usage.as_ref().map_or_else(Usage::default, |u| Usage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });

    Ok(MessagesResponse {
        id,
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: resp.model.clone(),
        stop_reason: choice
            .finish_reason
            .as_deref()
            .map(|r| stop_reason_buffered(r).to_string()),
        stop_sequence: None,
        usage,
    })
}

/// A fresh Anthropic-style message id: `msg_` plus twelve hex characters.
pub fn fresh_message_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("msg_{}", &hex[..12])
}

/// The finish-reason table shared by both translation directions.
fn finish_reason_entry(reason: &str) -> Option<&'static str> {
    match reason {
        "stop" => Some("end_turn"),
        "length" => Some("max_tokens"),
        "tool_calls" | "function_call" => Some("tool_use"),
        "content_filter" => Some("stop_sequence"),
        _ => None,
    }
}

/// Buffered-response mapping: unrecognized reasons pass through verbatim.
pub fn stop_reason_buffered(reason: &str) -> &str {
    finish_reason_entry(reason).unwrap_or(reason)
}

/// Streaming mapping: unrecognized reasons fall back to `end_turn`.
pub fn stop_reason_streaming(reason: &str) -> &'static str {
    finish_reason_entry(reason).unwrap_or("end_turn")
}

/// Translate an `OpenAI` error body into an Anthropic error response.
pub fn chat_error_to_messages(err: &ChatErrorResponse) -> ErrorResponse {
    let error_type = match err.error.error_type.as_str() {
        "invalid_request_error" => "invalid_request_error",
        "rate_limit_error" | "rate_limit_exceeded" => "rate_limit_error",
        _ => "api_error",
    };
    ErrorResponse::new(error_type, &err.error.message)
}
