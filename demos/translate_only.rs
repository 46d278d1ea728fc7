//! Demonstrate the translation layer without a server.
//!
//! Usage:
//!   `cargo run --example translate_only`

use std::collections::HashMap;

use unified_proxy::convert::anthropic::{
    Message, MessageContent, MessagesRequest, Role, SystemContent,
};
use unified_proxy::convert::openai::ChatCompletionResponse;
use unified_proxy::convert::request::messages_to_chat;
use unified_proxy::convert::response::chat_to_messages;
use unified_proxy::convert::stream::StreamTranslator;

fn main() {
    // A Messages API request, as an Anthropic-format client would send it.
    let messages_req = MessagesRequest {
        model: "claude-sonnet-4-20250514".to_string(),
        messages: vec![
            Message {
                role: Role::User,
                content: MessageContent::Text("What is the capital of France?".to_string()),
                tool_use_id: None,
            },
            Message {
                role: Role::Assistant,
                content: MessageContent::Text("The capital of France is Paris.".to_string()),
                tool_use_id: None,
            },
            Message {
                role: Role::User,
                content: MessageContent::Text("And Germany?".to_string()),
                tool_use_id: None,
            },
        ],
        system: Some(SystemContent::Text(
            "You are a geography expert. Be concise.".to_string(),
        )),
        max_tokens: Some(1024),
        temperature: Some(0.7),
        stream: Some(true),
        tools: None,
        tool_choice: None,
        extra: HashMap::default(),
    };

    let chat_req = messages_to_chat(&messages_req);

    println!("=== Translated Request (Chat Completions format) ===");
    println!("{}", serde_json::to_string_pretty(&chat_req).unwrap());

    // Simulate a backend response and translate it back.
    let chat_resp: ChatCompletionResponse = serde_json::from_value(serde_json::json!({
        "id": "chatcmpl-demo",
        "model": "grok-4",
        "choices": [{
            "message": {"role": "assistant", "content": "The capital of Germany is Berlin."},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 42, "completion_tokens": 8, "total_tokens": 50}
    }))
    .unwrap();

    let messages_resp = chat_to_messages(&chat_resp, None).unwrap();

    println!();
    println!("=== Translated Response (Messages format) ===");
    println!("{}", serde_json::to_string_pretty(&messages_resp).unwrap());

    // Drive the streaming translator with raw upstream SSE lines.
    println!();
    println!("=== Streaming Translation Demo ===");

    let mut translator = StreamTranslator::new("grok-4");

    let lines = [
        r#"data: {"model":"grok-4","choices":[{"delta":{"role":"assistant","content":"The"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":" capital"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":" is Berlin."}}]}"#,
        r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        "data: [DONE]",
    ];

    for line in lines {
        for event in translator.process_line(line) {
            let (event_line, data_line) = event.to_sse_lines();
            println!("{event_line}");
            println!("{data_line}");
            println!();
        }
    }

    println!("Done! The translation layer works without any network calls.");
}
