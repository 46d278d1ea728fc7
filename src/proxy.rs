//! Forwarding layer: sends translated requests upstream and translates what
//! comes back, buffered or streamed.

use crate::audit::{fresh_request_id, AuditLog, AuditMetadata};
use crate::config::ProxyConfig;
use crate::convert::anthropic::{ErrorResponse, MessagesRequest, MessagesResponse};
use crate::convert::openai::{ChatCompletionResponse, ChatErrorResponse};
use crate::convert::request::messages_to_chat;
use crate::convert::response::{chat_error_to_messages, chat_to_messages};
use crate::convert::stream::StreamTranslator;
use crate::error::{ProxyError, Result};
use crate::logging::SharedLogger;

use bytes::Bytes;
use futures::stream::{self, Stream};
use futures::StreamExt;
use std::pin::Pin;
use std::time::Instant;

/// Outcome of proxying a non-streaming request.
pub enum ProxyResult {
    Success(MessagesResponse),
    Error(ErrorResponse, u16),
}

/// A stream of outgoing Anthropic SSE events.
pub type SseStream =
    Pin<Box<dyn Stream<Item = std::result::Result<SseEvent, std::io::Error>> + Send>>;

#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Build the outbound Chat Completions body: convert, apply the model map,
/// set the stream flag, and drop backend-rejected keys.
fn outbound_body(
    req: &MessagesRequest,
    config: &ProxyConfig,
    streaming: bool,
) -> Result<(String, serde_json::Value)> {
    let mut chat_req = messages_to_chat(req);
    let target_model = config.target_model(&req.model);
    chat_req.model = target_model.clone();
    chat_req.stream = streaming.then_some(true);

    let mut body = serde_json::to_value(&chat_req)?;
    if let Some(map) = body.as_object_mut() {
        for key in &config.params.drop {
            map.remove(key);
        }
    }

    Ok((target_model, body))
}

/// Forward a non-streaming Messages request through the configured backend.
pub async fn proxy_non_streaming(
    req: &MessagesRequest,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
    audit: &AuditLog,
) -> Result<ProxyResult> {
    let started = Instant::now();
    let api_key = config.resolve_api_key()?;
    let base_url = config.effective_base_url()?;
    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let (target_model, body) = outbound_body(req, config, false)?;

    logger.info("proxy", format!("POST {url} model={target_model}"));

    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| ProxyError::provider(format!("Request failed: {e}")))?;

    let status = response.status().as_u16();
    let resp_body = response
        .text()
        .await
        .map_err(|e| ProxyError::provider(format!("Failed to read response body: {e}")))?;

    logger.debug(
        "proxy",
        format!("Response status={status} body_len={}", resp_body.len()),
    );

    if status >= 400 {
        let anthropic_err = match serde_json::from_str::<ChatErrorResponse>(&resp_body) {
            Ok(err) => {
                logger.warn("proxy", format!("Backend error: {}", err.error.message));
                chat_error_to_messages(&err)
            }
            Err(_) => ErrorResponse::api_error(format!(
                "Backend returned status {status}: {}",
                truncate(&resp_body, 500)
            )),
        };
        return Ok(ProxyResult::Error(anthropic_err, status));
    }

    let chat_resp: ChatCompletionResponse = serde_json::from_str(&resp_body).map_err(|e| {
        ProxyError::provider(format!(
            "Failed to parse backend response: {e}. Body: {}",
            truncate(&resp_body, 300)
        ))
    })?;

    let anthropic_resp = chat_to_messages(&chat_resp, None)?;

    logger.info(
        "proxy",
        format!(
            "Completed: in={} out={} tokens",
            anthropic_resp.usage.input_tokens, anthropic_resp.usage.output_tokens
        ),
    );

    if audit.is_enabled() {
        let metadata = AuditMetadata {
            request_id: fresh_request_id(),
            backend: config.backend.name.clone(),
            original_model: req.model.clone(),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        let captured = audit.record(
            &serde_json::to_value(req)?,
            Some(&serde_json::to_value(&anthropic_resp)?),
            &metadata,
        );
        if let Err(e) = captured {
            logger.warn("audit", format!("Failed to capture exchange: {e}"));
        }
    }

    Ok(ProxyResult::Success(anthropic_resp))
}

/// Forward a streaming Messages request, returning Anthropic SSE events.
pub async fn proxy_streaming(
    req: &MessagesRequest,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<SseStream> {
    let api_key = config.resolve_api_key()?;
    let base_url = config.effective_base_url()?;
    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let (target_model, body) = outbound_body(req, config, true)?;

    logger.info("proxy", format!("POST {url} model={target_model} (streaming)"));

    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| ProxyError::provider(format!("Streaming request failed: {e}")))?;

    let status = response.status().as_u16();

    if status >= 400 {
        let resp_body = response.text().await.unwrap_or_default();
        logger.warn(
            "proxy",
            format!("Streaming error status={status}: {}", truncate(&resp_body, 300)),
        );

        let error_event = match serde_json::from_str::<ChatErrorResponse>(&resp_body) {
            Ok(err) => chat_error_to_messages(&err),
            Err(_) => ErrorResponse::api_error(format!("Backend returned status {status}")),
        };

        let event = SseEvent {
            event: "error".to_string(),
            data: serde_json::to_string(&error_event).unwrap_or_default(),
        };
        return Ok(Box::pin(stream::once(async move { Ok(event) })));
    }

    let event_stream =
        sse_translate_stream(response.bytes_stream(), target_model, logger.clone());

    Ok(Box::pin(event_stream))
}

/// Feed upstream SSE lines through a per-connection [`StreamTranslator`] in
/// arrival order, emitting translated events as soon as they are available.
fn sse_translate_stream(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
    model: String,
    logger: SharedLogger,
) -> impl Stream<Item = std::result::Result<SseEvent, std::io::Error>> + Send + 'static {
    async_stream::stream! {
        let mut translator = StreamTranslator::new(&model);
        let mut buffer = String::new();

        tokio::pin!(byte_stream);

        'read: while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    logger.error("stream", format!("Byte stream error: {e}"));
                    break;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline_pos) = buffer.find('\n') {
                let line = buffer[..newline_pos].to_string();
                buffer.drain(..=newline_pos);

                for event in translator.process_line(&line) {
                    yield Ok(sse_event(&event));
                }

                if translator.is_terminated() {
                    break 'read;
                }
            }
        }

        // Close out streams whose upstream dropped without [DONE].
        for event in translator.close() {
            yield Ok(sse_event(&event));
        }

        logger.info("stream", "Stream completed");
    }
}

fn sse_event(event: &crate::convert::anthropic::StreamEvent) -> SseEvent {
    SseEvent {
        event: event.event_name().to_string(),
        data: serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string()),
    }
}

/// Forward an Anthropic-format request untouched (passthrough mode).
pub async fn proxy_passthrough(
    body: Bytes,
    headers: &reqwest::header::HeaderMap,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<(u16, reqwest::header::HeaderMap, Bytes)> {
    let api_key = config.resolve_api_key()?;
    let base_url = config.effective_base_url()?;
    let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));

    logger.info("proxy", format!("Passthrough POST {url}"));

    let mut req_builder = client
        .post(&url)
        .header("x-api-key", &api_key)
        .header("Content-Type", "application/json");

    for header in ["anthropic-version", "anthropic-beta"] {
        if let Some(value) = headers.get(header) {
            req_builder = req_builder.header(header, value);
        }
    }

    let response = req_builder
        .body(body)
        .send()
        .await
        .map_err(|e| ProxyError::provider(format!("Passthrough request failed: {e}")))?;

    let status = response.status().as_u16();
    let resp_headers = response.headers().clone();
    let resp_body = response
        .bytes()
        .await
        .map_err(|e| ProxyError::provider(format!("Failed to read passthrough response: {e}")))?;

    logger.info(
        "proxy",
        format!("Passthrough response: status={status} len={}", resp_body.len()),
    );

    Ok((status, resp_headers, resp_body))
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        &s[..max]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, LoggingSettings, ParamsConfig, PromptSettings};
    use crate::convert::anthropic::{Message, MessageContent, Role};
    use std::collections::HashMap;

    fn config_with_drop(drop: Vec<String>) -> ProxyConfig {
        let mut models = HashMap::new();
        models.insert("claude-sonnet-4-20250514".to_string(), "grok-4".to_string());
        ProxyConfig {
            port: 0,
            backend: BackendConfig {
                name: "grok".to_string(),
                base_url: None,
                api_key_env: None,
                format: None,
            },
            models,
            params: ParamsConfig { drop },
            logging: LoggingSettings::default(),
            prompt: PromptSettings::default(),
        }
    }

    fn request() -> MessagesRequest {
        MessagesRequest {
            model: "claude-sonnet-4-20250514".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: MessageContent::Text("Hi".to_string()),
                tool_use_id: None,
            }],
            system: None,
            max_tokens: Some(64),
            temperature: None,
            stream: None,
            tools: None,
            tool_choice: Some(serde_json::json!({"type": "auto"})),
            extra: HashMap::default(),
        }
    }

    #[test]
    fn outbound_body_applies_model_map_and_stream_flag() {
        let (model, body) = outbound_body(&request(), &config_with_drop(vec![]), true).unwrap();
        assert_eq!(model, "grok-4");
        assert_eq!(body["model"], "grok-4");
        assert_eq!(body["stream"], true);
        assert_eq!(body["tool_choice"]["type"], "auto");
    }

    #[test]
    fn outbound_body_drops_configured_params() {
        let config = config_with_drop(vec!["tool_choice".to_string()]);
        let (_, body) = outbound_body(&request(), &config, false).unwrap();
        assert!(body.get("tool_choice").is_none());
        assert!(body.get("stream").is_none());
    }
}
