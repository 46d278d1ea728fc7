//! State machine translating an upstream Chat Completions SSE stream into
//! Anthropic Messages SSE events.
//!
//! A [`StreamTranslator`] owns the state of exactly one logical response
//! stream. The forwarding loop feeds it raw upstream lines in arrival order
//! via [`StreamTranslator::process_line`]; each call returns the events to
//! write out immediately, so nothing is buffered to the end of the stream.
//!
//! Event ordering guarantees, which downstream clients depend on:
//! - exactly one `message_start`, before everything else;
//! - one `content_block_start`/`content_block_stop` pair per block index,
//!   text at index 0, tool calls at their upstream index plus one;
//! - `message_delta` at most once, after all blocks are closed, and a single
//!   terminal `message_stop`.

use std::collections::BTreeMap;

use super::anthropic::{
    Delta, DeltaUsage, MessageDeltaBody, MessagesResponse, ResponseContentBlock, StreamEvent,
    Usage,
};
use super::openai::{ChatCompletionChunk, ChunkToolCall};
use super::response::{fresh_message_id, stop_reason_streaming};

const DONE_SENTINEL: &str = "[DONE]";

/// An in-flight tool call, keyed by its upstream index.
#[derive(Debug, Clone, Default)]
struct OpenToolCall {
    id: String,
    /// Captured from name fragments; not re-emitted as its own event.
    #[allow(dead_code)]
    name: String,
    /// Argument fragments accumulate here; the whole buffer is re-parsed on
    /// every fragment (see `argument_delta`).
    arguments: String,
}

#[derive(Debug)]
pub struct StreamTranslator {
    /// Model name reported in `message_start` when the chunk carries none.
    fallback_model: String,
    message_id: String,
    started: bool,
    text_block_open: bool,
    open_tool_calls: BTreeMap<u64, OpenToolCall>,
    input_tokens: u64,
    output_tokens: u64,
    finish_emitted: bool,
    terminated: bool,
}

impl StreamTranslator {
    pub fn new(fallback_model: &str) -> Self {
        Self {
            fallback_model: fallback_model.to_string(),
            message_id: String::new(),
            started: false,
            text_block_open: false,
            open_tool_calls: BTreeMap::new(),
            input_tokens: 0,
            output_tokens: 0,
            finish_emitted: false,
            terminated: false,
        }
    }

    /// Whether the terminal `message_stop` has been emitted.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Process one raw line from the upstream SSE stream, in arrival order.
    ///
    /// Blank lines and lines without the `data:` marker produce nothing, as
    /// does a payload that fails to parse (keep-alive noise is tolerated
    /// rather than aborting a healthy stream).
    pub fn process_line(&mut self, line: &str) -> Vec<StreamEvent> {
        let line = line.trim();
        if line.is_empty() || self.terminated {
            return Vec::new();
        }

        let Some(payload) = line
            .strip_prefix("data: ")
            .or_else(|| line.strip_prefix("data:"))
            .map(str::trim)
        else {
            return Vec::new();
        };

        if payload == DONE_SENTINEL {
            self.terminated = true;
            return vec![StreamEvent::MessageStop];
        }

        let chunk: ChatCompletionChunk = match serde_json::from_str(payload) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        let mut events = Vec::new();

        if !self.started {
            self.started = true;
            self.message_id = fresh_message_id();
            events.push(self.message_start(&chunk));
        }

        if let Some(choice) = chunk.choices.first() {
            if let Some(ref content) = choice.delta.content {
                if !content.is_empty() {
                    self.text_delta(content, &mut events);
                }
            }

            if let Some(ref tool_calls) = choice.delta.tool_calls {
                for tc in tool_calls {
                    self.tool_call_delta(tc, &mut events);
                }
            }

            if let Some(ref reason) = choice.finish_reason {
                if !reason.is_empty() {
                    self.finish(reason, &mut events);
                }
            }
        }

        // Counters update after choice handling: a message_delta carried in
        // the same chunk as a usage object reports the previous counter.
        if let Some(ref usage) = chunk.usage {
            self.input_tokens = usage.prompt_tokens;
            self.output_tokens = usage.completion_tokens;
        }

        events
    }

    /// Close out a stream whose upstream ended without the `[DONE]`
    /// sentinel, so the client still sees a well-formed event sequence.
    /// Produces nothing if no chunk ever arrived.
    pub fn close(&mut self) -> Vec<StreamEvent> {
        if self.terminated || !self.started {
            return Vec::new();
        }
        let mut events = Vec::new();
        if !self.finish_emitted {
            self.finish("stop", &mut events);
        }
        self.terminated = true;
        events.push(StreamEvent::MessageStop);
        events
    }

    fn message_start(&self, chunk: &ChatCompletionChunk) -> StreamEvent {
        let model = chunk
            .model
            .clone()
            .unwrap_or_else(|| self.fallback_model.clone());

        StreamEvent::MessageStart {
            message: MessagesResponse {
                id: self.message_id.clone(),
                response_type: "message".to_string(),
                role: "assistant".to_string(),
                content: Vec::new(),
                model,
                stop_reason: None,
                stop_sequence: None,
                usage: Usage {
                    input_tokens: self.input_tokens,
                    output_tokens: 0,
                },
            },
        }
    }

    fn text_delta(&mut self, content: &str, events: &mut Vec<StreamEvent>) {
        if !self.text_block_open {
            self.text_block_open = true;
            events.push(StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ResponseContentBlock::Text {
                    text: String::new(),
                },
            });
        }

        events.push(StreamEvent::ContentBlockDelta {
            index: 0,
            delta: Delta::TextDelta {
                text: content.to_string(),
            },
        });
    }

    fn tool_call_delta(&mut self, tc: &ChunkToolCall, events: &mut Vec<StreamEvent>) {
        // Text owns index 0; tool blocks live at upstream index + 1.
        let block_index = (tc.index + 1) as usize;

        if !self.open_tool_calls.contains_key(&tc.index) {
            let call = OpenToolCall {
                id: tc.id.clone().unwrap_or_default(),
                ..OpenToolCall::default()
            };
            events.push(StreamEvent::ContentBlockStart {
                index: block_index,
                content_block: ResponseContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: String::new(),
                    input: serde_json::Value::Object(serde_json::Map::new()),
                },
            });
            self.open_tool_calls.insert(tc.index, call);
        }

        let Some(ref function) = tc.function else {
            return;
        };
        let Some(call) = self.open_tool_calls.get_mut(&tc.index) else {
            return;
        };

        if let Some(ref name) = function.name {
            call.name = name.clone();
        }

        if let Some(ref fragment) = function.arguments {
            call.arguments.push_str(fragment);

            // Re-parse the whole accumulated buffer each time. Once it
            // parses, the re-serialized full object goes out as the delta;
            // until then the raw fragment does.
            let partial_json = match serde_json::from_str::<serde_json::Value>(&call.arguments) {
                Ok(value) => serde_json::to_string(&value).unwrap_or_else(|_| fragment.clone()),
                Err(_) => fragment.clone(),
            };

            events.push(StreamEvent::ContentBlockDelta {
                index: block_index,
                delta: Delta::InputJsonDelta { partial_json },
            });
        }
    }

    fn finish(&mut self, reason: &str, events: &mut Vec<StreamEvent>) {
        if self.finish_emitted {
            return;
        }
        self.finish_emitted = true;

        if self.text_block_open {
            self.text_block_open = false;
            events.push(StreamEvent::ContentBlockStop { index: 0 });
        }

        for index in self.open_tool_calls.keys() {
            events.push(StreamEvent::ContentBlockStop {
                index: (index + 1) as usize,
            });
        }
        self.open_tool_calls.clear();

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop_reason_streaming(reason).to_string()),
                stop_sequence: None,
            },
            usage: DeltaUsage {
                output_tokens: self.output_tokens,
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::event_name).collect()
    }

    fn drive(translator: &mut StreamTranslator, lines: &[&str]) -> Vec<StreamEvent> {
        lines
            .iter()
            .flat_map(|l| translator.process_line(l))
            .collect()
    }

    #[test]
    fn text_stream_emits_canonical_sequence() {
        let mut translator = StreamTranslator::new("grok-4");
        let events = drive(
            &mut translator,
            &[
                r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
                r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
                r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
                "data: [DONE]",
            ],
        );

        assert_eq!(
            names(&events),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        match &events[1] {
            StreamEvent::ContentBlockStart {
                index,
                content_block: ResponseContentBlock::Text { text },
            } => {
                assert_eq!(*index, 0);
                assert!(text.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &events[2] {
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: Delta::TextDelta { text },
            } => assert_eq!(text, "Hel"),
            other => panic!("unexpected event {other:?}"),
        }
        match &events[3] {
            StreamEvent::ContentBlockDelta {
                delta: Delta::TextDelta { text },
                ..
            } => assert_eq!(text, "lo"),
            other => panic!("unexpected event {other:?}"),
        }
        match &events[5] {
            StreamEvent::MessageDelta { delta, .. } => {
                assert_eq!(delta.stop_reason.as_deref(), Some("end_turn"));
                assert_eq!(delta.stop_sequence, None);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn message_start_carries_chunk_model_and_zero_usage() {
        let mut translator = StreamTranslator::new("fallback");
        let events =
            translator.process_line(r#"data: {"model":"grok-4","choices":[{"delta":{}}]}"#);

        match &events[0] {
            StreamEvent::MessageStart { message } => {
                assert!(message.id.starts_with("msg_"));
                assert_eq!(message.model, "grok-4");
                assert!(message.content.is_empty());
                assert_eq!(message.usage.input_tokens, 0);
                assert_eq!(message.usage.output_tokens, 0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn fallback_model_used_when_chunk_has_none() {
        let mut translator = StreamTranslator::new("grok-4");
        let events = translator.process_line(r#"data: {"choices":[{"delta":{}}]}"#);
        match &events[0] {
            StreamEvent::MessageStart { message } => assert_eq!(message.model, "grok-4"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn blank_marker_less_and_unparsable_lines_are_skipped() {
        let mut translator = StreamTranslator::new("grok-4");
        assert!(translator.process_line("").is_empty());
        assert!(translator.process_line("   ").is_empty());
        assert!(translator.process_line(": keep-alive").is_empty());
        assert!(translator.process_line("event: noise").is_empty());
        assert!(translator.process_line("data: {not json").is_empty());

        // The stream is still healthy afterwards.
        let events = translator.process_line(r#"data: {"choices":[{"delta":{"content":"ok"}}]}"#);
        assert_eq!(
            names(&events),
            vec!["message_start", "content_block_start", "content_block_delta"]
        );
    }

    #[test]
    fn complete_tool_arguments_reserialize_as_full_object() {
        let mut translator = StreamTranslator::new("grok-4");
        let events = drive(
            &mut translator,
            &[
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"lookup","arguments":"{\"a\":1}"}}]}}]}"#,
            ],
        );

        assert_eq!(
            names(&events),
            vec!["message_start", "content_block_start", "content_block_delta"]
        );
        match &events[1] {
            StreamEvent::ContentBlockStart {
                index,
                content_block: ResponseContentBlock::ToolUse { id, name, input },
            } => {
                assert_eq!(*index, 1);
                assert_eq!(id, "call_1");
                assert!(name.is_empty());
                assert_eq!(input, &serde_json::json!({}));
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &events[2] {
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: Delta::InputJsonDelta { partial_json },
            } => {
                let parsed: serde_json::Value = serde_json::from_str(partial_json).unwrap();
                assert_eq!(parsed, serde_json::json!({"a": 1}));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn incomplete_tool_arguments_emit_raw_fragments_until_they_parse() {
        let mut translator = StreamTranslator::new("grok-4");
        let _ = translator.process_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"lookup","arguments":"{\"city\":"}}]}}]}"#,
        );

        // Buffer is still `{"city":` -- not yet JSON, the raw fragment goes out.
        let events = translator.process_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Lon"}}]}}]}"#,
        );
        match &events[0] {
            StreamEvent::ContentBlockDelta {
                delta: Delta::InputJsonDelta { partial_json },
                ..
            } => assert_eq!(partial_json, "\"Lon"),
            other => panic!("unexpected event {other:?}"),
        }

        // The closing fragment completes the buffer; the full object is emitted.
        let events = translator.process_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"don\"}"}}]}}]}"#,
        );
        match &events[0] {
            StreamEvent::ContentBlockDelta {
                delta: Delta::InputJsonDelta { partial_json },
                ..
            } => {
                let parsed: serde_json::Value = serde_json::from_str(partial_json).unwrap();
                assert_eq!(parsed, serde_json::json!({"city": "London"}));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn repeated_tool_index_opens_one_block() {
        let mut translator = StreamTranslator::new("grok-4");
        let first = translator.process_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"arguments":"{"}}]}}]}"#,
        );
        let second = translator.process_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"}"}}]}}]}"#,
        );

        let starts = |events: &[StreamEvent]| {
            events
                .iter()
                .filter(|e| e.event_name() == "content_block_start")
                .count()
        };
        assert_eq!(starts(&first), 1);
        assert_eq!(starts(&second), 0);
    }

    #[test]
    fn text_and_tool_blocks_close_before_message_delta() {
        let mut translator = StreamTranslator::new("grok-4");
        let _ = drive(
            &mut translator,
            &[
                r#"data: {"choices":[{"delta":{"content":"Checking"}}]}"#,
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"lookup","arguments":"{}"}}]}}]}"#,
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_2","function":{"name":"fetch","arguments":"{}"}}]}}]}"#,
            ],
        );

        let events =
            translator.process_line(r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#);

        let stops: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ContentBlockStop { index } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(stops, vec![0, 1, 2]);
        assert_eq!(events.last().unwrap().event_name(), "message_delta");
        match events.last().unwrap() {
            StreamEvent::MessageDelta { delta, .. } => {
                assert_eq!(delta.stop_reason.as_deref(), Some("tool_use"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn duplicate_finish_reason_emits_one_message_delta() {
        let mut translator = StreamTranslator::new("grok-4");
        let _ = translator.process_line(r#"data: {"choices":[{"delta":{"content":"x"}}]}"#);
        let first =
            translator.process_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        let second =
            translator.process_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#);

        assert!(names(&first).contains(&"message_delta"));
        assert!(second.is_empty());
    }

    #[test]
    fn usage_chunk_updates_counters_after_choice_handling() {
        let mut translator = StreamTranslator::new("grok-4");
        let _ = translator.process_line(r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#);

        // Usage arriving with the finish chunk is only visible afterwards.
        let events = translator.process_line(
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":9,"completion_tokens":4}}"#,
        );
        match events.last().unwrap() {
            StreamEvent::MessageDelta { usage, .. } => assert_eq!(usage.output_tokens, 0),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn usage_seen_before_finish_is_reported() {
        let mut translator = StreamTranslator::new("grok-4");
        let _ = translator.process_line(r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#);
        let _ = translator.process_line(
            r#"data: {"choices":[],"usage":{"prompt_tokens":9,"completion_tokens":4}}"#,
        );
        let events =
            translator.process_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#);

        match events.last().unwrap() {
            StreamEvent::MessageDelta { usage, .. } => assert_eq!(usage.output_tokens, 4),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn done_sentinel_terminates_the_stream() {
        let mut translator = StreamTranslator::new("grok-4");
        let _ = translator.process_line(r#"data: {"choices":[{"delta":{"content":"x"}}]}"#);
        let events = translator.process_line("data: [DONE]");
        assert_eq!(names(&events), vec!["message_stop"]);
        assert!(translator.is_terminated());

        // Nothing after the terminal event.
        assert!(translator
            .process_line(r#"data: {"choices":[{"delta":{"content":"y"}}]}"#)
            .is_empty());
        assert!(translator.process_line("data: [DONE]").is_empty());
    }

    #[test]
    fn close_flushes_a_stream_missing_the_sentinel() {
        let mut translator = StreamTranslator::new("grok-4");
        let _ = translator.process_line(r#"data: {"choices":[{"delta":{"content":"x"}}]}"#);
        let events = translator.close();
        assert_eq!(
            names(&events),
            vec!["content_block_stop", "message_delta", "message_stop"]
        );
        assert!(translator.close().is_empty());
    }

    #[test]
    fn close_before_any_chunk_is_silent() {
        let mut translator = StreamTranslator::new("grok-4");
        assert!(translator.close().is_empty());
    }

    #[test]
    fn message_start_is_emitted_exactly_once_and_first() {
        let mut translator = StreamTranslator::new("grok-4");
        let all = drive(
            &mut translator,
            &[
                r#"data: {"choices":[{"delta":{"content":"a"}}]}"#,
                r#"data: {"choices":[{"delta":{"content":"b"}}]}"#,
                r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
                "data: [DONE]",
            ],
        );

        let starts = all
            .iter()
            .filter(|e| e.event_name() == "message_start")
            .count();
        assert_eq!(starts, 1);
        assert_eq!(all[0].event_name(), "message_start");
        assert_eq!(all.last().unwrap().event_name(), "message_stop");
    }
}
