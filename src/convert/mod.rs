//! API translation between the Anthropic Messages and `OpenAI` Chat
//! Completions formats.
//!
//! The core of the proxy: request conversion, buffered response conversion,
//! and the streaming event translator. All translation is pure (no I/O);
//! streaming state lives in a per-connection [`stream::StreamTranslator`].

pub mod anthropic;
pub mod openai;
pub mod request;
pub mod response;
pub mod stream;
