use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// One streamed chunk of a model response (provider-agnostic).
///
/// Adapters normalize their wire format to this shape. A well-formed
/// stream yields any number of `Content`/`ToolCall` chunks followed by
/// exactly one terminal chunk (`Finish` or `Error`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamChunk {
    /// Incremental assistant text.
    #[serde(rename = "content")]
    Content { text: String },

    /// A fragment of a tool call, keyed by the call's stream index.
    ///
    /// `id` and `name` arrive on the first fragment for an index;
    /// `arguments_fragment` strings are concatenated in arrival order.
    #[serde(rename = "tool_call")]
    ToolCall {
        index: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments_fragment: Option<String>,
    },

    /// Terminal: the model finished generating.
    #[serde(rename = "finish")]
    Finish {
        reason: Option<String>,
        usage: Option<Usage>,
    },

    /// Terminal: the provider reported an error mid-stream.
    #[serde(rename = "error")]
    Error { status_code: u16, message: String },
}

impl StreamChunk {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::Finish { .. } | StreamChunk::Error { .. })
    }
}

/// Token usage for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
