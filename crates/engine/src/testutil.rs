//! Scripted model provider for engine tests.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tm_domain::error::Result;
use tm_domain::stream::{BoxStream, StreamChunk};
use tm_providers::{ChatRequest, ChatResponse, LlmProvider};
use tokio::sync::mpsc;

use crate::events::ExecEvent;

/// An [`LlmProvider`] that replays pre-baked responses.
///
/// Streaming calls pop from the stream queue; non-streaming calls (the
/// orchestrator's decision calls) pop from the chat queue.
pub struct ScriptedProvider {
    streams: Mutex<VecDeque<Vec<Result<StreamChunk>>>>,
    chats: Mutex<VecDeque<ChatResponse>>,
    /// Requests observed by `chat`, for prompt assertions.
    pub chat_requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(VecDeque::new()),
            chats: Mutex::new(VecDeque::new()),
            chat_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_stream(&self, chunks: Vec<Result<StreamChunk>>) {
        self.streams.lock().push_back(chunks);
    }

    pub fn push_chat_text(&self, content: &str) {
        self.chats.lock().push_back(ChatResponse {
            content: content.to_string(),
            tool_calls: Vec::new(),
            usage: None,
            model: "scripted-model".into(),
            finish_reason: Some("stop".into()),
        });
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        self.chat_requests.lock().push(req);
        Ok(self
            .chats
            .lock()
            .pop_front()
            .expect("scripted chat response available"))
    }

    async fn chat_stream(
        &self,
        _req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let chunks = self
            .streams
            .lock()
            .pop_front()
            .expect("scripted stream available");
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

/// A stream that emits text deltas then finishes cleanly.
pub fn script_finish(texts: &[&str]) -> Vec<Result<StreamChunk>> {
    let mut chunks: Vec<Result<StreamChunk>> = texts
        .iter()
        .map(|t| {
            Ok(StreamChunk::Content {
                text: t.to_string(),
            })
        })
        .collect();
    chunks.push(Ok(StreamChunk::Finish {
        reason: Some("stop".into()),
        usage: None,
    }));
    chunks
}

/// A stream that emits one tool call assembled from argument fragments.
pub fn script_tool_call(id: &str, name: &str, fragments: &[&str]) -> Vec<Result<StreamChunk>> {
    let mut chunks: Vec<Result<StreamChunk>> = vec![Ok(StreamChunk::ToolCall {
        index: 0,
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        arguments_fragment: None,
    })];
    for fragment in fragments {
        chunks.push(Ok(StreamChunk::ToolCall {
            index: 0,
            id: None,
            name: None,
            arguments_fragment: Some(fragment.to_string()),
        }));
    }
    chunks.push(Ok(StreamChunk::Finish {
        reason: Some("tool_calls".into()),
        usage: None,
    }));
    chunks
}

/// Collect every event until the channel closes.
pub async fn drain(mut rx: mpsc::Receiver<ExecEvent>) -> Vec<ExecEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}
