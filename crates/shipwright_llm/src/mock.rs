//! Mock completion service for testing.
//!
//! Returns scripted replies in order (cycling when exhausted) and captures
//! every request, so gateway and loop behavior can be tested without network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{LlmError, LlmResult};
use crate::provider::{CompletionRequest, CompletionResponse, CompletionService};

/// Predefined reply for one call.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(LlmError),
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn status(status: u16) -> Self {
        Self::Fail(LlmError::from_status(status, format!("mock status {}", status)))
    }

    pub fn network() -> Self {
        Self::Fail(LlmError::Network("connection reset by peer".to_string()))
    }
}

/// Mock completion service.
#[derive(Clone, Default)]
pub struct MockCompletionService {
    replies: Arc<RwLock<Vec<MockReply>>>,
    reply_index: Arc<AtomicUsize>,
    captured: Arc<RwLock<Vec<CompletionRequest>>>,
}

impl MockCompletionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reply for the next call.
    pub fn add_reply(self, reply: MockReply) -> Self {
        self.replies.write().push(reply);
        self
    }

    pub fn add_text(self, content: impl Into<String>) -> Self {
        self.add_reply(MockReply::text(content))
    }

    pub fn with_replies(self, replies: Vec<MockReply>) -> Self {
        *self.replies.write() = replies;
        self
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.captured.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured.read().len()
    }

    /// Models requested, in call order.
    pub fn models(&self) -> Vec<String> {
        self.captured.read().iter().map(|r| r.model.clone()).collect()
    }

    fn next_reply(&self) -> MockReply {
        let replies = self.replies.read();
        if replies.is_empty() {
            return MockReply::text("");
        }
        let index = self.reply_index.fetch_add(1, Ordering::SeqCst);
        replies
            .get(index % replies.len())
            .cloned()
            .unwrap_or_else(|| MockReply::text(""))
    }
}

#[async_trait]
impl CompletionService for MockCompletionService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        self.captured.write().push(request.clone());
        match self.next_reply() {
            MockReply::Text(content) => Ok(CompletionResponse {
                input_tokens: (request.system.len() + request.user.len()) as u64 / 4,
                output_tokens: content.len() as u64 / 4,
                content,
                model: request.model.clone(),
            }),
            MockReply::Fail(error) => Err(error),
        }
    }
}
