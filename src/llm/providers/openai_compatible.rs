use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{TapClawError, TapClawResult};
use crate::llm::prompt::build_messages;
use crate::llm::provider::InferenceProvider;
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, InferenceRequest, StreamChunkKind};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    call: CallConfig,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String, call: CallConfig) -> Self {
        Self {
            id,
            api_base,
            api_key,
            call,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl InferenceProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn infer(&self, request: &InferenceRequest) -> TapClawResult<String> {
        let messages = build_messages(request);
        let body = serde_json::json!({
            "model": self.call.model,
            "messages": &messages,
            "stream": self.call.stream,
            "temperature": self.call.temperature,
        });

        tracing::debug!(
            provider = %self.id,
            model = %self.call.model,
            stream = self.call.stream,
            messages = messages.len(),
            "sending inference request"
        );

        let mut req = self.client.post(&self.api_base).json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(TapClawError::InferenceUnavailable(format!("{status}: {err_body}")));
        }

        if self.call.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Accumulates an SSE stream into the full response text.
    async fn handle_stream(&self, response: reqwest::Response) -> TapClawResult<String> {
        let mut byte_stream = response.bytes_stream();
        let mut acc = SseAccumulator::default();

        while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            if acc.feed(&bytes) {
                break;
            }
        }
        let (content, reasoning_len) = acc.finish();

        tracing::info!(
            provider = %self.id,
            content_len = content.len(),
            reasoning_len,
            "inference stream complete"
        );
        Ok(content)
    }

    async fn handle_json(&self, response: reqwest::Response) -> TapClawResult<String> {
        let json: serde_json::Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| TapClawError::InferenceUnavailable("response has no message content".into()))?
            .to_string();
        tracing::info!(provider = %self.id, content_len = content.len(), "inference response received");
        Ok(content)
    }
}

/// Splits SSE bytes into lines and collects content deltas.
#[derive(Default)]
struct SseAccumulator {
    line_buf: Vec<u8>,
    content: String,
    reasoning_len: usize,
    done: bool,
}

impl SseAccumulator {
    /// Returns true once the stream signalled completion.
    fn feed(&mut self, bytes: &[u8]) -> bool {
        for &b in bytes {
            if self.done {
                break;
            }
            if b == b'\n' {
                self.flush_line();
            } else {
                self.line_buf.push(b);
            }
        }
        self.done
    }

    /// Parses a final line the server left unterminated.
    fn finish(mut self) -> (String, usize) {
        if !self.done {
            self.flush_line();
        }
        (self.content, self.reasoning_len)
    }

    fn flush_line(&mut self) {
        let line = String::from_utf8_lossy(&self.line_buf).trim().to_string();
        self.line_buf.clear();
        if line.is_empty() {
            return;
        }
        match sse_parser::parse_sse_line(&line) {
            Ok(Some(chunk)) => match chunk.kind {
                StreamChunkKind::Content => self.content.push_str(&chunk.content),
                StreamChunkKind::Reasoning => self.reasoning_len += chunk.content.len(),
                StreamChunkKind::Done => self.done = true,
            },
            Ok(None) => {}
            Err(e) => tracing::debug!("SSE parse skipped: {e}"),
        }
    }
}
