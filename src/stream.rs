use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt, stream};
use tokio::sync::{mpsc, oneshot};

use crate::backend::{ModelBackend, TokenHook};
use crate::completion::run_completion;
use crate::config::{CompletionOptions, GenerationConfig};
use crate::types::{CompletionResponse, TokenEvent};
use crate::{EmberError, Result};

/// Live stream of generated text chunks, in strict generation order.
pub type ChunkStream = BoxStream<'static, String>;

/// Deferred handle to the eventual [`CompletionResponse`]. Resolves exactly
/// once, and never before the paired chunk stream has closed.
pub struct ResponseHandle {
    rx: oneshot::Receiver<Result<CompletionResponse>>,
}

impl ResponseHandle {
    pub async fn wait(self) -> Result<CompletionResponse> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(EmberError::ResultDropped),
        }
    }
}

/// A push-stream of text chunks paired with the deferred final result.
///
/// The stream always reaches a normal end-of-stream, even when the underlying
/// request fails; only the handle carries the error. Dropping the stream early
/// does not cancel the request, which runs to completion in the background.
pub struct CompletionStream {
    pub stream: ChunkStream,
    pub handle: ResponseHandle,
}

impl CompletionStream {
    pub fn into_parts(self) -> (ChunkStream, ResponseHandle) {
        (self.stream, self.handle)
    }
}

pub fn create_completion_stream(
    backend: Arc<dyn ModelBackend>,
    message: impl Into<String>,
    options: &CompletionOptions,
) -> CompletionStream {
    spawn_completion(backend, message.into(), options.merged(), None)
}

/// Like [`create_completion_stream`], also forwarding each token to `hook`
/// and honoring its continue/stop decision.
pub fn create_completion_stream_with_hook(
    backend: Arc<dyn ModelBackend>,
    message: impl Into<String>,
    options: &CompletionOptions,
    hook: TokenHook,
) -> CompletionStream {
    spawn_completion(backend, message.into(), options.merged(), Some(hook))
}

fn spawn_completion(
    backend: Arc<dyn ModelBackend>,
    message: String,
    config: GenerationConfig,
    hook: Option<TokenHook>,
) -> CompletionStream {
    let (chunk_tx, chunk_rx) = mpsc::unbounded_channel::<String>();
    let (result_tx, result_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut hook = hook;
        let forwarding: TokenHook = Box::new(move |event: &TokenEvent| {
            // Send fails once the consumer is gone; generation continues
            // regardless.
            let _ = chunk_tx.send(event.text.clone());
            match hook.as_mut() {
                Some(hook) => hook(event),
                None => None,
            }
        });

        let result = run_completion(backend.as_ref(), &message, &config, Some(forwarding)).await;
        // The forwarding hook, and with it the chunk sender, is gone by the
        // time run_completion returns. End-of-stream therefore precedes the
        // result settling.
        let _ = result_tx.send(result);
    });

    let stream = stream::unfold(chunk_rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    })
    .boxed();

    CompletionStream {
        stream,
        handle: ResponseHandle { rx: result_rx },
    }
}

/// Pull-based, single-pass adapter over [`CompletionStream`]: a lazy sequence
/// of text chunks, with the settled response available from [`finish`] once
/// the sequence is exhausted.
///
/// Abandoning the generator early leaves the request running to completion in
/// the background.
///
/// [`finish`]: CompletionGenerator::finish
pub struct CompletionGenerator {
    chunks: ChunkStream,
    handle: ResponseHandle,
}

pub fn create_completion_generator(
    backend: Arc<dyn ModelBackend>,
    message: impl Into<String>,
    options: &CompletionOptions,
) -> CompletionGenerator {
    let (chunks, handle) = create_completion_stream(backend, message, options).into_parts();
    CompletionGenerator { chunks, handle }
}

pub fn create_completion_generator_with_hook(
    backend: Arc<dyn ModelBackend>,
    message: impl Into<String>,
    options: &CompletionOptions,
    hook: TokenHook,
) -> CompletionGenerator {
    let (chunks, handle) =
        create_completion_stream_with_hook(backend, message, options, hook).into_parts();
    CompletionGenerator { chunks, handle }
}

impl CompletionGenerator {
    /// Suspend until the next chunk is available, or `None` at end of stream.
    pub async fn next_chunk(&mut self) -> Option<String> {
        self.chunks.next().await
    }

    /// Drain any remaining chunks and return the settled response, or the
    /// propagated failure.
    pub async fn finish(mut self) -> Result<CompletionResponse> {
        while self.chunks.next().await.is_some() {}
        self.handle.wait().await
    }
}

impl Stream for CompletionGenerator {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().chunks.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::backend::TokenSink;
    use crate::types::TokenEvent;

    struct ChunkedBackend {
        tokens: Vec<String>,
        fail: Option<String>,
    }

    impl ChunkedBackend {
        fn emitting(tokens: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                tokens: tokens.iter().map(|t| t.to_string()).collect(),
                fail: None,
            })
        }

        fn failing(tokens: &[&str], message: &str) -> Arc<Self> {
            Arc::new(Self {
                tokens: tokens.iter().map(|t| t.to_string()).collect(),
                fail: Some(message.to_string()),
            })
        }
    }

    #[async_trait]
    impl ModelBackend for ChunkedBackend {
        fn model_name(&self) -> &str {
            "chunked.gguf"
        }

        async fn generate(
            &self,
            _prompt: &str,
            _config: &GenerationConfig,
            on_token: TokenSink<'_>,
        ) -> Result<String> {
            let mut accumulated = String::new();
            for (index, token) in self.tokens.iter().enumerate() {
                accumulated.push_str(token);
                let event = TokenEvent {
                    id: index as u32,
                    text: token.clone(),
                    accumulated: accumulated.clone(),
                };
                if !on_token(&event) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            if let Some(message) = &self.fail {
                return Err(EmberError::Backend(message.clone()));
            }
            Ok(accumulated)
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn stream_yields_chunks_in_order_then_result() -> Result<()> {
        let backend = ChunkedBackend::emitting(&["a", "b", "c"]);
        let CompletionStream { mut stream, handle } =
            create_completion_stream(backend, "prompt", &CompletionOptions::default());

        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk);
        }
        assert_eq!(chunks, vec!["a", "b", "c"]);

        // The stream has closed, so the result is already settled.
        let response = handle.wait().await?;
        assert_eq!(response.message.content, "abc");
        assert_eq!(response.usage.completion_tokens, 3);
        Ok(())
    }

    #[tokio::test]
    async fn failed_request_closes_stream_normally_and_rejects_handle() {
        let backend = ChunkedBackend::failing(&["a", "b"], "backend exploded");
        let CompletionStream { mut stream, handle } =
            create_completion_stream(backend, "prompt", &CompletionOptions::default());

        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk);
        }
        // Chunks produced before the failure still arrive; the stream ends
        // without any error event of its own.
        assert_eq!(chunks, vec!["a", "b"]);

        let err = handle.wait().await.expect_err("should reject");
        match err {
            EmberError::Backend(message) => assert_eq!(message, "backend exploded"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_hook_can_stop_generation() -> Result<()> {
        let backend = ChunkedBackend::emitting(&["a", "b", "c", "d"]);
        let hook: TokenHook = Box::new(|event| Some(event.text != "b"));
        let CompletionStream { mut stream, handle } =
            create_completion_stream_with_hook(backend, "prompt", &CompletionOptions::default(), hook);

        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk);
        }
        assert_eq!(chunks, vec!["a", "b"]);

        let response = handle.wait().await?;
        assert_eq!(response.usage.completion_tokens, 2);
        Ok(())
    }

    #[tokio::test]
    async fn abandoned_stream_does_not_cancel_the_request() -> Result<()> {
        let backend = ChunkedBackend::emitting(&["a", "b", "c"]);
        let CompletionStream { stream, handle } =
            create_completion_stream(backend, "prompt", &CompletionOptions::default());
        drop(stream);

        let response = handle.wait().await?;
        assert_eq!(response.message.content, "abc");
        assert_eq!(response.usage.completion_tokens, 3);
        Ok(())
    }

    #[tokio::test]
    async fn generator_yields_same_chunks_and_trailing_response() -> Result<()> {
        let backend = ChunkedBackend::emitting(&["x", "y", "z"]);
        let mut generator =
            create_completion_generator(backend, "prompt", &CompletionOptions::default());

        let mut chunks = Vec::new();
        while let Some(chunk) = generator.next_chunk().await {
            chunks.push(chunk);
        }
        assert_eq!(chunks, vec!["x", "y", "z"]);

        let response = generator.finish().await?;
        assert_eq!(response.message.content, "xyz");
        Ok(())
    }

    #[tokio::test]
    async fn generator_finish_drains_unconsumed_chunks() -> Result<()> {
        let backend = ChunkedBackend::emitting(&["x", "y", "z"]);
        let generator =
            create_completion_generator(backend, "prompt", &CompletionOptions::default());

        let response = generator.finish().await?;
        assert_eq!(response.message.content, "xyz");
        Ok(())
    }

    #[tokio::test]
    async fn handle_reports_dropped_producer() {
        let (tx, rx) = oneshot::channel::<Result<CompletionResponse>>();
        drop(tx);

        let err = ResponseHandle { rx }.wait().await.expect_err("should error");
        assert!(matches!(err, EmberError::ResultDropped));
    }
}
