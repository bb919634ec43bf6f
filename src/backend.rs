use async_trait::async_trait;

use crate::Result;
use crate::config::GenerationConfig;
use crate::types::TokenEvent;

/// Per-unit sink driven by the backend's generation loop, once per token in
/// generation order. The returned flag is the continuation decision; `false`
/// asks the backend to stop. Whether the backend actually stops is up to the
/// backend, the flag is advisory.
pub type TokenSink<'a> = &'a mut (dyn FnMut(&TokenEvent) -> bool + Send);

/// Caller-facing per-token hook. Only an explicit `Some(false)` stops
/// generation; `None` and `Some(true)` both mean keep going.
pub type TokenHook = Box<dyn FnMut(&TokenEvent) -> Option<bool> + Send>;

/// Narrow seam over the native inference library: one loaded model handle
/// exposing generation with a token callback, and embedding.
///
/// Implementations are expected to support at most one in-flight generation
/// per handle unless they document otherwise.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn model_name(&self) -> &str;

    /// Run one generation pass, invoking `on_token` synchronously for every
    /// produced unit, and return the full output text.
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        on_token: TokenSink<'_>,
    ) -> Result<String>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
