use tracing::debug;

use crate::Result;
use crate::backend::{ModelBackend, TokenHook};
use crate::config::{CompletionOptions, GenerationConfig};
use crate::types::{CompletionResponse, Message, TokenEvent, Usage};

/// Drive one generation request to completion and shape the final response.
///
/// Caller overrides are merged onto the default configuration before the
/// backend is invoked. Backend failures propagate unmodified; no retry and
/// no partial response.
pub async fn create_completion(
    backend: &dyn ModelBackend,
    message: &str,
    options: &CompletionOptions,
) -> Result<CompletionResponse> {
    run_completion(backend, message, &options.merged(), None).await
}

/// Like [`create_completion`], forwarding every token to `hook`. Generation
/// keeps going unless the hook returns `Some(false)`.
pub async fn create_completion_with_hook(
    backend: &dyn ModelBackend,
    message: &str,
    options: &CompletionOptions,
    hook: TokenHook,
) -> Result<CompletionResponse> {
    run_completion(backend, message, &options.merged(), Some(hook)).await
}

pub(crate) async fn run_completion(
    backend: &dyn ModelBackend,
    message: &str,
    config: &GenerationConfig,
    mut hook: Option<TokenHook>,
) -> Result<CompletionResponse> {
    let verbose = config.verbose;
    let mut completion_tokens: u64 = 0;

    let text = {
        let mut sink = |event: &TokenEvent| -> bool {
            if verbose {
                debug!(token = event.id, text = %event.text, "generated token");
            }
            let decision = match hook.as_mut() {
                Some(hook) => hook(event),
                None => None,
            };
            // Counted per invocation, whatever the hook decided.
            completion_tokens += 1;
            decision != Some(false)
        };
        backend.generate(message, config, &mut sink).await?
    };

    // Character count stands in for a real prompt token count; the native
    // tokenizer is not exposed at this layer.
    let prompt_tokens = message.chars().count() as u64;

    Ok(CompletionResponse {
        model: backend.model_name().to_string(),
        usage: Usage::new(prompt_tokens, completion_tokens),
        message: Message::assistant(text),
    })
}
