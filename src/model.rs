use std::sync::Arc;

use crate::Result;
use crate::backend::{ModelBackend, TokenHook};
use crate::config::CompletionOptions;
use crate::stream::{CompletionGenerator, CompletionStream};
use crate::types::CompletionResponse;
use crate::{completion, stream};

/// A loaded model, wrapped according to its configured type.
pub enum Model {
    Inference(InferenceModel),
    Embedding(EmbeddingModel),
}

impl Model {
    pub fn model_name(&self) -> &str {
        match self {
            Model::Inference(model) => model.model_name(),
            Model::Embedding(model) => model.model_name(),
        }
    }
}

/// Text-generation surface over one native model handle.
#[derive(Clone)]
pub struct InferenceModel {
    backend: Arc<dyn ModelBackend>,
}

impl InferenceModel {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub async fn create_completion(
        &self,
        message: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse> {
        completion::create_completion(self.backend.as_ref(), message, options).await
    }

    pub async fn create_completion_with_hook(
        &self,
        message: &str,
        options: &CompletionOptions,
        hook: TokenHook,
    ) -> Result<CompletionResponse> {
        completion::create_completion_with_hook(self.backend.as_ref(), message, options, hook).await
    }

    pub fn create_completion_stream(
        &self,
        message: impl Into<String>,
        options: &CompletionOptions,
    ) -> CompletionStream {
        stream::create_completion_stream(self.backend.clone(), message, options)
    }

    pub fn create_completion_stream_with_hook(
        &self,
        message: impl Into<String>,
        options: &CompletionOptions,
        hook: TokenHook,
    ) -> CompletionStream {
        stream::create_completion_stream_with_hook(self.backend.clone(), message, options, hook)
    }

    pub fn create_completion_generator(
        &self,
        message: impl Into<String>,
        options: &CompletionOptions,
    ) -> CompletionGenerator {
        stream::create_completion_generator(self.backend.clone(), message, options)
    }
}

/// Embedding surface over one native model handle.
#[derive(Clone)]
pub struct EmbeddingModel {
    backend: Arc<dyn ModelBackend>,
}

impl EmbeddingModel {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.backend.embed(text).await
    }
}

/// Direct passthrough to the model's embedding capability.
pub async fn create_embedding(model: &EmbeddingModel, text: &str) -> Result<Vec<f32>> {
    model.embed(text).await
}
