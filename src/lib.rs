mod backend;
mod completion;
mod config;
mod error;
mod loader;
mod model;
mod resolver;
mod stream;
mod types;

#[doc(hidden)]
pub mod test_support;

pub use backend::{ModelBackend, TokenHook, TokenSink};
pub use completion::{create_completion, create_completion_with_hook};
pub use config::{
    CompletionOptions, GenerationConfig, LIBRARY_PATH_SEPARATOR, LoadModelOptions,
    default_libraries_path, default_models_dir,
};
pub use error::{EmberError, Result};
pub use loader::{BackendLoader, LoadSpec, MODEL_FILE_SUFFIX, load_model};
pub use model::{EmbeddingModel, InferenceModel, Model, create_embedding};
pub use resolver::{HttpResolver, ModelDescriptor, ModelResolver, ResolvedModel};
pub use stream::{
    ChunkStream, CompletionGenerator, CompletionStream, ResponseHandle,
    create_completion_generator, create_completion_generator_with_hook, create_completion_stream,
    create_completion_stream_with_hook,
};
pub use types::{CompletionResponse, Message, ModelType, Role, TokenEvent, Usage};
