use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::Result;
use crate::backend::ModelBackend;
use crate::config::{LIBRARY_PATH_SEPARATOR, LoadModelOptions};
use crate::model::{EmbeddingModel, InferenceModel, Model};
use crate::resolver::ModelResolver;
use crate::types::ModelType;

/// Suffix every model file carries; appended to bare model names.
pub const MODEL_FILE_SUFFIX: &str = ".gguf";

/// Everything the native library needs to construct one model handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSpec {
    /// Model file name, suffix included.
    pub model_name: String,
    /// Resolved path of the model file on disk.
    pub model_path: PathBuf,
    /// Existing directories to search for backend libraries, in the order
    /// they appeared in the configured libraries path.
    pub library_search_path: Vec<PathBuf>,
    pub device: String,
    pub n_ctx: u32,
    pub ngl: u32,
}

/// Constructor seam for native model handles. The implementation owns all
/// foreign-function mechanics; this crate only hands it a [`LoadSpec`].
#[async_trait]
pub trait BackendLoader: Send + Sync {
    async fn load(&self, spec: &LoadSpec) -> Result<Arc<dyn ModelBackend>>;
}

pub(crate) fn ensure_model_suffix(model_name: &str) -> String {
    if model_name.ends_with(MODEL_FILE_SUFFIX) {
        model_name.to_string()
    } else {
        format!("{model_name}{MODEL_FILE_SUFFIX}")
    }
}

/// Split the delimiter-separated libraries path and keep only entries that
/// exist on disk, preserving order.
pub(crate) fn filter_library_path(raw: &str) -> Vec<PathBuf> {
    raw.split(LIBRARY_PATH_SEPARATOR)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(PathBuf::from)
        .filter(|path| path.exists())
        .collect()
}

/// Resolve `model_name` (downloading it when permitted), construct the native
/// handle, and wrap it according to the configured model type.
///
/// Resolution and construction failures propagate unmodified. An invalid
/// `type` value in loosely-typed options is rejected by
/// [`LoadModelOptions::from_value`] before any handle is constructed.
pub async fn load_model(
    model_name: &str,
    options: &LoadModelOptions,
    resolver: &dyn ModelResolver,
    loader: &dyn BackendLoader,
) -> Result<Model> {
    let file_name = ensure_model_suffix(model_name);
    let resolved = resolver.resolve(&file_name, options).await?;
    let library_search_path = filter_library_path(&options.library_path);

    if options.verbose {
        debug!(
            model = %file_name,
            path = %resolved.path.display(),
            libraries = library_search_path.len(),
            device = %options.device,
            "loading model"
        );
    }

    let spec = LoadSpec {
        model_name: file_name,
        model_path: resolved.path,
        library_search_path,
        device: options.device.clone(),
        n_ctx: options.n_ctx,
        ngl: options.ngl,
    };

    let backend = loader.load(&spec).await?;
    Ok(match options.model_type {
        ModelType::Inference => Model::Inference(InferenceModel::new(backend)),
        ModelType::Embedding => Model::Embedding(EmbeddingModel::new(backend)),
    })
}
