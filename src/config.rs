use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ModelType;
use crate::{EmberError, Result};

/// Separator for the delimiter-joined libraries path option.
#[cfg(windows)]
pub const LIBRARY_PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const LIBRARY_PATH_SEPARATOR: char = ':';

/// Directory where resolved model files live by default.
pub fn default_models_dir() -> PathBuf {
    match directories::ProjectDirs::from("dev", "ember", "ember-llm") {
        Some(dirs) => dirs.data_dir().join("models"),
        None => PathBuf::from("models"),
    }
}

/// Default search path for the native backend libraries.
pub fn default_libraries_path() -> String {
    match directories::ProjectDirs::from("dev", "ember", "ember-llm") {
        Some(dirs) => dirs.data_dir().join("libraries").display().to_string(),
        None => "libraries".to_string(),
    }
}

/// Sampling and context parameters handed to the native backend for one
/// request. Immutable once built; construct via [`CompletionOptions::merged`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub n_ctx: u32,
    pub n_predict: u32,
    pub temperature: f32,
    pub top_k: i32,
    pub top_p: f32,
    pub min_p: f32,
    pub repeat_penalty: f32,
    pub repeat_last_n: u32,
    pub n_batch: u32,
    pub verbose: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            n_ctx: 2048,
            n_predict: 4096,
            temperature: 0.7,
            top_k: 40,
            top_p: 0.4,
            min_p: 0.0,
            repeat_penalty: 1.18,
            repeat_last_n: 10,
            n_batch: 8,
            verbose: false,
        }
    }
}

/// Caller-supplied overrides for one completion request. Every unset key
/// falls back to [`GenerationConfig::default`]; a set key always wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_ctx: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_predict: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_last_n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_batch: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

impl CompletionOptions {
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value::<Self>(value.clone())
            .map_err(|err| EmberError::Config(format!("invalid completion options: {err}")))
    }

    /// Merge these overrides onto the defaults, key by key.
    pub fn merged(&self) -> GenerationConfig {
        let defaults = GenerationConfig::default();
        GenerationConfig {
            n_ctx: self.n_ctx.unwrap_or(defaults.n_ctx),
            n_predict: self.n_predict.unwrap_or(defaults.n_predict),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            min_p: self.min_p.unwrap_or(defaults.min_p),
            repeat_penalty: self.repeat_penalty.unwrap_or(defaults.repeat_penalty),
            repeat_last_n: self.repeat_last_n.unwrap_or(defaults.repeat_last_n),
            n_batch: self.n_batch.unwrap_or(defaults.n_batch),
            verbose: self.verbose.unwrap_or(defaults.verbose),
        }
    }
}

/// Options for [`crate::load_model`]. Defaults mirror the fixed loader
/// configuration: models dir, libraries dir, inference type, downloads
/// allowed, cpu device, 2048-token context, 100 gpu layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadModelOptions {
    /// Directory searched (and downloaded into) for model files.
    pub model_path: PathBuf,
    /// Delimiter-separated list of directories to search for native
    /// backend libraries. See [`LIBRARY_PATH_SEPARATOR`].
    pub library_path: String,
    #[serde(rename = "type", default)]
    pub model_type: ModelType,
    pub allow_download: bool,
    pub verbose: bool,
    pub device: String,
    pub n_ctx: u32,
    pub ngl: u32,
}

impl Default for LoadModelOptions {
    fn default() -> Self {
        Self {
            model_path: default_models_dir(),
            library_path: default_libraries_path(),
            model_type: ModelType::Inference,
            allow_download: true,
            verbose: false,
            device: "cpu".to_string(),
            n_ctx: 2048,
            ngl: 100,
        }
    }
}

impl LoadModelOptions {
    /// Parse options from loosely-typed json, with every missing key taken
    /// from the defaults. An unrecognized `type` string is reported as
    /// [`EmberError::InvalidModelType`] rather than a bare parse error.
    pub fn from_value(value: &Value) -> Result<Self> {
        if let Some(raw) = value.get("type").and_then(Value::as_str) {
            raw.parse::<ModelType>()?;
        }

        let defaults = Self::default();
        let Some(object) = value.as_object() else {
            return Err(EmberError::Config(
                "load options must be a json object".to_string(),
            ));
        };

        let mut merged = serde_json::to_value(&defaults)?;
        let merged_object = merged
            .as_object_mut()
            .expect("serialized options are an object");
        for (key, entry) in object {
            if !merged_object.contains_key(key.as_str()) {
                return Err(EmberError::Config(format!("unknown load option {key:?}")));
            }
            merged_object.insert(key.clone(), entry.clone());
        }

        serde_json::from_value(merged)
            .map_err(|err| EmberError::Config(format!("invalid load options: {err}")))
    }
}
