use std::path::PathBuf;

use crate::error::EmbedError;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Where model files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Directory containing `config.json`, `tokenizer.json` and `model.safetensors`.
    Local { path: PathBuf },
    /// Repository on the `HuggingFace` Hub, resolved through the local cache.
    HuggingFace { repo_id: String },
}

impl ModelSource {
    /// Identifier recorded next to stored vectors.
    #[must_use]
    pub fn model_id(&self) -> String {
        match self {
            Self::Local { path } => path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
            Self::HuggingFace { repo_id } => repo_id.clone(),
        }
    }
}

/// Resolved paths of the three files a BERT-style embedding model needs.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// Locate model files, fetching from the Hub cache when needed.
///
/// # Errors
///
/// Returns [`EmbedError::ModelLoad`] if any file is missing or cannot be fetched.
pub fn resolve_model_files(source: &ModelSource) -> Result<ModelFiles, EmbedError> {
    match source {
        ModelSource::Local { path } => {
            let files = ModelFiles {
                config: path.join(CONFIG_FILE),
                tokenizer: path.join(TOKENIZER_FILE),
                weights: path.join(WEIGHTS_FILE),
            };
            for file in [&files.config, &files.tokenizer, &files.weights] {
                if !file.is_file() {
                    return Err(EmbedError::ModelLoad(format!(
                        "missing model file: {}",
                        file.display()
                    )));
                }
            }
            Ok(files)
        }
        ModelSource::HuggingFace { repo_id } => {
            let api = hf_hub::api::sync::Api::new().map_err(|e| {
                EmbedError::ModelLoad(format!("failed to create HuggingFace API client: {e}"))
            })?;
            let repo = api.model(repo_id.clone());
            let fetch = |name: &str| {
                repo.get(name).map_err(|e| {
                    EmbedError::ModelLoad(format!("failed to download {name} from {repo_id}: {e}"))
                })
            };
            Ok(ModelFiles {
                config: fetch(CONFIG_FILE)?,
                tokenizer: fetch(TOKENIZER_FILE)?,
                weights: fetch(WEIGHTS_FILE)?,
            })
        }
    }
}
