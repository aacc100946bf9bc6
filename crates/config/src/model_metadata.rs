//! Model metadata cache.
//!
//! Constraints discovered at runtime (notably "single tool-calls only")
//! are persisted under `~/.agentichat/model_metadata.json` keyed by model
//! id, so the next session applies them proactively instead of tripping
//! over the same provider error again.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct ModelMetadataStore {
    path: PathBuf,
    metadata: HashMap<String, Value>,
}

impl ModelMetadataStore {
    /// Load the store from `<data_dir>/model_metadata.json`. A missing or
    /// corrupt file starts empty.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("model_metadata.json");
        let metadata = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => {
                    info!(path = %path.display(), "Loaded model metadata");
                    map
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupt model metadata");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, metadata }
    }

    /// Saved parallel-tool-call limit for a model, if any.
    pub fn max_parallel_tools(&self, model: &str) -> Option<usize> {
        self.metadata
            .get(model)?
            .get("max_parallel_tools")?
            .as_u64()
            .map(|n| n as usize)
    }

    /// Persist a parallel-tool-call limit for a model.
    pub fn set_max_parallel_tools(&mut self, model: &str, limit: usize) {
        let entry = self
            .metadata
            .entry(model.to_string())
            .or_insert_with(|| json!({}));
        entry["max_parallel_tools"] = json!(limit);
        self.save();
        info!(model, limit, "Saved max_parallel_tools constraint");
    }

    /// Inspect a provider error message for a known constraint; persist and
    /// report true when one is recognized.
    pub fn detect_and_save_constraint(&mut self, model: &str, error_message: &str) -> bool {
        if error_message
            .to_lowercase()
            .contains("only supports single tool-calls")
        {
            warn!(model, "Detected single tool-call constraint, saving to metadata");
            self.set_max_parallel_tools(model, 1);
            return true;
        }
        false
    }

    fn save(&self) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, "Cannot create data directory for model metadata");
                return;
            }
        }
        match serde_json::to_string_pretty(&self.metadata) {
            Ok(serialized) => {
                if let Err(e) = std::fs::write(&self.path, serialized) {
                    warn!(path = %self.path.display(), error = %e, "Failed to save model metadata");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize model metadata"),
        }
    }
}
