//! Inference boundary: where attention tensors come from.
//!
//! The model itself (tokenizer, weights, device) lives outside this crate. Implement
//! [`AttentionModel`] to plug one in; [`JsonlAttentionModel`] serves tensors exported
//! ahead of time, one JSON object per line.

use crate::attention::AttentionTensors;
use crate::error::{AttributeError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Produces per-layer, per-head attention tensors for a text.
pub trait AttentionModel: Send + Sync {
    fn attentions(&self, text: &str) -> Result<AttentionTensors>;
}

#[derive(Debug, Deserialize)]
struct ExportedAttentions {
    text: String,
    layers: Vec<Vec<Vec<Vec<f32>>>>,
}

/// Attention tensors keyed by the exact text they were computed for.
#[derive(Debug, Default)]
pub struct JsonlAttentionModel {
    entries: HashMap<String, AttentionTensors>,
}

impl JsonlAttentionModel {
    /// Parse JSON lines of the form `{"text": "...", "layers": [[[[f32]]]]}`.
    ///
    /// Blank lines are ignored; a malformed line fails the whole load.
    pub fn from_jsonl(content: &str) -> Result<Self> {
        let mut entries = HashMap::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let exported: ExportedAttentions = serde_json::from_str(line).map_err(|e| {
                AttributeError::inference(format!("line {}: {}", lineno + 1, e))
            })?;
            if entries
                .insert(
                    exported.text.clone(),
                    AttentionTensors {
                        layers: exported.layers,
                    },
                )
                .is_some()
            {
                warn!(text = %exported.text, "Duplicate attention export; keeping the last one");
            }
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let model = Self::from_jsonl(&content)?;
        info!(path = %path.display(), texts = model.entries.len(), "Loaded attention exports");
        Ok(model)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AttentionModel for JsonlAttentionModel {
    fn attentions(&self, text: &str) -> Result<AttentionTensors> {
        self.entries
            .get(text)
            .cloned()
            .ok_or_else(|| AttributeError::inference(format!("no attention export for {:?}", text)))
    }
}
