//! Attention attributor: assigns each adjective to the noun it attends to most.
//!
//! Raw tensors come from a masked language model as `layers[layer][head][query][key]`.
//! They are reduced to one square matrix over the document's tokens (the leading and
//! trailing structural positions are dropped) and each adjective row is argmax'ed over
//! the noun columns. Only the relative order of weights matters.

use crate::attributor::ObjectAttributor;
use crate::config::AttentionConfig;
use crate::error::{AttributeError, Result};
use crate::inference::AttentionModel;
use crate::merge::{self, SurfaceForm};
use crate::tagger::Tagger;
use crate::types::{Document, ObjectAttribution, Token};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Per-layer, per-head attention matrices for a single sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttentionTensors {
    pub layers: Vec<Vec<Vec<Vec<f32>>>>,
}

/// How raw tensors are collapsed into one matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionReduction {
    /// First layer only, averaged over heads.
    FirstBlock,
    /// First N layers, averaged over layers and heads.
    #[default]
    MeanOfBlocks,
}

/// Square weight matrix over document token positions.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightMatrix {
    size: usize,
    weights: Vec<f32>,
}

impl WeightMatrix {
    /// Build from rows; every row must have `rows.len()` columns.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let size = rows.len();
        let mut weights = Vec::with_capacity(size * size);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != size {
                return Err(AttributeError::shape(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    size
                )));
            }
            weights.extend(row);
        }
        Ok(Self { size, weights })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.size && col < self.size {
            Some(self.weights[row * self.size + col])
        } else {
            None
        }
    }
}

/// Collapse `tensors` into a single matrix with structural tokens removed.
pub fn reduce(
    tensors: &AttentionTensors,
    reduction: AttentionReduction,
    n_blocks: usize,
) -> Result<WeightMatrix> {
    if tensors.layers.is_empty() {
        return Err(AttributeError::shape("no attention layers"));
    }
    let used = match reduction {
        AttentionReduction::FirstBlock => 1,
        AttentionReduction::MeanOfBlocks => n_blocks.clamp(1, tensors.layers.len()),
    };

    let seq = tensors.layers[0]
        .first()
        .map(Vec::len)
        .ok_or_else(|| AttributeError::shape("layer 0 has no heads"))?;
    if seq < 2 {
        return Err(AttributeError::shape(format!(
            "sequence length {} leaves no room for structural tokens",
            seq
        )));
    }

    let mut sum = vec![0.0f64; seq * seq];
    let mut count = 0usize;
    for (l, layer) in tensors.layers[..used].iter().enumerate() {
        if layer.is_empty() {
            return Err(AttributeError::shape(format!("layer {} has no heads", l)));
        }
        for (h, head) in layer.iter().enumerate() {
            if head.len() != seq || head.iter().any(|row| row.len() != seq) {
                return Err(AttributeError::shape(format!(
                    "layer {} head {} is not {}x{}",
                    l, h, seq, seq
                )));
            }
            for (q, row) in head.iter().enumerate() {
                for (k, w) in row.iter().enumerate() {
                    sum[q * seq + k] += f64::from(*w);
                }
            }
            count += 1;
        }
    }

    let inner = seq - 2;
    let rows = (1..seq - 1)
        .map(|q| {
            (1..seq - 1)
                .map(|k| (sum[q * seq + k] / count as f64) as f32)
                .collect()
        })
        .collect::<Vec<Vec<f32>>>();
    debug!(layers = used, heads = count, size = inner, "Reduced attention tensors");
    WeightMatrix::from_rows(rows)
}

/// Attention-based attributor working on precomputed tensors.
#[derive(Debug, Clone)]
pub struct AttentionAttributor {
    reduction: AttentionReduction,
    n_blocks: usize,
}

impl AttentionAttributor {
    pub fn new(config: &AttentionConfig) -> Self {
        Self {
            reduction: config.reduction,
            n_blocks: config.n_blocks_to_average,
        }
    }

    pub fn attribute_tensors(
        &self,
        document: &Document,
        tensors: &AttentionTensors,
    ) -> Result<ObjectAttribution> {
        if document.nouns().is_empty() {
            return Ok(ObjectAttribution::new());
        }
        let matrix = reduce(tensors, self.reduction, self.n_blocks)?;
        attribute_weights(document, &matrix)
    }

    /// Adjective → noun → weight, for every adjective/noun pair in the document.
    pub fn pairwise_weights(
        &self,
        document: &Document,
        tensors: &AttentionTensors,
    ) -> Result<BTreeMap<String, BTreeMap<String, f32>>> {
        let matrix = reduce(tensors, self.reduction, self.n_blocks)?;
        let nouns = document.nouns();
        let mut result: BTreeMap<String, BTreeMap<String, f32>> = BTreeMap::new();
        for adjective in document.adjectives() {
            let row = result.entry(adjective.text.clone()).or_default();
            for noun in &nouns {
                row.insert(noun.text.clone(), weight(&matrix, adjective, noun)?);
            }
        }
        Ok(result)
    }
}

/// Assign each adjective to the noun column with the highest weight in its row.
pub fn attribute_weights(document: &Document, matrix: &WeightMatrix) -> Result<ObjectAttribution> {
    let nouns = document.nouns();
    if nouns.is_empty() {
        return Ok(ObjectAttribution::new());
    }

    let mut pairs = Vec::new();
    for adjective in document.adjectives() {
        let mut best = nouns[0];
        let mut best_weight = weight(matrix, adjective, best)?;
        for &noun in &nouns[1..] {
            let w = weight(matrix, adjective, noun)?;
            if w > best_weight {
                best = noun;
                best_weight = w;
            }
        }
        pairs.push((best, adjective));
    }
    Ok(merge::merge_assignments(document, pairs, SurfaceForm::AsIs))
}

fn weight(matrix: &WeightMatrix, adjective: &Token, noun: &Token) -> Result<f32> {
    matrix.get(adjective.index, noun.index).ok_or_else(|| {
        AttributeError::shape(format!(
            "token index {} or {} outside {}x{} attention matrix",
            adjective.index,
            noun.index,
            matrix.size(),
            matrix.size()
        ))
    })
}

/// [`AttentionAttributor`] bound to a tagger and an attention model.
pub struct TaggedAttentionAttributor {
    inner: AttentionAttributor,
    tagger: Arc<dyn Tagger>,
    model: Arc<dyn AttentionModel>,
}

impl TaggedAttentionAttributor {
    pub fn new(
        config: &AttentionConfig,
        tagger: Arc<dyn Tagger>,
        model: Arc<dyn AttentionModel>,
    ) -> Self {
        Self {
            inner: AttentionAttributor::new(config),
            tagger,
            model,
        }
    }

    /// Diagnostic view of the adjective/noun weights for `text`.
    pub fn pairwise_weights(&self, text: &str) -> Result<BTreeMap<String, BTreeMap<String, f32>>> {
        let document = self.tagger.tag(text)?;
        let tensors = self.model.attentions(text)?;
        self.inner.pairwise_weights(&document, &tensors)
    }
}

#[async_trait]
impl ObjectAttributor for TaggedAttentionAttributor {
    fn name(&self) -> &'static str {
        "attention"
    }

    async fn attribute(&self, text: &str) -> Result<ObjectAttribution> {
        let document = self.tagger.tag(text)?;
        let tensors = self.model.attentions(text)?;
        self.inner.attribute_tensors(&document, &tensors)
    }
}
