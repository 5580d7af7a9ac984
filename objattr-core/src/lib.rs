//! # Objattr Core
//!
//! Core library for objattr: given a text, decide which adjectives describe which
//! objects (nouns). Three interchangeable strategies are provided: nearest-noun
//! assignment over part-of-speech tags, argmax over transformer attention weights, and
//! prompting an OpenAI-compatible LLM, with a batched, retried corpus path for the last.

pub mod attention;
pub mod attributor;
pub mod client;
pub mod config;
pub mod error;
pub mod inference;
pub mod llm;
pub mod merge;
pub mod reference;
pub mod server;
pub mod syntactic;
pub mod tagger;
pub mod types;

// Re-export commonly used types at the crate root.
pub use attention::{AttentionAttributor, AttentionReduction, AttentionTensors, WeightMatrix};
pub use attributor::{ObjectAttributor, create_attributor};
pub use client::ExtractClient;
pub use config::{AttributorKind, ObjattrConfig, load_config};
pub use error::{AttributeError, ConfigError, LlmError, Result};
pub use inference::{AttentionModel, JsonlAttentionModel};
pub use llm::{CorpusReport, LlmAttributor};
pub use merge::SurfaceForm;
pub use reference::reference_labels;
pub use syntactic::SyntacticAttributor;
pub use tagger::{ConlluTagger, Tagger};
pub use types::{CoarseTag, Document, ObjectAttribution, TextAttribution, Token};
