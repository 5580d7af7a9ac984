//! Syntactic attributor: nearest-noun assignment over part-of-speech tags.
//!
//! Each adjective goes to the noun with the smallest token-index distance, regardless of
//! dependency edges. Ties go to the earlier noun. Nouns are indexed by position so the
//! lookup is a binary search rather than a scan over every noun.

use crate::attributor::ObjectAttributor;
use crate::config::SyntacticConfig;
use crate::error::Result;
use crate::merge::{self, SurfaceForm};
use crate::tagger::Tagger;
use crate::types::{Document, ObjectAttribution, Token};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Nearest-neighbour attributor over a tagged [`Document`].
#[derive(Debug, Clone, Default)]
pub struct SyntacticAttributor {
    surface: SurfaceForm,
}

impl SyntacticAttributor {
    pub fn new(config: &SyntacticConfig) -> Self {
        Self {
            surface: config.surface_form(),
        }
    }

    /// Assign every adjective of `document` to its nearest noun.
    pub fn attribute_document(&self, document: &Document) -> ObjectAttribution {
        let nouns = document.nouns();
        if nouns.is_empty() {
            return ObjectAttribution::new();
        }

        let mut attribution = ObjectAttribution::new();
        for noun in nouns_without_modifiers(document) {
            attribution.ensure_object(self.surface.apply(&noun.text));
        }

        for adjective in document.adjectives() {
            let noun = nearest_noun(&nouns, adjective.index);
            attribution.attribute(
                self.surface.apply(&noun.text),
                self.surface.apply(&adjective.text),
            );
        }

        merge::finalize(document, attribution, self.surface)
    }
}

/// Nouns that have no child marked as an adjectival modifier.
pub fn nouns_without_modifiers(document: &Document) -> Vec<&Token> {
    document
        .nouns()
        .into_iter()
        .filter(|noun| {
            !document
                .children_of(noun.index)
                .any(Token::is_adjectival_modifier)
        })
        .collect()
}

/// Nearest noun to `position`; `nouns` must be non-empty and sorted by index.
fn nearest_noun<'a>(nouns: &[&'a Token], position: usize) -> &'a Token {
    let split = nouns.partition_point(|n| n.index < position);
    let before = split.checked_sub(1).map(|i| nouns[i]);
    let after = nouns.get(split).copied();
    match (before, after) {
        (Some(b), Some(a)) => {
            if position - b.index <= a.index - position {
                b
            } else {
                a
            }
        }
        (Some(b), None) => b,
        (None, Some(a)) => a,
        (None, None) => nouns[0],
    }
}

/// [`SyntacticAttributor`] bound to a tagger.
pub struct TaggedSyntacticAttributor {
    inner: SyntacticAttributor,
    tagger: Arc<dyn Tagger>,
}

impl TaggedSyntacticAttributor {
    pub fn new(config: &SyntacticConfig, tagger: Arc<dyn Tagger>) -> Self {
        Self {
            inner: SyntacticAttributor::new(config),
            tagger,
        }
    }
}

#[async_trait]
impl ObjectAttributor for TaggedSyntacticAttributor {
    fn name(&self) -> &'static str {
        "syntactic"
    }

    async fn attribute(&self, text: &str) -> Result<ObjectAttribution> {
        let document = self.tagger.tag(text)?;
        debug!(tokens = document.len(), "Running syntactic attribution");
        Ok(self.inner.attribute_document(&document))
    }
}
