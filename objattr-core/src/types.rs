//! Core data types: tagged tokens, documents, and the canonical attribution mapping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dependency label marking an adjectival modifier of its parent noun.
pub const ADJECTIVAL_MODIFIER: &str = "amod";

/// Coarse part-of-speech tag assigned by the tagger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoarseTag {
    Noun,
    ProperNoun,
    Adjective,
    Verb,
    Other,
}

impl CoarseTag {
    /// Map a Universal Dependencies UPOS tag to a coarse tag.
    pub fn from_upos(upos: &str) -> Self {
        match upos {
            "NOUN" => Self::Noun,
            "PROPN" => Self::ProperNoun,
            "ADJ" => Self::Adjective,
            "VERB" => Self::Verb,
            _ => Self::Other,
        }
    }

    /// Nouns and proper nouns are candidate objects.
    pub fn is_object(self) -> bool {
        matches!(self, Self::Noun | Self::ProperNoun)
    }
}

/// A single tagged token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Ordinal position within the document (not a byte offset).
    pub index: usize,
    pub text: String,
    pub coarse_tag: CoarseTag,
    /// Syntactic role relative to the parent token, e.g. `amod`.
    #[serde(default)]
    pub dependency_label: Option<String>,
    /// Index of the parent token; `None` for the root.
    #[serde(default)]
    pub head: Option<usize>,
}

impl Token {
    pub fn new(index: usize, text: impl Into<String>, coarse_tag: CoarseTag) -> Self {
        Self {
            index,
            text: text.into(),
            coarse_tag,
            dependency_label: None,
            head: None,
        }
    }

    /// Attach a dependency edge to `head` with the given label.
    pub fn with_dependency(mut self, label: impl Into<String>, head: usize) -> Self {
        self.dependency_label = Some(label.into());
        self.head = Some(head);
        self
    }

    pub fn is_adjectival_modifier(&self) -> bool {
        self.dependency_label.as_deref() == Some(ADJECTIVAL_MODIFIER)
    }
}

/// An ordered, read-only sequence of tokens produced by a tagger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    tokens: Vec<Token>,
}

impl Document {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Candidate objects (nouns and proper nouns), ordered by index.
    pub fn nouns(&self) -> Vec<&Token> {
        let mut nouns: Vec<&Token> = self
            .tokens
            .iter()
            .filter(|t| t.coarse_tag.is_object())
            .collect();
        nouns.sort_by_key(|t| t.index);
        nouns
    }

    /// Candidate modifiers, ordered by index.
    pub fn adjectives(&self) -> Vec<&Token> {
        let mut adjectives: Vec<&Token> = self
            .tokens
            .iter()
            .filter(|t| t.coarse_tag == CoarseTag::Adjective)
            .collect();
        adjectives.sort_by_key(|t| t.index);
        adjectives
    }

    /// Tokens whose parent is the token at `index`.
    pub fn children_of(&self, index: usize) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(move |t| t.head == Some(index))
    }
}

/// Mapping from object surface text to the adjectives attributed to it.
///
/// Serializes as `{"objects": {noun: [adjective, ...]}}`. Adjective lists keep insertion
/// order and are never de-duplicated implicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAttribution {
    #[serde(default)]
    pub objects: BTreeMap<String, Vec<String>>,
}

impl ObjectAttribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `object` is present, with an empty list if it has no adjectives yet.
    pub fn ensure_object(&mut self, object: impl Into<String>) {
        self.objects.entry(object.into()).or_default();
    }

    /// Attribute `adjective` to `object`.
    pub fn attribute(&mut self, object: impl Into<String>, adjective: impl Into<String>) {
        self.objects
            .entry(object.into())
            .or_default()
            .push(adjective.into());
    }

    pub fn adjectives_of(&self, object: &str) -> Option<&[String]> {
        self.objects.get(object).map(Vec::as_slice)
    }

    pub fn contains_object(&self, object: &str) -> bool {
        self.objects.contains_key(object)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.objects.iter()
    }

    /// Copy with every adjective list sorted, for order-insensitive comparison.
    pub fn normalized(&self) -> Self {
        let objects = self
            .objects
            .iter()
            .map(|(noun, adjectives)| {
                let mut adjectives = adjectives.clone();
                adjectives.sort();
                (noun.clone(), adjectives)
            })
            .collect();
        Self { objects }
    }
}

impl From<BTreeMap<String, Vec<String>>> for ObjectAttribution {
    fn from(objects: BTreeMap<String, Vec<String>>) -> Self {
        Self { objects }
    }
}

/// An attribution paired with the text it was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextAttribution {
    pub text: String,
    pub attribution: ObjectAttribution,
}
