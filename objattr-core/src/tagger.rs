//! Tagger boundary: where tokenized, POS-tagged, dependency-parsed documents come from.
//!
//! Parsing is not done here. [`ConlluTagger`] serves documents produced by an external
//! tagger in CoNLL-U format, keyed by each sentence's `# text =` comment.

use crate::error::{AttributeError, Result};
use crate::types::{CoarseTag, Document, Token};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

const CONLLU_COLUMNS: usize = 10;

/// Produces a [`Document`] for a text.
pub trait Tagger: Send + Sync {
    fn tag(&self, text: &str) -> Result<Document>;
}

/// One sentence read from a CoNLL-U file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConlluSentence {
    pub text: String,
    pub document: Document,
}

/// Parse CoNLL-U content into sentences.
///
/// Multiword ranges (`1-2`) and empty nodes (`1.1`) are skipped. A sentence without a
/// `# text =` comment gets its forms joined by single spaces as its text.
pub fn parse_conllu(content: &str) -> Result<Vec<ConlluSentence>> {
    let mut sentences = Vec::new();
    let mut text: Option<String> = None;
    let mut tokens: Vec<Token> = Vec::new();

    for (lineno, raw) in content.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            flush(&mut sentences, &mut text, &mut tokens);
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            if let Some(value) = comment.trim_start().strip_prefix("text =") {
                text = Some(value.trim().to_string());
            }
            continue;
        }

        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < CONLLU_COLUMNS {
            return Err(AttributeError::tagger(format!(
                "line {}: expected {} tab-separated columns, found {}",
                lineno + 1,
                CONLLU_COLUMNS,
                columns.len()
            )));
        }
        let id = columns[0];
        if id.contains('-') || id.contains('.') {
            continue;
        }
        let id: usize = id.parse().map_err(|_| {
            AttributeError::tagger(format!("line {}: invalid token id {:?}", lineno + 1, id))
        })?;
        if id == 0 {
            return Err(AttributeError::tagger(format!(
                "line {}: token ids start at 1",
                lineno + 1
            )));
        }
        // HEAD is 1-based with 0 for the root.
        let head = match columns[6] {
            "_" => None,
            h => h
                .parse::<usize>()
                .map_err(|_| {
                    AttributeError::tagger(format!("line {}: invalid head {:?}", lineno + 1, h))
                })?
                .checked_sub(1),
        };
        let dependency_label = match columns[7] {
            "_" => None,
            label => Some(label.to_string()),
        };

        tokens.push(Token {
            index: id - 1,
            text: columns[1].to_string(),
            coarse_tag: CoarseTag::from_upos(columns[3]),
            dependency_label,
            head,
        });
    }
    flush(&mut sentences, &mut text, &mut tokens);
    Ok(sentences)
}

fn flush(sentences: &mut Vec<ConlluSentence>, text: &mut Option<String>, tokens: &mut Vec<Token>) {
    if tokens.is_empty() {
        *text = None;
        return;
    }
    let tokens = std::mem::take(tokens);
    let text = text.take().unwrap_or_else(|| {
        tokens
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    });
    sentences.push(ConlluSentence {
        text,
        document: Document::new(tokens),
    });
}

/// Tagger backed by pre-parsed CoNLL-U sentences.
#[derive(Debug, Default)]
pub struct ConlluTagger {
    documents: HashMap<String, Document>,
    order: Vec<String>,
}

impl ConlluTagger {
    pub fn from_sentences(sentences: Vec<ConlluSentence>) -> Self {
        let mut tagger = Self::default();
        for sentence in sentences {
            if tagger.documents.contains_key(&sentence.text) {
                warn!(text = %sentence.text, "Duplicate sentence in CoNLL-U input; keeping the first");
                continue;
            }
            tagger.order.push(sentence.text.clone());
            tagger.documents.insert(sentence.text, sentence.document);
        }
        tagger
    }

    pub fn from_conllu(content: &str) -> Result<Self> {
        Ok(Self::from_sentences(parse_conllu(content)?))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let tagger = Self::from_conllu(&content)?;
        info!(path = %path.display(), sentences = tagger.len(), "Loaded CoNLL-U documents");
        Ok(tagger)
    }

    /// Sentence texts in file order.
    pub fn texts(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Tagger for ConlluTagger {
    fn tag(&self, text: &str) -> Result<Document> {
        self.documents
            .get(text)
            .or_else(|| self.documents.get(text.trim()))
            .cloned()
            .ok_or_else(|| AttributeError::tagger(format!("no tagged document for {:?}", text)))
    }
}
