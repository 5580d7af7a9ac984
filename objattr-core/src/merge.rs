//! Result merging: turns per-adjective assignments into the canonical mapping.
//!
//! Both the syntactic and the attention attributor finish here, which is what guarantees
//! that every candidate noun of the document appears in the output exactly once.

use crate::types::{Document, ObjectAttribution, Token};
use serde::{Deserialize, Serialize};

/// How token surface text is rendered in the output mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceForm {
    #[default]
    AsIs,
    Lowercase,
}

impl SurfaceForm {
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::AsIs => text.to_string(),
            Self::Lowercase => text.to_lowercase(),
        }
    }
}

/// Build an attribution from `(noun, adjective)` pairs and close it over the document.
pub fn merge_assignments<'a>(
    document: &Document,
    assignments: impl IntoIterator<Item = (&'a Token, &'a Token)>,
    surface: SurfaceForm,
) -> ObjectAttribution {
    let mut attribution = ObjectAttribution::new();
    for (noun, adjective) in assignments {
        attribution.attribute(surface.apply(&noun.text), surface.apply(&adjective.text));
    }
    finalize(document, attribution, surface)
}

/// Guarantee every candidate noun of `document` is present, possibly with an empty list.
pub fn finalize(
    document: &Document,
    mut attribution: ObjectAttribution,
    surface: SurfaceForm,
) -> ObjectAttribution {
    for noun in document.nouns() {
        attribution.ensure_object(surface.apply(&noun.text));
    }
    attribution
}
