//! Reference labels read straight off the dependency parse.
//!
//! Every noun or proper noun maps to the surface text of its `amod` children. These are
//! the labels the other strategies are compared against.

use crate::types::{Document, ObjectAttribution};

/// Dependency-derived labels for `document`, in original surface form.
///
/// A noun appearing more than once accumulates the modifiers of every occurrence.
pub fn reference_labels(document: &Document) -> ObjectAttribution {
    let mut attribution = ObjectAttribution::new();
    for noun in document.nouns() {
        attribution.ensure_object(noun.text.clone());
        for child in document.children_of(noun.index) {
            if child.is_adjectival_modifier() {
                attribution.attribute(noun.text.clone(), child.text.clone());
            }
        }
    }
    attribution
}

/// Whether `document` contains at least one adjective, i.e. is worth labelling.
pub fn has_adjectives(document: &Document) -> bool {
    !document.adjectives().is_empty()
}
