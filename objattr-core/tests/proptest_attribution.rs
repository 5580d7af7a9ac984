//! Property-based tests for the attributors and the merger using proptest.

use proptest::prelude::*;

use objattr_core::attention::attribute_weights;
use objattr_core::config::SyntacticConfig;
use objattr_core::{
    CoarseTag, Document, ObjectAttribution, SyntacticAttributor, Token, WeightMatrix,
};

fn tag_strategy() -> impl Strategy<Value = CoarseTag> {
    prop_oneof![
        Just(CoarseTag::Noun),
        Just(CoarseTag::ProperNoun),
        Just(CoarseTag::Adjective),
        Just(CoarseTag::Verb),
        Just(CoarseTag::Other),
    ]
}

/// Documents with unique lowercase surface forms so counts are comparable.
fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::vec(tag_strategy(), 0..30).prop_map(|tags| {
        Document::new(
            tags.into_iter()
                .enumerate()
                .map(|(i, tag)| Token::new(i, format!("w{}", i), tag))
                .collect(),
        )
    })
}

fn document_with_weights() -> impl Strategy<Value = (Document, Vec<Vec<f32>>)> {
    document_strategy().prop_flat_map(|doc| {
        let n = doc.len();
        let rows = prop::collection::vec(prop::collection::vec(0.0f32..1.0, n), n);
        (Just(doc), rows)
    })
}

fn total_adjectives(attribution: &ObjectAttribution) -> usize {
    attribution.iter().map(|(_, adjectives)| adjectives.len()).sum()
}

fn syntactic() -> SyntacticAttributor {
    SyntacticAttributor::new(&SyntacticConfig::default())
}

// --- Syntactic attributor properties ---

proptest! {
    #[test]
    fn syntactic_every_noun_present(doc in document_strategy()) {
        let result = syntactic().attribute_document(&doc);
        for noun in doc.nouns() {
            prop_assert!(result.contains_object(&noun.text));
        }
        prop_assert_eq!(result.len(), doc.nouns().len());
    }

    #[test]
    fn syntactic_assigns_each_adjective_once(doc in document_strategy()) {
        let result = syntactic().attribute_document(&doc);
        if doc.nouns().is_empty() {
            prop_assert!(result.is_empty());
        } else {
            prop_assert_eq!(total_adjectives(&result), doc.adjectives().len());
        }
    }

    #[test]
    fn syntactic_is_idempotent(doc in document_strategy()) {
        let attributor = syntactic();
        prop_assert_eq!(attributor.attribute_document(&doc), attributor.attribute_document(&doc));
    }

    #[test]
    fn syntactic_without_adjectives_yields_empty_lists(
        tags in prop::collection::vec(
            prop_oneof![Just(CoarseTag::Noun), Just(CoarseTag::Verb), Just(CoarseTag::Other)],
            0..20,
        )
    ) {
        let doc = Document::new(
            tags.into_iter()
                .enumerate()
                .map(|(i, tag)| Token::new(i, format!("w{}", i), tag))
                .collect(),
        );
        let result = syntactic().attribute_document(&doc);
        prop_assert_eq!(total_adjectives(&result), 0);
        prop_assert_eq!(result.len(), doc.nouns().len());
    }
}

// --- Attention attributor properties ---

proptest! {
    #[test]
    fn attention_every_noun_present((doc, rows) in document_with_weights()) {
        let matrix = WeightMatrix::from_rows(rows).unwrap();
        let result = attribute_weights(&doc, &matrix).unwrap();
        prop_assert_eq!(result.len(), doc.nouns().len());
        if !doc.nouns().is_empty() {
            prop_assert_eq!(total_adjectives(&result), doc.adjectives().len());
        }
    }

    #[test]
    fn attention_picks_row_maximum((doc, rows) in document_with_weights()) {
        let nouns = doc.nouns();
        prop_assume!(!nouns.is_empty());
        let matrix = WeightMatrix::from_rows(rows.clone()).unwrap();
        let result = attribute_weights(&doc, &matrix).unwrap();

        for adjective in doc.adjectives() {
            let best = nouns
                .iter()
                .map(|n| rows[adjective.index][n.index])
                .fold(f32::MIN, f32::max);
            let (owner, _) = result
                .iter()
                .find(|(_, adjectives)| adjectives.contains(&adjective.text))
                .unwrap();
            let owner_index = nouns
                .iter()
                .find(|n| n.text.as_str() == owner.as_str())
                .unwrap()
                .index;
            prop_assert_eq!(rows[adjective.index][owner_index], best);
        }
    }
}

// --- Wire format properties ---

proptest! {
    #[test]
    fn attribution_wire_round_trip(
        objects in prop::collection::btree_map(
            "[a-z]{1,8}",
            prop::collection::vec("[a-z]{1,8}", 0..4),
            0..6,
        )
    ) {
        let attribution = ObjectAttribution::from(objects);
        let json = serde_json::to_string(&attribution).unwrap();
        prop_assert!(json.starts_with("{\"objects\":"), "json must start with {{\"objects\":");
        let back: ObjectAttribution = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back.normalized(), attribution.normalized());
    }
}
