//! Prompt rendering and corpus batching.

use crate::config::PromptConfig;

/// A bounded, ordered group of input texts sent in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position of this batch in partition order.
    pub index: usize,
    pub texts: Vec<String>,
}

/// Split `texts` into batches of at most `batch_size`, preserving order.
///
/// A `batch_size` of zero is treated as one.
pub fn partition(texts: &[String], batch_size: usize) -> Vec<Batch> {
    texts
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            texts: chunk.to_vec(),
        })
        .collect()
}

/// Renders single-text and multi-text prompts from the configured fragments.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    prompts: PromptConfig,
}

impl PromptBuilder {
    pub fn new(prompts: PromptConfig) -> Self {
        Self { prompts }
    }

    /// Instruction, example, and the input text.
    pub fn single(&self, text: &str) -> String {
        format!(
            "{}{}{}",
            self.prompts.task,
            self.prompts.example,
            self.prompts.input.replace("{input_text}", text)
        )
    }

    /// Instruction, multi-text example, and every text wrapped in `<...>`.
    pub fn multi(&self, texts: &[String]) -> String {
        let bracketed: Vec<String> = texts.iter().map(|t| format!("<{}>", t)).collect();
        let listed = serde_json::to_string(&bracketed).unwrap_or_default();
        format!(
            "{}{}{}",
            self.prompts.task,
            self.prompts.multi_text_example,
            self.prompts.multi_text_input.replace("{input_texts}", &listed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {}", i)).collect()
    }

    #[test]
    fn test_partition_35_by_16() {
        let input = texts(35);
        let batches = partition(&input, 16);
        let sizes: Vec<usize> = batches.iter().map(|b| b.texts.len()).collect();
        assert_eq!(sizes, vec![16, 16, 3]);
        assert_eq!(batches[0].texts[0], "text 0");
        assert_eq!(batches[1].texts[0], "text 16");
        assert_eq!(batches[2].texts[2], "text 34");
        assert_eq!(batches[2].index, 2);
        let flattened: Vec<String> = batches.into_iter().flat_map(|b| b.texts).collect();
        assert_eq!(flattened, input);
    }

    #[test]
    fn test_partition_empty_and_exact() {
        assert!(partition(&[], 16).is_empty());
        assert_eq!(partition(&texts(32), 16).len(), 2);
        assert_eq!(partition(&texts(3), 0).len(), 3);
    }

    #[test]
    fn test_single_prompt() {
        let builder = PromptBuilder::new(PromptConfig {
            task: "TASK\n".into(),
            example: "EXAMPLE\n".into(),
            multi_text_example: "MULTI\n".into(),
            input: "Text: {input_text}".into(),
            multi_text_input: "Texts: {input_texts}".into(),
        });
        assert_eq!(builder.single("red car"), "TASK\nEXAMPLE\nText: red car");
        assert_eq!(
            builder.multi(&["red car".to_string(), "say \"hi\"".to_string()]),
            "TASK\nMULTI\nTexts: [\"<red car>\",\"<say \\\"hi\\\">\"]"
        );
    }
}
