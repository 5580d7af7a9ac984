//! The strategy seam shared by every attributor, and the factory that picks one.

use crate::attention::TaggedAttentionAttributor;
use crate::config::{AttributorKind, ObjattrConfig};
use crate::error::{ConfigError, Result};
use crate::inference::AttentionModel;
use crate::llm::LlmAttributor;
use crate::syntactic::TaggedSyntacticAttributor;
use crate::tagger::Tagger;
use crate::types::ObjectAttribution;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Turns a raw text into an object to adjectives mapping.
#[async_trait]
pub trait ObjectAttributor: Send + Sync {
    /// Short strategy name used in logs and responses.
    fn name(&self) -> &'static str;

    async fn attribute(&self, text: &str) -> Result<ObjectAttribution>;
}

fn missing(component: &str, kind: AttributorKind) -> ConfigError {
    ConfigError::Invalid {
        key: "app.attributor".to_string(),
        message: format!("the {} attributor needs a {}", kind, component),
    }
}

/// Build the attributor selected by `config.app.attributor`.
///
/// The syntactic and attention strategies need a tagger; attention also needs a model.
/// The LLM strategy resolves its API key here, so a missing key fails at startup.
pub fn create_attributor(
    config: &ObjattrConfig,
    tagger: Option<Arc<dyn Tagger>>,
    model: Option<Arc<dyn AttentionModel>>,
) -> Result<Arc<dyn ObjectAttributor>> {
    let kind = config.app.attributor;
    let attributor: Arc<dyn ObjectAttributor> = match kind {
        AttributorKind::Syntactic => {
            let tagger = tagger.ok_or_else(|| missing("tagger", kind))?;
            Arc::new(TaggedSyntacticAttributor::new(&config.syntactic, tagger))
        }
        AttributorKind::Attention => {
            let tagger = tagger.ok_or_else(|| missing("tagger", kind))?;
            let model = model.ok_or_else(|| missing("attention model", kind))?;
            Arc::new(TaggedAttentionAttributor::new(
                &config.attention,
                tagger,
                model,
            ))
        }
        AttributorKind::Llm => Arc::new(LlmAttributor::from_config(&config.llm)?),
    };
    info!(attributor = attributor.name(), "Attributor ready");
    Ok(attributor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttributeError;
    use crate::tagger::ConlluTagger;

    const CONLLU: &str = "# text = red car\n\
        1\tred\tred\tADJ\t_\t_\t2\tamod\t_\t_\n\
        2\tcar\tcar\tNOUN\t_\t_\t0\troot\t_\t_\n";

    fn tagger() -> Arc<dyn Tagger> {
        Arc::new(ConlluTagger::from_conllu(CONLLU).unwrap())
    }

    #[tokio::test]
    async fn test_syntactic_from_config() {
        let config = ObjattrConfig::default();
        let attributor = create_attributor(&config, Some(tagger()), None).unwrap();
        assert_eq!(attributor.name(), "syntactic");
        let result = attributor.attribute("red car").await.unwrap();
        assert_eq!(result.adjectives_of("car"), Some(&["red".to_string()][..]));
    }

    #[test]
    fn test_missing_components() {
        let mut config = ObjattrConfig::default();
        assert!(matches!(
            create_attributor(&config, None, None),
            Err(AttributeError::Config(ConfigError::Invalid { .. }))
        ));

        config.app.attributor = AttributorKind::Attention;
        assert!(matches!(
            create_attributor(&config, Some(tagger()), None),
            Err(AttributeError::Config(_))
        ));
    }

    #[test]
    fn test_llm_needs_no_tagger() {
        let mut config = ObjattrConfig::default();
        config.app.attributor = AttributorKind::Llm;
        config.llm.api_key = Some("sk-test".into());
        let attributor = create_attributor(&config, None, None).unwrap();
        assert_eq!(attributor.name(), "llm");
    }

    #[test]
    fn test_llm_missing_key() {
        let mut config = ObjattrConfig::default();
        config.app.attributor = AttributorKind::Llm;
        config.llm.api_key = None;
        config.llm.api_key_env = "OBJATTR_TEST_NO_SUCH_KEY".into();
        assert!(matches!(
            create_attributor(&config, None, None),
            Err(AttributeError::Llm(_))
        ));
    }
}
