//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use anyhow::Context;
use objattr_core::attention::TaggedAttentionAttributor;
use objattr_core::config::{ObjattrConfig, user_config_path};
use objattr_core::llm::persist::read_log;
use objattr_core::reference::has_adjectives;
use objattr_core::server::{self, AppState};
use objattr_core::tagger::parse_conllu;
use objattr_core::{
    AttentionModel, AttributorKind, ConlluTagger, CorpusReport, ExtractClient,
    JsonlAttentionModel, LlmAttributor, Tagger, TextAttribution, create_attributor,
    reference_labels,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Global options shared by every subcommand.
#[derive(Debug, Default)]
pub struct Inputs {
    pub config: Option<PathBuf>,
    pub attributor: Option<String>,
    pub tagged: Option<PathBuf>,
    pub attentions: Option<PathBuf>,
}

impl Inputs {
    fn load_config(&self) -> anyhow::Result<ObjattrConfig> {
        let mut config = objattr_core::load_config(self.config.as_deref())
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
        if let Some(kind) = &self.attributor {
            config.app.attributor = parse_kind(kind)?;
        }
        Ok(config)
    }

    fn tagger(&self) -> anyhow::Result<Option<Arc<dyn Tagger>>> {
        match &self.tagged {
            Some(path) => {
                let tagger = ConlluTagger::load(path)
                    .with_context(|| format!("Failed to load {}", path.display()))?;
                Ok(Some(Arc::new(tagger)))
            }
            None => Ok(None),
        }
    }

    fn model(&self) -> anyhow::Result<Option<Arc<dyn AttentionModel>>> {
        match &self.attentions {
            Some(path) => {
                let model = JsonlAttentionModel::load(path)
                    .with_context(|| format!("Failed to load {}", path.display()))?;
                Ok(Some(Arc::new(model)))
            }
            None => Ok(None),
        }
    }
}

fn parse_kind(kind: &str) -> anyhow::Result<AttributorKind> {
    serde_json::from_value(serde_json::Value::String(kind.to_string()))
        .map_err(|_| anyhow::anyhow!("Unknown attributor: '{}'", kind))
}

/// Trimmed non-empty lines of `path`, in order.
fn read_corpus(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Texts not yet present in `done`, compared without surrounding whitespace.
fn pending_texts(texts: Vec<String>, done: &[TextAttribution]) -> Vec<String> {
    let seen: HashSet<&str> = done.iter().map(|r| r.text.trim()).collect();
    texts
        .into_iter()
        .filter(|t| !seen.contains(t.trim()))
        .collect()
}

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, inputs: &Inputs) -> anyhow::Result<()> {
    match command {
        Commands::Extract { text } => handle_extract(&text, inputs).await,
        Commands::Weights { text } => handle_weights(&text, inputs),
        Commands::Corpus {
            input,
            persist,
            resume,
            output,
        } => handle_corpus(&input, persist.as_deref(), resume, output.as_deref(), inputs).await,
        Commands::Reference {
            input,
            only_with_adjectives,
        } => handle_reference(&input, only_with_adjectives),
        Commands::Remote { text, url } => handle_remote(&text, url, inputs).await,
        Commands::Serve { host, port } => handle_serve(host, port, inputs).await,
        Commands::Config { action } => handle_config(action, inputs),
    }
}

async fn handle_extract(text: &str, inputs: &Inputs) -> anyhow::Result<()> {
    let config = inputs.load_config()?;
    let attributor = create_attributor(&config, inputs.tagger()?, inputs.model()?)?;
    let attribution = attributor.attribute(text).await?;
    println!("{}", serde_json::to_string_pretty(&attribution)?);
    Ok(())
}

fn handle_weights(text: &str, inputs: &Inputs) -> anyhow::Result<()> {
    let config = inputs.load_config()?;
    let tagger = inputs
        .tagger()?
        .ok_or_else(|| anyhow::anyhow!("--tagged is required for weights"))?;
    let model = inputs
        .model()?
        .ok_or_else(|| anyhow::anyhow!("--attentions is required for weights"))?;
    let attributor = TaggedAttentionAttributor::new(&config.attention, tagger, model);
    let weights = attributor.pairwise_weights(text)?;
    println!("{}", serde_json::to_string_pretty(&weights)?);
    Ok(())
}

async fn handle_corpus(
    input: &Path,
    persist: Option<&Path>,
    resume: bool,
    output: Option<&Path>,
    inputs: &Inputs,
) -> anyhow::Result<()> {
    let config = inputs.load_config()?;
    let mut texts = read_corpus(input)?;

    if resume
        && let Some(log) = persist
        && log.exists()
    {
        let done = read_log(log)?;
        let before = texts.len();
        texts = pending_texts(texts, &done);
        info!(
            skipped = before - texts.len(),
            remaining = texts.len(),
            "Resuming from persist log"
        );
    }

    let report = if texts.is_empty() {
        info!("Nothing to extract");
        CorpusReport::default()
    } else {
        let attributor = LlmAttributor::from_config(&config.llm)?;
        attributor.attribute_many(&texts, persist).await
    };

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Wrote {} attributions ({}/{} batches succeeded) to {}",
                report.attributions.len(),
                report.successful_batches,
                report.total_batches,
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn handle_reference(input: &Path, only_with_adjectives: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    for sentence in parse_conllu(&content)? {
        if only_with_adjectives && !has_adjectives(&sentence.document) {
            continue;
        }
        let line = TextAttribution {
            attribution: reference_labels(&sentence.document),
            text: sentence.text,
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

async fn handle_remote(text: &str, url: Option<String>, inputs: &Inputs) -> anyhow::Result<()> {
    let url = match url {
        Some(url) => url,
        None => {
            let config = inputs.load_config()?;
            format!("http://{}:{}", config.server.host, config.server.port)
        }
    };
    let attribution = ExtractClient::new(&url).extract(text).await;
    println!("{}", serde_json::to_string_pretty(&attribution)?);
    Ok(())
}

async fn handle_serve(
    host: Option<String>,
    port: Option<u16>,
    inputs: &Inputs,
) -> anyhow::Result<()> {
    let mut config = inputs.load_config()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let attributor = create_attributor(&config, inputs.tagger()?, inputs.model()?)?;
    let state = AppState::new(attributor, config.app.text_max_len);
    println!(
        "Serving {} attributor on http://{}:{}",
        config.app.attributor, config.server.host, config.server.port
    );
    server::run(&config.server, state).await?;
    Ok(())
}

fn handle_config(action: ConfigAction, inputs: &Inputs) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = user_config_path()
                .ok_or_else(|| anyhow::anyhow!("No user configuration directory on this platform"))?;
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let toml_str = toml::to_string_pretty(&ObjattrConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = inputs.load_config()?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objattr_core::ObjectAttribution;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const CONLLU: &str = "# text = red car\n\
        1\tred\tred\tADJ\t_\t_\t2\tamod\t_\t_\n\
        2\tcar\tcar\tNOUN\t_\t_\t0\troot\t_\t_\n\
        \n\
        # text = it rains\n\
        1\tit\tit\tPRON\t_\t_\t2\tnsubj\t_\t_\n\
        2\trains\train\tVERB\t_\t_\t0\troot\t_\t_\n";

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("llm").unwrap(), AttributorKind::Llm);
        assert_eq!(parse_kind("attention").unwrap(), AttributorKind::Attention);
        assert!(parse_kind("bert").is_err());
    }

    #[test]
    fn test_read_corpus_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "corpus.txt", "red car\r\n\n  \n\tblue sky  \n");
        assert_eq!(read_corpus(&path).unwrap(), vec!["red car", "blue sky"]);
    }

    #[test]
    fn test_pending_texts() {
        let done = vec![TextAttribution {
            text: "red car".into(),
            attribution: ObjectAttribution::new(),
        }];
        let pending = pending_texts(vec!["red car".into(), "blue sky".into()], &done);
        assert_eq!(pending, vec!["blue sky".to_string()]);

        let padded = pending_texts(vec!["  red car ".into()], &done);
        assert!(padded.is_empty());
    }

    #[tokio::test]
    async fn test_extract_with_tagged_file() {
        let dir = TempDir::new().unwrap();
        let inputs = Inputs {
            attributor: Some("syntactic".into()),
            tagged: Some(write(&dir, "tagged.conllu", CONLLU)),
            ..Default::default()
        };
        let command = Commands::Extract {
            text: "red car".into(),
        };
        assert!(handle_command(command, &inputs).await.is_ok());
    }

    #[tokio::test]
    async fn test_weights_requires_inputs() {
        let inputs = Inputs::default();
        let command = Commands::Weights {
            text: "red car".into(),
        };
        assert!(handle_command(command, &inputs).await.is_err());
    }

    #[tokio::test]
    async fn test_reference_command() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Reference {
            input: write(&dir, "ref.conllu", CONLLU),
            only_with_adjectives: true,
        };
        assert!(handle_command(command, &Inputs::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_remote_without_front_still_prints() {
        let command = Commands::Remote {
            text: "red car".into(),
            url: Some("http://127.0.0.1:9".into()),
        };
        assert!(handle_command(command, &Inputs::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_corpus_resume_with_nothing_left() {
        let dir = TempDir::new().unwrap();
        let input = write(&dir, "corpus.txt", "  red car \n");
        let persist = write(
            &dir,
            "labels.log",
            "red car~{\"objects\":{\"car\":[\"red\"]}}\n",
        );
        let output = dir.path().join("report.json");
        let command = Commands::Corpus {
            input,
            persist: Some(persist),
            resume: true,
            output: Some(output.clone()),
        };

        handle_command(command, &Inputs::default()).await.unwrap();
        let report: CorpusReport =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(report, CorpusReport::default());
    }
}
