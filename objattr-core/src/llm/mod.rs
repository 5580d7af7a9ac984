//! LLM attributor: prompt-based extraction against an OpenAI-compatible endpoint.
//!
//! Two entry points:
//! - [`LlmAttributor::attribute_text`] sends one prompt for one text and degrades to an
//!   empty mapping on any failure.
//! - [`LlmAttributor::attribute_many`] partitions a corpus into batches, dispatches them
//!   concurrently behind a shared gate with bounded retries, optionally appends each
//!   parsed result to a log, and aggregates whatever succeeded.
//!
//! Corpus results are matched back to inputs by the text keys in the model's answer.
//! A model that rephrases or truncates a key breaks that association; such keys are
//! still returned but reported as uncorrelated.

pub mod parse;
pub mod persist;
pub mod prompt;
pub mod retry;
pub mod transport;

pub use persist::PersistLog;
pub use prompt::{Batch, PromptBuilder, partition};
pub use retry::{Backoff, RequestOutcome, RetryPolicy, RetryState};
pub use transport::{CompletionRequest, CompletionTransport, HttpTransport, RawResponse};

use crate::attributor::ObjectAttributor;
use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::types::{ObjectAttribution, TextAttribution};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Summary of one corpus run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusReport {
    /// Parsed results, in input order; failed texts are absent.
    pub attributions: Vec<TextAttribution>,
    pub total_batches: usize,
    pub successful_batches: usize,
    pub exhausted_batches: usize,
    /// Answer keys that matched no input text of their batch.
    pub uncorrelated_keys: Vec<String>,
}

#[derive(Default)]
struct BatchResult {
    /// Entries paired with their input text, in input order.
    matched: Vec<TextAttribution>,
    /// Entries whose key names no input text, keyed by the normalized answer key.
    uncorrelated: Vec<TextAttribution>,
    succeeded: bool,
}

/// Prompt-based attributor.
pub struct LlmAttributor {
    transport: Arc<dyn CompletionTransport>,
    model: String,
    prompts: PromptBuilder,
    batch_size: usize,
    retry: RetryPolicy,
    gate: Arc<Semaphore>,
    successful_batches: AtomicUsize,
}

impl LlmAttributor {
    pub fn new(config: &LlmConfig, transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            transport,
            model: config.model.clone(),
            prompts: PromptBuilder::new(config.prompts.clone()),
            batch_size: config.batch_size.max(1),
            retry: RetryPolicy::from_config(config),
            gate: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            successful_batches: AtomicUsize::new(0),
        }
    }

    /// Build with an [`HttpTransport`] resolved from `config`.
    pub fn from_config(config: &LlmConfig) -> std::result::Result<Self, LlmError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Batches that received HTTP 200 in the current (or last) corpus run.
    pub fn successful_batches(&self) -> usize {
        self.successful_batches.load(Ordering::SeqCst)
    }

    /// Extract from a single text. Never fails; problems are logged and yield an
    /// empty mapping.
    pub async fn attribute_text(&self, text: &str) -> ObjectAttribution {
        let request = CompletionRequest::user(&self.model, self.prompts.single(text));
        let response = {
            let _permit = match self.gate.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Dispatch gate closed; skipping request");
                    return ObjectAttribution::new();
                }
            };
            self.transport.send(&request).await
        };

        let body = match response {
            Ok(response) if response.is_ok() => response.body,
            Ok(response) => {
                warn!(status = response.status, "Completion request returned an error status");
                return ObjectAttribution::new();
            }
            Err(e) => {
                warn!(error = %e, "Exception raised when requesting the completion endpoint");
                return ObjectAttribution::new();
            }
        };

        match parse::completion_content(&body).and_then(|c| parse::parse_attribution(&c)) {
            Ok(attribution) => attribution,
            Err(e) => {
                warn!(error = %e, "Could not parse completion response");
                ObjectAttribution::new()
            }
        }
    }

    /// Extract from a corpus in concurrent batches.
    ///
    /// With `persist_path`, each parsed `(text, attribution)` is appended to that log as
    /// soon as its batch is parsed. A batch that exhausts its retries contributes
    /// nothing; the run itself never fails.
    pub async fn attribute_many(&self, texts: &[String], persist_path: Option<&Path>) -> CorpusReport {
        self.successful_batches.store(0, Ordering::SeqCst);
        let batches = partition(texts, self.batch_size);
        let log = persist_path.map(PersistLog::new);
        info!(
            texts = texts.len(),
            batches = batches.len(),
            batch_size = self.batch_size,
            "Starting corpus extraction"
        );

        let results = join_all(batches.iter().map(|b| self.run_batch(b, log.as_ref()))).await;

        let report = aggregate(&batches, results, self.successful_batches());
        info!(
            attributions = report.attributions.len(),
            successful_batches = report.successful_batches,
            exhausted_batches = report.exhausted_batches,
            uncorrelated = report.uncorrelated_keys.len(),
            "Corpus extraction finished"
        );
        report
    }

    async fn run_batch(&self, batch: &Batch, log: Option<&PersistLog>) -> BatchResult {
        let request = CompletionRequest::user(&self.model, self.prompts.multi(&batch.texts));
        debug!(batch = batch.index, texts = batch.texts.len(), "Dispatching batch");

        let body = match retry::send_with_retry(
            self.transport.as_ref(),
            &self.gate,
            &request,
            &self.retry,
        )
        .await
        {
            RequestOutcome::Success { body, retries } => {
                let done = self.successful_batches.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(batch = batch.index, retries, successful_batches = done, "Batch completed");
                body
            }
            RequestOutcome::Exhausted { attempts, .. } => {
                warn!(batch = batch.index, attempts, "Batch abandoned after retries");
                return BatchResult::default();
            }
        };

        let parsed = match parse::completion_content(&body).and_then(|c| parse::parse_batch(&c)) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(batch = batch.index, error = %e, "Couldn't parse batch response");
                Vec::new()
            }
        };

        let result = correlate(&batch.texts, parsed);

        if let Some(log) = log {
            for entry in result.matched.iter().chain(&result.uncorrelated) {
                if let Err(e) = log.append(&entry.text, &entry.attribution).await {
                    warn!(path = %log.path().display(), error = %e, "Failed to persist result");
                }
            }
        }

        result
    }
}

type KeyReading = fn(&str) -> String;

fn as_given(key: &str) -> String {
    key.trim().to_string()
}

fn unwrapped(key: &str) -> String {
    parse::unwrap_key(key).to_string()
}

fn count_matches(texts: &[String], parsed: &[(String, ObjectAttribution)], read: KeyReading) -> usize {
    let keys: HashSet<String> = parsed.iter().map(|(key, _)| read(key)).collect();
    texts.iter().filter(|t| keys.contains(t.trim())).count()
}

/// Pair each input text of an answered batch with its answer entry.
///
/// A model either answers with the texts as given (`<html>` for the text `<html>`) or
/// keeps the prompt's brackets (`<<html>>`). Whichever reading matches more inputs of
/// the batch is tried first, then the other, then one that also trims inside the
/// brackets. Each entry is consumed at most once.
fn correlate(texts: &[String], mut parsed: Vec<(String, ObjectAttribution)>) -> BatchResult {
    let readings: [KeyReading; 3] =
        if count_matches(texts, &parsed, unwrapped) > count_matches(texts, &parsed, as_given) {
            [unwrapped, as_given, parse::normalize_key]
        } else {
            [as_given, unwrapped, parse::normalize_key]
        };

    let mut slots: Vec<Option<ObjectAttribution>> = vec![None; texts.len()];
    for read in readings {
        for (text, slot) in texts.iter().zip(slots.iter_mut()) {
            if slot.is_some() {
                continue;
            }
            if let Some(i) = parsed.iter().position(|(key, _)| read(key) == text.trim()) {
                *slot = Some(parsed.remove(i).1);
            }
        }
    }

    let matched = texts
        .iter()
        .zip(slots)
        .filter_map(|(text, slot)| {
            slot.map(|attribution| TextAttribution {
                text: text.clone(),
                attribution,
            })
        })
        .collect();

    parsed.sort_by(|a, b| a.0.cmp(&b.0));
    let uncorrelated = parsed
        .into_iter()
        .map(|(key, attribution)| TextAttribution {
            text: parse::normalize_key(&key),
            attribution,
        })
        .collect();

    BatchResult {
        matched,
        uncorrelated,
        succeeded: true,
    }
}

/// Order results by input text; duplicates keep the first parse.
fn aggregate(batches: &[Batch], results: Vec<BatchResult>, successful: usize) -> CorpusReport {
    let mut report = CorpusReport {
        total_batches: batches.len(),
        successful_batches: successful,
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::new();
    let mut uncorrelated = Vec::new();

    for (batch, result) in batches.iter().zip(results) {
        if !result.succeeded {
            report.exhausted_batches += 1;
        }
        for entry in result.matched {
            if seen.insert(entry.text.clone()) {
                report.attributions.push(entry);
            }
        }
        for entry in result.uncorrelated {
            warn!(batch = batch.index, text = %entry.text, "Answer key matches no input text of its batch");
            report.uncorrelated_keys.push(entry.text.clone());
            if seen.insert(entry.text.clone()) {
                uncorrelated.push(entry);
            }
        }
    }

    report.attributions.extend(uncorrelated);
    report
}

#[async_trait]
impl ObjectAttributor for LlmAttributor {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn attribute(&self, text: &str) -> Result<ObjectAttribution> {
        Ok(self.attribute_text(text).await)
    }
}
