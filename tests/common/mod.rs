//! Shared test fixtures: a deterministic in-process gateway and store
//! helpers. Scorer and conflict prompts are deliberately not matched
//! against; responses are scripted per call instead.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use archivist::config::Config;
use archivist::error::{Error, Result};
use archivist::llm::{ChatMessage, CompletionOptions, Gateway};
use archivist::store::{Repository, Store};
use async_trait::async_trait;

pub const EMBEDDING_DIM: usize = 32;

/// Deterministic gateway stub.
///
/// Embeddings are a synonym-normalised hashed bag of words, so texts that
/// share vocabulary (or configured synonyms) land close together while
/// staying fully deterministic. Completions pop from a scripted queue
/// (empty string once the queue drains) or fail when configured to.
pub struct StubGateway {
    pub complete_calls: AtomicUsize,
    pub embed_calls: AtomicUsize,
    fail_completions: bool,
    fail_embeddings: bool,
    scripted: Mutex<VecDeque<String>>,
    synonyms: Vec<(String, String)>,
}

impl Default for StubGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            complete_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            fail_completions: false,
            fail_embeddings: false,
            scripted: Mutex::new(VecDeque::new()),
            synonyms: Vec::new(),
        }
    }

    /// Every completion fails; embeddings keep working.
    pub fn failing_completions() -> Self {
        Self {
            fail_completions: true,
            ..Self::new()
        }
    }

    /// Every embedding fails; completions keep working.
    pub fn failing_embeddings() -> Self {
        Self {
            fail_embeddings: true,
            ..Self::new()
        }
    }

    pub fn scripted(responses: &[&str]) -> Self {
        let gateway = Self::new();
        gateway.push_completions(responses);
        gateway
    }

    pub fn push_completions(&self, responses: &[&str]) {
        let mut queue = self.scripted.lock().unwrap();
        for response in responses {
            queue.push_back((*response).to_string());
        }
    }

    pub fn with_synonyms(pairs: &[(&str, &str)]) -> Self {
        Self {
            synonyms: pairs
                .iter()
                .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
                .collect(),
            ..Self::new()
        }
    }

    pub fn total_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst) + self.embed_calls.load(Ordering::SeqCst)
    }

    fn canonical(&self, word: &str) -> String {
        for (from, to) in &self.synonyms {
            if from == word {
                return to.clone();
            }
        }
        word.to_string()
    }

    /// The deterministic embedding the stub produces for *text*.
    pub fn embedding_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; EMBEDDING_DIM];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let canonical = self.canonical(&word.to_ascii_lowercase());
            let hash = fnv1a(canonical.as_bytes());
            vector[(hash as usize) % EMBEDDING_DIM] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl Gateway for StubGateway {
    async fn complete(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
        _options: CompletionOptions,
    ) -> Result<String> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_completions {
            return Err(Error::ProviderFatal("stubbed completion failure".into()));
        }
        Ok(self.scripted.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embeddings {
            return Err(Error::ProviderFatal("stubbed embedding failure".into()));
        }
        Ok(self.embedding_for(text))
    }

    async fn transcribe(&self, _model: &str, _audio_path: &Path) -> Result<String> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        Ok("stubbed transcript".to_string())
    }

    fn validate_credentials(&self, _model: &str) -> Result<()> {
        Ok(())
    }
}

/// A project config rooted at *root*, with an in-repo store path.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.project_root = root.to_path_buf();
    config.paths.config_file = root.join("archivist.yaml");
    config.paths.db_file = root.join(".archivist.db");
    config
}

/// Open a repository on the config's store path.
pub fn open_repo(config: &Config) -> Repository {
    Repository::new(Store::open(&config.paths.db_file).unwrap())
}
