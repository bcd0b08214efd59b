//! Localization and repair pipeline
//!
//! vector → context pairs → cached predictions → per-position scores →
//! ranking → validated fixes.

use crate::cache::{PredictionCache, PredictionError, SqliteStore};
use crate::config::{Config, PredictorCommand};
use crate::context::ContextWindow;
use crate::edit::{Edit, EditError};
use crate::fix::FixSynthesizer;
use crate::lang::{SyntaxChecker, Tokenizer};
use crate::predict::{CommandPredictor, DistributionError, Predictor};
use crate::rank::Ranker;
use crate::score::{DisagreementScorer, IndexResult};
use crate::source::SourceFile;
use crate::vector::{TokenVector, UnrepresentableToken};
use crate::vocabulary::Vocabulary;
use anyhow::Context as _;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error("scoring failed: {0}")]
    Distribution(#[from] DistributionError),
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error("syntax checker failed: {0:#}")]
    SyntaxCheck(anyhow::Error),
    #[error("tokenizer failed: {0:#}")]
    Tokenize(anyhow::Error),
    #[error(transparent)]
    Unrepresentable(#[from] UnrepresentableToken),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub context_length: usize,
    pub top_k: usize,
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            context_length: config.context_length,
            top_k: config.top_k,
        }
    }
}

/// Ranked positions plus every validated fix for one vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FixResult {
    pub ranked: Vec<IndexResult>,
    pub fixes: Vec<Edit>,
}

pub struct Pipeline {
    vocabulary: Vocabulary,
    cache: PredictionCache,
    checker: Arc<dyn SyntaxChecker>,
    options: PipelineOptions,
    scorer: DisagreementScorer,
    ranker: Ranker,
}

impl Pipeline {
    pub fn new(
        vocabulary: Vocabulary,
        cache: PredictionCache,
        checker: Arc<dyn SyntaxChecker>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            vocabulary,
            cache,
            checker,
            options,
            scorer: DisagreementScorer::new(),
            ranker: Ranker,
        }
    }

    /// Build the pipeline described by `config`: its vocabulary, the
    /// configured predictor commands, and the durable store.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let vocabulary = load_vocabulary(config)?;
        let forward = command_predictor(config.forward.as_ref(), "forward")?;
        let backward = command_predictor(config.backward.as_ref(), "backward")?;
        let store_path = config.store_path()?;
        let store = SqliteStore::open(&store_path)?;
        let cache = PredictionCache::new(
            forward,
            backward,
            Arc::new(store),
            vocabulary.len(),
            config.memory_capacity,
        )?;
        tracing::info!(
            language = config.language.name(),
            vocabulary = vocabulary.len(),
            store = %store_path.display(),
            "pipeline ready"
        );
        Ok(Self::new(
            vocabulary,
            cache,
            Arc::new(config.language),
            PipelineOptions::from(config),
        ))
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn cache(&self) -> &PredictionCache {
        &self.cache
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    /// Score every position of `vector`, in position order.
    pub fn score(&self, vector: &TokenVector) -> Result<Vec<IndexResult>, PipelineError> {
        let window = ContextWindow::new(
            vector,
            self.options.context_length,
            self.vocabulary.start_token_index(),
            self.vocabulary.end_token_index(),
        );
        let mut results = Vec::with_capacity(window.len());
        for pair in window {
            let a = self.cache.forward(&pair.prefix)?;
            let b = self.cache.backward(&pair.suffix)?;
            results.push(self.scorer.score(pair.position, vector[pair.position], &a, &b)?);
        }
        Ok(results)
    }

    /// All positions, most suspicious first.
    pub fn rank(&self, vector: &TokenVector) -> Result<Vec<IndexResult>, PipelineError> {
        Ok(self.ranker.rank(self.score(vector)?))
    }

    pub fn synthesizer(&self) -> FixSynthesizer<'_> {
        FixSynthesizer::new(&self.vocabulary, self.checker.as_ref(), self.options.top_k)
    }

    pub fn rank_and_fix(&self, vector: &TokenVector) -> Result<FixResult, PipelineError> {
        let ranked = self.rank(vector)?;
        let fixes = self.synthesizer().fix(vector, &ranked)?;
        Ok(FixResult { ranked, fixes })
    }

    /// [`rank_and_fix`](Self::rank_and_fix) with candidates checked on the
    /// source line of each position of `vector`.
    pub fn rank_and_fix_on_lines(
        &self,
        vector: &TokenVector,
        lines: &[usize],
    ) -> Result<FixResult, PipelineError> {
        let ranked = self.rank(vector)?;
        let fixes = self.synthesizer().with_lines(lines).fix(vector, &ranked)?;
        Ok(FixResult { ranked, fixes })
    }

    /// Tokenize `source` and rank and fix it on its own line layout.
    pub fn rank_source(
        &self,
        source: impl Into<Vec<u8>>,
        tokenizer: &dyn Tokenizer,
    ) -> Result<(SourceFile, FixResult), PipelineError> {
        let file = SourceFile::parse(source, tokenizer, &self.vocabulary)
            .map_err(PipelineError::Tokenize)?;
        let result = self.rank_and_fix_on_lines(file.vector(), file.lines())?;
        Ok((file, result))
    }
}

/// The configured vocabulary file, else the language's built-in one.
pub fn load_vocabulary(config: &Config) -> anyhow::Result<Vocabulary> {
    match &config.vocabulary {
        Some(path) => Vocabulary::load(path)
            .with_context(|| format!("Failed to load vocabulary '{}'", path.display())),
        None => config.language.vocabulary().with_context(|| {
            format!("Built-in {} vocabulary is invalid", config.language.name())
        }),
    }
}

fn command_predictor(
    command: Option<&PredictorCommand>,
    side: &str,
) -> anyhow::Result<Arc<dyn Predictor>> {
    let command = command.with_context(|| {
        format!("No {side} predictor configured; add a [{side}] table to the config")
    })?;
    Ok(Arc::new(CommandPredictor::new(command)))
}
