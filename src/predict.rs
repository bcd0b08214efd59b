//! Sequence predictors
//!
//! The forward and backward models are external collaborators. This module
//! defines the narrow capability the rest of the crate consumes, the
//! validated [`Distribution`] they must return, and a predictor backed by an
//! external command.

use crate::config::PredictorCommand;
use crate::util::run_command_with_input;
use crate::vocabulary::Vind;
use anyhow::{anyhow, Context as _};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Allowed deviation of a distribution's L1 norm from 1.
pub const NORMALIZATION_TOLERANCE: f32 = 0.01;

#[derive(Debug, Error, PartialEq)]
pub enum DistributionError {
    #[error("distribution has {actual} entries, vocabulary has {expected}")]
    WrongLength { expected: usize, actual: usize },
    #[error("distribution has a negative probability {value} at index {index}")]
    Negative { index: usize, value: f32 },
    #[error("distribution has a non-finite probability at index {index}")]
    NotFinite { index: usize },
    #[error("distribution sums to {sum}, not 1")]
    NotNormalized { sum: f32 },
}

/// A probability distribution over the vocabulary.
///
/// Construction validates non-negativity and L1 normalization; holding a
/// `Distribution` means those checks passed.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    probs: Arc<[f32]>,
}

impl Distribution {
    pub fn new(probs: Vec<f32>, vocabulary_size: usize) -> Result<Self, DistributionError> {
        if probs.len() != vocabulary_size {
            return Err(DistributionError::WrongLength {
                expected: vocabulary_size,
                actual: probs.len(),
            });
        }
        let mut sum = 0.0f32;
        for (index, &value) in probs.iter().enumerate() {
            if !value.is_finite() {
                return Err(DistributionError::NotFinite { index });
            }
            if value < 0.0 {
                return Err(DistributionError::Negative { index, value });
            }
            sum += value;
        }
        if (sum - 1.0).abs() > NORMALIZATION_TOLERANCE {
            return Err(DistributionError::NotNormalized { sum });
        }
        Ok(Self {
            probs: probs.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.probs
    }

    pub fn probability(&self, token: Vind) -> f32 {
        self.probs.get(token as usize).copied().unwrap_or(0.0)
    }

    /// Most likely token; ties go to the lowest index.
    pub fn argmax(&self) -> Vind {
        let mut best = 0usize;
        for (index, &value) in self.probs.iter().enumerate() {
            if value > self.probs[best] {
                best = index;
            }
        }
        best as Vind
    }

    /// Little-endian `f32` blob for the durable store.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.probs.len() * 4);
        for value in self.probs.iter() {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn from_le_bytes(bytes: &[u8], vocabulary_size: usize) -> Result<Self, DistributionError> {
        if bytes.len() != vocabulary_size * 4 {
            return Err(DistributionError::WrongLength {
                expected: vocabulary_size,
                actual: bytes.len() / 4,
            });
        }
        let probs = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Self::new(probs, vocabulary_size)
    }
}

/// A next-token (or previous-token) model.
pub trait Predictor: Send + Sync {
    /// Stable identity used to key the durable cache.
    fn model_id(&self) -> &str;

    /// Probability of every vocabulary entry given `context`.
    fn predict(&self, context: &[Vind]) -> anyhow::Result<Vec<f32>>;
}

impl<P: Predictor + ?Sized> Predictor for Box<P> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn predict(&self, context: &[Vind]) -> anyhow::Result<Vec<f32>> {
        (**self).predict(context)
    }
}

impl<P: Predictor + ?Sized> Predictor for Arc<P> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn predict(&self, context: &[Vind]) -> anyhow::Result<Vec<f32>> {
        (**self).predict(context)
    }
}

/// Predictor served by an external process.
///
/// The context is written to stdin as a JSON array of integers; the process
/// must print a JSON array of probabilities and exit successfully.
#[derive(Debug, Clone)]
pub struct CommandPredictor {
    model_id: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandPredictor {
    pub fn new(command: &PredictorCommand) -> Self {
        Self {
            model_id: command.model_id.clone(),
            program: command.program.clone(),
            args: command.args.clone(),
            timeout: Duration::from_secs(command.timeout_secs),
        }
    }
}

impl Predictor for CommandPredictor {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn predict(&self, context: &[Vind]) -> anyhow::Result<Vec<f32>> {
        let input = serde_json::to_vec(context)?;
        let mut command = Command::new(&self.program);
        command.args(&self.args);

        let result = run_command_with_input(&mut command, &input, self.timeout)
            .map_err(|e| anyhow!("predictor '{}': {}", self.model_id, e))?;
        if result.timed_out {
            return Err(anyhow!(
                "predictor '{}' timed out after {}s",
                self.model_id,
                self.timeout.as_secs()
            ));
        }
        let success = result.status.map(|s| s.success()).unwrap_or(false);
        if !success {
            return Err(anyhow!(
                "predictor '{}' failed: {}",
                self.model_id,
                crate::util::truncate(result.stderr.trim(), 400)
            ));
        }
        serde_json::from_str(result.stdout.trim())
            .with_context(|| format!("predictor '{}' printed malformed output", self.model_id))
    }
}
