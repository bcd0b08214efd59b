//! Two-tier prediction cache
//!
//! Tier 1 is a bounded in-memory LRU per predictor side. Tier 2 is the
//! durable [`PredictionStore`], shared by both sides and keyed by model
//! identity. A lookup falls through memory, then the store, then the
//! predictor itself; whatever is found is promoted into the tiers above it.
//!
//! Concurrent requests for the same key wait on a per-key slot, so each
//! distinct context is computed at most once per cache.
//!
//! # Error Handling
//!
//! A failed store write is retried once with a warning before the error
//! reaches the caller. Predictor failures and invalid distributions are
//! never cached.

mod store;

pub use store::{PredictionStore, SqliteStore, StoreError};

use crate::context::{Context, Side};
use crate::predict::{Distribution, DistributionError, Predictor};
use crate::vocabulary::Vind;
use lru::LruCache;
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("predictor '{model}' failed: {cause:#}")]
    Predictor { model: String, cause: anyhow::Error },
    #[error("predictor '{model}' returned an invalid distribution: {source}")]
    InvalidDistribution {
        model: String,
        #[source]
        source: DistributionError,
    },
    #[error("stored distribution for '{model}' is unreadable: {source}")]
    CorruptEntry {
        model: String,
        #[source]
        source: DistributionError,
    },
    #[error("forward and backward predictors share the model id '{0}'")]
    DuplicateModel(String),
    #[error("no predictor with model id '{0}'")]
    UnknownModel(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counters for one predictor side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SideStats {
    pub memory_hits: u64,
    pub store_hits: u64,
    pub computed: u64,
    pub store_retries: u64,
    pub memory_len: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub forward: SideStats,
    pub backward: SideStats,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    store_hits: AtomicU64,
    computed: AtomicU64,
    store_retries: AtomicU64,
}

type Slot = Arc<Mutex<Option<Distribution>>>;

// Poisoning only means another thread panicked mid-lookup; the cached data
// itself is still consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One predictor plus its in-memory tier.
struct CachedPredictor {
    predictor: Arc<dyn Predictor>,
    memory: Mutex<LruCache<Vec<u8>, Distribution>>,
    in_flight: Mutex<HashMap<Vec<u8>, Slot>>,
    counters: Counters,
}

impl CachedPredictor {
    fn new(predictor: Arc<dyn Predictor>, capacity: NonZeroUsize) -> Self {
        Self {
            predictor,
            memory: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    fn model_id(&self) -> &str {
        self.predictor.model_id()
    }

    fn from_memory(&self, key: &[u8]) -> Option<Distribution> {
        let hit = lock(&self.memory).get(key).cloned();
        if hit.is_some() {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    fn get_or_compute(
        &self,
        store: &dyn PredictionStore,
        vocabulary_size: usize,
        context: &[Vind],
    ) -> Result<Distribution, PredictionError> {
        if let Some(hit) = self.from_memory(context) {
            return Ok(hit);
        }

        let slot = Arc::clone(lock(&self.in_flight).entry(context.to_vec()).or_default());
        let mut guard = lock(&slot);
        if let Some(done) = guard.as_ref() {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(done.clone());
        }
        // The previous owner of this key may have finished between our
        // memory miss and taking the slot.
        if let Some(hit) = self.from_memory(context) {
            self.release(context, &slot);
            return Ok(hit);
        }

        let result = self.load_or_predict(store, vocabulary_size, context);
        if let Ok(distribution) = &result {
            *guard = Some(distribution.clone());
            lock(&self.memory).put(context.to_vec(), distribution.clone());
        }
        drop(guard);
        self.release(context, &slot);
        result
    }

    fn release(&self, key: &[u8], slot: &Slot) {
        let mut in_flight = lock(&self.in_flight);
        if in_flight.get(key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            in_flight.remove(key);
        }
    }

    fn load_or_predict(
        &self,
        store: &dyn PredictionStore,
        vocabulary_size: usize,
        context: &[Vind],
    ) -> Result<Distribution, PredictionError> {
        let model = self.model_id();

        if let Some(bytes) = store.get(model, context)? {
            let distribution = Distribution::from_le_bytes(&bytes, vocabulary_size).map_err(
                |source| PredictionError::CorruptEntry {
                    model: model.to_string(),
                    source,
                },
            )?;
            self.counters.store_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(distribution);
        }

        let probs = self
            .predictor
            .predict(context)
            .map_err(|cause| PredictionError::Predictor {
                model: model.to_string(),
                cause,
            })?;
        let distribution = Distribution::new(probs, vocabulary_size).map_err(|source| {
            PredictionError::InvalidDistribution {
                model: model.to_string(),
                source,
            }
        })?;
        self.counters.computed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(model, context_len = context.len(), "computed prediction");

        let bytes = distribution.to_le_bytes();
        if let Err(first) = store.put(model, context, &bytes) {
            tracing::warn!(model, error = %first, "prediction store write failed, retrying");
            self.counters.store_retries.fetch_add(1, Ordering::Relaxed);
            store.put(model, context, &bytes)?;
        }
        Ok(distribution)
    }

    fn clear(&self) {
        lock(&self.memory).clear();
    }

    fn stats(&self) -> SideStats {
        SideStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            store_hits: self.counters.store_hits.load(Ordering::Relaxed),
            computed: self.counters.computed.load(Ordering::Relaxed),
            store_retries: self.counters.store_retries.load(Ordering::Relaxed),
            memory_len: lock(&self.memory).len(),
        }
    }
}

/// Memoizing front for the forward and backward predictors.
///
/// Safe to share across worker threads.
pub struct PredictionCache {
    forward: CachedPredictor,
    backward: CachedPredictor,
    store: Arc<dyn PredictionStore>,
    vocabulary_size: usize,
}

impl PredictionCache {
    /// `capacity` bounds each side's in-memory tier; zero is treated as one.
    pub fn new(
        forward: Arc<dyn Predictor>,
        backward: Arc<dyn Predictor>,
        store: Arc<dyn PredictionStore>,
        vocabulary_size: usize,
        capacity: usize,
    ) -> Result<Self, PredictionError> {
        if forward.model_id() == backward.model_id() {
            return Err(PredictionError::DuplicateModel(
                forward.model_id().to_string(),
            ));
        }
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            forward: CachedPredictor::new(forward, capacity),
            backward: CachedPredictor::new(backward, capacity),
            store,
            vocabulary_size,
        })
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary_size
    }

    pub fn forward_model(&self) -> &str {
        self.forward.model_id()
    }

    pub fn backward_model(&self) -> &str {
        self.backward.model_id()
    }

    /// Look up (or compute) the distribution `model_id` assigns to `context`.
    pub fn get_or_compute(
        &self,
        model_id: &str,
        context: &[Vind],
    ) -> Result<Distribution, PredictionError> {
        let side = if model_id == self.forward.model_id() {
            &self.forward
        } else if model_id == self.backward.model_id() {
            &self.backward
        } else {
            return Err(PredictionError::UnknownModel(model_id.to_string()));
        };
        side.get_or_compute(self.store.as_ref(), self.vocabulary_size, context)
    }

    /// Forward prediction for a prefix context.
    pub fn forward(&self, context: &Context<'_>) -> Result<Distribution, PredictionError> {
        debug_assert_eq!(context.side(), Side::Prefix);
        self.forward
            .get_or_compute(self.store.as_ref(), self.vocabulary_size, &context.to_bytes())
    }

    /// Backward prediction for a suffix context.
    pub fn backward(&self, context: &Context<'_>) -> Result<Distribution, PredictionError> {
        debug_assert_eq!(context.side(), Side::Suffix);
        self.backward
            .get_or_compute(self.store.as_ref(), self.vocabulary_size, &context.to_bytes())
    }

    /// Drop the in-memory tier. The durable store is untouched.
    pub fn clear(&self) {
        self.forward.clear();
        self.backward.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            forward: self.forward.stats(),
            backward: self.backward.stats(),
        }
    }
}
