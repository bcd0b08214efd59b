use criterion::{black_box, criterion_group, criterion_main, Criterion};
use naturalfix::cache::{PredictionCache, SqliteStore};
use naturalfix::lang::Language;
use naturalfix::pipeline::{Pipeline, PipelineOptions};
use naturalfix::predict::{Distribution, Predictor};
use naturalfix::rank::Ranker;
use naturalfix::score::DisagreementScorer;
use naturalfix::util::fnv1a;
use naturalfix::vector::TokenVector;
use naturalfix::vocabulary::{Vind, Vocabulary};
use std::sync::Arc;

/// Peaked distribution whose mode depends on the context.
struct HashPredictor {
    id: &'static str,
    vocabulary_size: usize,
}

impl Predictor for HashPredictor {
    fn model_id(&self) -> &str {
        self.id
    }

    fn predict(&self, context: &[Vind]) -> anyhow::Result<Vec<f32>> {
        let peak = (fnv1a(context) % self.vocabulary_size as u64) as usize;
        let rest = 0.5 / (self.vocabulary_size - 1) as f32;
        let mut probs = vec![rest; self.vocabulary_size];
        probs[peak] = 0.5;
        Ok(probs)
    }
}

fn synthetic_vector(vocabulary: &Vocabulary, tokens: usize) -> TokenVector {
    let range = vocabulary.concrete_indices();
    let body = (0..tokens).map(|i| (range.start + (i * 7919) % range.len()) as Vind);
    TokenVector::bracketed(vocabulary, body)
}

fn bench_score_and_rank(c: &mut Criterion) {
    let n = 120;
    let scorer = DisagreementScorer::new();
    let dists: Vec<(Distribution, Distribution)> = (0..2_000)
        .map(|i| {
            let mut a = vec![0.5 / (n - 1) as f32; n];
            let mut b = a.clone();
            a[i % n] = 0.5;
            b[(i * 31) % n] = 0.5;
            (
                Distribution::new(a, n).expect("valid distribution"),
                Distribution::new(b, n).expect("valid distribution"),
            )
        })
        .collect();

    c.bench_function("score_2000_positions", |b| {
        b.iter(|| {
            let results = dists
                .iter()
                .enumerate()
                .map(|(i, (a, b))| scorer.score(i, (i % n) as Vind, a, b).expect("score"))
                .collect::<Vec<_>>();
            black_box(results);
        });
    });

    let results = dists
        .iter()
        .enumerate()
        .map(|(i, (a, b))| scorer.score(i, (i % n) as Vind, a, b).expect("score"))
        .collect::<Vec<_>>();
    c.bench_function("rank_2000_positions", |b| {
        b.iter(|| black_box(Ranker.rank(results.clone())));
    });
}

fn bench_cached_pipeline_score(c: &mut Criterion) {
    let language = Language::JavaScript;
    let vocabulary = language.vocabulary().expect("built-in vocabulary");
    let n = vocabulary.len();
    let cache = PredictionCache::new(
        Arc::new(HashPredictor {
            id: "bench-fwd",
            vocabulary_size: n,
        }),
        Arc::new(HashPredictor {
            id: "bench-bwd",
            vocabulary_size: n,
        }),
        Arc::new(SqliteStore::open_in_memory().expect("in-memory store")),
        n,
        1 << 14,
    )
    .expect("cache");
    let vector = synthetic_vector(&vocabulary, 1_000);
    let pipeline = Pipeline::new(
        vocabulary,
        cache,
        Arc::new(language),
        PipelineOptions {
            context_length: 20,
            top_k: 4,
        },
    );
    // Warm both tiers so the loop measures memory hits.
    pipeline.score(&vector).expect("warm-up score");

    c.bench_function("pipeline_score_1000_tokens_warm", |b| {
        b.iter(|| black_box(pipeline.score(black_box(&vector)).expect("score")));
    });
}

criterion_group!(perf_core, bench_score_and_rank, bench_cached_pipeline_score);
criterion_main!(perf_core);
