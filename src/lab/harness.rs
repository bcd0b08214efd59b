//! Mutation evaluation
//!
//! Per file: apply a known mutation, run localization and repair on the
//! mutant, compare against ground truth, and emit exactly one record. A
//! failure while scoring one file becomes a degenerate record carrying the
//! error; the batch carries on with the next file.

use crate::edit::{Edit, EditError, EditKind};
use crate::lab::sink::RecordSink;
use crate::pipeline::{FixResult, Pipeline, PipelineError};
use crate::rank::first_rank_where;
use crate::source::{PositionOutOfRange, SourceFile};
use crate::vocabulary::{Vind, Vocabulary};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no ranked position lies on line {line}")]
pub struct GroundTruthNotFound {
    pub line: usize,
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    GroundTruth(#[from] GroundTruthNotFound),
    #[error(transparent)]
    Position(#[from] PositionOutOfRange),
    #[error("mutation does not apply: {0}")]
    Mutation(#[from] EditError),
}

/// One row of evaluation output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub file: String,
    pub n_lines: usize,
    pub n_tokens: usize,
    pub m_kind: EditKind,
    pub m_loc: usize,
    pub m_token: Option<String>,
    pub m_old: Option<String>,
    pub correct_line: Option<usize>,
    pub line_top_rank: Option<usize>,
    pub rank_correct_line: Option<usize>,
    pub fixed: bool,
    pub true_fix: Option<bool>,
    pub f_kind: Option<EditKind>,
    pub f_loc: Option<usize>,
    pub f_token: Option<String>,
    pub f_old: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationRecord {
    fn new(file: &SourceFile, mutation: &Edit, vocabulary: &Vocabulary) -> Self {
        let text = |token: Option<Vind>| token.and_then(|t| vocabulary.to_text(t)).map(String::from);
        Self {
            file: file.id().to_string(),
            n_lines: file.sloc(),
            n_tokens: file.vector().len(),
            m_kind: mutation.kind(),
            m_loc: mutation.index(),
            m_token: text(mutation.new_token()),
            m_old: text(mutation.old_token()),
            correct_line: None,
            line_top_rank: None,
            rank_correct_line: None,
            fixed: false,
            true_fix: None,
            f_kind: None,
            f_loc: None,
            f_token: None,
            f_old: None,
            error: None,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.error.is_some()
    }
}

/// Running totals over a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub attempted: usize,
    pub scored: usize,
    pub failed: usize,
    pub fixed: usize,
    pub true_fixes: usize,
    /// Share of scored files whose top-ranked line is the mutated line
    pub top1_accuracy: f64,
    pub mean_reciprocal_rank: f64,
    pub cancelled: bool,
    #[serde(skip)]
    top1: usize,
    #[serde(skip)]
    reciprocal_ranks: f64,
}

impl BatchSummary {
    pub fn add(&mut self, record: &EvaluationRecord) {
        self.attempted += 1;
        if record.is_degenerate() {
            self.failed += 1;
            return;
        }
        self.scored += 1;
        if record.fixed {
            self.fixed += 1;
        }
        if record.true_fix == Some(true) {
            self.true_fixes += 1;
        }
        if record.correct_line.is_some() && record.line_top_rank == record.correct_line {
            self.top1 += 1;
        }
        if let Some(rank) = record.rank_correct_line {
            self.reciprocal_ranks += 1.0 / rank as f64;
        }
        let scored = self.scored as f64;
        self.top1_accuracy = self.top1 as f64 / scored;
        self.mean_reciprocal_rank = self.reciprocal_ranks / scored;
    }
}

/// A file paired with the mutation to evaluate on it.
#[derive(Debug, Clone)]
pub struct Mutant {
    pub file: SourceFile,
    pub mutation: Edit,
}

pub struct Evaluation<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> Evaluation<'a> {
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    /// Evaluate one mutant. Never fails; errors become degenerate records.
    pub fn evaluate(&self, file: &SourceFile, mutation: &Edit) -> EvaluationRecord {
        let outcome = mutation
            .apply(file.vector())
            .map_err(EvaluationError::from)
            .and_then(|mutant| {
                let lines = file.lines_after(mutation);
                Ok(self.pipeline.rank_and_fix_on_lines(&mutant, &lines)?)
            });
        self.record(file, mutation, outcome)
    }

    /// Judge the pipeline's outcome on a mutant against its mutation.
    pub fn record(
        &self,
        file: &SourceFile,
        mutation: &Edit,
        outcome: Result<FixResult, EvaluationError>,
    ) -> EvaluationRecord {
        let vocabulary = self.pipeline.vocabulary();
        let mut record = EvaluationRecord::new(file, mutation, vocabulary);
        let judged =
            outcome.and_then(|result| judge(file, mutation, &result, vocabulary, &mut record));
        if let Err(err) = judged {
            tracing::warn!(
                file = file.id(),
                mutation = %mutation.describe(vocabulary),
                error = %err,
                "evaluation failed"
            );
            record = EvaluationRecord {
                error: Some(err.to_string()),
                ..EvaluationRecord::new(file, mutation, vocabulary)
            };
        }
        record
    }

    /// Evaluate every mutant, writing one record per attempted file.
    ///
    /// `cancel` is checked before each file; files already started run to
    /// completion. With more than one job, files are spread over a rayon
    /// pool and record order is unspecified.
    pub fn run(
        &self,
        mutants: &[Mutant],
        sink: &RecordSink,
        cancel: &AtomicBool,
        jobs: usize,
    ) -> anyhow::Result<BatchSummary> {
        let evaluate_one = |mutant: &Mutant| -> anyhow::Result<Option<EvaluationRecord>> {
            if cancel.load(Ordering::SeqCst) {
                return Ok(None);
            }
            let record = self.evaluate(&mutant.file, &mutant.mutation);
            sink.write(&record)?;
            Ok(Some(record))
        };

        let records: Vec<Option<EvaluationRecord>> = if jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
            pool.install(|| mutants.par_iter().map(evaluate_one).collect::<anyhow::Result<Vec<_>>>())?
        } else {
            let mut out = Vec::with_capacity(mutants.len());
            for mutant in mutants {
                let record = evaluate_one(mutant)?;
                let stop = record.is_none();
                out.push(record);
                if stop {
                    break;
                }
            }
            out
        };

        let mut summary = BatchSummary::default();
        for record in records.iter().flatten() {
            summary.add(record);
        }
        summary.cancelled = records.iter().any(Option::is_none);
        tracing::info!(
            attempted = summary.attempted,
            failed = summary.failed,
            fixed = summary.fixed,
            top1 = summary.top1_accuracy,
            mrr = summary.mean_reciprocal_rank,
            cancelled = summary.cancelled,
            "evaluation finished"
        );
        Ok(summary)
    }
}

fn judge(
    file: &SourceFile,
    mutation: &Edit,
    result: &FixResult,
    vocabulary: &Vocabulary,
    record: &mut EvaluationRecord,
) -> Result<(), EvaluationError> {
    let correct_line = file.line_of_index(mutation.index(), Some(mutation))?;
    let line_of = |index: usize| file.line_of_index(index, Some(mutation));
    let line_top_rank = match result.ranked.first() {
        Some(top) => Some(line_of(top.index)?),
        None => None,
    };
    let rank_correct_line =
        first_rank_where(&result.ranked, |r| line_of(r.index) == Ok(correct_line))
            .ok_or(GroundTruthNotFound { line: correct_line })?;

    record.correct_line = Some(correct_line);
    record.line_top_rank = line_top_rank;
    record.rank_correct_line = Some(rank_correct_line);

    if let Some(fix) = result.fixes.first() {
        let text = |token: Option<Vind>| token.and_then(|t| vocabulary.to_text(t)).map(String::from);
        record.fixed = true;
        record.true_fix = Some(*fix == mutation.additive_inverse());
        record.f_kind = Some(fix.kind());
        record.f_loc = Some(fix.index());
        record.f_token = text(fix.new_token());
        record.f_old = text(fix.old_token());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{PredictionCache, SqliteStore};
    use crate::fix::tests::BraceChecker;
    use crate::lab::sink::read_records;
    use crate::lang::Token;
    use crate::pipeline::tests::FixedPredictor;
    use crate::pipeline::PipelineOptions;
    use std::sync::Arc;
    use tempfile::TempDir;

    // 3 class, 4 Hello, 5 {, 6 }
    fn vocab() -> Vocabulary {
        Vocabulary::from_names(["class", "Hello", "{", "}"]).unwrap()
    }

    fn token(class: &str, line: usize) -> Token {
        Token {
            class: class.to_string(),
            text: class.to_string(),
            line,
            column: 0,
        }
    }

    /// `class Hello {` on line 1, `}` on line 2.
    fn file() -> SourceFile {
        let tokens = vec![
            token("class", 1),
            token("Hello", 1),
            token("{", 1),
            token("}", 2),
        ];
        SourceFile::from_tokens(b"class Hello {\n}\n".to_vec(), tokens, &vocab())
    }

    fn pipeline() -> Pipeline {
        let vocab = vocab();
        let n = vocab.len();
        // Mutant after deleting `{`: <s> class Hello } </s>
        let forward = FixedPredictor::new("f", n)
            .with(&[1, 3], 4)
            .with(&[3, 4], 5)
            .with(&[4, 6], 2);
        let backward = FixedPredictor::new("b", n)
            .with(&[4, 6], 3)
            .with(&[6, 2], 4)
            .with(&[2, 2], 6)
            .with(&[3, 4], 1);
        let cache = PredictionCache::new(
            Arc::new(forward),
            Arc::new(backward),
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            n,
            64,
        )
        .unwrap();
        Pipeline::new(
            vocab,
            cache,
            Arc::new(BraceChecker::new()),
            PipelineOptions {
                context_length: 2,
                top_k: 4,
            },
        )
    }

    #[test]
    fn deleted_brace_is_localized_and_truly_fixed() {
        let pipeline = pipeline();
        let file = file();
        let mutation = Edit::Deletion {
            index: 3,
            original_token: 5,
        };
        let record = Evaluation::new(&pipeline).evaluate(&file, &mutation);

        assert_eq!(record.error, None);
        assert_eq!(record.n_tokens, 6);
        assert_eq!(record.n_lines, 2);
        assert_eq!(record.m_kind, EditKind::Deletion);
        assert_eq!(record.m_old.as_deref(), Some("{"));
        assert_eq!(record.m_token, None);
        // Mutant position 3 is the `}` that used to be at 4, on line 2.
        assert_eq!(record.correct_line, Some(2));
        assert_eq!(record.rank_correct_line, Some(1));
        assert!(record.fixed);
        assert_eq!(record.true_fix, Some(true));
        assert_eq!(record.f_kind, Some(EditKind::Insertion));
        assert_eq!(record.f_loc, Some(3));
        assert_eq!(record.f_token.as_deref(), Some("{"));
    }

    #[test]
    fn inapplicable_mutations_become_degenerate_records() {
        let pipeline = pipeline();
        let mutation = Edit::Deletion {
            index: 3,
            original_token: 6,
        };
        let record = Evaluation::new(&pipeline).evaluate(&file(), &mutation);
        assert!(record.is_degenerate());
        assert!(!record.fixed);
        assert_eq!(record.m_loc, 3);
    }

    #[test]
    fn rankings_that_miss_the_mutated_line_are_degenerate() {
        let pipeline = pipeline();
        let evaluation = Evaluation::new(&pipeline);
        let file = file();
        let mutation = Edit::Deletion {
            index: 3,
            original_token: 5,
        };
        let mutant = mutation.apply(file.vector()).unwrap();
        // Keep only the positions on line 1.
        let ranked: Vec<_> = pipeline
            .rank(&mutant)
            .unwrap()
            .into_iter()
            .filter(|r| r.index < 3)
            .collect();
        let result = FixResult {
            ranked,
            fixes: vec![Edit::Insertion { index: 3, token: 5 }],
        };

        let mut scratch = EvaluationRecord::new(&file, &mutation, pipeline.vocabulary());
        assert!(matches!(
            judge(&file, &mutation, &result, pipeline.vocabulary(), &mut scratch),
            Err(EvaluationError::GroundTruth(GroundTruthNotFound { line: 2 }))
        ));

        let record = evaluation.record(&file, &mutation, Ok(result));
        assert!(record.is_degenerate());
        assert_eq!(
            record.error.as_deref(),
            Some("no ranked position lies on line 2")
        );
        assert_eq!(record.correct_line, None);
        assert_eq!(record.line_top_rank, None);
        assert_eq!(record.rank_correct_line, None);
        assert!(!record.fixed);
        assert_eq!(record.true_fix, None);
        assert_eq!(record.f_kind, None);
        assert_eq!(record.m_kind, EditKind::Deletion);
        assert_eq!(record.m_loc, 3);
        assert_eq!(record.m_old.as_deref(), Some("{"));
        assert_eq!(record.n_tokens, 6);

        let mut summary = BatchSummary::default();
        summary.add(&record);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.scored, 0);
    }

    #[test]
    fn pipeline_errors_become_degenerate_records() {
        let pipeline = pipeline();
        let mutation = Edit::Deletion {
            index: 3,
            original_token: 5,
        };
        let err = EvaluationError::Pipeline(PipelineError::SyntaxCheck(anyhow::anyhow!("boom")));
        let record = Evaluation::new(&pipeline).record(&file(), &mutation, Err(err));
        assert_eq!(record.error.as_deref(), Some("syntax checker failed: boom"));
        assert!(!record.fixed);
    }

    #[test]
    fn summary_counts_every_attempt() {
        let mut summary = BatchSummary::default();
        let pipeline = pipeline();
        let evaluation = Evaluation::new(&pipeline);
        let good = Edit::Deletion {
            index: 3,
            original_token: 5,
        };
        let bad = Edit::Deletion {
            index: 9,
            original_token: 5,
        };
        summary.add(&evaluation.evaluate(&file(), &good));
        summary.add(&evaluation.evaluate(&file(), &bad));
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.scored, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.true_fixes, 1);
        assert!((summary.mean_reciprocal_rank - 1.0).abs() < 1e-9);
    }

    #[test]
    fn batch_writes_one_record_per_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("results.jsonl");
        let sink = RecordSink::open(&path).unwrap();
        let pipeline = pipeline();
        let mutants: Vec<Mutant> = (0..6)
            .map(|i| Mutant {
                file: file(),
                mutation: if i % 2 == 0 {
                    Edit::Deletion {
                        index: 3,
                        original_token: 5,
                    }
                } else {
                    Edit::Insertion { index: 99, token: 3 }
                },
            })
            .collect();

        let summary = Evaluation::new(&pipeline)
            .run(&mutants, &sink, &AtomicBool::new(false), 3)
            .unwrap();
        assert_eq!(summary.attempted, 6);
        assert_eq!(summary.failed, 3);
        assert!(!summary.cancelled);
        let records: Vec<EvaluationRecord> = read_records(&path).unwrap();
        assert_eq!(records.len(), 6);
    }

    #[test]
    fn cancelled_batches_stop_before_the_next_file() {
        let tmp = TempDir::new().unwrap();
        let sink = RecordSink::open(&tmp.path().join("results.jsonl")).unwrap();
        let pipeline = pipeline();
        let mutants = vec![
            Mutant {
                file: file(),
                mutation: Edit::Deletion {
                    index: 3,
                    original_token: 5,
                },
            };
            3
        ];
        let summary = Evaluation::new(&pipeline)
            .run(&mutants, &sink, &AtomicBool::new(true), 1)
            .unwrap();
        assert_eq!(summary.attempted, 0);
        assert!(summary.cancelled);
    }
}
