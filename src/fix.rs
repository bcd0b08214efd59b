//! Fix synthesis
//!
//! For each of the top `K` ranked positions, in rank order, candidate edits
//! are tried in a fixed priority:
//!
//! 1. insert the forward model's top token before the position
//! 2. insert the backward model's top token before the position
//! 3. delete the token at the position
//! 4. substitute the forward model's top token
//! 5. substitute the backward model's top token
//!
//! A candidate is kept when the rendered result passes the syntax checker.
//! Given the line of each input position, candidates are rendered on those
//! lines; otherwise on one line.
//! Candidates that repeat an earlier one, change nothing, or would touch a
//! sentinel are never checked.

use crate::edit::Edit;
use crate::lang::SyntaxChecker;
use crate::pipeline::PipelineError;
use crate::score::IndexResult;
use crate::source::line_after_edit;
use crate::vector::TokenVector;
use crate::vocabulary::{Vind, Vocabulary};
use std::collections::HashSet;

pub struct FixSynthesizer<'a> {
    vocabulary: &'a Vocabulary,
    checker: &'a dyn SyntaxChecker,
    top_k: usize,
    lines: Option<&'a [usize]>,
}

impl<'a> FixSynthesizer<'a> {
    pub fn new(vocabulary: &'a Vocabulary, checker: &'a dyn SyntaxChecker, top_k: usize) -> Self {
        Self {
            vocabulary,
            checker,
            top_k,
            lines: None,
        }
    }

    /// Render candidates with position `i` of the input vector on `lines[i]`.
    pub fn with_lines(mut self, lines: &'a [usize]) -> Self {
        self.lines = Some(lines);
        self
    }

    /// Every edit that restores valid syntax, in priority order.
    pub fn fix(
        &self,
        vector: &TokenVector,
        ranked: &[IndexResult],
    ) -> Result<Vec<Edit>, PipelineError> {
        let mut fixes = Vec::new();
        for edit in self.candidates(vector, ranked) {
            if self.is_valid(vector, &edit)? {
                fixes.push(edit);
            }
        }
        Ok(fixes)
    }

    /// The highest-priority fix, checking no further candidates once found.
    pub fn first_fix(
        &self,
        vector: &TokenVector,
        ranked: &[IndexResult],
    ) -> Result<Option<Edit>, PipelineError> {
        for edit in self.candidates(vector, ranked) {
            if self.is_valid(vector, &edit)? {
                return Ok(Some(edit));
            }
        }
        Ok(None)
    }

    /// Candidate edits for the top `K` positions, deduplicated.
    pub fn candidates(&self, vector: &TokenVector, ranked: &[IndexResult]) -> Vec<Edit> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for result in ranked.iter().take(self.top_k) {
            for edit in self.candidates_at(vector, result) {
                if seen.insert(edit) {
                    out.push(edit);
                }
            }
        }
        out
    }

    fn candidates_at(&self, vector: &TokenVector, result: &IndexResult) -> Vec<Edit> {
        let index = result.index;
        let Some(original) = vector.get(index) else {
            return Vec::new();
        };
        let vocab = self.vocabulary;
        let insertable = |token: Vind| index > 0 && vocab.is_concrete(token);
        let replaceable = vocab.is_concrete(original);
        let substitutable = |token: Vind| replaceable && token != original && vocab.is_concrete(token);

        let mut edits = Vec::with_capacity(5);
        for token in [result.forward_top, result.backward_top] {
            if insertable(token) {
                edits.push(Edit::Insertion { index, token });
            }
        }
        if replaceable {
            edits.push(Edit::Deletion {
                index,
                original_token: original,
            });
        }
        for token in [result.forward_top, result.backward_top] {
            if substitutable(token) {
                edits.push(Edit::Substitution {
                    index,
                    token,
                    original_token: original,
                });
            }
        }
        edits
    }

    fn is_valid(&self, vector: &TokenVector, edit: &Edit) -> Result<bool, PipelineError> {
        let candidate = edit.apply(vector)?;
        let source = match self.lines {
            Some(lines) => candidate
                .render_lines(self.vocabulary, |index| line_after_edit(lines, edit, index))?,
            None => candidate.render(self.vocabulary)?,
        };
        let ok = self
            .checker
            .check_syntax(source.as_bytes())
            .map_err(PipelineError::SyntaxCheck)?;
        tracing::debug!(edit = ?edit, ok, "checked candidate fix");
        Ok(ok)
    }
}
