//! Source files and their token vectors
//!
//! A [`SourceFile`] keeps the original bytes, the lexical tokens, the
//! sentinel-bracketed vector, and a line table so that any vector position
//! (including positions in a mutated copy) can be attributed to a line.

use crate::edit::{Edit, EditKind};
use crate::lang::{vectorize, Token, Tokenizer};
use crate::util::hash_bytes;
use crate::vector::{TokenVector, UnrepresentableToken};
use crate::vocabulary::{Vind, Vocabulary};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("position {index} is outside a file of {len} positions")]
pub struct PositionOutOfRange {
    pub index: usize,
    pub len: usize,
}

/// The one-token edit that separates a broken revision from its fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixEvent {
    /// Applies to the broken revision's vector
    pub fix: Edit,
    /// Line of the fix; an inserted token's line in the fixed revision
    pub line: usize,
    pub new_token: Option<String>,
    pub old_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    id: String,
    source: Vec<u8>,
    tokens: Vec<Token>,
    vector: TokenVector,
    /// Line of every vector position, sentinels included
    lines: Vec<usize>,
}

impl SourceFile {
    /// Tokenize and vectorize `source`. The id is a content hash.
    pub fn parse(
        source: impl Into<Vec<u8>>,
        tokenizer: &dyn Tokenizer,
        vocabulary: &Vocabulary,
    ) -> anyhow::Result<Self> {
        let source = source.into();
        let tokens = tokenizer.tokenize(&source)?;
        Ok(Self::from_tokens(source, tokens, vocabulary))
    }

    pub fn from_tokens(source: Vec<u8>, tokens: Vec<Token>, vocabulary: &Vocabulary) -> Self {
        let vector = vectorize(&tokens, vocabulary);
        let first = tokens.first().map_or(1, |t| t.line);
        let last = tokens.last().map_or(1, |t| t.line);
        let mut lines = Vec::with_capacity(tokens.len() + 2);
        lines.push(first);
        lines.extend(tokens.iter().map(|t| t.line));
        lines.push(last);

        Self {
            id: hash_bytes(&source),
            source,
            tokens,
            vector,
            lines,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn vector(&self) -> &TokenVector {
        &self.vector
    }

    /// Line of every vector position, sentinels included.
    pub fn lines(&self) -> &[usize] {
        &self.lines
    }

    /// Line table for the vector produced by applying `edit`.
    pub fn lines_after(&self, edit: &Edit) -> Vec<usize> {
        let len = match edit.kind() {
            EditKind::Insertion => self.lines.len() + 1,
            EditKind::Deletion => self.lines.len().saturating_sub(1),
            EditKind::Substitution => self.lines.len(),
        };
        (0..len)
            .map(|index| line_after_edit(&self.lines, edit, index))
            .collect()
    }

    /// The vector as source text, each token on its original line.
    pub fn render(&self, vocabulary: &Vocabulary) -> Result<String, UnrepresentableToken> {
        self.vector
            .render_lines(vocabulary, |index| line_at(&self.lines, index))
    }

    /// How `fixed` repairs this file, when it differs by exactly one token.
    pub fn fix_event(&self, fixed: &SourceFile, vocabulary: &Vocabulary) -> Option<FixEvent> {
        let fix = Edit::between(&self.vector, &fixed.vector)?;
        let line = match fix {
            Edit::Insertion { index, .. } => fixed.line_of_index(index, None),
            _ => self.line_of_index(fix.index(), None),
        }
        .ok()?;
        let name = |token: Option<Vind>| token.and_then(|t| vocabulary.name_of(t)).map(String::from);
        Some(FixEvent {
            fix,
            line,
            new_token: name(fix.new_token()),
            old_token: name(fix.old_token()),
        })
    }

    /// Source lines of code: the line of the last token.
    pub fn sloc(&self) -> usize {
        self.tokens.last().map_or(0, |t| t.line)
    }

    /// Line of `index`. With `edit`, `index` is a position in the vector
    /// produced by applying `edit` to this file's vector.
    pub fn line_of_index(
        &self,
        index: usize,
        edit: Option<&Edit>,
    ) -> Result<usize, PositionOutOfRange> {
        let original = edit.map_or(index, |e| e.original_position(index));
        self.lines
            .get(original)
            .copied()
            .ok_or(PositionOutOfRange {
                index: original,
                len: self.lines.len(),
            })
    }
}

/// Line of position `index` in the vector produced by applying `edit` to a
/// vector laid out on `lines`.
pub fn line_after_edit(lines: &[usize], edit: &Edit, index: usize) -> usize {
    line_at(lines, edit.original_position(index))
}

// Past-the-end positions (an insertion before `</s>`) sit on the last line.
fn line_at(lines: &[usize], index: usize) -> usize {
    lines.get(index).or(lines.last()).copied().unwrap_or(1)
}
