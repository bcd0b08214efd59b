//! Token vectors
//!
//! A `TokenVector` is one file revision encoded as vocabulary indices,
//! bracketed by the start/end sentinels. Vectors are never mutated in
//! place; applying an [`Edit`](crate::edit::Edit) yields a new vector.

use crate::vocabulary::{Vind, Vocabulary};
use std::ops::Index;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("token {token} at index {index} has no textual form")]
pub struct UnrepresentableToken {
    pub index: usize,
    pub token: Vind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenVector {
    tokens: Arc<[Vind]>,
}

impl TokenVector {
    pub fn new(tokens: Vec<Vind>) -> Self {
        Self {
            tokens: tokens.into(),
        }
    }

    /// Bracket `body` with the vocabulary's start and end sentinels.
    pub fn bracketed(vocabulary: &Vocabulary, body: impl IntoIterator<Item = Vind>) -> Self {
        let mut tokens = vec![vocabulary.start_token_index()];
        tokens.extend(body);
        tokens.push(vocabulary.end_token_index());
        Self::new(tokens)
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }

    /// One byte per token.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.tokens.to_vec()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn as_slice(&self) -> &[Vind] {
        &self.tokens
    }

    pub fn get(&self, index: usize) -> Option<Vind> {
        self.tokens.get(index).copied()
    }

    /// Render the vector as space-separated source text, skipping sentinels.
    ///
    /// A lone `'` is glued to the token after it so lifetimes and labels
    /// (`'a`) survive.
    pub fn render(&self, vocabulary: &Vocabulary) -> Result<String, UnrepresentableToken> {
        self.render_lines(vocabulary, |_| 1)
    }

    /// Render with every position placed on `line_of(index)`.
    ///
    /// A token on a later line than the one before it starts that many
    /// lines down; otherwise tokens are space-separated as in
    /// [`render`](Self::render). Newline-sensitive grammars (Go's implicit
    /// semicolons, JavaScript's ASI) need this to re-parse.
    pub fn render_lines(
        &self,
        vocabulary: &Vocabulary,
        line_of: impl Fn(usize) -> usize,
    ) -> Result<String, UnrepresentableToken> {
        let mut out = String::new();
        let mut previous: Option<usize> = None;
        let mut glue = false;
        for (index, &token) in self.tokens.iter().enumerate() {
            if vocabulary.is_sentinel(token) {
                continue;
            }
            let text = vocabulary
                .to_text(token)
                .ok_or(UnrepresentableToken { index, token })?;
            let line = line_of(index);
            match previous {
                Some(_) if glue => {}
                Some(previous) if line > previous => {
                    out.push_str(&"\n".repeat(line - previous));
                }
                Some(_) => out.push(' '),
                None => {}
            }
            out.push_str(text);
            previous = Some(line);
            glue = text == "'";
        }
        Ok(out)
    }
}

impl Index<usize> for TokenVector {
    type Output = Vind;

    fn index(&self, index: usize) -> &Vind {
        &self.tokens[index]
    }
}

impl From<Vec<Vind>> for TokenVector {
    fn from(tokens: Vec<Vind>) -> Self {
        Self::new(tokens)
    }
}
