//! Prediction contexts
//!
//! For every position of a token vector, the forward model sees the `C`
//! tokens before it and the backward model sees the `C` tokens after it.
//! Near the file boundaries the missing tokens are filled with the
//! start/end sentinels.
//!
//! Contexts borrow from the vector: materializing one is a slice plus a
//! padding count, never a copy of the file.

use crate::vector::TokenVector;
use crate::vocabulary::Vind;

/// Which side of the anchor position a context covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Tokens before the anchor, padded on the left with `<s>`
    Prefix,
    /// Tokens after the anchor, padded on the right with `</s>`
    Suffix,
}

/// A fixed-length, sentinel-padded view into a token vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context<'a> {
    side: Side,
    tokens: &'a [Vind],
    padding: usize,
    padding_token: Vind,
}

impl<'a> Context<'a> {
    pub fn side(&self) -> Side {
        self.side
    }

    /// Always the configured context length.
    pub fn len(&self) -> usize {
        self.tokens.len() + self.padding
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The padded sequence, in file order.
    pub fn iter(&self) -> impl Iterator<Item = Vind> + 'a {
        let pad = std::iter::repeat(self.padding_token).take(self.padding);
        let tokens = self.tokens.iter().copied();
        let (leading, trailing) = match self.side {
            Side::Prefix => (self.padding, 0),
            Side::Suffix => (0, self.padding),
        };
        pad.clone()
            .take(leading)
            .chain(tokens)
            .chain(pad.take(trailing))
    }

    pub fn to_vec(&self) -> Vec<Vind> {
        self.iter().collect()
    }

    /// Cache key form: one byte per token.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_vec()
    }
}

/// The prefix and suffix contexts anchored at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextPair<'a> {
    pub position: usize,
    pub prefix: Context<'a>,
    pub suffix: Context<'a>,
}

/// Lazy, finite sequence of context pairs for positions `0..n`.
///
/// Not restartable; derive a new window from the vector instead.
#[derive(Debug, Clone)]
pub struct ContextWindow<'a> {
    tokens: &'a [Vind],
    length: usize,
    start_token: Vind,
    end_token: Vind,
    next: usize,
}

impl<'a> ContextWindow<'a> {
    pub fn new(vector: &'a TokenVector, length: usize, start_token: Vind, end_token: Vind) -> Self {
        Self {
            tokens: vector.as_slice(),
            length,
            start_token,
            end_token,
            next: 0,
        }
    }

    /// Context pair at an arbitrary position, independent of iteration.
    pub fn at(&self, position: usize) -> ContextPair<'a> {
        let n = self.tokens.len();
        let before = position.min(n);
        let prefix_start = before.saturating_sub(self.length);
        let prefix = &self.tokens[prefix_start..before];

        let suffix_start = (position + 1).min(n);
        let suffix_end = suffix_start.saturating_add(self.length).min(n);
        let suffix = &self.tokens[suffix_start..suffix_end];

        ContextPair {
            position,
            prefix: Context {
                side: Side::Prefix,
                tokens: prefix,
                padding: self.length - prefix.len(),
                padding_token: self.start_token,
            },
            suffix: Context {
                side: Side::Suffix,
                tokens: suffix,
                padding: self.length - suffix.len(),
                padding_token: self.end_token,
            },
        }
    }
}

impl<'a> Iterator for ContextWindow<'a> {
    type Item = ContextPair<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.tokens.len() {
            return None;
        }
        let pair = self.at(self.next);
        self.next += 1;
        Some(pair)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.tokens.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ContextWindow<'_> {}
