//! Single-token edits
//!
//! An [`Edit`] is an insertion, deletion, or substitution at one index of a
//! [`TokenVector`]. Every edit has an additive inverse such that applying
//! the edit and then its inverse restores the original vector exactly.
//!
//! [`Edit::between`] recovers the edit separating two revisions, and
//! [`token_distance`] measures how far apart they are.

use crate::vector::TokenVector;
use crate::vocabulary::{Vind, Vocabulary};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("{kind} at index {index} is out of range for a vector of length {len}")]
    OutOfRange {
        kind: EditKind,
        index: usize,
        len: usize,
    },
    #[error("edit expects token {expected} at index {index}, found {found}")]
    TokenMismatch {
        index: usize,
        expected: Vind,
        found: Vind,
    },
    #[error("invalid serialized edit: {0}")]
    InvalidSerialization(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditKind {
    #[serde(rename = "i")]
    Insertion,
    #[serde(rename = "x")]
    Deletion,
    #[serde(rename = "s")]
    Substitution,
}

impl EditKind {
    /// Short code used in evaluation records.
    pub fn code(&self) -> &'static str {
        match self {
            EditKind::Insertion => "i",
            EditKind::Deletion => "x",
            EditKind::Substitution => "s",
        }
    }

    pub fn all() -> [EditKind; 3] {
        [EditKind::Insertion, EditKind::Deletion, EditKind::Substitution]
    }
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EditKind::Insertion => "insertion",
            EditKind::Deletion => "deletion",
            EditKind::Substitution => "substitution",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "SerializedEdit", try_from = "SerializedEdit")]
pub enum Edit {
    /// Insert `token` before position `index`.
    Insertion { index: usize, token: Vind },
    /// Remove the token at `index`, which must be `original_token`.
    Deletion { index: usize, original_token: Vind },
    /// Replace `original_token` at `index` with `token`.
    Substitution {
        index: usize,
        token: Vind,
        original_token: Vind,
    },
}

/// Flat `(kind, index, new, old)` form of an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedEdit {
    pub kind: EditKind,
    pub index: usize,
    pub new_token: Option<Vind>,
    pub old_token: Option<Vind>,
}

impl Edit {
    pub fn kind(&self) -> EditKind {
        match self {
            Edit::Insertion { .. } => EditKind::Insertion,
            Edit::Deletion { .. } => EditKind::Deletion,
            Edit::Substitution { .. } => EditKind::Substitution,
        }
    }

    pub fn index(&self) -> usize {
        match *self {
            Edit::Insertion { index, .. }
            | Edit::Deletion { index, .. }
            | Edit::Substitution { index, .. } => index,
        }
    }

    /// Token the edit introduces, if any.
    pub fn new_token(&self) -> Option<Vind> {
        match *self {
            Edit::Insertion { token, .. } | Edit::Substitution { token, .. } => Some(token),
            Edit::Deletion { .. } => None,
        }
    }

    /// Token the edit removes or replaces, if any.
    pub fn old_token(&self) -> Option<Vind> {
        match *self {
            Edit::Deletion { original_token, .. }
            | Edit::Substitution { original_token, .. } => Some(original_token),
            Edit::Insertion { .. } => None,
        }
    }

    /// Apply the edit, returning a new vector. The input is never modified.
    pub fn apply(&self, vector: &TokenVector) -> Result<TokenVector, EditError> {
        let len = vector.len();
        let tokens = vector.as_slice();
        match *self {
            Edit::Insertion { index, token } => {
                self.check_range(index, len + 1)?;
                let mut out = Vec::with_capacity(len + 1);
                out.extend_from_slice(&tokens[..index]);
                out.push(token);
                out.extend_from_slice(&tokens[index..]);
                Ok(TokenVector::new(out))
            }
            Edit::Deletion {
                index,
                original_token,
            } => {
                self.check_range(index, len)?;
                check_token(tokens, index, original_token)?;
                let mut out = Vec::with_capacity(len - 1);
                out.extend_from_slice(&tokens[..index]);
                out.extend_from_slice(&tokens[index + 1..]);
                Ok(TokenVector::new(out))
            }
            Edit::Substitution {
                index,
                token,
                original_token,
            } => {
                self.check_range(index, len)?;
                check_token(tokens, index, original_token)?;
                let mut out = tokens.to_vec();
                out[index] = token;
                Ok(TokenVector::new(out))
            }
        }
    }

    fn check_range(&self, index: usize, bound: usize) -> Result<(), EditError> {
        if index < bound {
            return Ok(());
        }
        Err(EditError::OutOfRange {
            kind: self.kind(),
            index,
            len: match self.kind() {
                EditKind::Insertion => bound - 1,
                EditKind::Deletion | EditKind::Substitution => bound,
            },
        })
    }

    /// The edit that undoes this one on the vector this one produces.
    pub fn additive_inverse(&self) -> Edit {
        match *self {
            Edit::Insertion { index, token } => Edit::Deletion {
                index,
                original_token: token,
            },
            Edit::Deletion {
                index,
                original_token,
            } => Edit::Insertion {
                index,
                token: original_token,
            },
            Edit::Substitution {
                index,
                token,
                original_token,
            } => Edit::Substitution {
                index,
                token: original_token,
                original_token: token,
            },
        }
    }

    /// Map a position in the vector *after* this edit back to the
    /// corresponding position in the vector *before* it.
    ///
    /// Only one edit per file is supported; composing edits is not.
    pub fn original_position(&self, mutated_index: usize) -> usize {
        match *self {
            Edit::Insertion { index, .. } if mutated_index > index => mutated_index - 1,
            Edit::Insertion { .. } => mutated_index,
            Edit::Deletion { index, .. } if mutated_index >= index => mutated_index + 1,
            Edit::Deletion { .. } => mutated_index,
            Edit::Substitution { .. } => mutated_index,
        }
    }

    /// Map a position in the vector *before* this edit to its position
    /// after it. Returns `None` for a deleted token.
    pub fn mutated_position(&self, original_index: usize) -> Option<usize> {
        match *self {
            Edit::Insertion { index, .. } if original_index >= index => Some(original_index + 1),
            Edit::Insertion { .. } => Some(original_index),
            Edit::Deletion { index, .. } if original_index == index => None,
            Edit::Deletion { index, .. } if original_index > index => Some(original_index - 1),
            Edit::Deletion { .. } => Some(original_index),
            Edit::Substitution { .. } => Some(original_index),
        }
    }

    /// The single edit that turns `before` into `after`, if there is one.
    ///
    /// The edit is placed at the first position where the vectors differ.
    pub fn between(before: &TokenVector, after: &TokenVector) -> Option<Edit> {
        let a = before.as_slice();
        let b = after.as_slice();
        let at = a.iter().zip(b).take_while(|(x, y)| x == y).count();

        if b.len() == a.len() + 1 {
            (a[at..] == b[at + 1..]).then_some(Edit::Insertion {
                index: at,
                token: b[at],
            })
        } else if a.len() == b.len() + 1 {
            (a[at + 1..] == b[at..]).then_some(Edit::Deletion {
                index: at,
                original_token: a[at],
            })
        } else if a.len() == b.len() && at < a.len() {
            (a[at + 1..] == b[at + 1..]).then_some(Edit::Substitution {
                index: at,
                token: b[at],
                original_token: a[at],
            })
        } else {
            None
        }
    }

    pub fn serialize(&self) -> SerializedEdit {
        SerializedEdit {
            kind: self.kind(),
            index: self.index(),
            new_token: self.new_token(),
            old_token: self.old_token(),
        }
    }

    pub fn deserialize(serialized: SerializedEdit) -> Result<Edit, EditError> {
        let SerializedEdit {
            kind,
            index,
            new_token,
            old_token,
        } = serialized;
        let missing = |what: &str| {
            EditError::InvalidSerialization(format!("{kind} at {index} is missing its {what}"))
        };
        let unexpected = |what: &str| {
            EditError::InvalidSerialization(format!("{kind} at {index} must not carry a {what}"))
        };
        match kind {
            EditKind::Insertion => {
                if old_token.is_some() {
                    return Err(unexpected("old token"));
                }
                Ok(Edit::Insertion {
                    index,
                    token: new_token.ok_or_else(|| missing("new token"))?,
                })
            }
            EditKind::Deletion => {
                if new_token.is_some() {
                    return Err(unexpected("new token"));
                }
                Ok(Edit::Deletion {
                    index,
                    original_token: old_token.ok_or_else(|| missing("old token"))?,
                })
            }
            EditKind::Substitution => Ok(Edit::Substitution {
                index,
                token: new_token.ok_or_else(|| missing("new token"))?,
                original_token: old_token.ok_or_else(|| missing("old token"))?,
            }),
        }
    }

    /// Human-readable description using the vocabulary's class names.
    pub fn describe(&self, vocabulary: &Vocabulary) -> String {
        let name = |token: Vind| vocabulary.name_of(token).unwrap_or("?").to_string();
        match *self {
            Edit::Insertion { index, token } => format!("insert '{}' at {}", name(token), index),
            Edit::Deletion {
                index,
                original_token,
            } => format!("delete '{}' at {}", name(original_token), index),
            Edit::Substitution {
                index,
                token,
                original_token,
            } => format!(
                "substitute '{}' with '{}' at {}",
                name(original_token),
                name(token),
                index
            ),
        }
    }
}

/// Levenshtein distance counted in tokens.
pub fn token_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, x) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let substitution = diagonal + usize::from(x != y);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[b.len()]
}

fn check_token(tokens: &[Vind], index: usize, expected: Vind) -> Result<(), EditError> {
    let found = tokens[index];
    if found != expected {
        return Err(EditError::TokenMismatch {
            index,
            expected,
            found,
        });
    }
    Ok(())
}

impl From<Edit> for SerializedEdit {
    fn from(edit: Edit) -> Self {
        edit.serialize()
    }
}

impl TryFrom<SerializedEdit> for Edit {
    type Error = EditError;

    fn try_from(serialized: SerializedEdit) -> Result<Self, Self::Error> {
        Edit::deserialize(serialized)
    }
}
