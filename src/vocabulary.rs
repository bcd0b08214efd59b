//! Token vocabulary
//!
//! Bidirectional mapping between lexical token classes and the small
//! integer indices (`Vind`) that every other module works with.
//!
//! Index layout is fixed:
//! - `0` is the out-of-vocabulary marker
//! - `1` is the start-of-file sentinel
//! - `2` is the end-of-file sentinel
//! - `3..` are the concrete entries, in declaration order

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// A vocabulary index. Vectors are stored one byte per token, so the whole
/// vocabulary must fit below 256.
pub type Vind = u8;

const UNK_NAME: &str = "<UNK>";
const START_NAME: &str = "<s>";
const END_NAME: &str = "</s>";
const RESERVED: usize = 3;

/// Largest vocabulary size. Sizes stay below 256 so every index fits a byte.
pub const MAX_VOCABULARY_SIZE: usize = 255;

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("vocabulary has {size} entries; at most {max} are addressable")]
    TooLarge { size: usize, max: usize },
    #[error("duplicate vocabulary entry: {0}")]
    Duplicate(String),
    #[error("vocabulary entry '{0}' collides with a reserved sentinel")]
    Reserved(String),
    #[error("failed to read vocabulary '{path}': {message}")]
    Load { path: String, message: String },
}

/// One concrete entry in the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VocabularyEntry {
    /// The class name doubles as its textual form (`{`, `class`, ...)
    Plain(String),
    /// A lexical class whose rendered text differs from its name
    /// (`identifier` renders as some placeholder identifier)
    Named { name: String, text: Option<String> },
}

impl VocabularyEntry {
    pub fn name(&self) -> &str {
        match self {
            VocabularyEntry::Plain(name) => name,
            VocabularyEntry::Named { name, .. } => name,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            VocabularyEntry::Plain(name) => name,
            VocabularyEntry::Named { name, text } => text.as_deref().unwrap_or(name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    names: Vec<String>,
    texts: Vec<Option<String>>,
    by_name: HashMap<String, Vind>,
}

impl Vocabulary {
    pub fn new(entries: Vec<VocabularyEntry>) -> Result<Self, VocabularyError> {
        let size = entries.len() + RESERVED;
        if size > MAX_VOCABULARY_SIZE {
            return Err(VocabularyError::TooLarge {
                size,
                max: MAX_VOCABULARY_SIZE,
            });
        }

        let mut names = vec![
            UNK_NAME.to_string(),
            START_NAME.to_string(),
            END_NAME.to_string(),
        ];
        let mut texts = vec![None, None, None];
        let mut by_name = HashMap::with_capacity(size);
        for (index, name) in names.iter().enumerate() {
            by_name.insert(name.clone(), index as Vind);
        }

        for entry in entries {
            let name = entry.name().to_string();
            if matches!(name.as_str(), UNK_NAME | START_NAME | END_NAME) {
                return Err(VocabularyError::Reserved(name));
            }
            if by_name.contains_key(&name) {
                return Err(VocabularyError::Duplicate(name));
            }
            by_name.insert(name.clone(), names.len() as Vind);
            texts.push(Some(entry.text().to_string()));
            names.push(name);
        }

        Ok(Self {
            names,
            texts,
            by_name,
        })
    }

    /// Build from plain names; each name is also its rendered text.
    pub fn from_names<I, S>(names: I) -> Result<Self, VocabularyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| VocabularyEntry::Plain(name.into()))
                .collect(),
        )
    }

    /// Load a vocabulary from a JSON array of entries.
    pub fn load(path: &Path) -> Result<Self, VocabularyError> {
        let load_error = |message: String| VocabularyError::Load {
            path: path.display().to_string(),
            message,
        };
        let content = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let entries: Vec<VocabularyEntry> =
            serde_json::from_str(&content).map_err(|e| load_error(e.to_string()))?;
        Self::new(entries)
    }

    /// Total number of indices, sentinels included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.len() == RESERVED
    }

    pub fn unk_token_index(&self) -> Vind {
        0
    }

    pub fn start_token_index(&self) -> Vind {
        1
    }

    pub fn end_token_index(&self) -> Vind {
        2
    }

    pub fn is_sentinel(&self, index: Vind) -> bool {
        index == self.start_token_index() || index == self.end_token_index()
    }

    /// True for indices that name a concrete, renderable token.
    pub fn is_concrete(&self, index: Vind) -> bool {
        (index as usize) >= RESERVED && (index as usize) < self.len()
    }

    /// Range of concrete token indices.
    pub fn concrete_indices(&self) -> std::ops::Range<usize> {
        RESERVED..self.len()
    }

    /// Index of a class name; unknown names map to the `<UNK>` marker.
    pub fn to_index(&self, name: &str) -> Vind {
        self.by_name
            .get(name)
            .copied()
            .unwrap_or_else(|| self.unk_token_index())
    }

    /// Textual form of a token, or `None` for sentinels, `<UNK>`, and
    /// indices outside the vocabulary.
    pub fn to_text(&self, index: Vind) -> Option<&str> {
        self.texts.get(index as usize).and_then(|t| t.as_deref())
    }

    /// Class name of an index, sentinels included.
    pub fn name_of(&self, index: Vind) -> Option<&str> {
        self.names.get(index as usize).map(String::as_str)
    }
}
