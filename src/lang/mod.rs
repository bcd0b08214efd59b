//! Languages, tokenization, and syntax checking
//!
//! The scoring core never looks at source text. It consumes three
//! capabilities defined here: a [`Tokenizer`], a [`SyntaxChecker`], and a
//! [`Vocabulary`]. [`Language`] provides all three for the grammars the
//! tree-sitter parser pool supports.

mod parser;
mod vocabularies;

use crate::vector::TokenVector;
use crate::vocabulary::{Vocabulary, VocabularyError};
use serde::{Deserialize, Serialize};

pub use parser::leaf_tokens;

/// One lexical token of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Lexical class, the vocabulary lookup key
    pub class: String,
    /// Exact source text
    pub text: String,
    /// 1-based line
    pub line: usize,
    /// 0-based column, in bytes
    pub column: usize,
}

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, source: &[u8]) -> anyhow::Result<Vec<Token>>;
}

pub trait SyntaxChecker: Send + Sync {
    /// True when `source` parses without errors. Must be side-effect free.
    fn check_syntax(&self, source: &[u8]) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    JavaScript,
    TypeScript,
    Go,
}

impl Language {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "rs" => Some(Language::Rust),
            "js" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" => Some(Language::TypeScript),
            "go" => Some(Language::Go),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
        }
    }

    /// File extensions recognized for this language.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Rust => &["rs"],
            Language::JavaScript => &["js", "mjs", "cjs"],
            Language::TypeScript => &["ts"],
            Language::Go => &["go"],
        }
    }

    /// The built-in vocabulary for this language.
    pub fn vocabulary(&self) -> Result<Vocabulary, VocabularyError> {
        Vocabulary::new(vocabularies::entries(*self))
    }
}

impl Tokenizer for Language {
    fn tokenize(&self, source: &[u8]) -> anyhow::Result<Vec<Token>> {
        parser::tokenize(*self, source)
    }
}

impl SyntaxChecker for Language {
    fn check_syntax(&self, source: &[u8]) -> anyhow::Result<bool> {
        parser::check_syntax(*self, source)
    }
}

/// Encode tokens as a sentinel-bracketed vector.
pub fn vectorize(tokens: &[Token], vocabulary: &Vocabulary) -> TokenVector {
    TokenVector::bracketed(
        vocabulary,
        tokens.iter().map(|token| vocabulary.to_index(&token.class)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Language; 4] = [
        Language::Rust,
        Language::JavaScript,
        Language::TypeScript,
        Language::Go,
    ];

    #[test]
    fn built_in_vocabularies_fit_in_a_byte() {
        for language in ALL {
            let vocab = language.vocabulary().unwrap();
            assert!(vocab.len() <= 256, "{} too large", language.name());
            assert!(!vocab.is_empty());
        }
    }

    #[test]
    fn extensions_round_trip() {
        for language in ALL {
            for ext in language.extensions() {
                assert_eq!(Language::from_extension(ext), Some(language));
            }
        }
        assert_eq!(Language::from_extension("py"), None);
        // JSX markup has no vocabulary entries.
        assert_eq!(Language::from_extension("jsx"), None);
    }

    #[test]
    fn vectorize_brackets_with_sentinels() {
        let language = Language::JavaScript;
        let vocab = language.vocabulary().unwrap();
        let tokens = language.tokenize(b"class Hello {}").unwrap();
        let vector = vectorize(&tokens, &vocab);
        assert_eq!(vector.len(), tokens.len() + 2);
        assert_eq!(vector[0], vocab.start_token_index());
        assert_eq!(vector[vector.len() - 1], vocab.end_token_index());
        assert_eq!(vector[1], vocab.to_index("class"));
        assert_eq!(vector[2], vocab.to_index("identifier"));
    }

    #[test]
    fn rendered_vectors_stay_parseable() {
        let language = Language::JavaScript;
        let vocab = language.vocabulary().unwrap();
        let source = b"function add(a, b) {\n  return a + b;\n}\nconst s = \"hi\";\n";
        let vector = vectorize(&language.tokenize(source).unwrap(), &vocab);
        let rendered = vector.render(&vocab).unwrap();
        assert!(language.check_syntax(rendered.as_bytes()).unwrap(), "{rendered}");
    }

    #[test]
    fn regex_literals_render_as_regexes() {
        let language = Language::JavaScript;
        let vocab = language.vocabulary().unwrap();
        let tokens = language.tokenize(b"const re = /ab+c/g;\nre.test(s);\n").unwrap();
        let rendered = vectorize(&tokens, &vocab).render(&vocab).unwrap();
        assert_eq!(rendered, "const x = /a/g ; x . p ( x ) ;");
        assert!(language.check_syntax(rendered.as_bytes()).unwrap(), "{rendered}");
    }
}
