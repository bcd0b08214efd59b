//! Mutation evaluation lab
//!
//! Builds a corpus of syntactically valid files, splits it into folds,
//! and measures how well the pipeline finds and repairs synthetic
//! single-token errors.

pub mod corpus;
pub mod harness;
pub mod sink;

use crate::lang::{Language, SyntaxChecker};
use crate::mutate::MutationGenerator;
use crate::source::SourceFile;
use crate::vocabulary::Vocabulary;
use anyhow::Context;
use corpus::VectorStore;
use harness::Mutant;
use serde::Serialize;
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Files with one of the language's extensions
    pub scanned: usize,
    pub inserted: usize,
    /// Already present under the same content hash
    pub duplicates: usize,
    /// Unreadable, syntactically invalid, or not reproducible from its
    /// vector (tokens outside the vocabulary, or a rendering that no longer
    /// parses)
    pub rejected: usize,
}

/// Add every valid `language` file under `root` to `store`.
pub fn ingest_dir(
    root: &Path,
    language: Language,
    vocabulary: &Vocabulary,
    store: &mut VectorStore,
) -> anyhow::Result<IngestReport> {
    if !root.is_dir() {
        anyhow::bail!("'{}' is not a directory", root.display());
    }
    let mut report = IngestReport::default();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e.path()))
        .filter_map(|e| e.ok());

    for entry in walker {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
            == Some(language);
        if !matches {
            continue;
        }
        report.scanned += 1;

        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable file");
                report.rejected += 1;
                continue;
            }
        };
        match language.check_syntax(&content) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(path = %path.display(), "skipping file with syntax errors");
                report.rejected += 1;
                continue;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "syntax check failed");
                report.rejected += 1;
                continue;
            }
        }

        let file = SourceFile::parse(content, &language, vocabulary)
            .with_context(|| format!("Failed to tokenize '{}'", path.display()))?;
        // Fixes are judged on the rendered vector, so the unmutated
        // rendering must parse.
        let rendered = match file.render(vocabulary) {
            Ok(rendered) => rendered,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "skipping file with unknown tokens");
                report.rejected += 1;
                continue;
            }
        };
        match language.check_syntax(rendered.as_bytes()) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(path = %path.display(), "skipping file whose rendering does not parse");
                report.rejected += 1;
                continue;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "syntax check failed");
                report.rejected += 1;
                continue;
            }
        }

        if store.insert(file.id(), file.vector(), file.source())? {
            report.inserted += 1;
        } else {
            report.duplicates += 1;
        }
    }

    tracing::info!(
        root = %root.display(),
        scanned = report.scanned,
        inserted = report.inserted,
        duplicates = report.duplicates,
        rejected = report.rejected,
        "ingest finished"
    );
    Ok(report)
}

/// Up to `per_file` seeded mutants for every file of `fold`.
///
/// Files are re-tokenized from their stored text so fixes can be
/// syntax-checked. Files whose stored text is missing are skipped.
pub fn fold_mutants(
    store: &VectorStore,
    fold: u32,
    language: Language,
    vocabulary: &Vocabulary,
    seed: u64,
    per_file: usize,
) -> anyhow::Result<Vec<Mutant>> {
    let mut mutants = Vec::new();
    for entry in store.files_in_fold(fold)? {
        let Some(source) = store.source_of(&entry.hash)? else {
            tracing::warn!(hash = %entry.hash, "no source text stored; skipping");
            continue;
        };
        let file = SourceFile::parse(source, &language, vocabulary)
            .with_context(|| format!("Failed to tokenize stored file {}", entry.hash))?;
        if file.vector() != &entry.vector {
            tracing::warn!(
                hash = %entry.hash,
                "stored vector differs from re-tokenized source; using the source"
            );
        }

        let mut generator = MutationGenerator::for_file(seed, &entry.hash);
        for _ in 0..per_file {
            if let Some(mutation) = generator.mutate(file.vector(), vocabulary) {
                mutants.push(Mutant {
                    file: file.clone(),
                    mutation,
                });
            }
        }
    }
    Ok(mutants)
}

fn is_ignored(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    let ignored = [
        "target",
        "node_modules",
        "vendor",
        "dist",
        "build",
        "__pycache__",
    ];

    ignored.contains(&name) || name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALID: &str = "function add(a, b) {\n  return a + b;\n}\n";

    fn corpus_dir() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("a.js"), VALID).unwrap();
        std::fs::write(root.join("b.js"), "function broken( {\n").unwrap();
        std::fs::write(root.join("notes.txt"), "not code").unwrap();
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::write(root.join("nested").join("copy.js"), VALID).unwrap();
        std::fs::create_dir_all(root.join("node_modules")).unwrap();
        std::fs::write(root.join("node_modules").join("dep.js"), "var x = 1;\n").unwrap();
        tmp
    }

    #[test]
    fn ingest_keeps_valid_unique_files() {
        let tmp = corpus_dir();
        let language = Language::JavaScript;
        let vocabulary = language.vocabulary().unwrap();
        let mut store = VectorStore::open_in_memory().unwrap();

        let report = ingest_dir(tmp.path(), language, &vocabulary, &mut store).unwrap();
        assert_eq!(
            report,
            IngestReport {
                scanned: 3,
                inserted: 1,
                duplicates: 1,
                rejected: 1,
            }
        );
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn ingest_rejects_files_that_do_not_render_back() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("markup.js"), "const el = <div>hi</div>;\n").unwrap();
        std::fs::write(root.join("regex.js"), "const re = /ab+c/g;\n").unwrap();
        std::fs::write(root.join("view.jsx"), "const el = <p/>;\n").unwrap();
        let language = Language::JavaScript;
        let vocabulary = language.vocabulary().unwrap();
        let mut store = VectorStore::open_in_memory().unwrap();

        let report = ingest_dir(root, language, &vocabulary, &mut store).unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.rejected, 1);
    }

    #[test]
    fn ingest_accepts_newline_sensitive_go() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("main.go"),
            "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hi\")\n}\n",
        )
        .unwrap();
        let language = Language::Go;
        let vocabulary = language.vocabulary().unwrap();
        let mut store = VectorStore::open_in_memory().unwrap();

        let report = ingest_dir(tmp.path(), language, &vocabulary, &mut store).unwrap();
        assert_eq!(report.inserted, 1, "{report:?}");
    }

    #[test]
    fn ingest_rejects_missing_root() {
        let tmp = TempDir::new().unwrap();
        let language = Language::JavaScript;
        let vocabulary = language.vocabulary().unwrap();
        let mut store = VectorStore::open_in_memory().unwrap();
        let missing = tmp.path().join("missing");
        assert!(ingest_dir(&missing, language, &vocabulary, &mut store).is_err());
    }

    #[test]
    fn fold_mutants_are_reproducible_and_applicable() {
        let tmp = corpus_dir();
        let language = Language::JavaScript;
        let vocabulary = language.vocabulary().unwrap();
        let mut store = VectorStore::open_in_memory().unwrap();
        ingest_dir(tmp.path(), language, &vocabulary, &mut store).unwrap();
        store.assign_folds(1).unwrap();

        let first = fold_mutants(&store, 0, language, &vocabulary, 42, 3).unwrap();
        let second = fold_mutants(&store, 0, language, &vocabulary, 42, 3).unwrap();
        assert_eq!(first.len(), 3);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.mutation, b.mutation);
            assert!(a.mutation.apply(a.file.vector()).is_ok());
        }

        assert!(fold_mutants(&store, 7, language, &vocabulary, 42, 3)
            .unwrap()
            .is_empty());
    }
}
