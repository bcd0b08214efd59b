//! Tree-sitter backed tokenization and syntax checking

use super::{Language, Token};
use std::cell::RefCell;
use tree_sitter::{Node, Parser, Tree};

// ═══════════════════════════════════════════════════════════════════════════
//  THREAD-LOCAL PARSER POOL
// ═══════════════════════════════════════════════════════════════════════════
//
// Tree-sitter parsers are expensive to create but can be reused for multiple
// files of the same language. Each rayon worker thread gets its own set of
// pre-configured parsers.

thread_local! {
    static RUST_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // Ignore error here - will be caught at parse time if language fails
        let _ = p.set_language(&tree_sitter_rust::LANGUAGE.into());
        p
    });

    static JS_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_javascript::LANGUAGE.into());
        p
    });

    static TS_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into());
        p
    });

    static GO_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_go::LANGUAGE.into());
        p
    });
}

fn parse_with_pooled_parser(source: &[u8], language: Language) -> anyhow::Result<Tree> {
    let parse_result = match language {
        Language::Rust => RUST_PARSER.with(|p| p.borrow_mut().parse(source, None)),
        Language::JavaScript => JS_PARSER.with(|p| p.borrow_mut().parse(source, None)),
        Language::TypeScript => TS_PARSER.with(|p| p.borrow_mut().parse(source, None)),
        Language::Go => GO_PARSER.with(|p| p.borrow_mut().parse(source, None)),
    };

    parse_result.ok_or_else(|| anyhow::anyhow!("Failed to parse {} source", language.name()))
}

pub(super) fn check_syntax(language: Language, source: &[u8]) -> anyhow::Result<bool> {
    let tree = parse_with_pooled_parser(source, language)?;
    Ok(!tree.root_node().has_error())
}

pub(super) fn tokenize(language: Language, source: &[u8]) -> anyhow::Result<Vec<Token>> {
    let tree = parse_with_pooled_parser(source, language)?;
    Ok(leaf_tokens(tree.root_node(), source))
}

/// Collect the non-empty leaves of a syntax tree in source order.
///
/// Comment subtrees are skipped. Regex literals are taken whole: their
/// pattern and flags do not survive being split by spaces. Zero-width leaves (error recovery's
/// `MISSING` nodes, automatic semicolons) carry no source text and are
/// dropped as well.
pub fn leaf_tokens(root: Node<'_>, source: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut cursor = root.walk();
    let mut descend = true;

    loop {
        let node = cursor.node();
        if descend && !is_comment(&node) {
            if node.child_count() == 0 || is_atomic(&node) {
                push_leaf(&node, source, &mut tokens);
            } else if cursor.goto_first_child() {
                continue;
            }
        }

        if cursor.goto_next_sibling() {
            descend = true;
            continue;
        }
        if !cursor.goto_parent() {
            break;
        }
        descend = false;
    }

    tokens
}

fn is_comment(node: &Node<'_>) -> bool {
    let kind = node.kind();
    kind.ends_with("comment") || kind == "hash_bang_line" || kind == "shebang"
}

fn is_atomic(node: &Node<'_>) -> bool {
    node.kind() == "regex"
}

fn push_leaf(node: &Node<'_>, source: &[u8], tokens: &mut Vec<Token>) {
    let range = node.byte_range();
    if range.is_empty() || node.is_missing() {
        return;
    }
    let Some(bytes) = source.get(range) else {
        return;
    };
    let position = node.start_position();
    tokens.push(Token {
        class: node.kind().to_string(),
        text: String::from_utf8_lossy(bytes).into_owned(),
        line: position.row + 1,
        column: position.column,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(language: Language, source: &str) -> Vec<String> {
        tokenize(language, source.as_bytes())
            .unwrap()
            .into_iter()
            .map(|t| t.class)
            .collect()
    }

    #[test]
    fn javascript_leaves_in_source_order() {
        assert_eq!(
            classes(Language::JavaScript, "class Hello {}"),
            vec!["class", "identifier", "{", "}"]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let tokens = classes(Language::JavaScript, "// hi\nlet x = 1; /* there */");
        assert_eq!(tokens, vec!["let", "identifier", "=", "number", ";"]);

        let tokens = classes(Language::Rust, "/// docs\nfn main() {}");
        assert_eq!(tokens, vec!["fn", "identifier", "(", ")", "{", "}"]);
    }

    #[test]
    fn regex_literals_are_one_token() {
        let tokens = tokenize(Language::JavaScript, b"const re = /ab+c/g;").unwrap();
        let classes: Vec<&str> = tokens.iter().map(|t| t.class.as_str()).collect();
        assert_eq!(classes, vec!["const", "identifier", "=", "regex", ";"]);
        assert_eq!(tokens[3].text, "/ab+c/g");
    }

    #[test]
    fn tokens_carry_positions() {
        let tokens = tokenize(Language::JavaScript, b"let a;\n  a = 2;").unwrap();
        let last_a = &tokens[3];
        assert_eq!(last_a.text, "a");
        assert_eq!(last_a.line, 2);
        assert_eq!(last_a.column, 2);
    }

    #[test]
    fn syntax_check_detects_errors() {
        assert!(check_syntax(Language::JavaScript, b"class Hello {}").unwrap());
        assert!(!check_syntax(Language::JavaScript, b"class Hello {").unwrap());
        assert!(check_syntax(Language::Rust, b"fn main() { let x = 1; }").unwrap());
        assert!(!check_syntax(Language::Rust, b"fn main() { let x = ; }").unwrap());
        assert!(check_syntax(Language::Go, b"package main\nfunc main() {}\n").unwrap());
        assert!(check_syntax(Language::TypeScript, b"let n: number = 1;").unwrap());
    }
}
