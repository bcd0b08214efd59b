//! Built-in vocabularies
//!
//! Anonymous tree-sitter leaves (keywords, punctuation) are their own text.
//! Named leaves (identifiers, literals) collapse into one class each and
//! render as a fixed placeholder.

use super::Language;
use crate::vocabulary::VocabularyEntry;

const JS_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "export", "extends", "finally", "for", "from", "function",
    "get", "if", "import", "in", "instanceof", "let", "new", "of", "return", "set", "static",
    "switch", "target", "throw", "try", "typeof", "var", "void", "while", "with", "yield", "this",
    "super", "true", "false", "null", "undefined",
];

const JS_PUNCTUATION: &[&str] = &[
    "{", "}", "(", ")", "[", "]", ";", ",", ".", "...", "?.", "?", ":", "=>", "=", "+=", "-=",
    "*=", "/=", "%=", "**=", "<<=", ">>=", ">>>=", "&=", "^=", "|=", "&&=", "||=", "??=", "==",
    "===", "!=", "!==", "<", "<=", ">", ">=", "+", "-", "*", "/", "%", "**", "++", "--", "<<",
    ">>", ">>>", "&", "|", "^", "!", "~", "&&", "||", "??", "\"", "'", "`", "${", "@",
];

const JS_NAMED: &[(&str, &str)] = &[
    ("identifier", "x"),
    ("property_identifier", "p"),
    ("shorthand_property_identifier", "p"),
    ("shorthand_property_identifier_pattern", "p"),
    ("private_property_identifier", "#p"),
    ("statement_identifier", "label"),
    ("number", "0"),
    ("string_fragment", "s"),
    ("escape_sequence", "\\n"),
    ("regex", "/a/g"),
];

const TS_EXTRA_KEYWORDS: &[&str] = &[
    "abstract", "declare", "enum", "implements", "interface", "keyof", "namespace", "private",
    "protected", "public", "readonly", "type", "override", "satisfies", "is", "asserts", "infer",
    "module", "unique", "global", "any", "boolean", "string", "symbol", "never",
    "unknown", "object", "?:", "-?:", "+?:",
];

const TS_EXTRA_NAMED: &[(&str, &str)] = &[("type_identifier", "T")];

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "self", "static", "struct", "super", "trait", "true", "false", "type", "union",
    "unsafe", "use", "where", "while", "yield", "default", "macro_rules!",
];

const RUST_PUNCTUATION: &[&str] = &[
    "{", "}", "(", ")", "[", "]", ";", ",", ".", "..", "..=", "...", ":", "::", "->", "=>", "=",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>=", "==", "!=", "<", "<=", ">",
    ">=", "+", "-", "*", "/", "%", "&", "|", "^", "!", "&&", "||", "<<", ">>", "?", "#", "@", "_",
    "'", "\"", "$",
];

const RUST_NAMED: &[(&str, &str)] = &[
    ("identifier", "x"),
    ("type_identifier", "T"),
    ("field_identifier", "f"),
    ("primitive_type", "i32"),
    ("integer_literal", "0"),
    ("float_literal", "0.0"),
    ("string_content", "s"),
    ("char_literal", "'c'"),
    ("escape_sequence", "\\n"),
    ("mutable_specifier", "mut"),
    ("metavariable", "$x"),
    ("fragment_specifier", "expr"),
];

const GO_KEYWORDS: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough", "for",
    "func", "go", "goto", "if", "import", "interface", "map", "package", "range", "return",
    "select", "struct", "switch", "type", "var", "nil", "true", "false", "iota",
];

const GO_PUNCTUATION: &[&str] = &[
    "{", "}", "(", ")", "[", "]", ";", ",", ".", "...", ":", ":=", "=", "+=", "-=", "*=", "/=",
    "%=", "&=", "|=", "^=", "<<=", ">>=", "&^=", "==", "!=", "<", "<=", ">", ">=", "+", "-", "*",
    "/", "%", "&", "|", "^", "&^", "<<", ">>", "!", "&&", "||", "<-", "++", "--", "~", "\"",
];

const GO_NAMED: &[(&str, &str)] = &[
    ("identifier", "x"),
    ("field_identifier", "f"),
    ("type_identifier", "T"),
    ("package_identifier", "p"),
    ("label_name", "L"),
    ("blank_identifier", "_"),
    ("int_literal", "0"),
    ("float_literal", "0.0"),
    ("imaginary_literal", "0i"),
    ("rune_literal", "'a'"),
    ("raw_string_literal", "`s`"),
    ("interpreted_string_literal_content", "s"),
    ("escape_sequence", "\\n"),
];

pub(super) fn entries(language: Language) -> Vec<VocabularyEntry> {
    let (plain, named): (Vec<&[&str]>, Vec<&[(&str, &str)]>) = match language {
        Language::JavaScript => (vec![JS_KEYWORDS, JS_PUNCTUATION], vec![JS_NAMED]),
        Language::TypeScript => (
            vec![JS_KEYWORDS, TS_EXTRA_KEYWORDS, JS_PUNCTUATION],
            vec![JS_NAMED, TS_EXTRA_NAMED],
        ),
        Language::Rust => (vec![RUST_KEYWORDS, RUST_PUNCTUATION], vec![RUST_NAMED]),
        Language::Go => (vec![GO_KEYWORDS, GO_PUNCTUATION], vec![GO_NAMED]),
    };

    let mut out = Vec::new();
    for name in plain.into_iter().flatten() {
        push_unique(&mut out, VocabularyEntry::Plain((*name).to_string()));
    }
    for (name, text) in named.into_iter().flatten() {
        push_unique(
            &mut out,
            VocabularyEntry::Named {
                name: (*name).to_string(),
                text: Some((*text).to_string()),
            },
        );
    }
    out
}

// TS reuses the JS lists, so a keyword may appear twice.
fn push_unique(out: &mut Vec<VocabularyEntry>, entry: VocabularyEntry) {
    if !out.iter().any(|e| e.name() == entry.name()) {
        out.push(entry);
    }
}
