//! Host-language syntax: lexing, parsing, unparsing and tree walkers.

pub mod lexer;
pub mod node;
pub mod parser;
pub mod unparse;
pub mod walk;

pub use node::*;
pub use parser::{parse, parse_expression};
pub use unparse::{unparse, unparse_block, unparse_expr, unparse_stmt};
pub use walk::{
    assigned_names, call_target, dedent, expr_free_names, extract_returns, extract_signature,
    find_imports, find_top_level_defs, free_names, indent, mutated_names, AssignedNames, DefSite,
    ImportSite, Signature,
};

/// Reserved words of the host language.
pub const KEYWORDS: &[&str] = &[
    "def", "return", "for", "in", "while", "if", "elif", "else", "import", "from", "as", "pass",
    "break", "continue", "and", "or", "not", "is", "True", "False", "None",
];

/// Whether `text` is a valid identifier: ASCII letters, digits and
/// underscore, not starting with a digit, not a keyword.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !KEYWORDS.contains(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("a_1"));
        assert!(is_identifier("_x"));
        assert!(!is_identifier("1a"));
        assert!(!is_identifier("a.b"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("for"));
        assert!(!is_identifier("a b"));
    }
}
