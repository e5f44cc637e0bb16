//! Lexer for the host language.
//!
//! Uses logos for tokenization, with a wrapper that turns the
//! indentation-sensitive layout into explicit `Newline`, `Indent` and
//! `Dedent` tokens.
//!
//! # Layout Handling
//!
//! At the first token of each logical line (outside brackets):
//! - If indentation increases: emit INDENT
//! - If indentation decreases: emit one or more DEDENT tokens
//! - Blank lines and comment-only lines produce nothing
//!
//! A NEWLINE closes every logical line, so the parser sees statement
//! boundaries explicitly.

use std::fmt;

use logos::Logos;

use super::node::Span;
use crate::error::ParseError;

/// A token with its span
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    /// The token
    pub token: Token,
    /// Byte range in the source
    pub span: Span,
}

/// Token types for the host language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\f]+")]
#[logos(skip r"\\\r?\n")]
#[logos(skip r"\r")]
pub enum Token {
    // Keywords
    #[token("def")]
    Def,
    #[token("return")]
    Return,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("while")]
    While,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("import")]
    Import,
    #[token("from")]
    From,
    #[token("as")]
    As,
    #[token("pass")]
    Pass,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("is")]
    Is,
    #[token("True")]
    True,
    #[token("False")]
    False,
    #[token("None")]
    None_,

    // Identifiers
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Literals
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(strip_quotes(lex.slice(), 1)))]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| unescape(strip_quotes(lex.slice(), 1)))]
    #[token("\"\"\"", |lex| triple_quoted(lex, "\"\"\""))]
    #[token("'''", |lex| triple_quoted(lex, "'''"))]
    Str(String),

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    DoubleStar,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("//=")]
    DoubleSlashEq,
    #[token("%=")]
    PercentEq,
    #[token("**=")]
    DoubleStarEq,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token(";")]
    Semi,

    // Physical newline (turned into layout tokens by the wrapper)
    #[regex(r"\n")]
    Newline,

    // Comment
    #[regex(r"#[^\n]*", logos::skip)]
    Comment,

    // Synthetic layout tokens (not matched by logos directly)
    Indent,
    Dedent,

    // End of file
    Eof,
}

fn strip_quotes(slice: &str, width: usize) -> &str {
    &slice[width..slice.len() - width]
}

fn triple_quoted(lex: &mut logos::Lexer<Token>, close: &str) -> Option<String> {
    let rest = lex.remainder();
    let end = rest.find(close)?;
    let body = unescape(&rest[..end]);
    lex.bump(end + close.len());
    Some(body)
}

/// Resolve backslash escapes in a string literal body.
pub fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Def => "def",
            Token::Return => "return",
            Token::For => "for",
            Token::In => "in",
            Token::While => "while",
            Token::If => "if",
            Token::Elif => "elif",
            Token::Else => "else",
            Token::Import => "import",
            Token::From => "from",
            Token::As => "as",
            Token::Pass => "pass",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::And => "and",
            Token::Or => "or",
            Token::Not => "not",
            Token::Is => "is",
            Token::True => "True",
            Token::False => "False",
            Token::None_ => "None",
            Token::Ident(s) => return write!(f, "{}", s),
            Token::Float(n) => return write!(f, "{:?}", n),
            Token::Int(n) => return write!(f, "{}", n),
            Token::Str(s) => return write!(f, "{:?}", s),
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::DoubleStar => "**",
            Token::Slash => "/",
            Token::DoubleSlash => "//",
            Token::Percent => "%",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Le => "<=",
            Token::Ge => ">=",
            Token::Eq => "=",
            Token::PlusEq => "+=",
            Token::MinusEq => "-=",
            Token::StarEq => "*=",
            Token::SlashEq => "/=",
            Token::DoubleSlashEq => "//=",
            Token::PercentEq => "%=",
            Token::DoubleStarEq => "**=",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Dot => ".",
            Token::Semi => ";",
            Token::Newline => "NEWLINE",
            Token::Comment => "# comment",
            Token::Indent => "INDENT",
            Token::Dedent => "DEDENT",
            Token::Eof => "EOF",
        };
        f.write_str(text)
    }
}

/// Lexer wrapper that handles layout
struct Layout<'source> {
    source: &'source str,
    out: Vec<SpannedToken>,
    indent_stack: Vec<usize>,
    bracket_depth: usize,
    at_line_start: bool,
}

impl<'source> Layout<'source> {
    fn new(source: &'source str) -> Self {
        Self {
            source,
            out: Vec::new(),
            indent_stack: vec![0],
            bracket_depth: 0,
            at_line_start: true,
        }
    }

    /// Measure the indentation of the line containing `pos`
    fn measure_indent(&self, pos: usize) -> usize {
        let line_start = self.source[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let mut indent = 0;
        for ch in self.source[line_start..pos].chars() {
            match ch {
                ' ' => indent += 1,
                '\t' => indent += 4, // Treat tabs as 4 spaces
                _ => break,
            }
        }
        indent
    }

    fn push(&mut self, token: Token, span: Span) {
        self.out.push(SpannedToken { token, span });
    }

    fn last_is_newline(&self) -> bool {
        matches!(
            self.out.last().map(|t| &t.token),
            None | Some(Token::Newline) | Some(Token::Indent) | Some(Token::Dedent)
        )
    }

    /// Process indentation at the first token of a logical line
    fn process_indentation(&mut self, span: Span) -> Result<(), ParseError> {
        let indent = self.measure_indent(span.start);
        let current = self.indent_stack.last().copied().unwrap_or(0);

        if indent > current {
            self.indent_stack.push(indent);
            self.push(Token::Indent, Span::new(span.start, span.start));
        } else if indent < current {
            // Indent decreased - may need multiple dedents
            while let Some(&top) = self.indent_stack.last() {
                if top <= indent {
                    break;
                }
                self.indent_stack.pop();
                self.push(Token::Dedent, Span::new(span.start, span.start));
            }
            if self.indent_stack.last().copied().unwrap_or(0) != indent {
                return Err(ParseError::at(
                    self.source,
                    span.start,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        Ok(())
    }

    fn run(mut self) -> Result<Vec<SpannedToken>, ParseError> {
        let mut inner = Token::lexer(self.source).spanned();
        while let Some((token, range)) = inner.next() {
            let span = Span::new(range.start, range.end);
            let token = token.map_err(|_| {
                ParseError::at(
                    self.source,
                    span.start,
                    format!("unexpected character: '{}'", span.text(self.source)),
                )
            })?;

            if token == Token::Newline {
                if self.bracket_depth == 0 {
                    if !self.last_is_newline() {
                        self.push(Token::Newline, span);
                    }
                    self.at_line_start = true;
                }
                continue;
            }

            if self.at_line_start && self.bracket_depth == 0 {
                self.process_indentation(span)?;
            }
            self.at_line_start = false;

            match &token {
                Token::LParen | Token::LBracket | Token::LBrace => self.bracket_depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => {
                    self.bracket_depth = self.bracket_depth.saturating_sub(1)
                }
                _ => {}
            }
            self.push(token, span);
        }

        // End of input - close the last line, emit remaining dedents and EOF
        let pos = self.source.len();
        if !self.last_is_newline() {
            self.push(Token::Newline, Span::new(pos, pos));
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(Token::Dedent, Span::new(pos, pos));
        }
        self.push(Token::Eof, Span::new(pos, pos));
        Ok(self.out)
    }
}

/// Lex a source string into layout-annotated tokens.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    Layout::new(source).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_types(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|st| st.token)
            .collect()
    }

    #[test]
    fn test_keywords() {
        let tokens = token_types("def for in while return");
        assert_eq!(
            tokens,
            vec![
                Token::Def,
                Token::For,
                Token::In,
                Token::While,
                Token::Return,
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_identifiers_and_numbers() {
        let tokens = token_types("x1 = 42 + 2.5e3");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("x1".to_string()),
                Token::Eq,
                Token::Int(42),
                Token::Plus,
                Token::Float(2500.0),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        let tokens = token_types(r#"'a\nb' "c""#);
        assert_eq!(tokens[0], Token::Str("a\nb".to_string()));
        assert_eq!(tokens[1], Token::Str("c".to_string()));
    }

    #[test]
    fn test_triple_quoted_spans_lines() {
        let tokens = token_types("\"\"\"one\ntwo\"\"\"\nx");
        assert_eq!(tokens[0], Token::Str("one\ntwo".to_string()));
        assert_eq!(tokens[1], Token::Newline);
        assert_eq!(tokens[2], Token::Ident("x".to_string()));
    }

    #[test]
    fn test_indent_dedent() {
        let tokens = token_types("for x in y:\n    a = x\nb = 1\n");
        assert!(tokens.contains(&Token::Indent));
        assert!(tokens.contains(&Token::Dedent));
        let indent_pos = tokens.iter().position(|t| *t == Token::Indent).unwrap();
        assert_eq!(tokens[indent_pos - 1], Token::Newline);
    }

    #[test]
    fn test_blank_and_comment_lines_are_ignored() {
        let tokens = token_types("a = 1\n\n   # note\nb = 2\n");
        let newlines = tokens.iter().filter(|t| **t == Token::Newline).count();
        assert_eq!(newlines, 2);
        assert!(!tokens.contains(&Token::Indent));
    }

    #[test]
    fn test_no_layout_inside_brackets() {
        let tokens = token_types("f(a,\n      b)\n");
        assert!(!tokens.contains(&Token::Indent));
        assert_eq!(tokens.iter().filter(|t| **t == Token::Newline).count(), 1);
    }

    #[test]
    fn test_bad_dedent_is_error() {
        let err = tokenize("if x:\n        a = 1\n    b = 2\n").unwrap_err();
        assert!(err.message.contains("unindent"));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a = $").unwrap_err();
        assert!(err.message.contains("unexpected character"));
    }
}
