use std::fmt::{self, Display};

use linnyr_common::{Diagnostic, ErrorKind};

/// Errors raised while splitting source text into [`crate::Token`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenizerError {
    UnterminatedReference { start: usize },
    UnterminatedString { start: usize },
    UnexpectedChar { ch: char, offset: usize },
}

impl Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedReference { start } => {
                write!(f, "unterminated '[' reference starting at offset {start}")
            }
            Self::UnterminatedString { start } => {
                write!(f, "unterminated string literal starting at offset {start}")
            }
            Self::UnexpectedChar { ch, offset } => {
                write!(f, "unexpected character '{ch}' at offset {offset}")
            }
        }
    }
}

impl std::error::Error for TokenizerError {}

/// Errors raised while building an AST out of a token stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsingError {
    Tokenizer(TokenizerError),
    UnexpectedEnd,
    UnexpectedToken {
        found: String,
        offset: usize,
        expected: &'static str,
    },
    InvalidReference { detail: String, offset: usize },
    InvalidNumber { text: String, offset: usize },
    TrailingInput { offset: usize },
}

impl Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tokenizer(e) => write!(f, "{e}"),
            Self::UnexpectedEnd => write!(f, "unexpected end of expression"),
            Self::UnexpectedToken {
                found,
                offset,
                expected,
            } => write!(f, "expected {expected}, found '{found}' at offset {offset}"),
            Self::InvalidReference { detail, offset } => {
                write!(f, "invalid variable reference at offset {offset}: {detail}")
            }
            Self::InvalidNumber { text, offset } => {
                write!(f, "invalid number literal '{text}' at offset {offset}")
            }
            Self::TrailingInput { offset } => {
                write!(f, "unexpected trailing input at offset {offset}")
            }
        }
    }
}

impl std::error::Error for ParsingError {}

impl From<TokenizerError> for ParsingError {
    fn from(e: TokenizerError) -> Self {
        Self::Tokenizer(e)
    }
}

impl From<ParsingError> for Diagnostic {
    fn from(e: ParsingError) -> Self {
        let offset = match &e {
            ParsingError::UnexpectedToken { offset, .. }
            | ParsingError::InvalidReference { offset, .. }
            | ParsingError::InvalidNumber { offset, .. }
            | ParsingError::TrailingInput { offset } => Some(*offset),
            _ => None,
        };
        let mut d = Diagnostic::new(ErrorKind::ExpressionSyntax, e.to_string());
        if let Some(offset) = offset {
            d = d.with_offset(offset);
        }
        d
    }
}
