//! Error types for the wirescope-core library.
//!
//! Assembly errors always carry the [`Position`] of the offending input so
//! that reports render as `file:line:column: message`. Disassembly never
//! fails; anything the disassembler cannot interpret is emitted as a hex
//! literal instead.

use crate::scanner::Position;
use thiserror::Error;

/// Result type alias for wirescope operations.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors produced while assembling language text.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A quoted string was never closed.
    #[error("{pos}: unmatched '\"'")]
    UnmatchedQuote {
        /// Where the string started.
        pos: Position,
    },

    /// A hex literal was never closed.
    #[error("{pos}: unmatched '`'")]
    UnmatchedBacktick {
        /// Where the literal started.
        pos: Position,
    },

    /// A hex literal or `\x` escape contained invalid digits.
    #[error("{pos}: {source}")]
    InvalidHexDigits {
        /// Where the digits started.
        pos: Position,
        /// The underlying decode failure.
        #[source]
        source: hex::FromHexError,
    },

    /// Input ended in the middle of an escape sequence.
    #[error("{pos}: unfinished escape sequence")]
    UnfinishedEscape {
        /// Where the escape was cut short.
        pos: Position,
    },

    /// An escape sequence used an unknown introducer character.
    #[error("{pos}: unknown escape sequence \\{escape}")]
    UnknownEscape {
        /// Where the escape started.
        pos: Position,
        /// The character following the backslash.
        escape: char,
    },

    /// An escape decoded to a value that does not fit in one byte.
    #[error("{pos}: illegal escape for quoted string")]
    EscapeOutOfRange {
        /// Where the escape started.
        pos: Position,
    },

    /// A symbol did not match any token class.
    #[error("{pos}: unrecognized symbol {symbol:?}")]
    UnknownSymbol {
        /// Where the symbol started.
        pos: Position,
        /// The offending symbol text.
        symbol: String,
    },

    /// An integer literal cannot be represented in 64 bits.
    #[error("{pos}: integer literal {symbol} is out of range")]
    IntegerOutOfRange {
        /// Where the literal started.
        pos: Position,
        /// The offending literal text.
        symbol: String,
    },

    /// A value does not fit the width its suffix requests.
    #[error("{pos}: {symbol} does not fit in {bits} bits")]
    DoesNotFit {
        /// Where the literal started.
        pos: Position,
        /// The offending literal text.
        symbol: String,
        /// The requested width in bits.
        bits: u32,
    },

    /// A tag expression carried an `i32`/`i64` suffix.
    #[error("{pos}: cannot use fixed-width encoding on tag expressions")]
    FixedWidthTag {
        /// Where the tag started.
        pos: Position,
    },

    /// A tag's wire-type expression was not a keyword or an integer.
    #[error("{pos}: invalid wire type {expr:?}")]
    InvalidWireType {
        /// Where the tag started.
        pos: Position,
        /// The unparseable wire-type expression.
        expr: String,
    },

    /// A tag's numeric wire type was outside 0..=7.
    #[error("{pos}: a tag's wire type must be between 0 and 7")]
    WireTypeRange {
        /// Where the tag started.
        pos: Position,
    },

    /// A tag's field number cannot be encoded as a ten-byte varint.
    #[error("{pos}: field number in {symbol} is too large")]
    FieldNumberRange {
        /// Where the tag started.
        pos: Position,
        /// The offending tag text.
        symbol: String,
    },

    /// A `{` or `!{` was never closed.
    #[error("{pos}: unmatched '{{'")]
    UnmatchedOpenCurly {
        /// Where the block opened.
        pos: Position,
    },

    /// A `}` had no matching opener.
    #[error("{pos}: unmatched '}}'")]
    UnmatchedCloseCurly {
        /// Where the stray brace was found.
        pos: Position,
    },

    /// A `long-form:N` modifier was not followed by something it can pad.
    #[error("{pos}: length modifier was not followed by '{{' or varint")]
    DanglingLongForm {
        /// Where the modifier was written.
        pos: Position,
    },

    /// A `!{` did not follow a tag with an inferred wire type.
    #[error("{pos}: '!{{' must follow a tag with an inferred wire type")]
    BareGroup {
        /// Where the group opened.
        pos: Position,
    },

    /// A `!` was not followed by `{`.
    #[error("{pos}: expected '{{' after '!'")]
    ExpectedGroupBrace {
        /// Where the `!` was found.
        pos: Position,
    },
}

impl Error {
    /// The input position the error refers to.
    pub fn position(&self) -> &Position {
        match self {
            Error::UnmatchedQuote { pos }
            | Error::UnmatchedBacktick { pos }
            | Error::InvalidHexDigits { pos, .. }
            | Error::UnfinishedEscape { pos }
            | Error::UnknownEscape { pos, .. }
            | Error::EscapeOutOfRange { pos }
            | Error::UnknownSymbol { pos, .. }
            | Error::IntegerOutOfRange { pos, .. }
            | Error::DoesNotFit { pos, .. }
            | Error::FixedWidthTag { pos }
            | Error::InvalidWireType { pos, .. }
            | Error::WireTypeRange { pos }
            | Error::FieldNumberRange { pos, .. }
            | Error::UnmatchedOpenCurly { pos }
            | Error::UnmatchedCloseCurly { pos }
            | Error::DanglingLongForm { pos }
            | Error::BareGroup { pos }
            | Error::ExpectedGroupBrace { pos } => pos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_position() {
        let pos = Position {
            file: Some("demo.txt".to_string()),
            offset: 12,
            line: 2,
            column: 4,
        };
        let err = Error::UnmatchedCloseCurly { pos };
        assert_eq!(err.to_string(), "demo.txt:3:5: unmatched '}'");
    }

    #[test]
    fn display_defaults_file_name() {
        let err = Error::UnmatchedOpenCurly {
            pos: Position::default(),
        };
        assert_eq!(err.to_string(), "<input>:1:1: unmatched '{'");
    }
}
