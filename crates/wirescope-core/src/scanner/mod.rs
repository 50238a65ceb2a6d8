//! Lexical analysis for the wirescope language.
//!
//! The scanner turns UTF-8 text into a lazy stream of [`Token`]s. It is
//! byte-oriented: positions count bytes, not runes, and quoted strings copy
//! input bytes verbatim unless an escape intervenes.
//!
//! One wrinkle inherited from the language: a pending `long-form:N`
//! modifier is consumed *inside* the scanner when the next symbol is a
//! plain or zigzag integer, because only the scanner knows that the symbol
//! varint-encodes. All other placements are policed by the assembler.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::float::{parse_hex_f32, parse_hex_f64};
use crate::wire::{encode_varint, zigzag};

/// A location in the input stream.
///
/// Lines and columns are stored zero-indexed and printed one-indexed.
/// Columns count bytes, not runes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Position {
    /// Optional file name for pretty-printing.
    pub file: Option<String>,
    /// Byte offset into the input.
    pub offset: usize,
    /// Zero-indexed line number.
    pub line: usize,
    /// Zero-indexed byte column.
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self.file.as_deref().unwrap_or("<input>");
        write!(f, "{}:{}:{}", file, self.line + 1, self.column + 1)
    }
}

/// A pending `long-form:N` modifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LongForm {
    /// Redundant bytes to add to the next varint or length prefix.
    pub(crate) extra: usize,
    pub(crate) pos: Position,
}

/// A token in a wirescope file.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// A literal already encoded to its final byte form, except possibly
    /// for the wire-type bits of an enclosing inferred tag.
    Bytes {
        value: Vec<u8>,
        /// Which wire type an inferred tag preceding this token becomes.
        wire_type: u8,
        /// True for tag expressions whose wire type is inferred from the
        /// token that follows.
        inferred_type: bool,
        pos: Position,
    },
    /// A `long-form:N` modifier.
    LongForm(LongForm),
    /// `{`, or `!{` when `group` is set.
    LeftCurly { group: bool, pos: Position },
    /// `}`.
    RightCurly { pos: Position },
    /// End of input.
    Eof { pos: Position },
}

// Capture groups, shared across the integer/tag class:
// 1: the magnitude, 2: the encoding suffix, 3: the wire type including the
// colon (present iff this is a tag), 4: the wire-type expression, which may
// be empty when inferred.
static INT_OR_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?([0-9]+|0x[0-9a-fA-F]+)(z|i32|i64)?(:(\w*))?$").expect("static pattern")
});
static DEC_FLOAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?[0-9]+\.[0-9]+(?:[eE]-?[0-9]+)?)(i32|i64)?$").expect("static pattern")
});
static HEX_FLOAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?0x[0-9a-fA-F]+\.[0-9a-fA-F]+(?:[pP]-?[0-9]+)?)(i32|i64)?$")
        .expect("static pattern")
});
static LONG_FORM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^long-form:([0-9]+)$").expect("static pattern"));

/// Scanning state for a wirescope file.
pub struct Scanner<'a> {
    input: &'a str,
    pos: Position,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner over `input`.
    pub fn new(input: &'a str) -> Self {
        Scanner {
            input,
            pos: Position::default(),
        }
    }

    /// Sets the file path shown in this scanner's error reports.
    pub fn set_file(&mut self, path: impl Into<String>) {
        self.pos.file = Some(path.into());
    }

    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    /// Whether the cursor is at least `n` bytes past the end of the input.
    fn is_eof(&self, n: usize) -> bool {
        self.pos.offset + n >= self.input.len()
    }

    fn peek(&self) -> u8 {
        self.bytes()[self.pos.offset]
    }

    /// Advances the cursor up to `n` bytes, updating line and column.
    fn advance(&mut self, n: usize) {
        for _ in 0..n {
            if self.is_eof(0) {
                break;
            }
            if self.peek() == b'\n' {
                self.pos.line += 1;
                self.pos.column = 0;
            } else {
                self.pos.column += 1;
            }
            self.pos.offset += 1;
        }
    }

    /// Advances exactly `n` bytes and returns them, or `None` at EOF.
    ///
    /// Byte slices, not `&str`: the cursor may sit anywhere, including in
    /// the middle of a multi-byte rune.
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let start = self.pos.offset;
        self.advance(n);
        if self.pos.offset - start != n {
            return None;
        }
        Some(&self.bytes()[start..self.pos.offset])
    }

    /// Advances past the next occurrence of `b`, returning everything
    /// before it, or `None` if `b` never appears.
    fn take_until(&mut self, b: u8) -> Option<&'a [u8]> {
        let rest = &self.bytes()[self.pos.offset..];
        let i = rest.iter().position(|&c| c == b)?;
        let taken = self.take(i + 1).expect("checked length");
        Some(&taken[..i])
    }

    /// Parses an escape sequence, returning the value it denotes.
    ///
    /// The cursor is assumed to be on the backslash. Octal escapes consume
    /// one to three digits greedily and may exceed 0xFF; the caller decides
    /// whether that is legal.
    fn parse_escape(&mut self) -> Result<u32> {
        self.advance(1); // the backslash
        if self.is_eof(0) {
            return Err(Error::UnfinishedEscape {
                pos: self.pos.clone(),
            });
        }

        match self.peek() {
            b'n' => {
                self.advance(1);
                Ok(u32::from(b'\n'))
            }
            c @ (b'"' | b'\\') => {
                self.advance(1);
                Ok(u32::from(c))
            }
            b'x' => {
                self.advance(1);
                let pos = self.pos.clone();
                let Some(digits) = self.take(2) else {
                    return Err(Error::UnfinishedEscape {
                        pos: self.pos.clone(),
                    });
                };
                let decoded =
                    hex::decode(digits).map_err(|source| Error::InvalidHexDigits { pos, source })?;
                Ok(u32::from(decoded[0]))
            }
            b'0'..=b'7' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 3 && !self.is_eof(0) && matches!(self.peek(), b'0'..=b'7') {
                    value = value * 8 + u32::from(self.peek() - b'0');
                    self.advance(1);
                    digits += 1;
                }
                Ok(value)
            }
            c => Err(Error::UnknownEscape {
                pos: self.pos.clone(),
                escape: char::from(c),
            }),
        }
    }

    /// Parses a quoted string up to the closing `"`.
    ///
    /// The cursor is assumed to be on the opening quote. Bytes are copied
    /// verbatim, including raw newlines; only backslash escapes are
    /// interpreted.
    fn parse_quoted_string(&mut self) -> Result<Token> {
        let start = self.pos.clone();
        self.advance(1); // the opening quote
        let mut value = Vec::new();
        loop {
            if self.is_eof(0) {
                return Err(Error::UnmatchedQuote { pos: start });
            }
            match self.peek() {
                b'"' => {
                    self.advance(1);
                    return Ok(Token::Bytes {
                        value,
                        wire_type: 0,
                        inferred_type: false,
                        pos: start,
                    });
                }
                b'\\' => {
                    let escape_start = self.pos.clone();
                    let r = self.parse_escape()?;
                    if r > 0xff {
                        return Err(Error::EscapeOutOfRange { pos: escape_start });
                    }
                    value.push(r as u8);
                }
                c => {
                    self.advance(1);
                    value.push(c);
                }
            }
        }
    }

    /// Lexes the next token.
    ///
    /// `length_modifier` is the enclosing frame's pending `long-form`
    /// modifier; it is taken and applied when the next token is a plain or
    /// zigzag integer.
    pub(crate) fn next(&mut self, length_modifier: &mut Option<LongForm>) -> Result<Token> {
        loop {
            if self.is_eof(0) {
                return Ok(Token::Eof {
                    pos: self.pos.clone(),
                });
            }

            match self.peek() {
                b' ' | b'\t' | b'\n' | b'\r' => self.advance(1),
                b'#' => {
                    self.advance(1);
                    while !self.is_eof(0) {
                        let was_newline = self.peek() == b'\n';
                        self.advance(1);
                        if was_newline {
                            break;
                        }
                    }
                }
                b'{' => {
                    let pos = self.pos.clone();
                    self.advance(1);
                    return Ok(Token::LeftCurly { group: false, pos });
                }
                b'}' => {
                    let pos = self.pos.clone();
                    self.advance(1);
                    return Ok(Token::RightCurly { pos });
                }
                b'!' => {
                    let pos = self.pos.clone();
                    self.advance(1);
                    if self.is_eof(0) || self.peek() != b'{' {
                        return Err(Error::ExpectedGroupBrace {
                            pos: self.pos.clone(),
                        });
                    }
                    self.advance(1);
                    return Ok(Token::LeftCurly { group: true, pos });
                }
                b'"' => return self.parse_quoted_string(),
                b'`' => {
                    let start = self.pos.clone();
                    self.advance(1);
                    let digits_pos = self.pos.clone();
                    let Some(digits) = self.take_until(b'`') else {
                        return Err(Error::UnmatchedBacktick { pos: start });
                    };
                    let value = hex::decode(digits).map_err(|source| Error::InvalidHexDigits {
                        pos: digits_pos,
                        source,
                    })?;
                    return Ok(Token::Bytes {
                        value,
                        wire_type: 0,
                        inferred_type: false,
                        pos: start,
                    });
                }
                _ => return self.scan_symbol(length_modifier),
            }
        }
    }

    /// Consumes a bare symbol up to the next delimiter and classifies it.
    fn scan_symbol(&mut self, length_modifier: &mut Option<LongForm>) -> Result<Token> {
        let start = self.pos.clone();
        self.advance(1);
        while !self.is_eof(0) {
            match self.peek() {
                b' ' | b'\t' | b'\n' | b'\r' | b'{' | b'}' | b'[' | b']' | b'`' | b'"' | b'#'
                | b'!' => break,
                _ => self.advance(1),
            }
        }

        let symbol = &self.input[start.offset..self.pos.offset];

        if let Some(caps) = INT_OR_TAG.captures(symbol) {
            return self.classify_int_or_tag(symbol, &caps, start, length_modifier);
        }

        if let Some(caps) = DEC_FLOAT
            .captures(symbol)
            .or_else(|| HEX_FLOAT.captures(symbol))
        {
            return self.classify_float(symbol, &caps, start);
        }

        if let Some(caps) = LONG_FORM.captures(symbol) {
            let extra = caps[1]
                .parse::<usize>()
                .map_err(|_| Error::IntegerOutOfRange {
                    pos: start.clone(),
                    symbol: symbol.to_string(),
                })?;
            return Ok(Token::LongForm(LongForm { extra, pos: start }));
        }

        let (value, wire_type): (&[u8], u8) = match symbol {
            "true" => (&[0x01], 0),
            "false" => (&[0x00], 0),
            "inf32" => (&[0x00, 0x00, 0x80, 0x7f], 5),
            "-inf32" => (&[0x00, 0x00, 0x80, 0xff], 5),
            "inf64" => (&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf0, 0x7f], 1),
            "-inf64" => (&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf0, 0xff], 1),
            _ => {
                return Err(Error::UnknownSymbol {
                    pos: start,
                    symbol: symbol.to_string(),
                })
            }
        };

        Ok(Token::Bytes {
            value: value.to_vec(),
            wire_type,
            inferred_type: false,
            pos: start,
        })
    }

    fn classify_int_or_tag(
        &mut self,
        symbol: &str,
        caps: &regex::Captures<'_>,
        start: Position,
        length_modifier: &mut Option<LongForm>,
    ) -> Result<Token> {
        let negative = symbol.starts_with('-');
        let digits = caps.get(1).expect("group 1 always present").as_str();
        let (digits, base) = match digits.strip_prefix("0x") {
            Some(stripped) => (stripped, 16),
            None => (digits, 10),
        };

        let out_of_range = || Error::IntegerOutOfRange {
            pos: start.clone(),
            symbol: symbol.to_string(),
        };
        let magnitude = u64::from_str_radix(digits, base).map_err(|_| out_of_range())?;
        let mut value = if negative {
            if magnitude > 1u64 << 63 {
                return Err(out_of_range());
            }
            (magnitude as i64).wrapping_neg() as u64
        } else {
            magnitude
        };

        let suffix = caps.get(2).map_or("", |m| m.as_str());
        let mut inferred_type = false;

        if caps.get(3).is_some() {
            // A tag expression.
            if suffix == "i32" || suffix == "i64" {
                return Err(Error::FixedWidthTag { pos: start });
            }

            let expr = caps.get(4).expect("group 4 present with group 3").as_str();
            let wire_bits: u64 = match expr {
                "" => {
                    inferred_type = true;
                    0
                }
                "VARINT" => 0,
                "I64" => 1,
                "LEN" => 2,
                "SGROUP" => 3,
                "EGROUP" => 4,
                "I32" => 5,
                other => {
                    let parsed = match other.strip_prefix("0x") {
                        Some(h) => u64::from_str_radix(h, 16),
                        None => other.parse::<u64>(),
                    };
                    parsed.map_err(|_| Error::InvalidWireType {
                        pos: start.clone(),
                        expr: other.to_string(),
                    })?
                }
            };

            if wire_bits > 7 {
                return Err(Error::WireTypeRange { pos: start });
            }
            if (value as i64) > (i64::MAX >> 2) {
                return Err(Error::FieldNumberRange {
                    pos: start,
                    symbol: symbol.to_string(),
                });
            }

            value = value.wrapping_shl(3) | wire_bits;
        }

        let (enc, wire_type): (Vec<u8>, u8) = match suffix {
            "z" | "" => {
                if suffix == "z" {
                    value = zigzag(value as i64);
                }
                let extra = length_modifier.take().map_or(0, |m| m.extra);
                let mut enc = Vec::new();
                encode_varint(&mut enc, value, extra);
                (enc, 0)
            }
            "i32" => {
                let signed = value as i64;
                if signed >= 1 << 32 || signed < -(1 << 31) {
                    return Err(Error::DoesNotFit {
                        pos: start,
                        symbol: symbol.to_string(),
                        bits: 32,
                    });
                }
                ((value as u32).to_le_bytes().to_vec(), 5)
            }
            "i64" => (value.to_le_bytes().to_vec(), 1),
            _ => unreachable!("suffix group only matches z, i32, i64"),
        };

        Ok(Token::Bytes {
            value: enc,
            wire_type,
            inferred_type,
            pos: start,
        })
    }

    fn classify_float(
        &mut self,
        symbol: &str,
        caps: &regex::Captures<'_>,
        start: Position,
    ) -> Result<Token> {
        let literal = caps.get(1).expect("group 1 always present").as_str();
        let is_hex = literal.contains("0x");
        let suffix = caps.get(2).map_or("", |m| m.as_str());

        let does_not_fit = |bits| Error::DoesNotFit {
            pos: start.clone(),
            symbol: symbol.to_string(),
            bits,
        };

        let (enc, wire_type): (Vec<u8>, u8) = if suffix == "i32" {
            let value = if is_hex {
                parse_hex_f32(literal).ok_or_else(|| does_not_fit(32))?
            } else {
                literal.parse::<f32>().map_err(|_| does_not_fit(32))?
            };
            if value.is_infinite() {
                return Err(does_not_fit(32));
            }
            (value.to_bits().to_le_bytes().to_vec(), 5)
        } else {
            let value = if is_hex {
                parse_hex_f64(literal).ok_or_else(|| does_not_fit(64))?
            } else {
                literal.parse::<f64>().map_err(|_| does_not_fit(64))?
            };
            if value.is_infinite() {
                return Err(does_not_fit(64));
            }
            (value.to_bits().to_le_bytes().to_vec(), 1)
        };

        Ok(Token::Bytes {
            value: enc,
            wire_type,
            inferred_type: false,
            pos: start,
        })
    }
}
