//! The assembler: language text in, wire bytes out.
//!
//! The assembler drives the [`Scanner`] and resolves the two pieces of
//! deferred state a token stream can carry:
//!
//! - a pending `long-form:N` modifier, applied to the next varint or
//!   length prefix;
//! - a pending inferred-type tag, whose low three bits are OR-ed in once
//!   the following token reveals its wire type.
//!
//! Each `{` opens a recursive frame so a block's bytes are known before
//! its length prefix is emitted. `!{` frames encode no prefix; instead a
//! matching EGROUP tag is synthesized when the frame closes.

use crate::error::{Error, Result};
use crate::scanner::{LongForm, Position, Scanner, Token};
use crate::wire::{decode_varint, encode_varint, WireType};

/// Assembles `input` into wire bytes.
///
/// This is the convenience form of [`Assembler::assemble`] for anonymous
/// input.
pub fn assemble(input: &str) -> Result<Vec<u8>> {
    Assembler::new(input).assemble()
}

/// Encodes a token stream into an output buffer.
pub struct Assembler<'a> {
    scanner: Scanner<'a>,
}

/// What kind of frame a recursive [`Assembler::exec`] call encodes.
enum Frame {
    TopLevel,
    Length { open: Position },
    Group { open: Position },
}

/// The result of encoding one frame.
struct Block {
    bytes: Vec<u8>,
    /// A `long-form` modifier that was the last token of a group frame.
    /// It pads the synthesized EGROUP tag.
    trailing: Option<LongForm>,
}

impl<'a> Assembler<'a> {
    /// Creates an assembler for `input`.
    pub fn new(input: &'a str) -> Self {
        Assembler {
            scanner: Scanner::new(input),
        }
    }

    /// Sets the file path shown in error reports.
    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.scanner.set_file(path);
        self
    }

    /// Consumes tokens until the input is exhausted, returning the encoded
    /// bytes.
    pub fn assemble(mut self) -> Result<Vec<u8>> {
        let block = self.exec(Frame::TopLevel)?;
        Ok(block.bytes)
    }

    fn exec(&mut self, frame: Frame) -> Result<Block> {
        let mut out = Vec::new();
        let mut modifier: Option<LongForm> = None;
        // Index of the byte holding an inferred tag's wire-type bits.
        let mut inferred_index: Option<usize> = None;

        loop {
            let token = self.scanner.next(&mut modifier)?;

            // A still-pending modifier means the scanner could not apply
            // it; only a length prefix or a group-frame `}` may claim it
            // from here.
            if let Some(pending) = &modifier {
                let consumes = matches!(token, Token::LeftCurly { group: false, .. })
                    || (matches!(token, Token::RightCurly { .. })
                        && matches!(frame, Frame::Group { .. }));
                if !consumes {
                    return Err(Error::DanglingLongForm {
                        pos: pending.pos.clone(),
                    });
                }
            }

            match token {
                Token::Bytes {
                    value,
                    wire_type,
                    inferred_type,
                    ..
                } => {
                    if let Some(index) = inferred_index.take() {
                        out[index] |= wire_type;
                    }
                    if inferred_type {
                        inferred_index = Some(out.len());
                    }
                    out.extend_from_slice(&value);
                }
                Token::LongForm(pending) => {
                    modifier = Some(pending);
                }
                Token::LeftCurly { group: false, pos } => {
                    if let Some(index) = inferred_index.take() {
                        out[index] |= WireType::Len as u8;
                    }
                    let child = self.exec(Frame::Length { open: pos })?;
                    let extra = modifier.take().map_or(0, |m| m.extra);
                    encode_varint(&mut out, child.bytes.len() as u64, extra);
                    out.extend_from_slice(&child.bytes);
                }
                Token::LeftCurly { group: true, pos } => {
                    let Some(index) = inferred_index.take() else {
                        return Err(Error::BareGroup { pos });
                    };
                    // The tag varint sits at the end of the buffer with its
                    // wire-type bits still zero; recover its value before
                    // marking it as a group start.
                    let tag = decode_varint(&out[index..])
                        .expect("tag varint was emitted by the scanner")
                        .value;
                    out[index] |= WireType::StartGroup as u8;

                    let child = self.exec(Frame::Group { open: pos })?;
                    out.extend_from_slice(&child.bytes);
                    let extra = child.trailing.map_or(0, |m| m.extra);
                    encode_varint(&mut out, tag | u64::from(WireType::EndGroup as u8), extra);
                }
                Token::RightCurly { pos } => {
                    inferred_index = None;
                    return match frame {
                        Frame::TopLevel => Err(Error::UnmatchedCloseCurly { pos }),
                        Frame::Length { .. } => Ok(Block {
                            bytes: out,
                            trailing: None,
                        }),
                        Frame::Group { .. } => Ok(Block {
                            bytes: out,
                            trailing: modifier.take(),
                        }),
                    };
                }
                Token::Eof { .. } => {
                    inferred_index = None;
                    return match frame {
                        Frame::TopLevel => Ok(Block {
                            bytes: out,
                            trailing: None,
                        }),
                        Frame::Length { open } | Frame::Group { open } => {
                            Err(Error::UnmatchedOpenCurly { pos: open })
                        }
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Success vectors. Failure cases live in [`failures`] below.
    #[test]
    fn assemble_vectors() {
        #[rustfmt::skip]
        let cases: &[(&str, &str, &[u8])] = &[
            ("empty", "", &[]),
            ("comment", "#hello", &[]),
            ("comment with content", "#hello\n`abcd`", &[0xab, 0xcd]),
            ("empty hex", "``", &[]),
            ("hex", "`0123456789abcdefABCDEF0a1b`",
             &[0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0xab, 0xcd, 0xef, 0x0a, 0x1b]),
            ("empty quotes", "\"\"", &[]),
            ("quotes", "\"hello!\"", b"hello!"),
            ("quotes concat", "\"hello,\" \" world!\"", b"hello, world!"),
            ("quotes with non-latin", "\"\u{65e5}\u{672c}\"",
             "\u{65e5}\u{672c}".as_bytes()),
            ("quotes with escapes", "\"\\\\\\\"\\ntext\\x00\\xff\"",
             b"\\\"\ntext\x00\xff"),
            ("zero", "0", &[0x00]),
            ("minus zero", "-0", &[0x00]),
            ("long-form:0 zero", "long-form:0 0", &[0x00]),
            ("long zero", "long-form:5 0", &[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]),
            ("one byte", "42", &[42]),
            ("three byte", "100000", &[0xa0, 0x8d, 0x06]),
            ("ten byte", "-1",
             &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]),
            ("one hex byte", "0x5a", &[0x5a]),
            ("two hex byte", "0xa5", &[0xa5, 0x01]),
            ("unsigned max", "18446744073709551615",
             &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]),
            ("one zig", "-1z", &[0x01]),
            ("zig 42", "42z", &[84]),
            ("long answer", "long-form:5 -42z",
             &[0xd3, 0x80, 0x80, 0x80, 0x80, 0x00]),
            ("fixed32", "0xaaai32", &[0xaa, 0x0a, 0x00, 0x00]),
            ("-fixed32", "-0xaaai32", &[0x56, 0xf5, 0xff, 0xff]),
            ("fixed64", "0xaaai64",
             &[0xaa, 0x0a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
            ("-fixed64", "-0xaaai64",
             &[0x56, 0xf5, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]),
            ("biggest fixed",
             "18446744073709551615i64 -9223372036854775808i64 4294967295i32 -2147483648i32",
             &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
               0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80,
               0xff, 0xff, 0xff, 0xff,
               0x00, 0x00, 0x00, 0x80]),
            ("bools", "true false", &[1, 0]),
            ("tags", "1:VARINT 2:I64 3:LEN 4:SGROUP 5:EGROUP 6:I32",
             &[0x08, 0x11, 0x1a, 0x23, 0x2c, 0x35]),
            ("unusual field numbers", "-5:6 9z:7 0x22:1 0:0",
             &[0xde, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01,
               0x9e, 0x01,
               0x91, 0x02,
               0x00]),
            ("max field number", "0x1fffffffffffffff:0",
             &[0xf8, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]),
            ("wire type inference",
             "1: 42z 22: {} 333: 42i32 4444: -42i64 55555: 42.0i32 666666: 0x42.0 7777777: inf64",
             &[0x08, 0x54,
               0xb2, 0x01, 0x00,
               0xed, 0x14, 0x2a, 0x00, 0x00, 0x00,
               0xe1, 0x95, 0x02, 0xd6, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
               0x9d, 0x90, 0x1b, 0x00, 0x00, 0x28, 0x42,
               0xd1, 0xc2, 0xc5, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80, 0x50, 0x40,
               0x89, 0xdf, 0xd5, 0x1d, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf0, 0x7f]),
            ("long-form inference", "1: long-form:2 5 2: long-form:3 {}",
             &[0x08, 0x85, 0x80, 0x00,
               0x12, 0x80, 0x80, 0x80, 0x00]),
            ("eof inference", "1:", &[0x08]),
            ("string field", "23: {\"my cool string\"}",
             b"\xba\x01\x0emy cool string"),
            ("message field", "24: {\n  1: 5\n  2: {\"nested string\"}\n}",
             b"\xc2\x01\x11\x08\x05\x12\x0dnested string"),
            ("repeated varints", "25: { 1 2 3 4 5 6 7 }",
             &[0xca, 0x01, 0x07, 1, 2, 3, 4, 5, 6, 7]),
            ("long prefix", "23: long-form:2 {\"non-minimally-prefixed\"}",
             b"\xba\x01\x96\x80\x00non-minimally-prefixed"),
            ("empty group", "1: !{}", &[0x0b, 0x0c]),
            ("group with stuff", "5: !{1: 5 \"foo\"}",
             b"\x2b\x08\x05foo\x2c"),
            ("nested groups", "1:!{2:!{3:!{\"lmao\"}}}",
             b"\x0b\x13\x1blmao\x1c\x14\x0c"),
            ("nested groups and length prefixes", "1:!{2:{3:!{{\"lmao\"}}}}",
             b"\x0b\x12\x07\x1b\x04lmao\x1c\x0c"),
            ("group trailing long-form", "27: !{ long-form:3 }",
             &[0xdb, 0x01, 0xdc, 0x81, 0x80, 0x80, 0x00]),
            ("octal in strings", "\"\\127o\\127\" \"\\13\" \"\\007\"",
             &[0x57, 0x6f, 0x57, 0x0b, 0x07]),
        ];

        for (name, text, want) in cases {
            let got = assemble(text).unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_eq!(&got, want, "{name}");
        }
    }

    #[test]
    fn assemble_floats() {
        let cases: &[(&str, &str, Vec<u8>)] = &[
            (
                "fp zero",
                "0.0 -0.0 0.0i32 -0.0i32",
                [
                    0.0f64.to_le_bytes().as_slice(),
                    (-0.0f64).to_le_bytes().as_slice(),
                    0.0f32.to_le_bytes().as_slice(),
                    (-0.0f32).to_le_bytes().as_slice(),
                ]
                .concat(),
            ),
            (
                "infinity",
                "inf64 -inf64 inf32 -inf32",
                [
                    f64::INFINITY.to_le_bytes().as_slice(),
                    f64::NEG_INFINITY.to_le_bytes().as_slice(),
                    f32::INFINITY.to_le_bytes().as_slice(),
                    f32::NEG_INFINITY.to_le_bytes().as_slice(),
                ]
                .concat(),
            ),
            (
                "plank",
                "6.62607015e-34",
                6.62607015e-34f64.to_le_bytes().to_vec(),
            ),
            ("speed of light", "-3.0e9i32", (-3.0e9f32).to_le_bytes().to_vec()),
            (
                "hex floats",
                "-0xf.0 0xabcd.efp-10 0x1.8p5i32",
                [
                    (-15.0f64).to_le_bytes().as_slice(),
                    ((0xabcdefu32 as f64) / 262144.0).to_le_bytes().as_slice(),
                    48.0f32.to_le_bytes().as_slice(),
                ]
                .concat(),
            ),
        ];

        for (name, text, want) in cases {
            let got = assemble(text).unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_eq!(&got, want, "{name}");
        }
    }

    #[test]
    fn failures() {
        let cases: &[(&str, &str)] = &[
            ("garbage", "garbage"),
            ("broken hex", "`abcd"),
            ("odd hex", "`abc`"),
            ("non-hex in hex", "`bear`"),
            ("broken quotes", "\"hello!"),
            ("broken quotes by escape", "\"hello!\\\""),
            ("bad escape", "\"\\a\""),
            ("octal too big", "\"\\777\""),
            ("long eof", "long-form:5"),
            ("double long", "long-form:3 long-form:4 5"),
            ("negative long", "long-form:-3 5"),
            ("hex long", "long-form:0x3 5"),
            ("long string", "long-form:1 \"a\""),
            ("int too big", "18446744073709551616"),
            ("negative int too big", "-9223372036854775809"),
            ("fixed32 too big", "4294967296i32"),
            ("fixed32 too small", "-2147483649i32"),
            ("long fixed", "long-form:1 1i32"),
            ("bools are not varints", "long-form:1 true"),
            ("no fraction float", "1."),
            ("no fraction float w/ exponent", "1e1"),
            ("plus exponent", "1.0e+1"),
            ("long float", "long-form:1 1.0"),
            ("float64 too big", "1.7976931348623157e309"),
            ("float32 too big", "3.40282347e39i32"),
            ("bad named wire type", "1:LMAO"),
            ("wire type not a u3", "1:8"),
            ("field number too big", "0x2000000000000000:0"),
            ("fixed-width tag", "1i32:0"),
            ("unclosed prefix", "{"),
            ("unclosed group", "1: !{"),
            ("unopened prefix", "}"),
            ("long end-of-prefix", "{long-form:2}"),
            ("bare group", "!{}"),
            ("typed group", "1:SGROUP !{}"),
            ("long-form before group", "1: long-form:2 !{}"),
        ];

        for (name, text) in cases {
            assert!(assemble(text).is_err(), "{name}: expected an error");
        }
    }
}
