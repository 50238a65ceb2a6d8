//! Heuristic disassembly of protobuf wire data into language text.
//!
//! The disassembler walks a byte string field by field, committing to the
//! richest rendering it can defend: length-prefixed payloads are
//! speculatively decoded as messages with printer rollback on failure,
//! groups open optimistically as `!{` and are rewritten to literal
//! `SGROUP` tags when their closer never arrives, and fixed-width fields
//! become float literals only when the text re-parses to the same bits.
//!
//! Nothing here can fail. Input the walker cannot interpret is emitted as
//! a hex literal, which is how the byte-exact round-trip guarantee
//! survives arbitrary input.

mod schema;

use prost_reflect::{FieldDescriptor, Kind, MessageDescriptor};
use tracing::trace;

use crate::float::{format_f32, format_f64};
use crate::printer::{BlockInfo, Printer};
use crate::wire::{decode_varint, unzigzag, WireType};

use schema::DescriptorStack;

/// Spaces per indentation level.
const INDENT: usize = 2;
/// Nested one-liner folds allowed before a block stays expanded.
const MAX_FOLDS: i32 = 3;
/// Blocks at most this many lines tall collapse onto their opening line.
const FOLD_HEIGHT: usize = 3;
/// Columns used when folding packed arrays.
const PACKED_COLUMNS: usize = 8;
/// Bytes of hex emitted per line.
const HEX_BYTES_PER_LINE: usize = 40;
/// Bytes of quoted string emitted per line.
const STRING_BYTES_PER_LINE: usize = 80;

/// Options controlling the disassembler's heuristics and output shape.
#[derive(Debug, Default, Clone)]
pub struct WriterOptions {
    /// Never render LEN payloads as quoted strings.
    pub no_quoted_strings: bool,
    /// Accept partial message parses of LEN payloads, emitting the parsed
    /// prefix followed by the rest as hex.
    pub all_fields_are_messages: bool,
    /// Emit `SGROUP`/`EGROUP` literals instead of `!{ … }`.
    pub no_groups: bool,
    /// Always write the wire-type keyword after `N:` (implies no `!{}`).
    pub explicit_wire_types: bool,
    /// Emit literal length integers before LEN payloads, never `{ }`.
    pub explicit_length_prefixes: bool,
    /// Root message descriptor guiding field renderings.
    pub schema: Option<MessageDescriptor>,
    /// Annotate fields with their schema names as remarks.
    pub print_field_names: bool,
    /// Annotate enum values with their schema names as remarks.
    pub print_enum_names: bool,
}

/// Disassembles `src` into language text.
///
/// Re-assembling the output reproduces `src` exactly, for every option
/// combination.
pub fn disassemble(src: &[u8], opts: &WriterOptions) -> String {
    Disassembler::new(opts).run(src)
}

/// An open group awaiting its EGROUP tag.
#[derive(Debug)]
struct GroupInfo {
    field_number: u64,
    /// Opened as ` !{` rather than a literal `SGROUP` tag.
    delimited: bool,
    /// Whether a schema descriptor was pushed alongside this group.
    has_desc: bool,
}

struct Disassembler<'o> {
    opts: &'o WriterOptions,
    printer: Printer,
    groups: Vec<GroupInfo>,
    descs: DescriptorStack,
}

impl<'o> Disassembler<'o> {
    fn new(opts: &'o WriterOptions) -> Self {
        Disassembler {
            opts,
            printer: Printer::new(INDENT, MAX_FOLDS),
            groups: Vec::new(),
            descs: DescriptorStack::new(opts.schema.clone()),
        }
    }

    fn run(mut self, mut src: &[u8]) -> String {
        trace!(len = src.len(), "disassembling");
        while !src.is_empty() {
            self.printer.new_line();
            match self.decode_field(src) {
                Some(rest) => src = rest,
                None => {
                    self.printer.discard_line();
                    break;
                }
            }
        }

        self.reset_open_groups(0);

        if !src.is_empty() {
            trace!(len = src.len(), "emitting trailing bytes as hex");
            self.printer.new_line();
            self.dump_hex(src);
        }

        self.printer.finish()
    }

    /// Decodes one field from the front of `src`, returning the remainder,
    /// or `None` if the bytes do not look like a field at all.
    fn decode_field<'b>(&mut self, src: &'b [u8]) -> Option<&'b [u8]> {
        let tag = decode_varint(src)?;
        let mut rest = &src[tag.len..];

        let field_number = tag.value >> 3;
        // 0 is never a valid field number, so this probably isn't a
        // message.
        if field_number == 0 && !self.opts.all_fields_are_messages {
            return None;
        }
        let wire_type = WireType::from_bits((tag.value & 0x7) as u8)?;

        if tag.extra > 0 {
            self.printer.write(format!("long-form:{} ", tag.extra));
        }
        self.printer.write(format!("{field_number}:"));

        let field = self.descs.field(field_number);
        if self.opts.print_field_names {
            if let Some(field) = &field {
                self.printer.remark(field.name());
            }
        }

        if self.opts.explicit_wire_types
            && matches!(
                wire_type,
                WireType::Varint | WireType::I64 | WireType::Len | WireType::I32
            )
        {
            self.printer.write(wire_type.name());
        }

        let kind = field.as_ref().map(|f| f.kind());

        match wire_type {
            WireType::Varint => {
                let value = decode_varint(rest)?;
                rest = &rest[value.len..];
                if value.extra > 0 {
                    self.printer.write(format!(" long-form:{}", value.extra));
                }
                let (text, remark) = self.varint_repr(value.value, value.extra, kind.as_ref());
                self.printer.write(format!(" {text}"));
                if let Some(remark) = remark {
                    self.printer.remark(remark);
                }
            }

            WireType::I64 => {
                if rest.len() < 8 {
                    return None;
                }
                let (bytes, tail) = rest.split_at(8);
                rest = tail;
                let bits = u64::from_le_bytes(bytes.try_into().expect("split_at(8)"));
                let (text, remark) = self.fixed64_repr(bits, kind.as_ref());
                self.printer.write(format!(" {text}"));
                if let Some(remark) = remark {
                    self.printer.remark(remark);
                }
            }

            WireType::I32 => {
                if rest.len() < 4 {
                    return None;
                }
                let (bytes, tail) = rest.split_at(4);
                rest = tail;
                let bits = u32::from_le_bytes(bytes.try_into().expect("split_at(4)"));
                let (text, remark) = self.fixed32_repr(bits, kind.as_ref());
                self.printer.write(format!(" {text}"));
                if let Some(remark) = remark {
                    self.printer.remark(remark);
                }
            }

            WireType::StartGroup => {
                let delimited = !(self.opts.no_groups || self.opts.explicit_wire_types);
                if delimited {
                    self.printer.write(" !{");
                } else {
                    self.printer.write("SGROUP");
                }

                let descriptor = field.as_ref().and_then(schema::submessage);
                let has_desc = descriptor.is_some();
                if let Some(descriptor) = descriptor {
                    self.descs.push(Some(descriptor));
                }

                self.printer.start_block(BlockInfo {
                    has_delimiters: delimited,
                    height_to_fold_at: FOLD_HEIGHT,
                    unindent_at: 1,
                });
                self.groups.push(GroupInfo {
                    field_number,
                    delimited,
                    has_desc,
                });
            }

            WireType::EndGroup => match self.groups.pop() {
                None => self.printer.write("EGROUP"),
                Some(group) if group.field_number == field_number => {
                    if group.has_desc {
                        self.descs.pop();
                    }
                    if group.delimited {
                        // The closing brace stands in for the whole tag.
                        let line = self.printer.current_mut();
                        line.text.clear();
                        if tag.extra > 0 {
                            line.text.push_str(&format!("long-form:{} ", tag.extra));
                        }
                        line.text.push('}');
                    } else {
                        self.printer.write("EGROUP");
                    }
                    self.printer.end_block();
                }
                Some(group) => {
                    trace!(
                        open = group.field_number,
                        closed = field_number,
                        "group closer mismatch; rewriting opener"
                    );
                    self.reset_group(group);
                    self.printer.write("EGROUP");
                }
            },

            WireType::Len => {
                let len = decode_varint(rest)?;
                let payload_len = usize::try_from(len.value).ok()?;
                let after = &rest[len.len..];
                if after.len() < payload_len {
                    return None;
                }
                let (payload, tail) = after.split_at(payload_len);
                rest = tail;

                if self.opts.explicit_length_prefixes {
                    if !self.opts.explicit_wire_types {
                        self.printer.write("LEN");
                    }
                    if len.extra > 0 {
                        self.printer.write(format!(" long-form:{}", len.extra));
                    }
                    self.printer.write(format!(" {payload_len}"));
                } else {
                    if len.extra > 0 {
                        self.printer.write(format!(" long-form:{}", len.extra));
                    }
                    self.printer.write(" {");
                }

                let delimited = !self.opts.explicit_length_prefixes;
                self.printer.start_block(BlockInfo {
                    has_delimiters: delimited,
                    height_to_fold_at: FOLD_HEIGHT,
                    unindent_at: if delimited { 1 } else { 0 },
                });

                self.render_len_payload(payload, field.as_ref());

                if delimited {
                    self.printer.new_line();
                    self.printer.write("}");
                }
                self.printer.end_block();
            }
        }

        Some(rest)
    }

    /// Chooses a rendering for a LEN payload: packed scalars under a
    /// schema, then a speculative message parse, then UTF-8 text, then
    /// hex.
    fn render_len_payload(&mut self, payload: &[u8], field: Option<&FieldDescriptor>) {
        let kind = field.map(|f| f.kind());

        if let Some(kind) = &kind {
            if schema::is_packed_scalar(kind) && self.render_packed(payload, kind) {
                return;
            }
        }

        let prefer_string = matches!(kind, Some(Kind::String));
        if !prefer_string {
            let descriptor = field.and_then(schema::submessage);
            if self.render_message(payload, descriptor) {
                return;
            }
        }

        if !self.opts.no_quoted_strings && self.render_string(payload) {
            return;
        }

        if !payload.is_empty() {
            self.printer.new_line();
            self.dump_hex(payload);
        }
    }

    /// Speculatively decodes `payload` as a message, rolling the printer
    /// back if it does not parse.
    fn render_message(&mut self, payload: &[u8], descriptor: Option<MessageDescriptor>) -> bool {
        let mark = self.printer.mark();
        // The payload's groups are scoped to itself; an inner EGROUP must
        // never close an outer group.
        let outer_groups = std::mem::take(&mut self.groups);
        self.descs.push(descriptor);

        let mut src = payload;
        while !src.is_empty() {
            self.printer.new_line();
            match self.decode_field(src) {
                Some(rest) => src = rest,
                None => {
                    self.printer.discard_line();
                    break;
                }
            }
        }

        let consumed = payload.len() - src.len();
        let accept = src.is_empty() || (self.opts.all_fields_are_messages && consumed > 0);

        if accept {
            self.reset_open_groups(0);
            if !src.is_empty() {
                self.printer.new_line();
                self.dump_hex(src);
            }
        } else {
            trace!(consumed, len = payload.len(), "message speculation rejected");
            while let Some(group) = self.groups.pop() {
                if group.has_desc {
                    self.descs.pop();
                }
            }
            self.printer.reset(mark);
        }

        self.descs.pop();
        self.groups = outer_groups;
        accept
    }

    /// Renders `payload` as a quoted string if it is mostly-graphic UTF-8.
    fn render_string(&mut self, payload: &[u8]) -> bool {
        let Ok(text) = std::str::from_utf8(payload) else {
            return false;
        };

        let runes = text.chars().count();
        if runes > 0 {
            let unprintable = text.chars().filter(|&c| !is_graphic(c)).count();
            if unprintable as f64 / runes as f64 > 0.3 {
                return false;
            }
        }

        let mut segments = Vec::new();
        let mut segment = String::from("\"");
        for (i, c) in text.char_indices() {
            if i != 0 && i % STRING_BYTES_PER_LINE == 0 {
                segment.push('"');
                segments.push(std::mem::replace(&mut segment, String::from("\"")));
            }
            match c {
                '\n' => segment.push_str("\\n"),
                '\\' => segment.push_str("\\\\"),
                '"' => segment.push_str("\\\""),
                c if is_graphic(c) => segment.push(c),
                c => {
                    let mut buf = [0u8; 4];
                    for byte in c.encode_utf8(&mut buf).as_bytes() {
                        segment.push_str(&format!("\\x{byte:02x}"));
                    }
                }
            }
        }
        segment.push('"');
        segments.push(segment);

        for segment in segments {
            self.printer.new_line();
            self.printer.write(segment);
        }
        true
    }

    /// Decodes `payload` as a packed scalar array of `kind`. Nothing is
    /// printed unless the whole payload decodes.
    fn render_packed(&mut self, payload: &[u8], kind: &Kind) -> bool {
        let mut elements: Vec<(String, Option<String>)> = Vec::new();
        let mut src = payload;

        while !src.is_empty() {
            match kind {
                Kind::Fixed64 | Kind::Sfixed64 | Kind::Double => {
                    if src.len() < 8 {
                        return false;
                    }
                    let (bytes, tail) = src.split_at(8);
                    src = tail;
                    let bits = u64::from_le_bytes(bytes.try_into().expect("split_at(8)"));
                    elements.push(self.fixed64_repr(bits, Some(kind)));
                }
                Kind::Fixed32 | Kind::Sfixed32 | Kind::Float => {
                    if src.len() < 4 {
                        return false;
                    }
                    let (bytes, tail) = src.split_at(4);
                    src = tail;
                    let bits = u32::from_le_bytes(bytes.try_into().expect("split_at(4)"));
                    elements.push(self.fixed32_repr(bits, Some(kind)));
                }
                _ => {
                    let Some(value) = decode_varint(src) else {
                        return false;
                    };
                    src = &src[value.len..];
                    let (text, remark) = self.varint_repr(value.value, value.extra, Some(kind));
                    let text = if value.extra > 0 {
                        format!("long-form:{} {text}", value.extra)
                    } else {
                        text
                    };
                    elements.push((text, remark));
                }
            }
        }

        let count = elements.len();
        for (text, remark) in elements {
            self.printer.new_line();
            self.printer.write(text);
            if let Some(remark) = remark {
                self.printer.remark(remark);
            }
        }
        self.printer.fold_into_columns(PACKED_COLUMNS, count);
        true
    }

    /// Rewrites one group that never got its closer: its ` !{` opener
    /// becomes a literal `SGROUP` tag and the block's indentation unwinds.
    fn reset_group(&mut self, group: GroupInfo) {
        let start = self.printer.drop_block();
        if group.delimited {
            let line = self.printer.line_mut(start);
            debug_assert!(line.text.ends_with(" !{"));
            let keep = line.text.len().saturating_sub(3);
            line.text.truncate(keep);
            line.text.push_str("SGROUP");
        }
        if group.has_desc {
            self.descs.pop();
        }
    }

    /// Resets every group above `keep` on the stack.
    fn reset_open_groups(&mut self, keep: usize) {
        while self.groups.len() > keep {
            let group = self.groups.pop().expect("length checked");
            self.reset_group(group);
        }
    }

    /// Emits `bytes` as backtick hex literals, wrapping every
    /// [`HEX_BYTES_PER_LINE`] bytes. The first chunk lands on the current
    /// line.
    fn dump_hex(&mut self, bytes: &[u8]) {
        for (i, chunk) in bytes.chunks(HEX_BYTES_PER_LINE).enumerate() {
            if i > 0 {
                self.printer.new_line();
            }
            self.printer.write(format!("`{}`", hex::encode(chunk)));
        }
    }

    /// The text (and optional remark) for a varint value.
    ///
    /// `extra` guards the `true`/`false` spellings: the boolean keywords
    /// cannot carry a long-form prefix when re-assembled, so non-minimal
    /// bools fall back to integers.
    fn varint_repr(
        &self,
        value: u64,
        extra: usize,
        kind: Option<&Kind>,
    ) -> (String, Option<String>) {
        match kind {
            Some(Kind::Bool) if value <= 1 && extra == 0 => {
                let text = if value == 1 { "true" } else { "false" };
                (text.to_string(), None)
            }
            Some(Kind::Sint32 | Kind::Sint64) => (format!("{}z", unzigzag(value)), None),
            Some(Kind::Uint32 | Kind::Uint64) => (format!("{value}"), None),
            Some(Kind::Enum(descriptor)) => {
                let remark = if self.opts.print_enum_names {
                    descriptor
                        .get_value(value as i32)
                        .map(|v| v.name().to_string())
                } else {
                    None
                };
                (format!("{}", value as i64), remark)
            }
            _ => (format!("{}", value as i64), None),
        }
    }

    /// The text (and optional remark) for an eight-byte field.
    fn fixed64_repr(&self, bits: u64, kind: Option<&Kind>) -> (String, Option<String>) {
        match kind {
            Some(Kind::Fixed64 | Kind::Uint64) => (format!("{bits}i64"), None),
            Some(Kind::Sfixed64 | Kind::Sint64 | Kind::Int64) => {
                (format!("{}i64", bits as i64), None)
            }
            Some(Kind::Enum(descriptor)) => {
                let remark = if self.opts.print_enum_names {
                    descriptor
                        .get_value(bits as i32)
                        .map(|v| v.name().to_string())
                } else {
                    None
                };
                (format!("{}i64", bits as i64), remark)
            }
            kind => {
                let known_float = matches!(kind, Some(Kind::Double | Kind::Float));
                let value = f64::from_bits(bits);
                if value.is_infinite() {
                    let text = if value.is_sign_positive() {
                        "inf64"
                    } else {
                        "-inf64"
                    };
                    (text.to_string(), None)
                } else if value.is_nan() {
                    (format!("0x{bits:x}i64"), None)
                } else if let Some(text) = format_f64(bits, known_float) {
                    (text, Some(format!("0x{bits:x}i64")))
                } else {
                    (format!("{}i64", bits as i64), None)
                }
            }
        }
    }

    /// The text (and optional remark) for a four-byte field.
    fn fixed32_repr(&self, bits: u32, kind: Option<&Kind>) -> (String, Option<String>) {
        match kind {
            Some(Kind::Fixed32 | Kind::Uint32) => (format!("{bits}i32"), None),
            Some(Kind::Sfixed32 | Kind::Sint32 | Kind::Int32) => {
                (format!("{}i32", bits as i32), None)
            }
            Some(Kind::Enum(descriptor)) => {
                let remark = if self.opts.print_enum_names {
                    descriptor
                        .get_value(bits as i32)
                        .map(|v| v.name().to_string())
                } else {
                    None
                };
                (format!("{}i32", bits as i32), remark)
            }
            kind => {
                let known_float = matches!(kind, Some(Kind::Double | Kind::Float));
                let value = f32::from_bits(bits);
                if value.is_infinite() {
                    let text = if value.is_sign_positive() {
                        "inf32"
                    } else {
                        "-inf32"
                    };
                    (text.to_string(), None)
                } else if value.is_nan() {
                    (format!("0x{bits:x}i32"), None)
                } else if let Some(text) = format_f32(bits, known_float) {
                    (format!("{text}i32"), Some(format!("0x{bits:x}i32")))
                } else {
                    (format!("{}i32", bits as i32), None)
                }
            }
        }
    }
}

fn is_graphic(c: char) -> bool {
    !c.is_control()
}
