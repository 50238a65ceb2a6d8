//! Descriptor bookkeeping for schema-guided disassembly.
//!
//! The disassembler only ever asks one question of a schema: "what kind of
//! field is number N in the message I am currently inside?". This module
//! owns the stack of message contexts that makes the question answerable
//! while groups and length-prefixed payloads nest.

use prost_reflect::{FieldDescriptor, Kind, MessageDescriptor};

/// The stack of message descriptors the walker is currently inside.
///
/// `None` entries represent payloads being decoded without schema
/// knowledge (speculative message parses of unknown fields); they shadow
/// any outer descriptor so nested lookups degrade to schema-free
/// rendering instead of resolving against the wrong message.
#[derive(Debug)]
pub(crate) struct DescriptorStack {
    stack: Vec<Option<MessageDescriptor>>,
}

impl DescriptorStack {
    pub(crate) fn new(root: Option<MessageDescriptor>) -> Self {
        DescriptorStack { stack: vec![root] }
    }

    pub(crate) fn push(&mut self, descriptor: Option<MessageDescriptor>) {
        self.stack.push(descriptor);
    }

    pub(crate) fn pop(&mut self) {
        self.stack.pop().expect("descriptor stack underflow");
    }

    /// Looks up the field descriptor for `number` in the current context.
    ///
    /// Unknown field numbers are non-fatal; the caller degrades to
    /// schema-free rendering.
    pub(crate) fn field(&self, number: u64) -> Option<FieldDescriptor> {
        let current = self.stack.last()?.as_ref()?;
        let number = u32::try_from(number).ok()?;
        current.get_field(number)
    }
}

/// The message type behind a message- or group-typed field.
pub(crate) fn submessage(field: &FieldDescriptor) -> Option<MessageDescriptor> {
    match field.kind() {
        Kind::Message(message) => Some(message),
        _ => None,
    }
}

/// Whether a field's kind is a scalar that can appear packed inside a LEN
/// payload.
pub(crate) fn is_packed_scalar(kind: &Kind) -> bool {
    !matches!(
        kind,
        Kind::String | Kind::Bytes | Kind::Message(_)
    )
}
