//! # wirescope-core
//!
//! A bidirectional translator between a compact text language and the
//! Protobuf wire format.
//!
//! This crate provides the two cores of the translator:
//!
//! - [`assemble`]: read language text and emit a byte sequence, with
//!   precise control over every encoding choice — non-minimal varints,
//!   arbitrary wire-type bits, groups, fixed-width values, and raw hex.
//! - [`disassemble`]: heuristically reconstruct language text from
//!   arbitrary bytes, optionally guided by a schema descriptor, with the
//!   guarantee that re-assembling the output reproduces the input exactly.
//!
//! ## Architecture
//!
//! - [`scanner`]: tokenization with position tracking
//! - [`assembler`]: token stream to bytes
//! - [`disassembler`]: bytes to pretty-printed text
//! - [`wire`]: wire types and the redundancy-aware varint codec
//! - [`error`]: error types and handling
//!
//! ## Example
//!
//! ```
//! use wirescope_core::{assemble, disassemble, WriterOptions};
//!
//! let bytes = assemble("1: 42")?;
//! assert_eq!(bytes, [0x08, 0x2a]);
//!
//! let text = disassemble(&bytes, &WriterOptions::default());
//! assert_eq!(text, "1: 42\n");
//! # Ok::<(), wirescope_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod assembler;
pub mod disassembler;
pub mod error;
pub mod scanner;
pub mod wire;

mod float;
mod printer;

// Re-export primary types for convenience
pub use assembler::{assemble, Assembler};
pub use disassembler::{disassemble, WriterOptions};
pub use error::{Error, Result};
pub use scanner::{Position, Scanner};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The language reference text shown by the CLI's `--spec` flag.
pub const LANGUAGE_TEXT: &str = include_str!("language.txt");
