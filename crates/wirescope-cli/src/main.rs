//! wirescope - inspect binary Protobuf wire data as text, or assemble the
//! text language back into bytes.
//!
//! The default mode disassembles: it reads bytes and prints wirescope
//! text whose re-assembly reproduces the input exactly. `-s` selects the
//! assembly direction.

use anyhow::{Context, Result};
use clap::Parser;
use prost_reflect::{DescriptorPool, MessageDescriptor};
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;
use wirescope_core::{disassemble, Assembler, WriterOptions, LANGUAGE_TEXT};

/// Inspect binary Protobuf wire data, or assemble wirescope text into it
#[derive(Parser, Debug)]
#[command(name = "wirescope")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input file (defaults to stdin)
    input: Option<PathBuf>,

    /// Treat the input as wirescope source and assemble it to bytes
    #[arg(short = 's', long)]
    assemble: bool,

    /// Output file to use (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Assume no fields in the input contain UTF-8 text
    #[arg(long)]
    no_quoted_strings: bool,

    /// Try really hard to disassemble all length-prefixed fields as
    /// messages
    #[arg(long)]
    all_fields_are_messages: bool,

    /// Emit SGROUP/EGROUP literals instead of !{ ... }
    #[arg(long)]
    no_groups: bool,

    /// Always spell out each field's wire type
    #[arg(long)]
    explicit_wire_types: bool,

    /// Emit literal length prefixes instead of { } delimiters
    #[arg(long)]
    explicit_length_prefixes: bool,

    /// Serialized FileDescriptorSet to read schema information from
    #[arg(long, requires = "message_type", value_name = "PATH")]
    descriptor_set: Option<PathBuf>,

    /// Fully-qualified name of the message type the input encodes
    #[arg(long, requires = "descriptor_set", value_name = "NAME")]
    message_type: Option<String>,

    /// Annotate fields with their schema names
    #[arg(long)]
    print_field_names: bool,

    /// Annotate enum values with their schema names
    #[arg(long)]
    print_enum_names: bool,

    /// Print the language reference through a pager and exit
    #[arg(long)]
    spec: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    if cli.spec {
        return page(LANGUAGE_TEXT);
    }

    let input = read_input(cli.input.as_deref())?;
    debug!("read {} input bytes", input.len());

    let output = if cli.assemble {
        let text = String::from_utf8(input).context("input is not valid UTF-8")?;
        let mut assembler = Assembler::new(&text);
        if let Some(path) = &cli.input {
            assembler = assembler.with_file(path.display().to_string());
        }
        assembler.assemble().context("syntax error")?
    } else {
        let opts = WriterOptions {
            no_quoted_strings: cli.no_quoted_strings,
            all_fields_are_messages: cli.all_fields_are_messages,
            no_groups: cli.no_groups,
            explicit_wire_types: cli.explicit_wire_types,
            explicit_length_prefixes: cli.explicit_length_prefixes,
            schema: load_schema(&cli)?,
            print_field_names: cli.print_field_names,
            print_enum_names: cli.print_enum_names,
        };
        disassemble(&input, &opts).into_bytes()
    };

    write_output(cli.output.as_deref(), &output)
}

/// Reads the whole input stream, from a file or stdin.
fn read_input(path: Option<&std::path::Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => {
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))
        }
        None => {
            let mut buffer = Vec::new();
            io::stdin()
                .read_to_end(&mut buffer)
                .context("failed to read stdin")?;
            Ok(buffer)
        }
    }
}

/// Writes the result to a file or stdout.
fn write_output(path: Option<&std::path::Path>, bytes: &[u8]) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
        }
        None => io::stdout()
            .write_all(bytes)
            .context("failed to write stdout"),
    }
}

/// Resolves `--descriptor-set` + `--message-type` into a root descriptor.
fn load_schema(cli: &Cli) -> Result<Option<MessageDescriptor>> {
    let (Some(path), Some(name)) = (&cli.descriptor_set, &cli.message_type) else {
        return Ok(None);
    };

    let bytes =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let pool = DescriptorPool::decode(bytes.as_slice())
        .with_context(|| format!("{} is not a valid FileDescriptorSet", path.display()))?;
    let message = pool.get_message_by_name(name).with_context(|| {
        format!("message type {name:?} not found in {}", path.display())
    })?;

    debug!("loaded schema for {name}");
    Ok(Some(message))
}

/// Pipes `text` through `$PAGER` (default `less`), printing directly when
/// no pager can be spawned.
fn page(text: &str) -> Result<()> {
    let pager = std::env::var("PAGER").unwrap_or_else(|_| "less".to_string());
    let mut words = pager.split_whitespace();
    let Some(program) = words.next() else {
        io::stdout().write_all(text.as_bytes())?;
        return Ok(());
    };

    match Command::new(program)
        .args(words)
        .stdin(Stdio::piped())
        .spawn()
    {
        Ok(mut child) => {
            if let Some(stdin) = child.stdin.as_mut() {
                // A pager quitting early closes the pipe; that's fine.
                let _ = stdin.write_all(text.as_bytes());
            }
            let _ = child.wait();
            Ok(())
        }
        Err(_) => {
            io::stdout().write_all(text.as_bytes())?;
            Ok(())
        }
    }
}
