//! wiredump — print the field structure of length-prefixed wire data.
//!
//! Walks a buffer tag by tag without a schema: varints print as numbers,
//! fixed-width values as both integer and float reinterpretations, and
//! length-delimited payloads as nested records when they parse cleanly as
//! one, else as text or hex.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use fastwire::wire::varint::{read_size, read_varint};

#[derive(Parser)]
#[command(name = "wiredump", version, about = "Dump length-prefixed wire data as a field tree")]
struct Args {
    /// Input file; reads stdin when omitted.
    input: Option<PathBuf>,

    /// Nesting depth at which delimited payloads stop being explored.
    #[arg(long, default_value_t = 32)]
    max_depth: u32,

    /// Print delimited payloads as hex even when they look like text.
    #[arg(long)]
    hex: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let data = match &args.input {
        Some(path) => {
            fs::read(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };
    if !dump(&data, 0, args.max_depth, args.hex) {
        bail!("input is not a well-formed record");
    }
    Ok(())
}

/// Print the record in `buf` at the given indent level.  Returns `false`
/// when the buffer does not parse as a sequence of fields.
fn dump(buf: &[u8], indent: u32, max_depth: u32, force_hex: bool) -> bool {
    let mut pos = 0usize;
    while pos < buf.len() {
        let Some((tag, next)) = read_varint(buf, pos) else {
            return false;
        };
        let field = tag >> 3;
        let wiretype = tag & 7;
        if field == 0 {
            return false;
        }
        let pad = "  ".repeat(indent as usize);
        pos = next;
        match wiretype {
            0 => {
                let Some((value, next)) = read_varint(buf, pos) else {
                    return false;
                };
                println!("{pad}{field}: varint {value}");
                pos = next;
            }
            1 => {
                let Some(bytes) = buf.get(pos..pos + 8) else {
                    return false;
                };
                let raw = u64::from_le_bytes(bytes.try_into().unwrap());
                println!("{pad}{field}: fixed64 {raw} ({})", f64::from_bits(raw));
                pos += 8;
            }
            5 => {
                let Some(bytes) = buf.get(pos..pos + 4) else {
                    return false;
                };
                let raw = u32::from_le_bytes(bytes.try_into().unwrap());
                println!("{pad}{field}: fixed32 {raw} ({})", f32::from_bits(raw));
                pos += 4;
            }
            2 => {
                let Some((size, next)) = read_size(buf, pos) else {
                    return false;
                };
                let Some(payload) = buf.get(next..next + size) else {
                    return false;
                };
                print_delimited(field, payload, &pad, indent, max_depth, force_hex);
                pos = next + size;
            }
            // Groups are rare enough that the dump just names their extent.
            3 => println!("{pad}{field}: group start"),
            4 => println!("{pad}{field}: group end"),
            _ => return false,
        }
    }
    true
}

fn print_delimited(
    field: u64,
    payload: &[u8],
    pad: &str,
    indent: u32,
    max_depth: u32,
    force_hex: bool,
) {
    if !payload.is_empty() && indent < max_depth && parses_as_record(payload) {
        println!("{pad}{field}: record ({} bytes) {{", payload.len());
        let ok = dump(payload, indent + 1, max_depth, force_hex);
        debug_assert!(ok);
        println!("{pad}}}");
        return;
    }
    match core::str::from_utf8(payload) {
        Ok(text) if !force_hex && text.chars().all(|c| !c.is_control() || c == '\n') => {
            println!("{pad}{field}: \"{}\"", text.escape_default());
        }
        _ => {
            let hex: String = payload.iter().map(|b| format!("{b:02x}")).collect();
            println!("{pad}{field}: bytes {hex}");
        }
    }
}

/// Whether `buf` parses cleanly as a flat field sequence.
fn parses_as_record(buf: &[u8]) -> bool {
    let mut pos = 0usize;
    while pos < buf.len() {
        let Some((tag, next)) = read_varint(buf, pos) else {
            return false;
        };
        if tag >> 3 == 0 {
            return false;
        }
        pos = next;
        match tag & 7 {
            0 => match read_varint(buf, pos) {
                Some((_, next)) => pos = next,
                None => return false,
            },
            1 => pos += 8,
            5 => pos += 4,
            2 => match read_size(buf, pos) {
                Some((size, next)) if next + size <= buf.len() => pos = next + size,
                _ => return false,
            },
            _ => return false,
        }
        if pos > buf.len() {
            return false;
        }
    }
    true
}
