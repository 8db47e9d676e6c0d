//! Scanning stub headers for declared hook addresses.
//!
//! Stub files look like ordinary C++ headers: `namespace`/`class`/`struct`
//! blocks containing function declarations whose statement ends in an
//! `ADDR(0x...)` marker. The scanner splits the text into `;`-terminated
//! chunks, tracks scope nesting with an explicit stack keyed by brace depth,
//! and matches each chunk against the declaration grammar
//! `[qualifiers] NAME(ARGS) ADDR(0xHEX)` anchored at the end of the chunk.
//!
//! Matching is entirely hand-rolled; the grammar is small enough that a
//! cursor over the chunk bytes beats pulling in a pattern engine.

use std::{collections::BTreeMap, fs, path::Path};

use crate::{mangle, Error, Result};

/// Chunks longer than this are still counted for braces but never matched
/// as declarations.
const MAX_DECLARATION_LEN: usize = 1024;

/// Scope keywords that open a named nesting level.
const SCOPE_KEYWORDS: [&str; 3] = ["namespace", "class", "struct"];

/// One entry of the scanner's scope stack.
///
/// `depth` records the brace depth at the moment the scope opener was seen;
/// the frame pops when a closing brace returns the depth to that value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFrame {
    /// Name of the namespace, class or struct.
    pub name: String,
    /// Brace depth recorded when the frame was pushed.
    pub depth: i32,
}

/// A hook declaration recovered from stub text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredSymbol {
    /// `::`-qualified function name.
    pub qualified_name: String,
    /// Canonical argument rendering, empty for `()`.
    pub args: String,
    /// Declared hook address.
    pub address: u32,
    /// Synthetic mangled name derived from the scope stack.
    pub mangled: String,
}

/// Declared symbols keyed by address; the ordering keeps every later pass
/// over the table deterministic.
pub type DeclaredSymbols = BTreeMap<u32, DeclaredSymbol>;

/// Scans one stub file into the declared-symbol table.
///
/// # Errors
///
/// Returns [`Error::DuplicateAddress`] when two declarations in this file
/// claim the same address. Scanning of the file stops there; declarations
/// registered before the collision stay in the table.
pub fn scan_file(path: &Path, table: &mut DeclaredSymbols) -> Result<()> {
    let text = fs::read_to_string(path)?;
    scan_text(&path.display().to_string(), &text, table)
}

/// Scans stub text into the declared-symbol table.
///
/// `origin` names the source in diagnostics.
pub fn scan_text(origin: &str, text: &str, table: &mut DeclaredSymbols) -> Result<()> {
    let mut scopes: Vec<ScopeFrame> = Vec::new();
    let mut depth = 0i32;

    for raw in text.split(';') {
        let chunk: String = raw
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();

        let mut prev = 0;
        for (end, name) in find_scope_openers(&chunk) {
            scopes.push(ScopeFrame { name, depth });
            count_braces(&chunk[prev..end], &mut depth, &mut scopes);
            prev = end;
        }
        count_braces(&chunk[prev..], &mut depth, &mut scopes);

        if chunk.len() > MAX_DECLARATION_LEN {
            continue;
        }
        let Some((name, raw_args, address)) = match_declaration(&chunk) else {
            continue;
        };

        let (mangled, qualified) = mangle::mangle(&scopes, &name);
        let args = mangle::canonical_args(&raw_args);

        if let Some(existing) = table.get(&address) {
            log::warn!(
                "function '{}' has same address as '{}': 0x{:x}",
                qualified,
                existing.qualified_name,
                address
            );
            return Err(Error::DuplicateAddress {
                address,
                existing: existing.qualified_name.clone(),
                duplicate: qualified,
            });
        }

        log::info!(
            "registering function '{}'({}) at 0x{:x}\t{}",
            qualified,
            args,
            address,
            mangled
        );
        table.insert(
            address,
            DeclaredSymbol {
                qualified_name: qualified,
                args,
                address,
                mangled,
            },
        );
    }

    if depth != 0 {
        log::warn!("unbalanced braces in {origin} detected! {depth}");
    }

    Ok(())
}

/// Counts braces over a chunk segment, popping scope frames whose recorded
/// depth is reached again.
fn count_braces(segment: &str, depth: &mut i32, scopes: &mut Vec<ScopeFrame>) {
    for c in segment.chars() {
        match c {
            '{' => *depth += 1,
            '}' => {
                *depth -= 1;
                if scopes.last().is_some_and(|frame| frame.depth == *depth) {
                    scopes.pop();
                }
            }
            _ => {}
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn ident_end(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && is_ident_char(bytes[pos]) {
        pos += 1;
    }
    pos
}

/// Finds `namespace|class|struct IDENT {` openers, returning for each the
/// byte position just past the `{` and the scope name.
fn find_scope_openers(chunk: &str) -> Vec<(usize, String)> {
    let bytes = chunk.as_bytes();
    let mut openers = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if !is_ident_start(bytes[pos]) || (pos > 0 && is_ident_char(bytes[pos - 1])) {
            pos += 1;
            continue;
        }
        let word_end = ident_end(bytes, pos);
        let Ok(word) = std::str::from_utf8(&bytes[pos..word_end]) else {
            pos = word_end;
            continue;
        };
        if !SCOPE_KEYWORDS.contains(&word) {
            pos = word_end;
            continue;
        }

        let name_start = skip_whitespace(bytes, word_end);
        if name_start == word_end || name_start >= bytes.len() || !is_ident_start(bytes[name_start])
        {
            pos = word_end;
            continue;
        }
        let name_end = ident_end(bytes, name_start);
        let brace = skip_whitespace(bytes, name_end);
        if brace >= bytes.len() || bytes[brace] != b'{' {
            pos = word_end;
            continue;
        }

        let name = String::from_utf8_lossy(&bytes[name_start..name_end]).into_owned();
        openers.push((brace + 1, name));
        pos = brace + 1;
    }

    openers
}

/// Matches `[qualifiers] NAME(ARGS) ADDR(0xHEX)` anchored at end of chunk.
///
/// `NAME` may carry a leading `~` and must be preceded by whitespace,
/// `ARGS` is paren-free, and the address carries 6 to 8 hex digits.
fn match_declaration(chunk: &str) -> Option<(String, String, u32)> {
    let bytes = chunk.trim_end().as_bytes();
    if bytes.last() != Some(&b')') {
        return None;
    }
    let close = bytes.len() - 1;

    let mut hex_start = close;
    while hex_start > 0 && bytes[hex_start - 1].is_ascii_hexdigit() {
        hex_start -= 1;
    }
    let digits = close - hex_start;
    if !(6..=8).contains(&digits) {
        return None;
    }

    let marker_start = hex_start.checked_sub(7)?;
    if &bytes[marker_start..hex_start] != b"ADDR(0x" {
        return None;
    }
    let address =
        u32::from_str_radix(std::str::from_utf8(&bytes[hex_start..close]).ok()?, 16).ok()?;

    // optional whitespace between the argument list and the marker
    let mut pos = marker_start;
    while pos > 0 && bytes[pos - 1].is_ascii_whitespace() {
        pos -= 1;
    }
    if pos == 0 || bytes[pos - 1] != b')' {
        return None;
    }
    let args_close = pos - 1;

    let mut args_open = args_close;
    loop {
        if args_open == 0 {
            return None;
        }
        args_open -= 1;
        match bytes[args_open] {
            b'(' => break,
            b')' => return None,
            _ => {}
        }
    }
    let args = std::str::from_utf8(&bytes[args_open + 1..args_close])
        .ok()?
        .to_string();

    let mut ident_start = args_open;
    while ident_start > 0 && is_ident_char(bytes[ident_start - 1]) {
        ident_start -= 1;
    }
    if ident_start == args_open || bytes[ident_start].is_ascii_digit() {
        return None;
    }

    let name_start = if ident_start > 0 && bytes[ident_start - 1] == b'~' {
        ident_start - 1
    } else {
        ident_start
    };
    if name_start == 0 || !bytes[name_start - 1].is_ascii_whitespace() {
        return None;
    }

    let name = std::str::from_utf8(&bytes[name_start..args_open])
        .ok()?
        .to_string();
    Some((name, args, address))
}
