//! Wildcard byte-pattern compilation and patching.
//!
//! Signatures are written as hex pairs with optional whitespace; `??`
//! marks a wildcard position. A signature/replacement pair scans a buffer
//! for non-overlapping matches and overwrites only the replacement's
//! non-wildcard positions, so surrounding bytes and wildcard holes survive
//! the patch.

use std::{fs, path::Path};

use crate::Result;

/// A compiled byte pattern: values plus a mask marking which positions
/// participate (`false` = wildcard).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    bytes: Vec<u8>,
    mask: Vec<bool>,
}

impl Signature {
    /// Compiles a hex pattern with `??` wildcards.
    ///
    /// Whitespace anywhere in the text is ignored; every remaining pair of
    /// characters is one byte.
    pub fn compile(text: &str) -> Result<Signature> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if !compact.is_ascii() || compact.len() % 2 != 0 {
            return Err(malformed_error!("invalid hex pattern '{}'", text.trim()));
        }

        let mut bytes = Vec::with_capacity(compact.len() / 2);
        let mut mask = Vec::with_capacity(compact.len() / 2);
        for pair in compact.as_bytes().chunks_exact(2) {
            if pair == b"??" {
                bytes.push(0);
                mask.push(false);
                continue;
            }
            let digits = std::str::from_utf8(pair).unwrap_or_default();
            let byte = u8::from_str_radix(digits, 16)
                .map_err(|_| malformed_error!("invalid hex pair '{}' in pattern", digits))?;
            bytes.push(byte);
            mask.push(true);
        }

        Ok(Signature { bytes, mask })
    }

    /// Number of byte positions in the pattern.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the pattern has no positions at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Scans `data` for the signature and patches each non-overlapping match.
///
/// A replacement longer than its signature is reported but still applied
/// with the supplied lengths; writes are bounded by the end of the buffer.
/// After a match the scan resumes past the consumed window. Returns the
/// number of windows patched.
pub fn apply(data: &mut [u8], signature: &Signature, replacement: &Signature) -> usize {
    if signature.is_empty() || signature.len() > data.len() {
        return 0;
    }
    if replacement.len() > signature.len() {
        log::warn!(
            "replacement must be no larger than signature ({} > {} bytes)",
            replacement.len(),
            signature.len()
        );
    }

    let mut patched = 0;
    let mut pos = 0;
    while pos + signature.len() <= data.len() {
        let matches = signature
            .bytes
            .iter()
            .zip(&signature.mask)
            .enumerate()
            .all(|(i, (byte, &masked))| !masked || data[pos + i] == *byte);
        if !matches {
            pos += 1;
            continue;
        }

        for i in 0..replacement.len() {
            if replacement.mask[i] && pos + i < data.len() {
                data[pos + i] = replacement.bytes[i];
            }
        }
        patched += 1;
        pos += signature.len();
    }

    patched
}

/// One signature/replacement pair from a patch list file.
#[derive(Debug, Clone)]
pub struct PatchPair {
    /// The pattern to search for.
    pub signature: Signature,
    /// The bytes to write at each match.
    pub replacement: Signature,
    /// The signature's source text, kept for diagnostics.
    pub text: String,
}

/// Loads a patch list: paired lines of signature then replacement, with
/// blank lines and `//` comments skipped.
pub fn load_patches(path: &Path) -> Result<Vec<PatchPair>> {
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines().filter(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !trimmed.starts_with("//")
    });

    let mut pairs = Vec::new();
    while let Some(signature_line) = lines.next() {
        let Some(replacement_line) = lines.next() else {
            log::warn!("patch list ends with an unpaired signature line");
            break;
        };
        pairs.push(PatchPair {
            signature: Signature::compile(signature_line)?,
            replacement: Signature::compile(replacement_line)?,
            text: signature_line.trim().to_string(),
        });
    }

    Ok(pairs)
}
