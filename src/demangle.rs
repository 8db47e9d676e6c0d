//! Minimal demangling of compiler-produced symbol names.
//!
//! The resolver only needs enough demangling to check whether a candidate
//! symbol renders to something containing a declared qualified name and its
//! canonical argument list. This covers the `_Z` prefix, `N..E` nested
//! length-prefixed names with constructor/destructor markers, and the
//! primitive, pointer and const type codes the stub grammar can produce.
//! Anything outside that subset (substitutions, templates, operator
//! names) returns the input unchanged, which simply scores zero further
//! increments downstream.

/// Demangles a symbol name, returning the input unchanged when it does not
/// parse as a supported mangling.
pub fn demangle(symbol: &str) -> String {
    try_demangle(symbol).unwrap_or_else(|| symbol.to_string())
}

fn try_demangle(symbol: &str) -> Option<String> {
    let bytes = symbol.strip_prefix("_Z")?.as_bytes();
    let mut pos = 0;
    let mut components: Vec<String> = Vec::new();

    if bytes.first() == Some(&b'N') {
        pos += 1;
        // member function cv-qualifiers
        while matches!(bytes.get(pos), Some(b'K') | Some(b'V') | Some(b'r')) {
            pos += 1;
        }
        loop {
            match bytes.get(pos)? {
                b'E' => {
                    pos += 1;
                    break;
                }
                b'C' => {
                    let class = components.last()?.clone();
                    components.push(class);
                    pos += 2;
                }
                b'D' => {
                    let class = components.last()?.clone();
                    components.push(format!("~{class}"));
                    pos += 2;
                }
                c if c.is_ascii_digit() => {
                    let (name, next) = read_source_name(bytes, pos)?;
                    components.push(name);
                    pos = next;
                }
                _ => return None,
            }
        }
    } else {
        let (name, next) = read_source_name(bytes, pos)?;
        components.push(name);
        pos = next;
    }

    let mut params: Vec<String> = Vec::new();
    while pos < bytes.len() {
        let (ty, next) = read_type(bytes, pos)?;
        params.push(ty);
        pos = next;
    }

    let rendered = if params.len() == 1 && params[0] == "void" {
        String::from("()")
    } else {
        format!("({})", params.join(", "))
    };

    Some(format!("{}{}", components.join("::"), rendered))
}

/// Reads a decimal length followed by that many name bytes.
fn read_source_name(bytes: &[u8], mut pos: usize) -> Option<(String, usize)> {
    let start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos == start {
        return None;
    }
    let len: usize = std::str::from_utf8(&bytes[start..pos]).ok()?.parse().ok()?;
    if len == 0 || pos + len > bytes.len() {
        return None;
    }
    let name = std::str::from_utf8(&bytes[pos..pos + len]).ok()?.to_string();
    Some((name, pos + len))
}

fn read_type(bytes: &[u8], pos: usize) -> Option<(String, usize)> {
    match bytes.get(pos)? {
        b'P' => {
            let (inner, next) = read_type(bytes, pos + 1)?;
            Some((format!("{inner}*"), next))
        }
        b'K' => {
            let (inner, next) = read_type(bytes, pos + 1)?;
            Some((format!("{inner} const"), next))
        }
        c if c.is_ascii_digit() => read_source_name(bytes, pos),
        c => {
            let name = primitive(*c)?;
            Some((name.to_string(), pos + 1))
        }
    }
}

fn primitive(code: u8) -> Option<&'static str> {
    Some(match code {
        b'v' => "void",
        b'b' => "bool",
        b'c' => "char",
        b'a' => "signed char",
        b'h' => "unsigned char",
        b's' => "short",
        b't' => "unsigned short",
        b'i' => "int",
        b'j' => "unsigned int",
        b'l' => "long",
        b'm' => "unsigned long",
        b'x' => "long long",
        b'y' => "unsigned long long",
        b'f' => "float",
        b'd' => "double",
        b'e' => "long double",
        b'w' => "wchar_t",
        b'z' => "...",
        _ => return None,
    })
}
