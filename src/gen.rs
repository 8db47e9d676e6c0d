//! Generated build inputs: driver source, linker scripts and definitions.
//!
//! The external toolchain never sees the composer's in-memory state
//! directly; everything crosses over as generated text. This module emits
//! the aggregate section driver (includes plus registry arrays harvested
//! from `PatcherList_` identifiers), the declared-address linker script,
//! the placement script that pins hook slots and the new section at fixed
//! addresses, and the `define.h` produced from the linker's map output.
//! All output is ordered deterministically so repeated runs produce
//! byte-identical build inputs.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use crate::{
    resolve::ResolvedSymbols,
    scan::DeclaredSymbols,
    splice::PlacementSlot,
    Result,
};

/// Identifier prefix marking a registry-array entry in section sources.
const LIST_PREFIX: &str = "PatcherList_";

/// Registry arrays harvested from section sources: list name to element
/// names.
pub type PatcherLists = BTreeMap<String, BTreeSet<String>>;

/// Scans section sources for `PatcherList_<List>[_<element>]` identifiers.
///
/// The first occurrence per line is taken. A bare `PatcherList_<List>`
/// registers the list without adding an element.
pub fn collect_patcher_lists(sources: &[PathBuf]) -> Result<PatcherLists> {
    let mut lists = PatcherLists::new();
    for source in sources {
        let text = match fs::read_to_string(source) {
            Ok(text) => text,
            Err(err) => {
                log::error!("failed to open {}: {}", source.display(), err);
                continue;
            }
        };
        for line in text.lines() {
            if let Some((list, element)) = find_patcher_list(line) {
                let entry = lists.entry(list).or_default();
                if let Some(element) = element {
                    entry.insert(element);
                }
            }
        }
    }
    Ok(lists)
}

/// Matches `PatcherList_<List>[_<element>]` in a line of source text.
fn find_patcher_list(line: &str) -> Option<(String, Option<String>)> {
    let bytes = line.as_bytes();
    let start = line.find(LIST_PREFIX)? + LIST_PREFIX.len();

    // list name: a letter followed by letters and digits
    if start >= bytes.len() || !bytes[start].is_ascii_alphabetic() {
        return None;
    }
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_alphanumeric() {
        end += 1;
    }
    let list = std::str::from_utf8(&bytes[start..end]).ok()?.to_string();

    // optional element name after an underscore
    if end < bytes.len() && bytes[end] == b'_' {
        let elem_start = end + 1;
        if elem_start < bytes.len()
            && (bytes[elem_start].is_ascii_alphabetic() || bytes[elem_start] == b'_')
        {
            let mut elem_end = elem_start + 1;
            while elem_end < bytes.len()
                && (bytes[elem_end].is_ascii_alphanumeric() || bytes[elem_end] == b'_')
            {
                elem_end += 1;
            }
            let element = std::str::from_utf8(&bytes[elem_start..elem_end])
                .ok()?
                .to_string();
            return Some((list, Some(element)));
        }
    }

    Some((list, None))
}

/// Writes the aggregate driver source including every section source and
/// defining the harvested registry arrays.
pub fn write_section_driver(
    path: &Path,
    sources: &[PathBuf],
    lists: &PatcherLists,
) -> Result<()> {
    let mut out = String::new();
    for source in sources {
        out.push_str(&format!("#include \"{}\"\n", source.display()));
    }
    for (list, elements) in lists {
        out.push_str(&format!("void* {list}[] = {{"));
        for element in elements {
            out.push_str(&format!("&{element}, "));
        }
        out.push_str("0};\n");
    }
    fs::write(path, out)?;
    Ok(())
}

/// Writes the declared-address linker script: one alias per resolved
/// symbol, pinning the real mangled name at the declared address.
pub fn write_symbol_script(
    path: &Path,
    resolved: &ResolvedSymbols,
    declared: &DeclaredSymbols,
) -> Result<()> {
    let mut out = String::new();
    for (address, symbol) in resolved {
        let Some(declaration) = declared.get(address) else {
            continue;
        };
        out.push_str(&format!(
            "_{} = 0x{:x};    /* {}({}) */\n",
            symbol.mangled, address, declaration.qualified_name, declaration.args
        ));
    }
    fs::write(path, out)?;
    Ok(())
}

/// Writes the placement linker script pinning every hook slot at its
/// declared address and the new section at its computed base.
pub fn write_patch_script(
    path: &Path,
    slots: &[PlacementSlot],
    section_name: &str,
    section_address: u32,
    artifact: &str,
    section_object: &str,
) -> Result<()> {
    let mut out = String::new();
    out.push_str("OUTPUT_FORMAT(pei-i386)\n");
    out.push_str(&format!("OUTPUT({artifact})\n"));
    out.push_str("SECTIONS {\n");
    for slot in slots {
        out.push_str(&format!(
            "  {} 0x{:x} : SUBALIGN(1) {{\n    {}({})\n  }}\n",
            slot.slot, slot.addr, slot.object, slot.section
        ));
    }
    out.push_str(&format!(
        "  {} 0x{:x}: {{\n    {}\n    *(.data)\n    *(.bss)\n    *(.rdata)\n  }}\n",
        section_name, section_address, section_object
    ));
    out.push_str(
        "  /DISCARD/ : {\n    *(.text)\n    *(.text.startup)\n    *(.rdata$zzz)\n    *(.eh_frame)\n    *(.ctors)\n    *(.reloc)\n  }\n}\n",
    );
    fs::write(path, out)?;
    Ok(())
}

/// Converts a linker map into a header of `#define NAME ADDRESS` lines.
///
/// The `.text.startup` placement yields a `STARTUP` definition; symbol
/// lines below `.text`, `.data` and `.bss` placements become one
/// definition each. The header opens with stringization helpers so the
/// definitions can be pasted into inline assembly.
pub fn parse_map(map_path: &Path, out_path: &Path) -> Result<()> {
    let text = fs::read_to_string(map_path)?;
    let mut out = String::from("#define QUAUX(X) #X\n#define QU(X) QUAUX(X)\n\n");

    let mut in_placed_section = false;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(" .text.startup ") {
            if let Some(address) = rest.split_whitespace().next() {
                out.push_str(&format!("#define STARTUP {address}\n"));
            }
        } else if line.starts_with(" .text ")
            || line.starts_with(" .data ")
            || line.starts_with(" .bss ")
        {
            in_placed_section = true;
            continue;
        }

        if in_placed_section && line.starts_with("  ") {
            let entry = match line.find('(') {
                Some(paren) => &line[..paren],
                None => line,
            };
            let mut words = entry.split_whitespace();
            if let (Some(address), Some(name)) = (words.next(), words.next()) {
                out.push_str(&format!("#define {name} {address}\n"));
            }
            continue;
        }
        in_placed_section = false;
    }

    fs::write(out_path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_list_with_element() {
        assert_eq!(
            find_patcher_list("static int PatcherList_Render_drawHook = 0;"),
            Some(("Render".to_string(), Some("drawHook".to_string())))
        );
    }

    #[test]
    fn finds_bare_list() {
        assert_eq!(
            find_patcher_list("// PatcherList_Render"),
            Some(("Render".to_string(), None))
        );
        assert_eq!(
            find_patcher_list("PatcherList_Render_"),
            Some(("Render".to_string(), None))
        );
    }

    #[test]
    fn list_name_stops_at_underscore() {
        assert_eq!(
            find_patcher_list("PatcherList_Ai_attack_move"),
            Some(("Ai".to_string(), Some("attack_move".to_string())))
        );
    }

    #[test]
    fn no_identifier_no_match() {
        assert_eq!(find_patcher_list("int unrelated = 0;"), None);
        assert_eq!(find_patcher_list("PatcherList_9bad"), None);
    }

    #[test]
    fn map_lines_become_defines() {
        let dir = tempfile::tempdir().unwrap();
        let map_path = dir.path().join("sectmap.txt");
        let out_path = dir.path().join("define.h");

        let map = " .text.startup 0x00403000 0x20 build/section.o\n\
                    \u{20}.text          0x00403100      0x80\n\
                    \u{20} 0x00403100                hook_entry(file.o)\n\
                    \u{20} 0x00403140                helper\n\
                    some unrelated line\n\
                    \u{20} 0x00403180                ignored_after_reset\n";
        fs::write(&map_path, map).unwrap();

        parse_map(&map_path, &out_path).unwrap();
        let text = fs::read_to_string(&out_path).unwrap();

        assert!(text.starts_with("#define QUAUX(X) #X\n#define QU(X) QUAUX(X)\n"));
        assert!(text.contains("#define STARTUP 0x00403000\n"));
        assert!(text.contains("#define hook_entry 0x00403100\n"));
        assert!(text.contains("#define helper 0x00403140\n"));
        assert!(!text.contains("ignored_after_reset"));
    }

    #[test]
    fn driver_lists_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("hooks.cpp");
        fs::write(
            &src,
            "int PatcherList_Render_b;\nint PatcherList_Render_a;\nint PatcherList_Sound;\n",
        )
        .unwrap();

        let lists = collect_patcher_lists(&[src.clone()]).unwrap();
        let driver = dir.path().join("section.cpp");
        write_section_driver(&driver, &[src], &lists).unwrap();

        let text = fs::read_to_string(&driver).unwrap();
        assert!(text.contains("void* Render[] = {&a, &b, 0};"));
        assert!(text.contains("void* Sound[] = {0};"));
    }
}
