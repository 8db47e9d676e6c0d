//! End-to-end address mapping: stub scan, symbol resolution, script
//! emission.
//!
//! Exercises the same chain the orchestrator runs when address mapping is
//! enabled, with the compiler's `strings` output replaced by a canned
//! symbol stream.

use std::fs;

use sectweave::gen;
use sectweave::resolve::{self, ResolvedSymbols, ScoreWeight};
use sectweave::scan::{self, DeclaredSymbols};

const STUB: &str = "namespace Foo {\n\
                    \u{20} void Bar(int x) ADDR(0x402000);\n\
                    \u{20} void Baz() ADDR(0x403000);\n\
                    }\n";

const SYMBOL_STREAM: &str = "!some binary noise\n\
                             _ZN3Foo3BarEi\n\
                             _ZN3Foo3BazEv\n\
                             _ZN9Unrelated4FuncEv\n\
                             not a symbol at all\n";

#[test]
fn scans_resolves_and_emits_the_symbol_script() {
    let dir = tempfile::tempdir().unwrap();
    let stub_path = dir.path().join("funcmap.h");
    fs::write(&stub_path, STUB).unwrap();

    let mut declared = DeclaredSymbols::new();
    scan::scan_file(&stub_path, &mut declared).unwrap();

    assert_eq!(declared.len(), 2);
    assert_eq!(declared[&0x402000].qualified_name, "Foo::Bar");
    assert_eq!(declared[&0x402000].mangled, "3Foo3Bar");
    assert_eq!(declared[&0x402000].args, "int");
    assert_eq!(declared[&0x403000].qualified_name, "Foo::Baz");
    assert_eq!(declared[&0x403000].args, "");

    let mut resolved = ResolvedSymbols::new();
    resolve::resolve_stream(
        SYMBOL_STREAM.as_bytes(),
        &declared,
        &mut resolved,
        ScoreWeight::default(),
    )
    .unwrap();

    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[&0x402000].mangled, "_ZN3Foo3BarEi");
    assert_eq!(resolved[&0x403000].mangled, "_ZN3Foo3BazEv");

    let script_path = dir.path().join("symbols.ld");
    gen::write_symbol_script(&script_path, &resolved, &declared).unwrap();
    let script = fs::read_to_string(&script_path).unwrap();

    // the script aliases carry the platform's extra leading underscore
    assert!(script.contains("__ZN3Foo3BarEi = 0x402000;    /* Foo::Bar(int) */"));
    assert!(script.contains("__ZN3Foo3BazEv = 0x403000;    /* Foo::Baz() */"));
}

#[test]
fn both_score_weights_agree_on_clear_winners() {
    let dir = tempfile::tempdir().unwrap();
    let stub_path = dir.path().join("funcmap.h");
    fs::write(&stub_path, STUB).unwrap();

    let mut declared = DeclaredSymbols::new();
    scan::scan_file(&stub_path, &mut declared).unwrap();

    for weight in [ScoreWeight::Flat, ScoreWeight::ArgLength] {
        let mut resolved = ResolvedSymbols::new();
        resolve::resolve_stream(SYMBOL_STREAM.as_bytes(), &declared, &mut resolved, weight)
            .unwrap();

        assert_eq!(resolved[&0x402000].mangled, "_ZN3Foo3BarEi");
        assert_eq!(resolved[&0x403000].mangled, "_ZN3Foo3BazEv");
    }
}
