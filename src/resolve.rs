//! Correlating declared hooks with compiler-produced symbols.
//!
//! Candidate symbols harvested from compiled artifacts are scored against
//! every declared hook: containing the synthetic mangled name is worth one
//! point, a demangled rendering containing the qualified name another, and
//! a contained canonical argument list a third increment whose weight is
//! selectable (see [`ScoreWeight`]). The best-scoring declaration wins the
//! candidate, and a candidate claims an address only with a strictly higher
//! score than the resolution already stored there; ties keep the earliest
//! mapping stable.

use std::{collections::BTreeMap, io::BufRead};

use crate::{
    demangle::demangle,
    scan::{DeclaredSymbol, DeclaredSymbols},
    Result,
};

/// Prefix of a compiler-mangled symbol; only lines carrying it are scored.
pub const MANGLED_PREFIX: &str = "_Z";

/// Weight of the argument-list similarity increment.
///
/// Both variants order matches identically when argument lists are equal;
/// they differ in how strongly an argument match separates near-equal
/// candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreWeight {
    /// A matched argument list adds a flat point.
    Flat,
    /// A matched argument list adds its rendered length.
    #[default]
    ArgLength,
}

/// A declared address with the real mangled symbol chosen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol {
    /// The declared hook address.
    pub address: u32,
    /// The real mangled name selected for this address.
    pub mangled: String,
    /// Similarity score of the winning candidate.
    pub similarity: usize,
}

/// Resolutions keyed by address.
pub type ResolvedSymbols = BTreeMap<u32, ResolvedSymbol>;

/// Scores one candidate symbol against one declaration.
pub fn similarity(candidate: &str, declared: &DeclaredSymbol, weight: ScoreWeight) -> usize {
    if !candidate.contains(&declared.mangled) {
        return 0;
    }
    let mut score = 1;

    let demangled = demangle(candidate);
    if !demangled.contains(&declared.qualified_name) {
        return score;
    }
    score += 1;

    let args = if declared.args.is_empty() {
        "()"
    } else {
        declared.args.as_str()
    };
    if demangled.contains(args) {
        score += match weight {
            ScoreWeight::Flat => 1,
            ScoreWeight::ArgLength => args.len(),
        };
    }

    score
}

/// Finds the best-scoring declaration for a candidate symbol.
///
/// Declarations are visited in address order; a later declaration only
/// displaces an earlier one with a strictly greater score, so equal-scoring
/// candidates resolve to the lowest address deterministically. Returns
/// `None` when every declaration scores zero.
pub fn best_match(
    candidate: &str,
    declared: &DeclaredSymbols,
    weight: ScoreWeight,
) -> Option<(u32, usize)> {
    let mut best: Option<(u32, usize)> = None;
    for (address, symbol) in declared {
        let score = similarity(candidate, symbol, weight);
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((*address, score));
        }
    }
    best
}

/// Offers one candidate symbol to the resolution table.
///
/// Candidates without the mangled prefix are ignored. A stored resolution
/// is replaced only when the new candidate differs and scores strictly
/// higher.
pub fn offer(
    candidate: &str,
    declared: &DeclaredSymbols,
    resolved: &mut ResolvedSymbols,
    weight: ScoreWeight,
) {
    if !candidate.starts_with(MANGLED_PREFIX) {
        return;
    }
    let Some((address, score)) = best_match(candidate, declared, weight) else {
        return;
    };
    let declaration = &declared[&address];

    match resolved.get_mut(&address) {
        Some(existing) => {
            if existing.mangled != candidate && existing.similarity < score {
                log::info!(
                    "found better mangled version of '{}({})': '{}' at 0x{:x}",
                    declaration.qualified_name,
                    declaration.args,
                    candidate,
                    address
                );
                *existing = ResolvedSymbol {
                    address,
                    mangled: candidate.to_string(),
                    similarity: score,
                };
            }
        }
        None => {
            log::info!(
                "found mangled version of '{}({})': '{}' at 0x{:x}",
                declaration.qualified_name,
                declaration.args,
                candidate,
                address
            );
            resolved.insert(
                address,
                ResolvedSymbol {
                    address,
                    mangled: candidate.to_string(),
                    similarity: score,
                },
            );
        }
    }
}

/// Feeds every line of an extracted-symbols stream into the resolver.
pub fn resolve_stream<R: BufRead>(
    reader: R,
    declared: &DeclaredSymbols,
    resolved: &mut ResolvedSymbols,
    weight: ScoreWeight,
) -> Result<()> {
    for line in reader.lines() {
        let line = line?;
        offer(line.trim_end(), declared, resolved, weight);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(entries: &[(&str, &str, u32, &str)]) -> DeclaredSymbols {
        entries
            .iter()
            .map(|(qualified, args, address, mangled)| {
                (
                    *address,
                    DeclaredSymbol {
                        qualified_name: (*qualified).to_string(),
                        args: (*args).to_string(),
                        address: *address,
                        mangled: (*mangled).to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn containing_candidate_scores_above_zero() {
        let table = declared(&[("Foo::Bar", "int", 0x402000, "3Foo3Bar")]);
        let symbol = &table[&0x402000];

        assert!(similarity("_ZN3Foo3BarEi", symbol, ScoreWeight::ArgLength) > 0);
        assert_eq!(similarity("_ZN3Baz3QuxEi", symbol, ScoreWeight::ArgLength), 0);
    }

    #[test]
    fn full_match_scores_all_three_increments() {
        let table = declared(&[("Foo::Bar", "int", 0x402000, "3Foo3Bar")]);
        let symbol = &table[&0x402000];

        // substring + qualified name + args ("int".len() == 3)
        assert_eq!(similarity("_ZN3Foo3BarEi", symbol, ScoreWeight::ArgLength), 5);
        assert_eq!(similarity("_ZN3Foo3BarEi", symbol, ScoreWeight::Flat), 3);
    }

    #[test]
    fn empty_argument_list_substitutes_parens() {
        let table = declared(&[("Foo::Bar", "", 0x402000, "3Foo3Bar")]);
        let symbol = &table[&0x402000];

        // "()".len() == 2
        assert_eq!(similarity("_ZN3Foo3BarEv", symbol, ScoreWeight::ArgLength), 4);
    }

    #[test]
    fn best_match_prefers_higher_score() {
        let table = declared(&[
            ("Foo::Bar", "int", 0x401000, "3Foo3Bar"),
            ("Foo::Baz", "int", 0x402000, "3Foo3Baz"),
        ]);

        let (address, _) = best_match("_ZN3Foo3BazEi", &table, ScoreWeight::ArgLength).unwrap();
        assert_eq!(address, 0x402000);
    }

    #[test]
    fn zero_similarity_finds_nothing() {
        let table = declared(&[("Foo::Bar", "int", 0x401000, "3Foo3Bar")]);
        assert!(best_match("_ZN5Other4NameEv", &table, ScoreWeight::ArgLength).is_none());
    }

    #[test]
    fn replacement_requires_strictly_greater_score() {
        let table = declared(&[("Foo::Bar", "int", 0x402000, "3Foo3Bar")]);
        let mut resolved = ResolvedSymbols::new();

        // partial match: contains the mangled substring but demangles to a
        // qualified name that does not contain "Foo::Bar"
        offer("_ZN3Foo3Bary3FooEv", &table, &mut resolved, ScoreWeight::ArgLength);
        let first = resolved[&0x402000].clone();

        // equally partial candidate must not displace the stored one
        offer("_ZN3Foo3Barz3FooEv", &table, &mut resolved, ScoreWeight::ArgLength);
        assert_eq!(resolved[&0x402000], first);

        // full match scores higher and takes over
        offer("_ZN3Foo3BarEi", &table, &mut resolved, ScoreWeight::ArgLength);
        assert_eq!(resolved[&0x402000].mangled, "_ZN3Foo3BarEi");
        assert_eq!(resolved[&0x402000].similarity, 5);
    }

    #[test]
    fn non_mangled_lines_are_ignored() {
        let table = declared(&[("Foo::Bar", "int", 0x402000, "3Foo3Bar")]);
        let mut resolved = ResolvedSymbols::new();

        offer("plain text containing 3Foo3Bar", &table, &mut resolved, ScoreWeight::Flat);
        assert!(resolved.is_empty());
    }

    #[test]
    fn stream_resolution_scans_all_lines() {
        let table = declared(&[("Foo::Bar", "int", 0x402000, "3Foo3Bar")]);
        let mut resolved = ResolvedSymbols::new();

        let stream = "garbage\n_ZN3Foo3BarEi\nmore garbage\n";
        resolve_stream(
            stream.as_bytes(),
            &table,
            &mut resolved,
            ScoreWeight::ArgLength,
        )
        .unwrap();

        assert_eq!(resolved[&0x402000].mangled, "_ZN3Foo3BarEi");
    }
}
