//! Synthetic name mangling for declared hook functions.
//!
//! The composer never sees the real compiler's mangled output until it
//! harvests symbols from compiled artifacts. To correlate the two sides it
//! derives a synthetic mangled name from each declaration: every enclosing
//! scope contributes its length-prefixed name, folded around the
//! length-prefixed function name. A function named like its innermost scope
//! folds as a constructor (`C`), a `~`-prefixed match as a destructor (`D`).
//! The real compiler's output is expected to *contain* this synthetic form
//! as a substring, which is what the resolver scores on.
//!
//! Argument lists are canonicalized into the rendering a demangler produces
//! (`unsigned` prefix, `const` after the type when a pointer follows), not
//! into a low-level type encoding.

use crate::scan::ScopeFrame;

fn plus_length(s: &str) -> String {
    format!("{}{}", s.len(), s)
}

/// Mangles a function name within its scope stack.
///
/// Returns the synthetic mangled name and the `::`-qualified name. The
/// stack is ordered outermost first, as the scanner maintains it.
pub fn mangle(scopes: &[ScopeFrame], func: &str) -> (String, String) {
    let mut mangled = plus_length(func);
    let mut qualified = func.to_string();

    for (position, frame) in scopes.iter().rev().enumerate() {
        if position == 0 {
            if frame.name == func {
                mangled = String::from("C");
            } else if func.strip_prefix('~') == Some(frame.name.as_str()) {
                mangled = String::from("D");
            }
        }
        mangled = format!("{}{}", plus_length(&frame.name), mangled);
        qualified = format!("{}::{}", frame.name, qualified);
    }

    (mangled, qualified)
}

/// Canonicalizes a raw argument list into its demangler-style rendering.
///
/// Each comma-separated argument may carry an optional `const`, an optional
/// `unsigned`, a type identifier or `...`, an optional `*`, and a trailing
/// parameter name which is dropped. An empty list renders as an empty
/// string; the resolver substitutes `"()"` where needed.
pub fn canonical_args(raw: &str) -> String {
    let mut rendered = Vec::new();

    for piece in raw.split(',') {
        let spaced = piece.replace('*', " * ");
        let words: Vec<&str> = spaced.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        let mut index = 0;
        let is_const = words[index] == "const";
        if is_const {
            index += 1;
        }

        let mut is_unsigned = false;
        if index < words.len()
            && words[index] == "unsigned"
            && index + 1 < words.len()
            && is_type_word(words[index + 1])
        {
            is_unsigned = true;
            index += 1;
        }

        if index >= words.len() || !is_type_word(words[index]) {
            continue;
        }
        let base = words[index];
        index += 1;

        let is_ptr = index < words.len() && words[index] == "*";

        let mut arg = String::new();
        if is_unsigned {
            arg.push_str("unsigned ");
        }
        arg.push_str(base);
        if is_const && is_ptr {
            arg.push_str(" const");
        }
        if is_ptr {
            arg.push('*');
        }
        rendered.push(arg);
    }

    rendered.join(", ")
}

fn is_type_word(word: &str) -> bool {
    word == "..."
        || word
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes(names: &[&str]) -> Vec<ScopeFrame> {
        names
            .iter()
            .enumerate()
            .map(|(depth, name)| ScopeFrame {
                name: (*name).to_string(),
                depth: depth as i32,
            })
            .collect()
    }

    #[test]
    fn plain_function_folds_length_prefixed_scopes() {
        let (mangled, qualified) = mangle(&scopes(&["Foo"]), "Bar");
        assert_eq!(mangled, "3Foo3Bar");
        assert_eq!(qualified, "Foo::Bar");

        let (mangled, qualified) = mangle(&scopes(&["Outer", "Inner"]), "run");
        assert_eq!(mangled, "5Outer5Inner3run");
        assert_eq!(qualified, "Outer::Inner::run");
    }

    #[test]
    fn free_function_is_just_length_prefixed() {
        let (mangled, qualified) = mangle(&[], "main");
        assert_eq!(mangled, "4main");
        assert_eq!(qualified, "main");
    }

    #[test]
    fn constructor_abbreviates_to_c() {
        let (mangled, qualified) = mangle(&scopes(&["Ns", "Widget"]), "Widget");
        assert_eq!(mangled, "2Ns6WidgetC");
        assert_eq!(qualified, "Ns::Widget::Widget");
    }

    #[test]
    fn destructor_abbreviates_to_d() {
        let (mangled, qualified) = mangle(&scopes(&["Widget"]), "~Widget");
        assert_eq!(mangled, "6WidgetD");
        assert_eq!(qualified, "Widget::~Widget");
    }

    #[test]
    fn ctor_abbreviation_only_applies_to_innermost_scope() {
        // `Foo` matches the outer scope, not the innermost one
        let (mangled, _) = mangle(&scopes(&["Foo", "Bar"]), "Foo");
        assert_eq!(mangled, "3Foo3Bar3Foo");
    }

    #[test]
    fn mangling_is_deterministic() {
        let stack = scopes(&["Game", "Sim"]);
        let first = mangle(&stack, "Update");
        let second = mangle(&stack, "Update");
        assert_eq!(first, second);
    }

    #[test]
    fn arguments_render_like_a_demangler() {
        assert_eq!(canonical_args("int x"), "int");
        assert_eq!(canonical_args("const char* str"), "char const*");
        assert_eq!(canonical_args("unsigned int a, float b"), "unsigned int, float");
        assert_eq!(canonical_args("char* dst, const char* src"), "char*, char const*");
        assert_eq!(canonical_args("..."), "...");
        assert_eq!(canonical_args(""), "");
    }

    #[test]
    fn bare_unsigned_is_its_own_type() {
        assert_eq!(canonical_args("unsigned"), "unsigned");
        assert_eq!(canonical_args("unsigned x"), "unsigned x");
    }
}
