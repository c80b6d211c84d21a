//! Deciding whether two type or method names may stand in for each other.
//!
//! Support frameworks expose some framework types under a projected name
//! (`System.Collections.Generic.IList`1` is `Windows.Foundation.Collections.IVector`1`). The
//! alias tables below list those pairs; [`types_equivalent`] compares two full type names
//! against them, recursing into generic arguments, and [`methods_equivalent`] does the same for
//! method names.
//!
//! # Example
//!
//! ```rust
//! use refrewrite::rewrite::equivalence::{template_arguments, types_equivalent};
//!
//! assert!(types_equivalent(
//!     "System.Collections.Generic.IList`1<System.Uri>",
//!     "Windows.Foundation.Collections.IVector`1<Windows.Foundation.Uri>",
//! ));
//! assert_eq!(
//!     template_arguments("IMap`2<System.Int32,IVector`1<System.Int32>>")?,
//!     vec!["System.Int32", "IVector`1<System.Int32>"]
//! );
//! # Ok::<(), refrewrite::Error>(())
//! ```

use std::{collections::HashSet, sync::OnceLock};

use crate::{Error, Result};

/// Framework types and their projected counterparts
const TYPE_ALIASES: [(&str, &str); 20] = [
    ("System.Collections.Generic.IReadOnlyList", "Windows.Foundation.Collections.IVectorView"),
    ("System.Collections.Generic.IEnumerable", "Windows.Foundation.Collections.IIterable"),
    ("System.Collections.Generic.KeyValuePair", "Windows.Foundation.Collections.IKeyValuePair"),
    ("System.Collections.Generic.IDictionary", "Windows.Foundation.Collections.IMap"),
    ("System.Collections.Generic.IReadOnlyDictionary", "Windows.Foundation.Collections.IMapView"),
    ("System.Collections.Generic.IList", "Windows.Foundation.Collections.IVector"),
    (
        "System.Runtime.InteropServices.WindowsRuntime.EventRegistrationToken",
        "Windows.Foundation.EventRegistrationToken",
    ),
    ("System.DateTimeOffset", "Windows.Foundation.DateTime"),
    ("System.TimeSpan", "Windows.Foundation.TimeSpan"),
    ("System.Exception", "Windows.Foundation.HResult"),
    ("System.Uri", "Windows.Foundation.Uri"),
    ("System.EventHandler", "Windows.Foundation.EventHandler"),
    ("System.Nullable", "Windows.Foundation.IReference"),
    (
        "System.Collections.Specialized.INotifyCollectionChanged",
        "Windows.UI.Xaml.Interop.INotifyCollectionChanged",
    ),
    ("System.Collections.IList", "Windows.UI.Xaml.Interop.IBindableVector"),
    ("System.Collections.IEnumerable", "Windows.UI.Xaml.Interop.IBindableIterable"),
    (
        "System.Collections.Specialized.NotifyCollectionChangedAction",
        "Windows.UI.Xaml.Interop.NotifyCollectionChangedAction",
    ),
    (
        "System.Collections.Specialized.NotifyCollectionChangedEventHandler",
        "Windows.UI.Xaml.Interop.NotifyCollectionChangedEventHandler",
    ),
    (
        "System.Collections.Specialized.NotifyCollectionChangedEventArgs",
        "Windows.UI.Xaml.Interop.NotifyCollectionChangedEventArgs",
    ),
    ("System.Type", "Windows.UI.Xaml.Interop.TypeName"),
];

/// Methods that are known under another name on the support framework
const METHOD_ALIASES: [(&str, &str); 1] = [("Dispose", "Close")];

static TYPE_ALIAS_SET: OnceLock<HashSet<(&'static str, &'static str)>> = OnceLock::new();
static METHOD_ALIAS_SET: OnceLock<HashSet<(&'static str, &'static str)>> = OnceLock::new();

/// Both orientations of every pair, so lookups need a single check
fn symmetric(pairs: &[(&'static str, &'static str)]) -> HashSet<(&'static str, &'static str)> {
    pairs
        .iter()
        .flat_map(|&(a, b)| [(a, b), (b, a)])
        .collect()
}

fn type_aliases() -> &'static HashSet<(&'static str, &'static str)> {
    TYPE_ALIAS_SET.get_or_init(|| symmetric(&TYPE_ALIASES))
}

fn method_aliases() -> &'static HashSet<(&'static str, &'static str)> {
    METHOD_ALIAS_SET.get_or_init(|| symmetric(&METHOD_ALIASES))
}

/// Returns true if the two names form a pair of the type alias table
#[must_use]
pub fn are_type_aliases(a: &str, b: &str) -> bool {
    type_aliases().contains(&(a, b))
}

/// Returns true if two method names are identical or listed as aliases
#[must_use]
pub fn methods_equivalent(a: &str, b: &str) -> bool {
    a == b || method_aliases().contains(&(a, b))
}

/// Returns true if two full type names denote interchangeable types.
///
/// Identical names are always equivalent. Otherwise both names are split into a base name
/// (without generic arity suffix), their generic arguments and whatever follows the arguments
/// (`[]`, `&`, `*`). The suffixes must be identical, the base names must be equal or aliases,
/// and the arguments must match pairwise, again by identity or equivalence. A name with
/// unbalanced generic brackets is equivalent to nothing but itself.
#[must_use]
pub fn types_equivalent(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }

    let (Ok(left), Ok(right)) = (GenericName::parse(a), GenericName::parse(b)) else {
        return false;
    };
    if left.suffix != right.suffix || left.arguments.len() != right.arguments.len() {
        return false;
    }

    left.arguments
        .iter()
        .zip(&right.arguments)
        .all(|(x, y)| types_equivalent(x, y))
        && (left.base == right.base || are_type_aliases(left.base, right.base))
}

/// A full type name split around its generic template
struct GenericName<'a> {
    /// The name without arity suffix; the whole name if it has no template
    base: &'a str,
    arguments: Vec<String>,
    /// Everything after the closing bracket of the template
    suffix: &'a str,
}

impl<'a> GenericName<'a> {
    fn parse(name: &'a str) -> Result<Self> {
        let Some((backtick, open)) = template_start(name) else {
            return Ok(GenericName {
                base: name,
                arguments: Vec::new(),
                suffix: "",
            });
        };
        let invalid = || Error::InvalidTypeName(name.to_string());

        let mut depth = 0usize;
        let mut close = None;
        for (index, ch) in name[open..].char_indices() {
            match ch {
                '<' => depth += 1,
                '>' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(open + index);
                        break;
                    }
                }
                _ => {}
            }
        }
        let close = close.ok_or_else(invalid)?;
        let suffix = &name[close + 1..];
        if suffix.contains(['<', '>']) {
            return Err(invalid());
        }

        let template = &name[open + 1..close];
        let mut arguments = Vec::new();
        let mut depth = 0usize;
        let mut start = 0;
        for (index, ch) in template.char_indices() {
            match ch {
                '<' => depth += 1,
                '>' => depth -= 1,
                ',' if depth == 0 => {
                    push_argument(&mut arguments, &template[start..index]);
                    start = index + 1;
                }
                _ => {}
            }
        }
        push_argument(&mut arguments, &template[start..]);
        if arguments.is_empty() {
            return Err(invalid());
        }

        Ok(GenericName {
            base: &name[..backtick],
            arguments,
            suffix,
        })
    }
}

/// Positions of the backtick and the opening bracket of the first `` `N< `` in `name`
fn template_start(name: &str) -> Option<(usize, usize)> {
    let bytes = name.as_bytes();
    (0..bytes.len()).find_map(|open| {
        if bytes[open] != b'<' {
            return None;
        }
        let digits = bytes[..open]
            .iter()
            .rev()
            .take_while(|b| b.is_ascii_digit())
            .count();
        let backtick = open.checked_sub(digits + 1)?;
        (digits > 0 && bytes[backtick] == b'`').then_some((backtick, open))
    })
}

/// The top-level generic arguments of a full type name, trimmed, in declaration order.
///
/// Nested instantiations stay whole: `IMap`2<A,IVector`1<B>>` yields `A` and `IVector`1<B>`.
/// Only a bracket directly following a generic arity suffix opens the argument list, so
/// compiler generated names such as `<Get>d__1` have no arguments.
///
/// # Errors
/// Returns [`Error::InvalidTypeName`] if the argument list is empty or its brackets do not
/// balance.
pub fn template_arguments(name: &str) -> Result<Vec<String>> {
    GenericName::parse(name).map(|parsed| parsed.arguments)
}

fn push_argument(arguments: &mut Vec<String>, raw: &str) {
    let argument = raw.trim();
    if !argument.is_empty() {
        arguments.push(argument.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_arguments_simple() {
        assert_eq!(
            template_arguments("Windows.Foundation.Collections.IVector`1<System.Int32>").unwrap(),
            vec!["System.Int32"]
        );
        assert_eq!(
            template_arguments("Windows.Foundation.Collections.IMap`2<System.Int32,System.Int32>")
                .unwrap(),
            vec!["System.Int32", "System.Int32"]
        );
        assert!(template_arguments("System.String").unwrap().is_empty());
    }

    #[test]
    fn test_template_arguments_nested() {
        let name = "Windows.Foundation.Collections.IMap`2<\
            Windows.Foundation.Collections.IMap`2<Windows.Foundation.Collections.IVector`1<System.Int32>,Windows.Foundation.Collections.IVector`1<System.Int32>>,\
            Windows.Foundation.Collections.IMap`2<Windows.Foundation.Collections.IVector`1<System.Int32>,System.Int32>>";
        let args = template_arguments(name).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(
            args[0],
            "Windows.Foundation.Collections.IMap`2<Windows.Foundation.Collections.IVector`1<System.Int32>,Windows.Foundation.Collections.IVector`1<System.Int32>>"
        );
        assert_eq!(
            args[1],
            "Windows.Foundation.Collections.IMap`2<Windows.Foundation.Collections.IVector`1<System.Int32>,System.Int32>"
        );
    }

    #[test]
    fn test_template_arguments_spaces() {
        let args = template_arguments(
            "IMap`2< Windows.Foundation.Collections.IVector`1<System.Int32>, Windows.Foundation.Collections.IVector`1<System.Int32> >",
        )
        .unwrap();
        assert_eq!(
            args,
            vec![
                "Windows.Foundation.Collections.IVector`1<System.Int32>",
                "Windows.Foundation.Collections.IVector`1<System.Int32>"
            ]
        );
    }

    #[test]
    fn test_template_arguments_reconstruct() {
        let template = "A`1<B>,C,D`2<E,F`1<G>>";
        let name = format!("X`3<{template}>");
        assert_eq!(template_arguments(&name).unwrap().join(","), template);
    }

    #[test]
    fn test_template_arguments_unbalanced() {
        for name in ["List`1<System.Int32", "List`1<>", "A`1<B>>,C<D>"] {
            assert!(
                matches!(template_arguments(name), Err(Error::InvalidTypeName(_))),
                "{name} should be rejected"
            );
        }
        for name in ["List`1System.Int32>", "<System.Int32>", "Game.Loader/<Get>d__1"] {
            assert!(template_arguments(name).unwrap().is_empty(), "{name} has no template");
        }
    }

    #[test]
    fn test_compiler_generated_names() {
        let name = "Game.Loader/<Get>d__1`1<System.Int32>";
        assert_eq!(template_arguments(name).unwrap(), vec!["System.Int32"]);
        assert!(types_equivalent(name, name));
        assert!(!types_equivalent(name, "Game.Loader/<Get>d__1`1<System.String>"));
        assert_eq!(
            template_arguments("IMap`2<Game.Loader/<Get>d__1,System.Int32>").unwrap(),
            vec!["Game.Loader/<Get>d__1", "System.Int32"]
        );
    }

    #[test]
    fn test_types_equivalent_suffix() {
        let list = "System.Collections.Generic.List`1<System.Int32>";
        for decorated in [
            "System.Collections.Generic.List`1<System.Int32>[]",
            "System.Collections.Generic.List`1<System.Int32>&",
            "System.Collections.Generic.List`1<System.Int32>*",
        ] {
            assert!(!types_equivalent(decorated, list), "{decorated}");
            assert!(!types_equivalent(list, decorated), "{decorated}");
        }
        assert!(types_equivalent(
            "System.Collections.Generic.IList`1<System.Uri>[]",
            "Windows.Foundation.Collections.IVector`1<Windows.Foundation.Uri>[]"
        ));
        assert!(!types_equivalent(
            "System.Collections.Generic.IList`1<System.Uri>[]",
            "Windows.Foundation.Collections.IVector`1<Windows.Foundation.Uri>&"
        ));
    }

    #[test]
    fn test_unparseable_names_not_equivalent() {
        assert!(!types_equivalent("List`1<System.Int32", "List`1<System.Int32>"));
        assert!(types_equivalent("List`1<System.Int32", "List`1<System.Int32"));
    }

    #[test]
    fn test_types_equivalent_aliases() {
        assert!(types_equivalent("System.Uri", "Windows.Foundation.Uri"));
        assert!(types_equivalent("Windows.Foundation.Uri", "System.Uri"));
        assert!(types_equivalent(
            "System.Collections.Generic.IDictionary`2<System.String,System.TimeSpan>",
            "Windows.Foundation.Collections.IMap`2<System.String,Windows.Foundation.TimeSpan>"
        ));
        assert!(!types_equivalent(
            "System.Collections.Generic.IList`1<System.String>",
            "Windows.Foundation.Collections.IVector`1<System.Int32>"
        ));
        assert!(!types_equivalent("System.Uri", "System.String"));
        assert!(!types_equivalent(
            "System.Collections.Generic.IList`1<System.String>",
            "Windows.Foundation.Collections.IMap`2<System.String,System.String>"
        ));
    }

    #[test]
    fn test_types_equivalent_reflexive_and_symmetric() {
        let names = [
            "System.Type",
            "Windows.UI.Xaml.Interop.TypeName",
            "System.Nullable`1<System.DateTimeOffset>",
            "Windows.Foundation.IReference`1<Windows.Foundation.DateTime>",
            "System.Collections.IList",
            "Game.Player",
        ];
        for a in names {
            assert!(types_equivalent(a, a));
            for b in names {
                assert_eq!(
                    types_equivalent(a, b),
                    types_equivalent(b, a),
                    "{a} / {b}"
                );
            }
        }
        assert!(types_equivalent(names[2], names[3]));
    }

    #[test]
    fn test_methods_equivalent() {
        assert!(methods_equivalent("Dispose", "Close"));
        assert!(methods_equivalent("Close", "Dispose"));
        assert!(methods_equivalent("Run", "Run"));
        assert!(!methods_equivalent("Dispose", "Finalize"));
    }
}
