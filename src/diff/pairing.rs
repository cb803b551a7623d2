//! Pairing of the elements of two tree sets.
//!
//! Three rules are tried in order and the first one that pairs anything
//! wins: a lone leaf element on each side, then equal keys, then equal
//! display names.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::DiffError;
use crate::source::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingRule {
    /// One leaf element on each side
    Singleton,
    /// Elements with equal keys
    Identity,
    /// Elements with equal display names
    Name,
}

impl fmt::Display for PairingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PairingRule::Singleton => "singleton",
            PairingRule::Identity => "identity",
            PairingRule::Name => "name",
        };
        f.write_str(name)
    }
}

/// Elements compared with each other; `first` is the baseline side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementPair<'a> {
    pub first: &'a Element,
    pub second: &'a Element,
}

#[derive(Debug, Clone)]
pub struct Pairing<'a> {
    pub rule: PairingRule,
    pub pairs: Vec<ElementPair<'a>>,
}

/// Pair the root elements of two hierarchies
///
/// **Public** - matched compound elements are paired themselves, then their
/// children are paired with the same rule
///
/// # Errors
/// * `DiffError::NoComparableElements` - No rule produced any pair
pub fn pair_elements<'a>(
    first: &'a [Element],
    second: &'a [Element],
) -> Result<Pairing<'a>, DiffError> {
    if let ([a], [b]) = (first, second) {
        if !a.is_compound() && !b.is_compound() {
            debug!("Paired single elements {} and {}", a.key, b.key);
            return Ok(Pairing {
                rule: PairingRule::Singleton,
                pairs: vec![ElementPair { first: a, second: b }],
            });
        }
    }

    let mut pairs = Vec::new();
    pair_matching(first, second, &|a, b| a.key == b.key, &mut pairs);
    if !pairs.is_empty() {
        debug!("Paired {} elements by identity", pairs.len());
        return Ok(Pairing {
            rule: PairingRule::Identity,
            pairs,
        });
    }

    pair_matching(first, second, &|a, b| a.name == b.name, &mut pairs);
    if !pairs.is_empty() {
        debug!("Paired {} elements by name", pairs.len());
        return Ok(Pairing {
            rule: PairingRule::Name,
            pairs,
        });
    }

    warn!(
        "No comparable elements between {} and {} root elements",
        first.len(),
        second.len()
    );
    Err(DiffError::NoComparableElements)
}

fn pair_matching<'a>(
    first: &'a [Element],
    second: &'a [Element],
    matches: &dyn Fn(&Element, &Element) -> bool,
    pairs: &mut Vec<ElementPair<'a>>,
) {
    for a in first {
        if let Some(b) = second.iter().find(|b| matches(a, b)) {
            pairs.push(ElementPair { first: a, second: b });
            if a.is_compound() && b.is_compound() {
                pair_matching(&a.children, &b.children, matches, pairs);
            }
        }
    }
}
