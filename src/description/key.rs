//! Persisted key form of a relationship description.
//!
//! ```text
//! <prefix><type>#<DIRECTION>[#_LITERAL_#true]#<key1>#<value1>#<key2>#<value2>...
//! ```
//!
//! Keys are emitted in sorted order. `\` escapes `#` and itself; a property
//! key spelled like the literal marker and a concrete value spelled like the
//! wildcard token are escaped too, so decoding is exact.

use std::collections::BTreeMap;

use super::predicate::{Predicate, Semantics};
use super::properties::PropertiesDescription;
use super::relationship::RelationshipDescription;
use crate::model::Direction;
use crate::{Error, Result};

pub const SEPARATOR: char = '#';
pub const WILDCARD: &str = "_ANY_";
pub const LITERAL: &str = "_LITERAL_";

const ESCAPE: char = '\\';

/// Serialize `description` under a namespace `prefix`.
pub fn encode(prefix: &str, description: &RelationshipDescription) -> String {
    let mut out = String::from(prefix);
    push_escaped(&mut out, description.rel_type());
    out.push(SEPARATOR);
    out.push_str(description.direction().as_str());

    let properties = description.properties();
    if properties.is_literal() {
        out.push(SEPARATOR);
        out.push_str(LITERAL);
        out.push(SEPARATOR);
        out.push_str("true");
    }

    for (key, predicate) in properties.entries() {
        // Literal absence is expressed by leaving the key out.
        if *predicate == Predicate::Absent {
            continue;
        }
        out.push(SEPARATOR);
        if key == LITERAL {
            out.push(ESCAPE);
            out.push_str(key);
        } else {
            push_escaped(&mut out, key);
        }
        out.push(SEPARATOR);
        match predicate {
            Predicate::Concrete(v) if v == WILDCARD => {
                out.push(ESCAPE);
                out.push_str(v);
            }
            Predicate::Concrete(v) => push_escaped(&mut out, v),
            Predicate::Wildcard | Predicate::Absent => out.push_str(WILDCARD),
        }
    }
    out
}

/// Parse a key produced by [`encode`] with the same `prefix`.
pub fn decode(prefix: &str, key: &str) -> Result<RelationshipDescription> {
    let rest = key
        .strip_prefix(prefix)
        .ok_or_else(|| Error::Decode(format!("key '{key}' does not start with '{prefix}'")))?;

    let tokens = split_raw(rest);
    if tokens.len() < 2 || tokens.len() % 2 != 0 {
        return Err(Error::Decode(format!("malformed relationship key '{key}'")));
    }

    let rel_type = unescape(tokens[0]);
    let direction: Direction = tokens[1].parse()?;

    let mut semantics = Semantics::General;
    let mut predicates = BTreeMap::new();
    for pair in tokens[2..].chunks(2) {
        let (raw_key, raw_value) = (pair[0], pair[1]);
        if raw_key == LITERAL {
            semantics = Semantics::Literal;
            continue;
        }
        let predicate = if raw_value == WILDCARD {
            Predicate::Wildcard
        } else {
            Predicate::Concrete(unescape(raw_value))
        };
        predicates.insert(unescape(raw_key), predicate);
    }

    Ok(RelationshipDescription::new(
        rel_type,
        direction,
        PropertiesDescription::from_parts(semantics, predicates),
    ))
}

fn push_escaped(out: &mut String, s: &str) {
    for c in s.chars() {
        if c == SEPARATOR || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

/// Split on unescaped separators, keeping escapes in the tokens.
fn split_raw(s: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == ESCAPE {
            escaped = true;
        } else if c == SEPARATOR {
            tokens.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    tokens.push(&s[start..]);
    tokens
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut escaped = false;
    for c in raw.chars() {
        if !escaped && c == ESCAPE {
            escaped = true;
            continue;
        }
        escaped = false;
        out.push(c);
    }
    out
}
