//! Polymorphic `(kind, id)` references.
//!
//! The store does not enforce these; a reference may dangle at any time and
//! resolving it yields `None` rather than an error.

use super::kinds::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn concept(id: i64) -> Self {
        Self::new(EntityKind::Concept, id)
    }

    pub fn framework(id: i64) -> Self {
        Self::new(EntityKind::Framework, id)
    }

    pub fn framework_element(id: i64) -> Self {
        Self::new(EntityKind::FrameworkElement, id)
    }

    /// Node key used by graph projections, e.g. `concept:12`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A reference by human-readable code, resolved to an `EntityRef` at use time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CodeRef {
    pub kind: EntityKind,
    pub code: String,
}

impl CodeRef {
    pub fn new(kind: EntityKind, code: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
        }
    }
}

impl fmt::Display for CodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.code)
    }
}

impl FromStr for CodeRef {
    type Err = String;

    /// Parses `kind:CODE`; a bare code is taken to be a concept.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, code)) if !code.is_empty() => Ok(Self::new(kind.parse()?, code)),
            Some(_) => Err(format!("empty code in reference '{}'", s)),
            None if !s.trim().is_empty() => Ok(Self::new(EntityKind::Concept, s.trim())),
            None => Err("empty reference".to_string()),
        }
    }
}

impl TryFrom<String> for CodeRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CodeRef> for String {
    fn from(value: CodeRef) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ref_key_is_namespaced_by_kind() {
        assert_eq!(EntityRef::concept(4).key(), "concept:4");
        assert_ne!(EntityRef::concept(4).key(), EntityRef::framework(4).key());
    }

    #[test]
    fn code_ref_parses_kind_prefix() {
        let r: CodeRef = "framework:PRIME".parse().unwrap();
        assert_eq!(r.kind, EntityKind::Framework);
        assert_eq!(r.code, "PRIME");

        let bare: CodeRef = "UBI".parse().unwrap();
        assert_eq!(bare.kind, EntityKind::Concept);

        assert!("galaxy:X".parse::<CodeRef>().is_err());
        assert!("concept:".parse::<CodeRef>().is_err());
    }

    #[test]
    fn code_ref_round_trips_through_yaml_strings() {
        let r: CodeRef = serde_yaml::from_str("\"tension:T-01\"").unwrap();
        assert_eq!(r, CodeRef::new(EntityKind::Tension, "T-01"));
    }
}
