//! Field key policies
//!
//! A policy lets a field declare that the objects it yields carry domain
//! identity derived from the field's arguments, so logically identical
//! objects reached through different fields share one record. Evaluation
//! lives in the execution crate; this module holds the descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delimiter between the type name and key components in a policy key.
///
/// `Character` plus component `1` becomes `Character:1`.
pub const KEY_DELIMITER: char = ':';

// ============================================================================
// KEY COMPONENTS
// ============================================================================

/// One component of a policy key: an argument name plus an optional path
/// descending into nested input-object fields.
///
/// The parsed form is dotted: `"id"` names an argument, `"filter.tag"` names
/// the `tag` field inside the `filter` argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyComponent {
    /// Argument the component reads from.
    pub argument: String,
    /// Field path inside the argument value; empty for the argument itself.
    pub path: Vec<String>,
}

impl KeyComponent {
    /// Component reading the argument value directly.
    pub fn new(argument: impl Into<String>) -> Self {
        Self {
            argument: argument.into(),
            path: Vec::new(),
        }
    }

    /// Descend into nested fields of the argument value.
    pub fn with_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path = path.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Display for KeyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argument)?;
        for segment in &self.path {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for KeyComponent {
    type Err = KeyComponentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = s.split('.');
        let argument = match segments.next() {
            Some(first) if !first.is_empty() => first.to_string(),
            _ => return Err(KeyComponentParseError(s.to_string())),
        };
        let mut path = Vec::new();
        for segment in segments {
            if segment.is_empty() {
                return Err(KeyComponentParseError(s.to_string()));
            }
            path.push(segment.to_string());
        }
        Ok(Self { argument, path })
    }
}

/// Error when parsing an invalid key component spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyComponentParseError(pub String);

impl fmt::Display for KeyComponentParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid key component spec: {}", self.0)
    }
}

impl std::error::Error for KeyComponentParseError {}

// ============================================================================
// FIELD POLICY
// ============================================================================

/// Ordered key components attached to a field.
///
/// During evaluation each component resolves against the field's arguments;
/// the results join with [`KEY_DELIMITER`] under the yielded object's type
/// name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPolicy {
    /// Components in key order.
    pub components: Vec<KeyComponent>,
}

impl FieldPolicy {
    /// Create a policy from prepared components.
    pub fn new(components: impl IntoIterator<Item = KeyComponent>) -> Self {
        Self {
            components: components.into_iter().collect(),
        }
    }

    /// Create a policy from dotted component specs such as `["id"]` or
    /// `["filter.tag", "first"]`.
    pub fn from_specs<'a>(
        specs: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, KeyComponentParseError> {
        let components = specs
            .into_iter()
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { components })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_parse_argument_only() {
        let component: KeyComponent = "id".parse().unwrap();
        assert_eq!(component, KeyComponent::new("id"));
    }

    #[test]
    fn test_component_parse_with_path() {
        let component: KeyComponent = "filter.tag.slug".parse().unwrap();
        assert_eq!(
            component,
            KeyComponent::new("filter").with_path(["tag", "slug"])
        );
    }

    #[test]
    fn test_component_display_round_trip() {
        for spec in ["id", "filter.tag", "a.b.c"] {
            let component: KeyComponent = spec.parse().unwrap();
            assert_eq!(component.to_string(), spec);
        }
    }

    #[test]
    fn test_component_parse_rejects_empty_segments() {
        assert!("".parse::<KeyComponent>().is_err());
        assert!(".tag".parse::<KeyComponent>().is_err());
        assert!("filter..tag".parse::<KeyComponent>().is_err());
        assert!("filter.".parse::<KeyComponent>().is_err());
    }

    #[test]
    fn test_policy_from_specs() {
        let policy = FieldPolicy::from_specs(["id", "filter.tag"]).unwrap();
        assert_eq!(policy.components.len(), 2);
        assert_eq!(policy.components[0].argument, "id");
        assert_eq!(policy.components[1].path, vec!["tag".to_string()]);
    }

    #[test]
    fn test_policy_from_specs_propagates_parse_error() {
        let err = FieldPolicy::from_specs(["id", ""]).unwrap_err();
        assert!(err.to_string().contains("Invalid key component"));
    }
}
