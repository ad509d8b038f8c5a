//! Field policy evaluation
//!
//! Resolves a field's key components against its arguments to decide what
//! identity the yielded objects carry. Any resolution failure falls back to
//! structural keying without raising an error, so a policy can never make a
//! valid result unwritable.

use trellis_core::policy::{FieldPolicy, KeyComponent, KEY_DELIMITER};
use trellis_core::selection::{canonical_scalar, Argument, Variables};
use trellis_core::CacheKey;

/// Outcome of evaluating a field's key policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// No usable policy; structural keying applies.
    Structural,
    /// One custom key for a single-object field.
    Single(CacheKey),
    /// One custom key per list element, in element order.
    PerElement(Vec<CacheKey>),
}

enum ComponentValue {
    Fixed(String),
    Varying(Vec<String>),
}

/// Evaluate `policy` for a field yielding objects of `type_name`.
///
/// Exactly one component may resolve to a list; its elements pair
/// positionally with the repeated fixed components. Zero varying components
/// produce a single key. Anything else: a missing argument, an unset
/// variable, a dead-end path, a null or container end value, an empty list,
/// or more than one varying component, yields [`PolicyOutcome::Structural`].
pub fn evaluate_field_policy(
    policy: &FieldPolicy,
    type_name: &str,
    arguments: &[Argument],
    variables: &Variables,
) -> PolicyOutcome {
    if policy.components.is_empty() {
        return PolicyOutcome::Structural;
    }

    let mut resolved = Vec::with_capacity(policy.components.len());
    for component in &policy.components {
        match resolve_component(component, arguments, variables) {
            Some(value) => resolved.push(value),
            None => return PolicyOutcome::Structural,
        }
    }

    let varying = resolved
        .iter()
        .filter(|value| matches!(value, ComponentValue::Varying(_)))
        .count();
    match varying {
        0 => {
            let parts: Vec<&str> = resolved
                .iter()
                .filter_map(|value| match value {
                    ComponentValue::Fixed(s) => Some(s.as_str()),
                    ComponentValue::Varying(_) => None,
                })
                .collect();
            PolicyOutcome::Single(join_key(type_name, &parts))
        }
        1 => {
            let count = resolved
                .iter()
                .find_map(|value| match value {
                    ComponentValue::Varying(elements) => Some(elements.len()),
                    ComponentValue::Fixed(_) => None,
                })
                .unwrap_or(0);
            let keys = (0..count)
                .map(|index| {
                    let parts: Vec<&str> = resolved
                        .iter()
                        .map(|value| match value {
                            ComponentValue::Fixed(s) => s.as_str(),
                            ComponentValue::Varying(elements) => elements[index].as_str(),
                        })
                        .collect();
                    join_key(type_name, &parts)
                })
                .collect();
            PolicyOutcome::PerElement(keys)
        }
        _ => PolicyOutcome::Structural,
    }
}

fn join_key(type_name: &str, parts: &[&str]) -> CacheKey {
    let mut key = String::from(type_name);
    for part in parts {
        key.push(KEY_DELIMITER);
        key.push_str(part);
    }
    key
}

fn resolve_component(
    component: &KeyComponent,
    arguments: &[Argument],
    variables: &Variables,
) -> Option<ComponentValue> {
    let argument = arguments
        .iter()
        .find(|argument| argument.name == component.argument)?;
    let mut value = argument.value.resolve(variables)?;
    for segment in &component.path {
        value = match value {
            serde_json::Value::Object(mut map) => map.remove(segment)?,
            _ => return None,
        };
    }
    match value {
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                return None;
            }
            let elements = items
                .iter()
                .map(canonical_scalar)
                .collect::<Option<Vec<_>>>()?;
            Some(ComponentValue::Varying(elements))
        }
        end => canonical_scalar(&end).map(ComponentValue::Fixed),
    }
}

// =============================================================================
// TESTS
// =============================================================================
