//! Selection descriptors
//!
//! Typed descriptions of what a query asks for: fields with arguments and
//! declared shapes, plus fragment spreads. These drive both the write-path
//! normalizer and the read-path executor, so the canonical storage-key
//! rendering here is what makes two equivalent requests hit the same fields.

use crate::policy::FieldPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Runtime values substituted for variable references during execution.
pub type Variables = HashMap<String, serde_json::Value>;

// ============================================================================
// ARGUMENTS
// ============================================================================

/// Literal or variable-referencing argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgumentValue {
    /// Inline scalar literal.
    Scalar(serde_json::Value),
    /// Inline list literal.
    List(Vec<ArgumentValue>),
    /// Inline input-object literal, keyed by field name.
    Object(BTreeMap<String, ArgumentValue>),
    /// Reference to an operation variable by name.
    Variable(String),
}

impl ArgumentValue {
    /// Variable reference constructor.
    pub fn variable(name: impl Into<String>) -> Self {
        ArgumentValue::Variable(name.into())
    }

    /// Substitute variables, producing a plain JSON value.
    ///
    /// Returns `None` when any referenced variable is unset; callers omit
    /// such arguments from canonical forms.
    pub fn resolve(&self, variables: &Variables) -> Option<serde_json::Value> {
        match self {
            ArgumentValue::Scalar(v) => Some(v.clone()),
            ArgumentValue::List(items) => items
                .iter()
                .map(|item| item.resolve(variables))
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
            ArgumentValue::Object(fields) => fields
                .iter()
                .map(|(name, value)| value.resolve(variables).map(|v| (name.clone(), v)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(serde_json::Value::Object),
            ArgumentValue::Variable(name) => variables.get(name).cloned(),
        }
    }
}

/// Named argument on a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Argument name as declared in the schema.
    pub name: String,
    /// Supplied value.
    pub value: ArgumentValue,
}

impl Argument {
    /// Create a named argument.
    pub fn new(name: impl Into<String>, value: ArgumentValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

// ============================================================================
// CANONICAL FORMS
// ============================================================================

/// Canonical string form of a scalar for key building.
///
/// Strings render as-is (unquoted), numbers in decimal, booleans as
/// `true`/`false`. Null and containers have no scalar form.
pub fn canonical_scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Canonical JSON text of a resolved argument value.
///
/// Compact encoding with object keys in sorted order, so equal values always
/// render identically.
pub fn canonical_json(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

// ============================================================================
// FIELD SHAPE
// ============================================================================

/// Declared shape of a field's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldShape {
    /// Leaf value with no child selections.
    Scalar,
    /// Nested object read through the given selections.
    Object(SelectionSet),
    /// Ordered list of the inner shape.
    List(Box<FieldShape>),
    /// Inner shape that may legitimately be absent or null.
    Optional(Box<FieldShape>),
}

impl FieldShape {
    /// List shape constructor.
    pub fn list(inner: FieldShape) -> Self {
        FieldShape::List(Box::new(inner))
    }

    /// Optional shape constructor.
    pub fn optional(inner: FieldShape) -> Self {
        FieldShape::Optional(Box::new(inner))
    }

    /// Whether absence of this value is tolerated.
    pub fn is_optional(&self) -> bool {
        matches!(self, FieldShape::Optional(_))
    }

    /// Peel any optional wrappers.
    pub fn unwrap_optional(&self) -> &FieldShape {
        match self {
            FieldShape::Optional(inner) => inner.unwrap_optional(),
            other => other,
        }
    }

    /// Selections of the object this shape eventually yields, if any.
    pub fn selection_set(&self) -> Option<&SelectionSet> {
        match self {
            FieldShape::Scalar => None,
            FieldShape::Object(set) => Some(set),
            FieldShape::List(inner) | FieldShape::Optional(inner) => inner.selection_set(),
        }
    }
}

// ============================================================================
// FIELDS
// ============================================================================

/// One requested field with its arguments, shape, and optional key policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name as declared in the schema.
    pub name: String,
    /// Response alias, when the request renamed the field.
    pub alias: Option<String>,
    /// Supplied arguments.
    pub arguments: Vec<Argument>,
    /// Declared value shape.
    pub shape: FieldShape,
    /// Key policy for the objects this field yields.
    pub policy: Option<FieldPolicy>,
}

impl Field {
    /// Create a field with no alias, arguments, or policy.
    pub fn new(name: impl Into<String>, shape: FieldShape) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: Vec::new(),
            shape,
            policy: None,
        }
    }

    /// Set the response alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add an argument.
    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Attach a key policy.
    pub fn with_policy(mut self, policy: FieldPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Key under which this field appears in shaped output: the alias when
    /// present, the field name otherwise.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Key under which this field is stored on a record.
    ///
    /// Arguments are resolved against `variables`, sorted by name, and
    /// rendered in canonical JSON, so equivalent requests agree on the key.
    /// An argument whose variable is unset is omitted.
    pub fn storage_key(&self, variables: &Variables) -> String {
        let mut parts: Vec<(&str, String)> = self
            .arguments
            .iter()
            .filter_map(|arg| {
                arg.value
                    .resolve(variables)
                    .map(|v| (arg.name.as_str(), canonical_json(&v)))
            })
            .collect();
        if parts.is_empty() {
            return self.name.clone();
        }
        parts.sort_by(|a, b| a.0.cmp(b.0));
        let rendered: Vec<String> = parts
            .iter()
            .map(|(name, value)| format!("{name}:{value}"))
            .collect();
        format!("{}({})", self.name, rendered.join(","))
    }
}

// ============================================================================
// FRAGMENTS AND SELECTION SETS
// ============================================================================

/// Named fragment spread, optionally conditioned on a type and optionally
/// deferred to a later incremental payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentSpread {
    /// Fragment label; recorded in the fulfilled set when the fragment's
    /// fields are present.
    pub label: String,
    /// Concrete type the enclosing object must have for the fragment to
    /// apply; `None` applies unconditionally.
    pub type_condition: Option<String>,
    /// Whether the server may deliver this fragment's fields in a later
    /// incremental payload.
    pub deferred: bool,
    /// Fields and nested spreads the fragment contributes.
    pub selection_set: SelectionSet,
}

impl FragmentSpread {
    /// Create an unconditioned, non-deferred spread.
    pub fn new(label: impl Into<String>, selection_set: SelectionSet) -> Self {
        Self {
            label: label.into(),
            type_condition: None,
            deferred: false,
            selection_set,
        }
    }

    /// Condition the fragment on a concrete type name.
    pub fn with_type_condition(mut self, type_name: impl Into<String>) -> Self {
        self.type_condition = Some(type_name.into());
        self
    }

    /// Mark the fragment as deferrable.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Whether this fragment applies to an object.
    ///
    /// `runtime_type` is the object's `__typename` when the source exposes
    /// one; `static_type` is the declared type of the enclosing selection
    /// set, accepted so non-polymorphic spreads apply without a typename.
    pub fn matches(&self, runtime_type: Option<&str>, static_type: &str) -> bool {
        match &self.type_condition {
            None => true,
            Some(condition) => {
                runtime_type == Some(condition.as_str()) || condition == static_type
            }
        }
    }
}

/// A field in a selection set, or a spread contributing more of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selection {
    Field(Field),
    Fragment(FragmentSpread),
}

/// Ordered selections over one object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionSet {
    /// Declared type of the objects these selections read.
    pub type_name: String,
    /// Requested fields and fragment spreads, in request order.
    pub selections: Vec<Selection>,
}

impl SelectionSet {
    /// Create an empty selection set over `type_name`.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            selections: Vec::new(),
        }
    }

    /// Append a field selection.
    pub fn with_field(mut self, field: Field) -> Self {
        self.selections.push(Selection::Field(field));
        self
    }

    /// Append a fragment spread.
    pub fn with_fragment(mut self, fragment: FragmentSpread) -> Self {
        self.selections.push(Selection::Fragment(fragment));
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================
