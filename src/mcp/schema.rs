//! Declarative parameter trees and their compiled JSON schemas.
//!
//! A tool declares its inputs (and optionally its outputs) as a tree of
//! [`Param`] nodes. [`compile`] turns that tree into the JSON schema objects
//! advertised through `tools/list`, and [`validate_arguments`] checks an
//! argument bag against the same tree before a local handler runs.
//!
//! # Schema Shape
//!
//! ```text
//! {
//!   "type": "object",
//!   "properties": { <name>: <subschema>, ... },
//!   "required": [ <names of required params>, ... ],
//!   "additionalProperties": false
//! }
//! ```
//!
//! Objects (and arrays of objects) recurse into the same shape. A container
//! declared without children is *generic*: it accepts arbitrary structured
//! data (`additionalProperties: true` for objects, an item schema without
//! declared properties for arrays).

use serde_json::{json, Map, Value};

use crate::error::ToolError;

/// The type of a parameter node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// UTF-8 string.
    String,
    /// Any JSON number.
    Number,
    /// Whole number.
    Integer,
    /// `true` / `false`.
    Boolean,
    /// Nested object; fields are the node's children.
    Object,
    /// Homogeneous array; object items take the node's children.
    Array(Box<ParamType>),
}

impl ParamType {
    /// JSON schema `type` keyword for this type.
    #[must_use]
    pub const fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array(_) => "array",
        }
    }

    /// Returns `true` if `value` has this type (shallow check).
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array(_) => value.is_array(),
        }
    }
}

/// One node of a parameter tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Property name.
    pub name: String,
    /// Value type.
    pub param_type: ParamType,
    /// Whether the caller must supply it.
    pub required: bool,
    /// Human-readable description.
    pub description: Option<String>,
    /// Fields of an object, or of the objects inside an array.
    pub children: Vec<Param>,
}

impl Param {
    /// Creates an optional parameter of the given type.
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            description: None,
            children: Vec::new(),
        }
    }

    /// Creates a string parameter.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::String)
    }

    /// Creates a number parameter.
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Number)
    }

    /// Creates an integer parameter.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Integer)
    }

    /// Creates a boolean parameter.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Boolean)
    }

    /// Creates an object parameter. Without children it is generic.
    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Object)
    }

    /// Creates an array parameter whose items have type `item`.
    pub fn array(name: impl Into<String>, item: ParamType) -> Self {
        Self::new(name, ParamType::Array(Box::new(item)))
    }

    /// Marks the parameter as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a child field.
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Adds several child fields.
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.children.extend(children);
        self
    }

    /// Returns `true` for an object, or array of objects, with no declared fields.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.children.is_empty() && innermost(&self.param_type) == &ParamType::Object
    }
}

/// Input and output parameters of one tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamTree {
    /// Parameters the caller supplies.
    pub inputs: Vec<Param>,
    /// Fields of the structured result. Empty means no output schema.
    pub outputs: Vec<Param>,
}

impl ParamTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an input parameter.
    #[must_use]
    pub fn input(mut self, param: Param) -> Self {
        self.inputs.push(param);
        self
    }

    /// Adds an output parameter.
    #[must_use]
    pub fn output(mut self, param: Param) -> Self {
        self.outputs.push(param);
        self
    }
}

/// Compiled schemas of one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSchema {
    /// Always present; `properties` is present even when empty.
    pub input: Value,
    /// Present only when at least one output parameter exists.
    pub output: Option<Value>,
}

/// Compiles a parameter tree into input and output schemas.
#[must_use]
pub fn compile(tree: &ParamTree) -> ToolSchema {
    ToolSchema {
        input: object_schema(&tree.inputs),
        output: (!tree.outputs.is_empty()).then(|| object_schema(&tree.outputs)),
    }
}

fn object_schema(params: &[Param]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in params {
        properties.insert(param.name.clone(), param_schema(param));
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn param_schema(param: &Param) -> Value {
    let mut schema = type_schema(&param.param_type, &param.children);
    if let (Some(description), Some(obj)) = (&param.description, schema.as_object_mut()) {
        obj.insert("description".to_string(), json!(description));
    }
    schema
}

fn type_schema(param_type: &ParamType, children: &[Param]) -> Value {
    match param_type {
        ParamType::Object if children.is_empty() => json!({
            "type": "object",
            "additionalProperties": true,
        }),
        ParamType::Object => object_schema(children),
        ParamType::Array(item) => json!({
            "type": "array",
            "items": type_schema(item, children),
        }),
        scalar => json!({ "type": scalar.json_type() }),
    }
}

fn innermost(param_type: &ParamType) -> &ParamType {
    match param_type {
        ParamType::Array(item) => innermost(item),
        other => other,
    }
}

/// Checks an argument bag against a list of parameters.
///
/// Enforces presence of required parameters, non-empty required strings,
/// value types at every depth, and rejects unknown keys wherever the schema
/// says `additionalProperties: false`.
///
/// # Errors
///
/// Returns [`ToolError::InvalidParams`] naming the first offending parameter
/// by its dotted path (array elements appear as `items[2]`).
pub fn validate_arguments(params: &[Param], args: &Map<String, Value>) -> Result<(), ToolError> {
    validate_object(params, args, "")
}

fn validate_object(
    params: &[Param],
    args: &Map<String, Value>,
    prefix: &str,
) -> Result<(), ToolError> {
    for param in params {
        let path = join_path(prefix, &param.name);
        match args.get(&param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    return Err(ToolError::invalid_param(path, "is required"));
                }
            }
            Some(value) => {
                validate_value(&param.param_type, &param.children, param.required, value, &path)?;
            }
        }
    }

    if let Some(unknown) = args
        .keys()
        .find(|key| !params.iter().any(|p| &p.name == *key))
    {
        return Err(ToolError::invalid_param(
            join_path(prefix, unknown),
            "unknown parameter",
        ));
    }

    Ok(())
}

fn validate_value(
    param_type: &ParamType,
    children: &[Param],
    required: bool,
    value: &Value,
    path: &str,
) -> Result<(), ToolError> {
    if !param_type.matches(value) {
        return Err(ToolError::invalid_param(
            path,
            format!("expected {}", param_type.json_type()),
        ));
    }

    match (param_type, value) {
        (ParamType::String, Value::String(s)) if required && s.is_empty() => {
            Err(ToolError::invalid_param(path, "must not be empty"))
        }
        (ParamType::Object, Value::Object(fields)) if !children.is_empty() => {
            validate_object(children, fields, path)
        }
        (ParamType::Array(item), Value::Array(items)) => {
            for (index, element) in items.iter().enumerate() {
                // Elements are always required to be well-formed, but an empty
                // string element is a legitimate value.
                validate_value(item, children, false, element, &format!("{path}[{index}]"))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
