//! The dynamic value model that flows between the host and node implementations.
//!
//! - [`Value`] is what the host passes in and gets back
//! - [`Tensor`] is the structured numeric payload the wrapper knows how to verify
//! - [`Object`] carries property-bearing values built by generated setters

pub mod object;
pub mod tensor;

use std::any::Any;
use std::fmt;

use crate::core::error::NodeError;
use crate::core::schema::types::TypeKey;

pub use object::{Object, Properties, Property, PropertyInfo, Reflect};
pub use tensor::{Device, Tensor};

/// A helper trait that just provides the `as_any` method.
/// Needed for downcasting reflected objects back to their concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A value crossing the host boundary.
///
/// `List` is a sequence argument or list-valued output. `Tuple` is reserved
/// for multi-output results: a node returning several values returns a
/// `Tuple`, and anything else is treated as a single output.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tensor(Tensor),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Object(Object),
}

impl Value {
    /// Wrap a property-bearing object.
    pub fn object<T: Reflect>(value: T) -> Self {
        Value::Object(Object::new(value))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Short name of the variant, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Tensor(_) => "tensor",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Object(_) => "object",
        }
    }

    /// Identity of the Rust type this value represents, for registry lookups.
    pub fn type_key(&self) -> TypeKey {
        match self {
            Value::None => TypeKey::any(),
            Value::Bool(_) => TypeKey::of::<bool>(),
            Value::Int(_) => TypeKey::of::<i64>(),
            Value::Float(_) => TypeKey::of::<f64>(),
            Value::Str(_) => TypeKey::of::<String>(),
            Value::Tensor(_) => TypeKey::of::<Tensor>(),
            Value::List(_) | Value::Tuple(_) => TypeKey::of::<Vec<Value>>(),
            Value::Object(obj) => obj.type_key(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integers, and floats with no fractional part.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Downcast an object value to its concrete type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.as_object().and_then(|obj| obj.downcast_ref::<T>())
    }

    /// Apply `f` to every tensor, descending into lists and tuples.
    pub fn map_tensors(self, f: &impl Fn(Tensor) -> Tensor) -> Value {
        match self {
            Value::Tensor(t) => Value::Tensor(f(t)),
            Value::List(items) => Value::List(items.into_iter().map(|v| v.map_tensors(f)).collect()),
            Value::Tuple(items) => {
                Value::Tuple(items.into_iter().map(|v| v.map_tensors(f)).collect())
            }
            other => other,
        }
    }

    /// The first non-sequence value, following the first element of nested
    /// sequences. `None` if a sequence on the way is empty.
    pub fn first_leaf(&self) -> Option<&Value> {
        match self {
            Value::List(items) | Value::Tuple(items) => items.first()?.first_leaf(),
            leaf => Some(leaf),
        }
    }

    /// JSON rendering used for UI defaults and diagnostics.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            Value::Float(f) => json!(f),
            Value::Str(s) => json!(s),
            Value::Tensor(t) => json!({ "shape": t.shape(), "device": t.device().to_string() }),
            Value::List(items) | Value::Tuple(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(obj) => obj.to_json(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Tensor(t) => write!(f, "{t:?}"),
            Value::Object(obj) => write!(f, "{obj:?}"),
            Value::List(items) | Value::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

// ============================================================================
// Conversions into Value
// ============================================================================

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Tensor> for Value {
    fn from(v: Tensor) -> Self {
        Value::Tensor(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::None, Into::into)
    }
}

// ============================================================================
// Conversions out of Value
// ============================================================================

/// Typed extraction of an argument value.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, NodeError>;
}

fn conversion_error(expected: &str, value: &Value) -> NodeError {
    NodeError::Conversion {
        expected: expected.to_string(),
        found: value.kind().to_string(),
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, NodeError> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, NodeError> {
        value.as_bool().ok_or_else(|| conversion_error("bool", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, NodeError> {
        value.as_int().ok_or_else(|| conversion_error("int", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, NodeError> {
        value.as_float().ok_or_else(|| conversion_error("float", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, NodeError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| conversion_error("string", value))
    }
}

impl FromValue for Tensor {
    fn from_value(value: &Value) -> Result<Self, NodeError> {
        value
            .as_tensor()
            .cloned()
            .ok_or_else(|| conversion_error("tensor", value))
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, NodeError> {
        value
            .as_list()
            .ok_or_else(|| conversion_error("list", value))?
            .iter()
            .map(T::from_value)
            .collect()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, NodeError> {
        if value.is_none() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
