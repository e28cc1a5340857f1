use std::fmt;

use serde::Serialize;

use crate::core::error::NodeError;
use crate::core::schema::types::TypeKey;
use crate::core::value::Value;

/// Declared type of a parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Annotation {
    /// Nothing declared.
    #[default]
    Empty,
    Type(TypeKey),
    /// A sequence of the inner annotation.
    List(Box<Annotation>),
    /// Several return values, position by position.
    Tuple(Vec<Annotation>),
}

impl Annotation {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Annotation::Type(TypeKey::of::<T>())
    }

    pub fn list_of<T: ?Sized + 'static>() -> Self {
        Annotation::List(Box::new(Self::of::<T>()))
    }

    pub fn list(inner: Annotation) -> Self {
        Annotation::List(Box::new(inner))
    }

    pub fn tuple(items: impl IntoIterator<Item = Annotation>) -> Self {
        Annotation::Tuple(items.into_iter().collect())
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Annotation::List(_))
    }

    pub fn type_key(&self) -> Option<&TypeKey> {
        match self {
            Annotation::Type(key) => Some(key),
            _ => None,
        }
    }

    /// The key of the type itself, or of the element type for sequences.
    pub fn element_key(&self) -> Option<&TypeKey> {
        match self {
            Annotation::Type(key) => Some(key),
            Annotation::List(inner) => inner.element_key(),
            _ => None,
        }
    }
}

// ============================================================================
// Default-value wrappers
// ============================================================================

/// A string default offering a fixed set of choices. The first one is the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub choices: Vec<String>,
}

impl Choice {
    pub fn new<S: Into<String>>(choices: impl IntoIterator<Item = S>) -> Self {
        Self {
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }

    pub fn default_choice(&self) -> Option<&str> {
        self.choices.first().map(String::as_str)
    }
}

/// A string default with widget options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringInput {
    pub value: String,
    pub multiline: bool,
    pub force_input: bool,
    pub optional: bool,
    pub hidden: bool,
}

impl StringInput {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }

    pub fn force_input(mut self) -> Self {
        self.force_input = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub(crate) fn metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut meta = serde_json::Map::new();
        meta.insert("default".into(), self.value.clone().into());
        meta.insert("multiline".into(), self.multiline.into());
        meta.insert("display".into(), "input".into());
        meta.insert("forceInput".into(), self.force_input.into());
        meta
    }
}

/// A numeric default with range and widget options.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberInput {
    pub default: f64,
    /// Render the default (and bounds) as integers.
    pub integral: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub round: Option<f64>,
    pub display: String,
    pub optional: bool,
    pub hidden: bool,
}

impl NumberInput {
    pub fn new(default: f64) -> Self {
        Self {
            default,
            integral: false,
            min: None,
            max: None,
            step: None,
            round: None,
            display: "number".to_string(),
            optional: false,
            hidden: false,
        }
    }

    pub fn int(default: i64) -> Self {
        Self {
            integral: true,
            ..Self::new(default as f64)
        }
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn round(mut self, round: f64) -> Self {
        self.round = Some(round);
        self
    }

    pub fn display(mut self, display: impl Into<String>) -> Self {
        self.display = display.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Reject a default outside `[min, max]`.
    pub fn check(&self, param: &str) -> Result<(), NodeError> {
        if let Some(min) = self.min {
            if self.default < min {
                return Err(NodeError::DefaultOutOfRange {
                    param: param.to_string(),
                    value: self.default,
                    reason: format!("less than the minimum allowed {min}"),
                });
            }
        }
        if let Some(max) = self.max {
            if self.default > max {
                return Err(NodeError::DefaultOutOfRange {
                    param: param.to_string(),
                    value: self.default,
                    reason: format!("greater than the maximum allowed {max}"),
                });
            }
        }
        Ok(())
    }

    pub fn default_value(&self) -> Value {
        if self.integral {
            Value::Int(self.default as i64)
        } else {
            Value::Float(self.default)
        }
    }

    fn number(&self, v: f64) -> serde_json::Value {
        if self.integral && v.fract() == 0.0 {
            serde_json::Value::from(v as i64)
        } else {
            serde_json::Value::from(v)
        }
    }

    pub(crate) fn metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut meta = serde_json::Map::new();
        meta.insert("default".into(), self.number(self.default));
        meta.insert("display".into(), self.display.clone().into());
        let bounds = [("min", self.min), ("max", self.max), ("step", self.step), ("round", self.round)];
        for (key, v) in bounds {
            if let Some(v) = v {
                meta.insert(key.into(), self.number(v));
            }
        }
        meta
    }
}

/// Declared default of a parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ParamDefault {
    /// No default: the parameter is required.
    #[default]
    Empty,
    /// Explicitly defaults to nothing.
    None,
    Value(Value),
    Choice(Choice),
    Text(StringInput),
    Number(NumberInput),
}

impl ParamDefault {
    /// The value handed to the implementation when the host omits the argument.
    pub fn runtime_value(&self) -> Option<Value> {
        match self {
            ParamDefault::Empty => None,
            ParamDefault::None => Some(Value::None),
            ParamDefault::Value(v) => Some(v.clone()),
            ParamDefault::Choice(c) => Some(c.default_choice().map_or(Value::None, Value::from)),
            ParamDefault::Text(s) => Some(Value::Str(s.value.clone())),
            ParamDefault::Number(n) => Some(n.default_value()),
        }
    }
}

impl From<Value> for ParamDefault {
    fn from(v: Value) -> Self {
        if v.is_none() {
            ParamDefault::None
        } else {
            ParamDefault::Value(v)
        }
    }
}

impl From<Choice> for ParamDefault {
    fn from(c: Choice) -> Self {
        ParamDefault::Choice(c)
    }
}

impl From<StringInput> for ParamDefault {
    fn from(s: StringInput) -> Self {
        ParamDefault::Text(s)
    }
}

impl From<NumberInput> for ParamDefault {
    fn from(n: NumberInput) -> Self {
        ParamDefault::Number(n)
    }
}

macro_rules! default_from_value {
    ($($t:ty),*) => {
        $(impl From<$t> for ParamDefault {
            fn from(v: $t) -> Self {
                ParamDefault::Value(Value::from(v))
            }
        })*
    };
}

default_from_value!(bool, i64, i32, f64, f32, &str, String);

// ============================================================================
// Signature
// ============================================================================

/// A single declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Annotation,
    pub default: ParamDefault,
}

impl Param {
    pub fn new(name: impl Into<String>, annotation: Annotation) -> Self {
        Self {
            name: name.into(),
            annotation,
            default: ParamDefault::Empty,
        }
    }

    pub fn with_default(mut self, default: impl Into<ParamDefault>) -> Self {
        self.default = default.into();
        self
    }
}

/// The declared input/output contract of a node function.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    pub params: Vec<Param>,
    pub returns: Annotation,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Add a parameter of type `T` with no default.
    pub fn input<T: ?Sized + 'static>(self, name: impl Into<String>) -> Self {
        self.param(Param::new(name, Annotation::of::<T>()))
    }

    /// Add a parameter of type `T` with a default.
    pub fn input_with<T: ?Sized + 'static>(
        self,
        name: impl Into<String>,
        default: impl Into<ParamDefault>,
    ) -> Self {
        self.param(Param::new(name, Annotation::of::<T>()).with_default(default))
    }

    /// Add a parameter declared as a sequence of `T`.
    pub fn list_input<T: ?Sized + 'static>(self, name: impl Into<String>) -> Self {
        self.param(Param::new(name, Annotation::list_of::<T>()))
    }

    /// Add an untyped parameter.
    pub fn untyped(self, name: impl Into<String>) -> Self {
        self.param(Param::new(name, Annotation::Empty))
    }

    pub fn returns<T: ?Sized + 'static>(mut self) -> Self {
        self.returns = Annotation::of::<T>();
        self
    }

    pub fn returns_list<T: ?Sized + 'static>(mut self) -> Self {
        self.returns = Annotation::list_of::<T>();
        self
    }

    pub fn returns_annotation(mut self, annotation: Annotation) -> Self {
        self.returns = annotation;
        self
    }

    pub fn returns_tuple(mut self, items: impl IntoIterator<Item = Annotation>) -> Self {
        self.returns = Annotation::tuple(items);
        self
    }
}

/// Where a node function was defined.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// A location for generated code, which has no real file.
    pub fn synthetic(label: impl Into<String>) -> Self {
        Self::new(label, 0)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.file)
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}
