//! Type registry: maps Rust-side type identities to the host's type tags.
//!
//! The registry is open: any type can be registered through [`HostType`]
//! (or by key, for types only discovered at runtime) without touching this
//! module. The first registration of a key wins; later attempts are no-ops.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use crate::core::error::NodeError;
use crate::core::schema::signature::Annotation;
use crate::core::value::{Tensor, Value};

// ============================================================================
// Type identity
// ============================================================================

/// Fully-qualified identity of a type, as used for registry lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(Cow<'static, str>);

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeKey(Cow::Borrowed(std::any::type_name::<T>()))
    }

    /// A key for a type only known by name at runtime.
    pub fn named(name: impl Into<String>) -> Self {
        TypeKey(Cow::Owned(name.into()))
    }

    /// Key of the wildcard type.
    pub fn any() -> Self {
        Self::of::<AnyType>()
    }

    pub fn is_any(&self) -> bool {
        *self == Self::any()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, without generic arguments' paths.
    pub fn short_name(&self) -> &str {
        let base = self.0.split('<').next().unwrap_or(&self.0);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Host tags
// ============================================================================

/// A type label in the host's schema vocabulary (`"IMAGE"`, `"INT"`, ...).
///
/// Equality is exact. Compatibility between tags is [`HostTag::accepts`],
/// under which the wildcard `"*"` is never different from any other tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct HostTag(Cow<'static, str>);

impl HostTag {
    pub const ANY: HostTag = HostTag::from_static("*");
    pub const TENSOR: HostTag = HostTag::from_static("TENSOR");
    pub const IMAGE: HostTag = HostTag::from_static("IMAGE");
    pub const MASK: HostTag = HostTag::from_static("MASK");
    pub const DEPTH: HostTag = HostTag::from_static("DEPTH");
    pub const INT: HostTag = HostTag::from_static("INT");
    pub const FLOAT: HostTag = HostTag::from_static("FLOAT");
    pub const STRING: HostTag = HostTag::from_static("STRING");
    pub const BOOLEAN: HostTag = HostTag::from_static("BOOLEAN");
    pub const UNIQUE_ID: HostTag = HostTag::from_static("UNIQUE_ID");
    pub const EXTRA_PNGINFO: HostTag = HostTag::from_static("EXTRA_PNGINFO");

    pub const fn from_static(tag: &'static str) -> Self {
        HostTag(Cow::Borrowed(tag))
    }

    pub fn new(tag: impl Into<String>) -> Self {
        HostTag(Cow::Owned(tag.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == "*"
    }

    /// Whether a value tagged `other` may flow into a slot tagged `self`.
    pub fn accepts(&self, other: &HostTag) -> bool {
        self.is_wildcard() || other.is_wildcard() || self == other
    }
}

impl fmt::Display for HostTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for HostTag {
    fn from(tag: &'static str) -> Self {
        HostTag::from_static(tag)
    }
}

impl From<String> for HostTag {
    fn from(tag: String) -> Self {
        HostTag::new(tag)
    }
}

// ============================================================================
// Marker types
// ============================================================================

/// Annotation-only marker for image tensors (`[batch, height, width, channels]`).
pub enum ImageTensor {}

/// Annotation-only marker for normalized masks (`[batch, height, width]`, values in `[0, 1]`).
pub enum MaskTensor {}

/// Annotation-only marker that matches any host type.
pub enum AnyType {}

// ============================================================================
// Registrable types
// ============================================================================

/// Rebuilds a raw host value as a registered type.
pub type Converter = fn(Value) -> Result<Value, NodeError>;

fn identity(value: Value) -> Result<Value, NodeError> {
    Ok(value)
}

/// A Rust type with a host-side representation.
pub trait HostType: 'static {
    fn host_tag() -> HostTag;

    /// The type's "constructor", applied to arguments when autoconvert is on.
    fn convert(value: Value) -> Result<Value, NodeError> {
        Ok(value)
    }
}

fn cannot_convert(expected: &str, value: &Value) -> NodeError {
    NodeError::Conversion {
        expected: expected.to_string(),
        found: value.kind().to_string(),
    }
}

impl HostType for i64 {
    fn host_tag() -> HostTag {
        HostTag::INT
    }

    fn convert(value: Value) -> Result<Value, NodeError> {
        match value {
            Value::Int(i) => Ok(Value::Int(i)),
            Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
            Value::Bool(b) => Ok(Value::Int(i64::from(b))),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| cannot_convert("int", &Value::Str(s.clone()))),
            other => Err(cannot_convert("int", &other)),
        }
    }
}

impl HostType for f64 {
    fn host_tag() -> HostTag {
        HostTag::FLOAT
    }

    fn convert(value: Value) -> Result<Value, NodeError> {
        match value {
            Value::Float(f) => Ok(Value::Float(f)),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| cannot_convert("float", &Value::Str(s.clone()))),
            other => Err(cannot_convert("float", &other)),
        }
    }
}

impl HostType for String {
    fn host_tag() -> HostTag {
        HostTag::STRING
    }

    fn convert(value: Value) -> Result<Value, NodeError> {
        match value {
            Value::Str(s) => Ok(Value::Str(s)),
            other => Ok(Value::Str(other.to_string())),
        }
    }
}

impl HostType for bool {
    fn host_tag() -> HostTag {
        HostTag::BOOLEAN
    }

    fn convert(value: Value) -> Result<Value, NodeError> {
        match value {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::Int(i) => Ok(Value::Bool(i != 0)),
            Value::Float(f) => Ok(Value::Bool(f != 0.0)),
            Value::None => Ok(Value::Bool(false)),
            Value::Str(s) => Ok(Value::Bool(!s.is_empty())),
            other => Err(cannot_convert("bool", &other)),
        }
    }
}

impl HostType for Tensor {
    fn host_tag() -> HostTag {
        HostTag::TENSOR
    }
}

impl HostType for ImageTensor {
    fn host_tag() -> HostTag {
        HostTag::IMAGE
    }
}

impl HostType for MaskTensor {
    fn host_tag() -> HostTag {
        HostTag::MASK
    }
}

impl HostType for AnyType {
    fn host_tag() -> HostTag {
        HostTag::ANY
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Per-type registration flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeOptions {
    /// Rebuild arguments through the type's converter before the call.
    pub autoconvert: bool,
    /// Always require the parameter to come from an upstream connection.
    pub force_input: bool,
}

impl TypeOptions {
    pub fn autoconvert(mut self) -> Self {
        self.autoconvert = true;
        self
    }

    pub fn force_input(mut self) -> Self {
        self.force_input = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TypeEntry {
    pub host_tag: HostTag,
    pub options: TypeOptions,
    pub converter: Converter,
}

/// Registry of known types, keyed by [`TypeKey`].
#[derive(Debug)]
pub struct TypeRegistry {
    entries: RwLock<HashMap<TypeKey, TypeEntry>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A registry preloaded with the primitive, tensor and wildcard types.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register::<Tensor>(TypeOptions::default());
        registry.register::<ImageTensor>(TypeOptions::default());
        registry.register::<MaskTensor>(TypeOptions::default());
        registry.register::<i64>(TypeOptions::default());
        registry.register::<f64>(TypeOptions::default());
        registry.register::<String>(TypeOptions::default());
        registry.register::<bool>(TypeOptions::default());
        registry.register::<AnyType>(TypeOptions::default());
        registry
    }

    /// Register `T`. Returns `false` (and changes nothing) if already known.
    pub fn register<T: HostType>(&self, options: TypeOptions) -> bool {
        self.insert_first(
            TypeKey::of::<T>(),
            TypeEntry {
                host_tag: T::host_tag(),
                options,
                converter: T::convert,
            },
        )
    }

    /// Register `T` under an explicit tag instead of its default one.
    pub fn register_as<T: HostType>(&self, host_tag: impl Into<HostTag>, options: TypeOptions) -> bool {
        self.insert_first(
            TypeKey::of::<T>(),
            TypeEntry {
                host_tag: host_tag.into(),
                options,
                converter: T::convert,
            },
        )
    }

    /// Register a type known only by key. Its converter is the identity.
    pub fn register_key(&self, key: TypeKey, host_tag: impl Into<HostTag>, options: TypeOptions) -> bool {
        self.insert_first(
            key,
            TypeEntry {
                host_tag: host_tag.into(),
                options,
                converter: identity,
            },
        )
    }

    fn insert_first(&self, key: TypeKey, entry: TypeEntry) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&key) {
            log::debug!("Type '{}' already registered, keeping first registration", key);
            return false;
        }
        entries.insert(key, entry);
        true
    }

    pub fn entry(&self, key: &TypeKey) -> Option<TypeEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Host tag for a declared annotation.
    ///
    /// A sequence resolves through its element type. Unknown types resolve
    /// to the wildcard with a warning; a missing annotation resolves to the
    /// wildcard silently.
    pub fn resolve(&self, annotation: &Annotation) -> HostTag {
        match annotation {
            Annotation::Empty => HostTag::ANY,
            Annotation::List(inner) => self.resolve(inner),
            Annotation::Tuple(_) => {
                log::warn!("Tuple annotation used as a single value, treating as wildcard");
                HostTag::ANY
            }
            Annotation::Type(key) => self.resolve_key(key),
        }
    }

    pub fn resolve_key(&self, key: &TypeKey) -> HostTag {
        match self.entry(key) {
            Some(entry) => entry.host_tag,
            None => {
                log::warn!("Type '{}' not registered, treating as wildcard", key);
                HostTag::ANY
            }
        }
    }

    pub fn force_input(&self, annotation: &Annotation) -> bool {
        annotation
            .element_key()
            .and_then(|key| self.entry(key))
            .is_some_and(|e| e.options.force_input)
    }

    /// Rebuild `value` through the annotation's converter if its type asks
    /// for autoconversion. Sequences are converted elementwise.
    pub fn autoconvert(&self, annotation: &Annotation, value: Value) -> Result<Value, NodeError> {
        let Some(entry) = annotation.element_key().and_then(|key| self.entry(key)) else {
            return Ok(value);
        };
        if !entry.options.autoconvert {
            return Ok(value);
        }
        match value {
            Value::List(items) => items
                .into_iter()
                .map(entry.converter)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            other => (entry.converter)(other),
        }
    }
}
