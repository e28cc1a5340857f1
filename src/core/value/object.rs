//! Property-bearing objects.
//!
//! A type opts in by implementing [`Properties`]: a default constructor plus a
//! table of named getters and (optionally) setters. Everything else, including
//! the dynamic [`Reflect`] interface the setter generator drives, comes from
//! that table.

use std::fmt;

use crate::core::error::NodeError;
use crate::core::schema::types::TypeKey;
use crate::core::value::{AsAny, Value};

/// Reads a property from an object.
pub type Getter<T> = fn(&T) -> Value;

/// Writes a property on an object. `None` in [`Property::set`] means read-only.
pub type Setter<T> = fn(&mut T, Value) -> Result<(), NodeError>;

/// One named property of `T`.
pub struct Property<T> {
    pub name: &'static str,
    pub get: Getter<T>,
    pub set: Option<Setter<T>>,
}

impl<T> Property<T> {
    pub fn read_write(name: &'static str, get: Getter<T>, set: Setter<T>) -> Self {
        Self {
            name,
            get,
            set: Some(set),
        }
    }

    pub fn read_only(name: &'static str, get: Getter<T>) -> Self {
        Self {
            name,
            get,
            set: None,
        }
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }
}

/// Static property table of a constructible type.
pub trait Properties: Default + Clone + fmt::Debug + Send + Sync + 'static {
    fn properties() -> Vec<Property<Self>>;

    /// Unqualified type name, used as the host tag and node name of setters.
    fn name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Name and access of a property, as seen through [`Reflect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    pub name: &'static str,
    pub writable: bool,
}

/// Dynamic view of a property-bearing object.
pub trait Reflect: AsAny + Send + Sync + fmt::Debug + 'static {
    fn type_key(&self) -> TypeKey;

    fn type_name(&self) -> &'static str;

    fn property_info(&self) -> Vec<PropertyInfo>;

    fn get(&self, name: &str) -> Option<Value>;

    fn set(&mut self, name: &str, value: Value) -> Result<(), NodeError>;

    fn clone_object(&self) -> Box<dyn Reflect>;
}

impl<T: Properties> Reflect for T {
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        T::name()
    }

    fn property_info(&self) -> Vec<PropertyInfo> {
        T::properties()
            .iter()
            .map(|p| PropertyInfo {
                name: p.name,
                writable: p.is_writable(),
            })
            .collect()
    }

    fn get(&self, name: &str) -> Option<Value> {
        T::properties()
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| (p.get)(self))
    }

    fn set(&mut self, name: &str, value: Value) -> Result<(), NodeError> {
        let prop = T::properties()
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| NodeError::UnknownProperty {
                object: T::name().to_string(),
                property: name.to_string(),
            })?;
        let setter = prop.set.ok_or_else(|| NodeError::ReadOnlyProperty {
            object: T::name().to_string(),
            property: name.to_string(),
        })?;
        setter(self, value)
    }

    fn clone_object(&self) -> Box<dyn Reflect> {
        Box::new(self.clone())
    }
}

/// An owned, type-erased property-bearing object.
pub struct Object(Box<dyn Reflect>);

impl Object {
    pub fn new<T: Reflect>(value: T) -> Self {
        Object(Box::new(value))
    }

    pub fn from_boxed(value: Box<dyn Reflect>) -> Self {
        Object(value)
    }

    pub fn type_key(&self) -> TypeKey {
        self.0.type_key()
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    pub fn property_info(&self) -> Vec<PropertyInfo> {
        self.0.property_info()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<(), NodeError> {
        self.0.set(name, value)
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        (*self.0).as_any_mut().downcast_mut::<T>()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .property_info()
            .into_iter()
            .filter_map(|info| self.get(info.name).map(|v| (info.name.to_string(), v.to_json())))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl Clone for Object {
    fn clone(&self) -> Self {
        Object(self.0.clone_object())
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.type_key() == other.type_key()
            && self
                .property_info()
                .iter()
                .all(|info| self.get(info.name) == other.get(info.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct Knob {
        level: i64,
        serial: String,
    }

    impl Properties for Knob {
        fn properties() -> Vec<Property<Self>> {
            vec![
                Property::read_write(
                    "level",
                    |k: &Knob| Value::Int(k.level),
                    |k: &mut Knob, v: Value| {
                        k.level = i64::from_value(&v)?;
                        Ok(())
                    },
                ),
                Property::read_only("serial", |k: &Knob| Value::Str(k.serial.clone())),
            ]
        }
    }

    use crate::core::value::FromValue;

    #[test]
    fn test_reflect_get_set() {
        let mut obj = Object::new(Knob::default());
        assert_eq!(obj.type_name(), "Knob");
        obj.set("level", Value::Int(4)).unwrap();
        assert_eq!(obj.get("level"), Some(Value::Int(4)));
        assert_eq!(obj.downcast_ref::<Knob>().unwrap().level, 4);
    }

    #[test]
    fn test_read_only_and_unknown_properties() {
        let mut obj = Object::new(Knob::default());
        assert!(matches!(
            obj.set("serial", Value::from("x")),
            Err(NodeError::ReadOnlyProperty { .. })
        ));
        assert!(matches!(
            obj.set("missing", Value::Int(1)),
            Err(NodeError::UnknownProperty { .. })
        ));
        let info = obj.property_info();
        assert_eq!(info.len(), 2);
        assert!(info[0].writable);
        assert!(!info[1].writable);
    }

    #[test]
    fn test_object_equality_compares_properties() {
        let a = Value::object(Knob { level: 1, serial: "a".into() });
        let b = Value::object(Knob { level: 1, serial: "a".into() });
        let c = Value::object(Knob { level: 2, serial: "a".into() });
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
