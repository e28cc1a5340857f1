//! Setter nodes generated from property tables.
//!
//! For a [`Properties`] type, the generated node takes one optional input
//! per writable property, defaulting to the property's value on a fresh
//! instance, and returns a fresh instance with every supplied input applied.

use std::sync::Arc;

use crate::core::error::NodeError;
use crate::core::exec::{Args, CompiledNode};
use crate::core::registry::NodeRegistry;
use crate::core::schema::function::NodeFunction;
use crate::core::schema::signature::{
    Annotation, NumberInput, Param, ParamDefault, Signature, SourceLocation, StringInput,
};
use crate::core::schema::types::{HostTag, TypeKey, TypeOptions, TypeRegistry};
use crate::core::value::{Properties, Reflect, Value};

/// Input default for a property whose fresh value is `value`.
fn default_for(value: &Value) -> ParamDefault {
    match value {
        Value::Int(i) => NumberInput::int(*i).optional().into(),
        Value::Float(f) => NumberInput::new(*f).optional().into(),
        Value::Str(s) => StringInput::new(s.clone()).optional().into(),
        Value::Bool(b) => ParamDefault::Value(Value::Bool(*b)),
        _ => ParamDefault::None,
    }
}

/// Annotation for a property value, registering its type under its own
/// name if it isn't known yet.
fn annotation_for(types: &TypeRegistry, value: &Value) -> Annotation {
    let key = match value {
        Value::None => return Annotation::Empty,
        Value::List(items) | Value::Tuple(items) => {
            return match items.first() {
                Some(first) => Annotation::list(annotation_for(types, first)),
                None => Annotation::list(Annotation::Empty),
            };
        }
        other => other.type_key(),
    };
    if !types.contains(&key) {
        types.register_key(key.clone(), HostTag::new(key.short_name()), TypeOptions::default());
    }
    Annotation::Type(key)
}

/// Build the setter function for `T`.
pub fn create_setter<T: Properties>(types: &TypeRegistry) -> NodeFunction {
    let fresh = T::default();
    let mut signature = Signature::new();
    let mut writable = Vec::new();

    for info in Reflect::property_info(&fresh).into_iter().filter(|p| p.writable) {
        let current = Reflect::get(&fresh, info.name).unwrap_or_default();
        let param = Param::new(info.name, annotation_for(types, &current)).with_default(default_for(&current));
        signature = signature.param(param);
        writable.push(info.name);
    }
    let signature = signature.returns::<T>();

    let name = format!("{}_setter", T::name());
    NodeFunction::new(name, signature, move |args: &mut Args| {
        let mut object = T::default();
        for property in &writable {
            match args.take(property) {
                Some(value) if !value.is_none() => Reflect::set(&mut object, property, value)?,
                _ => {}
            }
        }
        Ok(Value::object(object))
    })
    .at(SourceLocation::synthetic(format!("<setter {}>", T::name())))
}

impl NodeRegistry {
    /// Register `T` as a host type and add its setter node, named after `T`.
    pub fn register_setter<T: Properties>(&self, category: Option<&str>) -> Result<Arc<CompiledNode>, NodeError> {
        let types = self.runtime().types();
        types.register_key(TypeKey::of::<T>(), HostTag::new(T::name()), TypeOptions::default());

        let function = create_setter::<T>(types);
        let mut builder = self
            .define(function)
            .display_name(T::name())
            .workflow_name(T::name());
        if let Some(category) = category {
            builder = builder.category(category);
        }
        builder.register()
    }
}
