//! Signature introspection: derive a node's input and output schema from
//! its declared parameters and return annotation.

use std::collections::HashMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::core::error::NodeError;
use crate::core::schema::signature::{Annotation, Param, ParamDefault, Signature};
use crate::core::schema::types::{HostTag, TypeRegistry};
use crate::core::value::Value;

/// Parameter names the host fills in itself. Always hidden.
pub const RESERVED_INPUTS: [(&str, HostTag); 2] = [
    ("unique_id", HostTag::UNIQUE_ID),
    ("extra_pnginfo", HostTag::EXTRA_PNGINFO),
];

pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Schema entry for one input.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSpec {
    /// A typed socket or widget, serialized as `[tag, {metadata}]`.
    Typed { tag: HostTag, metadata: Metadata },
    /// A dropdown, serialized as `[[choice, ...]]`.
    Choices(Vec<String>),
    /// Host-provided value, serialized as the bare tag.
    Reserved(HostTag),
}

impl InputSpec {
    pub fn tag(&self) -> Option<&HostTag> {
        match self {
            InputSpec::Typed { tag, .. } | InputSpec::Reserved(tag) => Some(tag),
            InputSpec::Choices(_) => None,
        }
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match self {
            InputSpec::Typed { metadata, .. } => Some(metadata),
            _ => None,
        }
    }
}

impl Serialize for InputSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            InputSpec::Typed { tag, metadata } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(tag)?;
                seq.serialize_element(metadata)?;
                seq.end()
            }
            InputSpec::Choices(choices) => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(choices)?;
                seq.end()
            }
            InputSpec::Reserved(tag) => tag.serialize(serializer),
        }
    }
}

/// Inputs in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputMap(Vec<(String, InputSpec)>);

impl InputMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, spec: InputSpec) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = spec,
            None => self.0.push((name, spec)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&InputSpec> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputSpec)> {
        self.0.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for InputMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, spec) in &self.0 {
            map.serialize_entry(name, spec)?;
        }
        map.end()
    }
}

/// Everything learned about a function's inputs.
#[derive(Debug, Clone, Default)]
pub struct IntrospectedInputs {
    pub required: InputMap,
    pub optional: InputMap,
    pub hidden: InputMap,
    /// Parameter name to whether it was declared as a sequence.
    pub is_list: HashMap<String, bool>,
    /// Parameter name to its raw annotation.
    pub annotations: HashMap<String, Annotation>,
    /// Values substituted for omitted optional and hidden parameters.
    pub defaults: HashMap<String, Value>,
    /// Parameter names in declaration order, receiver excluded.
    pub order: Vec<String>,
}

impl IntrospectedInputs {
    /// Host tag of a required or optional input.
    pub fn visible_tag(&self, name: &str) -> Option<&HostTag> {
        self.required
            .get(name)
            .or_else(|| self.optional.get(name))
            .and_then(InputSpec::tag)
    }
}

/// Where a parameter lands in the input schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Required,
    Optional,
    Hidden,
}

fn annotate_input(types: &TypeRegistry, param: &Param) -> Result<(InputSpec, Placement), NodeError> {
    if let Some((_, tag)) = RESERVED_INPUTS.iter().find(|(name, _)| *name == param.name) {
        return Ok((InputSpec::Reserved(tag.clone()), Placement::Hidden));
    }

    let tag = types.resolve(&param.annotation);
    let mut metadata = Metadata::new();

    let placement = match &param.default {
        ParamDefault::Empty => {
            metadata.insert("forceInput".into(), true.into());
            Placement::Required
        }
        ParamDefault::None => {
            metadata.insert("optional".into(), true.into());
            metadata.insert("forceInput".into(), true.into());
            Placement::Optional
        }
        ParamDefault::Choice(choice) => {
            if choice.choices.is_empty() {
                return Err(NodeError::EmptyChoice);
            }
            return Ok((InputSpec::Choices(choice.choices.clone()), Placement::Required));
        }
        // Widget wrappers carry their own forceInput flag.
        ParamDefault::Text(input) => {
            metadata.extend(input.metadata());
            let placement = placement_of(input.hidden, input.optional);
            return Ok((InputSpec::Typed { tag, metadata }, placement));
        }
        ParamDefault::Number(input) => {
            input.check(&param.name)?;
            metadata.extend(input.metadata());
            let placement = placement_of(input.hidden, input.optional);
            return Ok((InputSpec::Typed { tag, metadata }, placement));
        }
        ParamDefault::Value(value) => {
            metadata.insert("default".into(), value.to_json());
            Placement::Optional
        }
    };

    if types.force_input(&param.annotation) {
        metadata.insert("forceInput".into(), true.into());
    }

    Ok((InputSpec::Typed { tag, metadata }, placement))
}

/// `hidden` only applies to optional parameters.
fn placement_of(hidden: bool, optional: bool) -> Placement {
    match (optional, hidden) {
        (false, _) => Placement::Required,
        (true, true) => Placement::Hidden,
        (true, false) => Placement::Optional,
    }
}

/// Derive the input schema of `signature`. With `skip_receiver`, the first
/// parameter is an implicit receiver and contributes nothing.
pub fn infer_inputs(
    types: &TypeRegistry,
    signature: &Signature,
    skip_receiver: bool,
) -> Result<IntrospectedInputs, NodeError> {
    let mut inputs = IntrospectedInputs::default();
    let params = signature.params.iter().skip(usize::from(skip_receiver));

    for param in params {
        let (spec, placement) = annotate_input(types, param)?;
        match placement {
            Placement::Required => inputs.required.insert(&param.name, spec),
            Placement::Optional => inputs.optional.insert(&param.name, spec),
            Placement::Hidden => inputs.hidden.insert(&param.name, spec),
        }
        if placement != Placement::Required {
            let default = param.default.runtime_value().unwrap_or(Value::None);
            inputs.defaults.insert(param.name.clone(), default);
        }
        inputs.is_list.insert(param.name.clone(), param.annotation.is_list());
        inputs.annotations.insert(param.name.clone(), param.annotation.clone());
        inputs.order.push(param.name.clone());
    }

    Ok(inputs)
}

/// One output slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnSlot {
    pub tag: HostTag,
    pub is_list: bool,
}

impl ReturnSlot {
    pub fn new(tag: impl Into<HostTag>) -> Self {
        Self {
            tag: tag.into(),
            is_list: false,
        }
    }

    pub fn list(tag: impl Into<HostTag>) -> Self {
        Self {
            tag: tag.into(),
            is_list: true,
        }
    }
}

impl From<HostTag> for ReturnSlot {
    fn from(tag: HostTag) -> Self {
        ReturnSlot::new(tag)
    }
}

impl From<&'static str> for ReturnSlot {
    fn from(tag: &'static str) -> Self {
        ReturnSlot::new(tag)
    }
}

/// Derive output slots from a return annotation.
///
/// A tuple contributes one slot per element; anything else is a single
/// output; no annotation means no outputs.
pub fn infer_returns(types: &TypeRegistry, returns: &Annotation) -> Vec<ReturnSlot> {
    match returns {
        Annotation::Empty => Vec::new(),
        Annotation::Tuple(items) => items
            .iter()
            .map(|item| ReturnSlot {
                tag: types.resolve(item),
                is_list: item.is_list(),
            })
            .collect(),
        single => vec![ReturnSlot {
            tag: types.resolve(single),
            is_list: single.is_list(),
        }],
    }
}
