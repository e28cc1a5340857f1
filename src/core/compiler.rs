//! Compiles node functions into host-facing nodes.

use std::sync::Arc;

use crate::core::error::NodeError;
use crate::core::exec::CompiledNode;
use crate::core::registry::NodeRegistry;
use crate::core::runtime::Runtime;
use crate::core::schema::descriptor::{
    InputTypes, IsChangedHook, NodeColor, NodeDescriptor, ValidateInputsHook, compose_description,
    default_names,
};
use crate::core::schema::function::NodeFunction;
use crate::core::schema::introspect::{self, ReturnSlot};
use crate::core::value::Value;

/// Everything a node definition can override.
#[derive(Clone, Default)]
pub struct NodeOptions {
    pub category: Option<String>,
    pub display_name: Option<String>,
    pub workflow_name: Option<String>,
    pub description: Option<String>,
    pub is_output_node: bool,
    /// Output slots, bypassing inference from the return annotation.
    pub return_types: Option<Vec<ReturnSlot>>,
    pub return_names: Option<Vec<String>>,
    pub validate_inputs: Option<ValidateInputsHook>,
    pub is_changed: Option<IsChangedHook>,
    /// Attach a text or image preview of the first result.
    pub preview: bool,
    /// Log arguments and results of every call.
    pub debug: bool,
    /// `#RRGGBB`.
    pub color: Option<String>,
}

/// Compile `function` against `runtime`. Nothing is registered.
pub fn compile(
    runtime: &Arc<Runtime>,
    function: NodeFunction,
    options: NodeOptions,
) -> Result<CompiledNode, NodeError> {
    let config = runtime.config();
    let wrapped_name = format!("{}_wrapper", function.qualname());

    let inputs = introspect::infer_inputs(
        runtime.types(),
        function.signature(),
        function.kind().has_receiver(),
    )?;

    let returns = match options.return_types {
        Some(slots) => slots,
        None => introspect::infer_returns(runtime.types(), &function.signature().returns),
    };

    if let Some(names) = &options.return_names {
        if names.len() != returns.len() {
            return Err(NodeError::ReturnNameMismatch {
                names: names.len(),
                types: returns.len(),
            });
        }
    }

    let color = options.color.as_deref().map(NodeColor::parse).transpose()?;

    let (default_display, default_workflow) = default_names(function.name());
    let display_name = options.display_name.unwrap_or(default_display);
    let workflow_name = options.workflow_name.unwrap_or(default_workflow);

    let description = compose_description(
        options.description.as_deref(),
        function.docstring(),
        config.docstring_mode,
        color.as_ref(),
        function.location(),
    );

    // A node without outputs only runs if the host treats it as an output.
    let output_node = options.is_output_node || returns.is_empty();

    if options.debug {
        log::info!(
            "Compiled {} as '{}' ({}): {} required, {} optional, {} hidden inputs, {} outputs",
            function.qualname(),
            workflow_name,
            display_name,
            inputs.required.len(),
            inputs.optional.len(),
            inputs.hidden.len(),
            returns.len()
        );
    }

    let descriptor = NodeDescriptor {
        workflow_name,
        display_name,
        category: options.category.unwrap_or(config.default_category),
        function: wrapped_name,
        inputs: InputTypes {
            required: inputs.required.clone(),
            optional: inputs.optional.clone(),
            hidden: inputs.hidden.clone(),
        },
        return_types: returns.iter().map(|slot| slot.tag.clone()).collect(),
        return_names: options.return_names,
        input_is_list: inputs.is_list.values().any(|&is_list| is_list),
        output_is_list: returns.iter().map(|slot| slot.is_list).collect(),
        output_node,
        description,
        color,
        source: function.location().clone(),
        owner: function.owner().map(str::to_string),
        validate_inputs: options.validate_inputs,
        is_changed: options.is_changed,
    };

    Ok(CompiledNode::new(
        descriptor,
        function,
        inputs,
        options.preview,
        options.debug,
        Arc::clone(runtime),
    ))
}

/// Fluent node definition, finished by [`NodeBuilder::compile`] or
/// [`NodeBuilder::register`].
pub struct NodeBuilder<'a> {
    registry: &'a NodeRegistry,
    function: NodeFunction,
    options: NodeOptions,
}

impl<'a> NodeBuilder<'a> {
    pub(crate) fn new(registry: &'a NodeRegistry, function: NodeFunction) -> Self {
        Self {
            registry,
            function,
            options: NodeOptions::default(),
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.options.category = Some(category.into());
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.options.display_name = Some(name.into());
        self
    }

    pub fn workflow_name(mut self, name: impl Into<String>) -> Self {
        self.options.workflow_name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.options.description = Some(description.into());
        self
    }

    pub fn output_node(mut self) -> Self {
        self.options.is_output_node = true;
        self
    }

    pub fn return_types<T: Into<ReturnSlot>>(mut self, slots: impl IntoIterator<Item = T>) -> Self {
        self.options.return_types = Some(slots.into_iter().map(Into::into).collect());
        self
    }

    pub fn return_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.options.return_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn validate_inputs<F>(mut self, hook: F) -> Self
    where
        F: Fn(&std::collections::HashMap<String, Value>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.options.validate_inputs = Some(Arc::new(hook));
        self
    }

    pub fn is_changed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&std::collections::HashMap<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.options.is_changed = Some(Arc::new(hook));
        self
    }

    pub fn preview(mut self) -> Self {
        self.options.preview = true;
        self
    }

    pub fn debug(mut self) -> Self {
        self.options.debug = true;
        self
    }

    pub fn color(mut self, hex: impl Into<String>) -> Self {
        self.options.color = Some(hex.into());
        self
    }

    pub fn options(mut self, options: NodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Compile without registering.
    pub fn compile(self) -> Result<CompiledNode, NodeError> {
        compile(self.registry.runtime(), self.function, self.options)
    }

    /// Compile and register.
    pub fn register(self) -> Result<Arc<CompiledNode>, NodeError> {
        let node = compile(self.registry.runtime(), self.function, self.options)?;
        self.registry.register(node)
    }
}
