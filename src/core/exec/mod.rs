//! The execution wrapper: what runs when the host invokes a node.
//!
//! Every call goes through the same pipeline:
//!
//! 1. Arguments are checked against the schema, moved to the host's device,
//!    reshaped (2-D masks gain a batch axis), autoconverted and verified.
//! 2. In list mode, scalar parameters are unwrapped from their one-element lists.
//! 3. The implementation is resolved (possibly hot-reloaded) and called, up
//!    to `max_tries` times, each attempt inside its own capture scope.
//! 4. The result is normalized to a sequence matching the declared outputs,
//!    moved to the CPU and verified.
//! 5. An optional UI preview is attached.

pub mod capture;
pub mod preview;
pub mod validation;

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::config::{FailureReport, RuntimeConfig};
use crate::core::error::{BoxError, NodeError};
use crate::core::runtime::Runtime;
use crate::core::schema::descriptor::NodeDescriptor;
use crate::core::schema::function::{NodeFn, NodeFunction};
use crate::core::schema::introspect::IntrospectedInputs;
use crate::core::schema::types::HostTag;
use crate::core::value::{Device, FromValue, Value};

use capture::{CaptureScope, Diagnostics};
use preview::UiPayload;

// ============================================================================
// Arguments
// ============================================================================

/// Keyword arguments handed to a node implementation.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: HashMap<String, Value>,
    diagnostics: Diagnostics,
}

impl Args {
    pub fn new(values: HashMap<String, Value>, diagnostics: Diagnostics) -> Self {
        Self { values, diagnostics }
    }

    /// Typed access. An absent argument reads as `Value::None`, so `Option<T>`
    /// works for optional parameters.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, NodeError> {
        let value = self.values.get(name).unwrap_or(&Value::None);
        T::from_value(value).map_err(|source| NodeError::Argument {
            param: name.to_string(),
            source: Box::new(source),
        })
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn take(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Output sink captured for this attempt.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_values(self) -> HashMap<String, Value> {
        self.values
    }
}

impl From<HashMap<String, Value>> for Args {
    fn from(values: HashMap<String, Value>) -> Self {
        Self::new(values, Diagnostics::new())
    }
}

/// What a node invocation hands back to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    /// One value per declared output, or a single `None` for nodes without outputs.
    pub result: Vec<Value>,
    pub ui: Option<UiPayload>,
}

impl NodeOutput {
    pub fn into_result(self) -> Vec<Value> {
        self.result
    }

    /// The `{"ui": ...}` envelope, if there is a preview.
    pub fn ui_json(&self) -> Option<serde_json::Value> {
        self.ui
            .as_ref()
            .map(|ui| serde_json::json!({ "ui": ui }))
    }
}

// ============================================================================
// Compiled node
// ============================================================================

/// A node function compiled against a runtime: its host schema plus the
/// wrapper that executes it.
pub struct CompiledNode {
    descriptor: NodeDescriptor,
    function: NodeFunction,
    inputs: IntrospectedInputs,
    has_preview: bool,
    debug: bool,
    runtime: Arc<Runtime>,
}

impl CompiledNode {
    pub(crate) fn new(
        descriptor: NodeDescriptor,
        function: NodeFunction,
        inputs: IntrospectedInputs,
        has_preview: bool,
        debug: bool,
        runtime: Arc<Runtime>,
    ) -> Self {
        Self {
            descriptor,
            function,
            inputs,
            has_preview,
            debug,
            runtime,
        }
    }

    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    pub fn function(&self) -> &NodeFunction {
        &self.function
    }

    pub fn inputs(&self) -> &IntrospectedInputs {
        &self.inputs
    }

    pub fn workflow_name(&self) -> &str {
        &self.descriptor.workflow_name
    }

    pub fn display_name(&self) -> &str {
        &self.descriptor.display_name
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Run the node's input validation hook, if it has one.
    pub fn validate_inputs(&self, kwargs: &HashMap<String, Value>) -> Result<(), String> {
        match &self.descriptor.validate_inputs {
            Some(hook) => hook(kwargs),
            None => Ok(()),
        }
    }

    /// Run the node's change detection hook, if it has one.
    pub fn is_changed(&self, kwargs: &HashMap<String, Value>) -> Option<Value> {
        self.descriptor.is_changed.as_ref().map(|hook| hook(kwargs))
    }

    /// Invoke the node with keyword arguments from the host.
    pub fn invoke(&self, kwargs: HashMap<String, Value>) -> Result<NodeOutput, NodeError> {
        let config = self.runtime.config();
        self.runtime.mark_initialized();

        if self.debug {
            log::info!(
                "Calling {} with {} arguments",
                self.function.qualname(),
                kwargs.len()
            );
            for (name, value) in &kwargs {
                log::info!("{}: {}", name, value.kind());
            }
        }

        let (mut kwargs, input_desc) = self.prepare_inputs(kwargs, &config)?;

        if self.descriptor.input_is_list {
            self.unwrap_list_arguments(&mut kwargs)?;
        }

        for (name, default) in &self.inputs.defaults {
            if !kwargs.contains_key(name) {
                kwargs.insert(name.clone(), default.clone());
            }
        }

        let (reloaded, implementation) = self
            .runtime
            .reload()
            .resolve(&self.function, config.hot_reload)?;
        if reloaded && self.debug {
            log::info!("Using reloaded implementation of {}", self.function.qualname());
        }

        let result = self.call_with_retry(&implementation, kwargs, &input_desc, &config)?;

        let ui = if self.has_preview {
            preview::build_preview(&result, &self.runtime.host().temp_directory()).unwrap_or_else(|e| {
                log::warn!("{}: {}, not showing preview", self.function.qualname(), e);
                None
            })
        } else {
            None
        };

        Ok(NodeOutput { result, ui })
    }

    /// Check, place, convert and verify every argument. Returns the prepared
    /// arguments and a one-line description of each, in declaration order.
    fn prepare_inputs(
        &self,
        kwargs: HashMap<String, Value>,
        config: &RuntimeConfig,
    ) -> Result<(HashMap<String, Value>, Vec<String>), NodeError> {
        let location = &self.descriptor.source;

        if let Some(unknown) = kwargs.keys().find(|k| !self.inputs.annotations.contains_key(*k)) {
            return Err(NodeError::UnexpectedArgument {
                param: unknown.clone(),
                location: location.clone(),
            });
        }
        if let Some(missing) = self
            .descriptor
            .inputs
            .required
            .names()
            .find(|name| !kwargs.contains_key(*name))
        {
            return Err(NodeError::MissingArgument {
                param: missing.to_string(),
                location: location.clone(),
            });
        }

        let device = self.runtime.host().device();
        let mut kwargs = kwargs;
        let mut prepared = HashMap::with_capacity(kwargs.len());
        let mut input_desc = Vec::with_capacity(kwargs.len());

        for name in &self.inputs.order {
            let Some(arg) = kwargs.remove(name) else {
                continue;
            };
            let tag = self.inputs.visible_tag(name);
            let arg = self.coerce(name, arg, tag, device)?;

            input_desc.push(match &arg {
                Value::Tensor(t) => format!("{} ({}): {}", name, arg.kind(), t.info()),
                Value::Object(obj) => format!("{} ({}): {}", name, obj.type_name(), arg),
                other => format!("{} ({}): {}", name, other.kind(), other),
            });

            if config.verify_tensors {
                if let Some(tag) = tag {
                    let result = self.runtime.rules().verify(tag, &arg, &format!("'{name}'"));
                    result.log_warnings();
                    if !result.is_safe() {
                        return Err(NodeError::InputValidation {
                            param: name.clone(),
                            message: result.error_summary(),
                            location: location.clone(),
                        });
                    }
                }
            }

            prepared.insert(name.clone(), arg);
        }

        Ok((prepared, input_desc))
    }

    fn coerce(
        &self,
        name: &str,
        arg: Value,
        tag: Option<&HostTag>,
        device: Device,
    ) -> Result<Value, NodeError> {
        let mut arg = arg.map_tensors(&|t| t.to(device));

        if tag == Some(&HostTag::MASK) {
            if let Value::Tensor(mask) = &arg {
                if mask.rank() == 2 {
                    arg = Value::Tensor(mask.unsqueeze(0)?);
                }
            }
        }

        match self.inputs.annotations.get(name) {
            Some(annotation) => self
                .runtime
                .types()
                .autoconvert(annotation, arg)
                .map_err(|source| NodeError::Argument {
                    param: name.to_string(),
                    source: Box::new(source),
                }),
            None => Ok(arg),
        }
    }

    /// In list mode the host sends every argument as a list. Parameters not
    /// declared as sequences must receive exactly one element.
    fn unwrap_list_arguments(&self, kwargs: &mut HashMap<String, Value>) -> Result<(), NodeError> {
        for (name, value) in kwargs.iter_mut() {
            if self.inputs.is_list.get(name).copied().unwrap_or(false) {
                continue;
            }
            match std::mem::take(value) {
                Value::List(mut items) if items.len() == 1 => *value = items.remove(0),
                Value::List(items) => {
                    return Err(NodeError::ListArity {
                        param: name.clone(),
                        len: items.len(),
                    });
                }
                scalar => *value = scalar,
            }
        }
        Ok(())
    }

    fn call_with_retry(
        &self,
        implementation: &Arc<dyn NodeFn>,
        kwargs: HashMap<String, Value>,
        input_desc: &[String],
        config: &RuntimeConfig,
    ) -> Result<Vec<Value>, NodeError> {
        let max_tries = config.max_tries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let scope = CaptureScope::begin();
            let mut args = Args::new(kwargs.clone(), scope.diagnostics().clone());

            log::debug!("-------- Running {} --------", self.function.qualname());
            let outcome = implementation
                .call(&mut args)
                .and_then(|result| self.normalize_result(result, config).map_err(BoxError::from));
            log::debug!("-------- Finished {} --------", self.function.qualname());

            let captured = scope.finish();
            let err = match outcome {
                Ok(values) => return Ok(values),
                Err(err) => err,
            };

            if attempt >= max_tries {
                if max_tries > 1 {
                    log::info!("Out of tries for {}, raising the last error", self.function.qualname());
                }
                return Err(NodeError::from_boxed(err));
            }

            match &config.exception_hook {
                Some(hook) => hook(&FailureReport {
                    function: &self.function,
                    error: err.as_ref(),
                    inputs: input_desc,
                    log: &captured,
                    attempt,
                }),
                None => log::warn!(
                    "{} failed on attempt {}/{}: {}",
                    self.function.qualname(),
                    attempt,
                    max_tries,
                    err
                ),
            }
        }
    }

    /// Shape the raw return value into one value per declared output.
    fn normalize_result(&self, result: Value, config: &RuntimeConfig) -> Result<Vec<Value>, NodeError> {
        let location = &self.descriptor.source;
        let expected = self.descriptor.return_types.len();

        if expected == 0 {
            if !result.is_none() {
                return Err(NodeError::UnexpectedReturn {
                    function: self.function.qualname().to_string(),
                    location: location.clone(),
                });
            }
            return Ok(vec![Value::None]);
        }

        let values = match result {
            Value::Tuple(items) => items,
            single => vec![single],
        };
        if values.len() != expected {
            return Err(NodeError::ReturnArity {
                function: self.function.qualname().to_string(),
                expected,
                got: values.len(),
                location: location.clone(),
            });
        }

        let values: Vec<Value> = values
            .into_iter()
            .map(|v| v.map_tensors(&|t| t.to(Device::Cpu)))
            .collect();

        for (i, value) in values.iter().enumerate() {
            if value.is_none() {
                log::warn!("{}: result {} is None", self.function.qualname(), i);
            }
            if self.debug {
                log::info!("Result {}: {}", i, value.kind());
            }
            if config.verify_tensors {
                let output = match self.descriptor.return_names.as_ref().and_then(|n| n.get(i)) {
                    Some(name) => format!("'{name}'"),
                    None => format!("return_{i}"),
                };
                let tag = &self.descriptor.return_types[i];
                let result = self.runtime.rules().verify(tag, value, &output);
                result.log_warnings();
                if !result.is_safe() {
                    return Err(NodeError::OutputValidation {
                        output,
                        message: result.error_summary(),
                        location: location.clone(),
                    });
                }
            }
        }

        Ok(values)
    }
}

impl std::fmt::Debug for CompiledNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledNode")
            .field("descriptor", &self.descriptor)
            .field("function", &self.function)
            .field("has_preview", &self.has_preview)
            .finish_non_exhaustive()
    }
}
