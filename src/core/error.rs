use thiserror::Error;

use crate::core::schema::signature::SourceLocation;

/// Error type produced by node implementations.
///
/// Implementations may fail with anything; the wrapper only needs to be able
/// to display it, hand it to the exception hook and propagate it unchanged.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum NodeError {
    // ---- schema errors (compile / registration time) -------------------------
    #[error("Node class '{workflow_name}' ({function}) already exists")]
    DuplicateWorkflowName {
        workflow_name: String,
        function: String,
    },

    #[error("Display name '{0}' already exists")]
    DuplicateDisplayName(String),

    #[error("Only one method from '{0}' can be used as a node")]
    DuplicateOwner(String),

    #[error("Number of output names must match number of return types. Got {names} names and {types} return types")]
    ReturnNameMismatch { names: usize, types: usize },

    #[error("Color must be a hex color code of the form #RRGGBB, got '{0}'")]
    InvalidColor(String),

    #[error("Default {value} of '{param}' is outside the allowed range: {reason}")]
    DefaultOutOfRange {
        param: String,
        value: f64,
        reason: String,
    },

    #[error("Choice list must not be empty")]
    EmptyChoice,

    // ---- input errors (per call, before the implementation runs) -------------
    #[error("Error verifying INPUT tensor '{param}': {message}\n Source: {location}")]
    InputValidation {
        param: String,
        message: String,
        location: SourceLocation,
    },

    #[error("Missing required argument '{param}'\n Source: {location}")]
    MissingArgument {
        param: String,
        location: SourceLocation,
    },

    #[error("Unexpected argument '{param}'\n Source: {location}")]
    UnexpectedArgument {
        param: String,
        location: SourceLocation,
    },

    #[error("Argument '{param}' is not declared as a list, expected exactly 1 element in list mode, got {len}")]
    ListArity { param: String, len: usize },

    #[error("Cannot convert {found} to {expected}")]
    Conversion { expected: String, found: String },

    #[error("Argument '{param}': {source}")]
    Argument {
        param: String,
        #[source]
        source: Box<NodeError>,
    },

    #[error("No property '{property}' on '{object}'")]
    UnknownProperty { object: String, property: String },

    #[error("Property '{property}' on '{object}' is read-only")]
    ReadOnlyProperty { object: String, property: String },

    #[error("Invalid tensor: {0}")]
    InvalidTensor(String),

    // ---- arity / output errors (per call, after the implementation returns) --
    #[error("{function}: Number of return values {got} does not match number of return types {expected}\n Source: {location}")]
    ReturnArity {
        function: String,
        expected: usize,
        got: usize,
        location: SourceLocation,
    },

    #[error("{function}: Return value is not None, but no return type specified\n Source: {location}")]
    UnexpectedReturn {
        function: String,
        location: SourceLocation,
    },

    #[error("Error verifying OUTPUT tensor {output}: {message}\n Source: {location}")]
    OutputValidation {
        output: String,
        message: String,
        location: SourceLocation,
    },

    // ---- execution ------------------------------------------------------------
    #[error(transparent)]
    Execution(BoxError),

    #[error("Failed to reload module '{module}': {source}")]
    Reload {
        module: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to write preview: {0}")]
    Preview(String),

    #[error("Background invocation failed: {0}")]
    Join(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NodeError {
    /// Recovers a `NodeError` from a boxed implementation error, wrapping
    /// foreign errors as [`NodeError::Execution`].
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<NodeError>() {
            Ok(node_err) => *node_err,
            Err(other) => NodeError::Execution(other),
        }
    }

    /// True for errors raised while compiling or registering a node.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            NodeError::DuplicateWorkflowName { .. }
                | NodeError::DuplicateDisplayName(_)
                | NodeError::DuplicateOwner(_)
                | NodeError::ReturnNameMismatch { .. }
                | NodeError::InvalidColor(_)
                | NodeError::DefaultOutOfRange { .. }
                | NodeError::EmptyChoice
        )
    }
}
