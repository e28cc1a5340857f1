//! # nodefunc
//!
//! Turn ordinary typed functions into nodes a graph execution host can
//! present, wire and run.
//!
//! ## Features
//!
//! - **Schema from signatures**: inputs, widgets and outputs are derived from
//!   a function's declared parameters and return annotation
//! - **Safe execution**: arguments are placed, converted and verified before
//!   the call; results are normalized and verified after it
//! - **Retries and diagnostics**: failed attempts are retried with captured
//!   output handed to a hook
//! - **Hot reload**: implementations loaded from files are re-resolved when
//!   the file changes
//! - **Setter nodes**: any property-bearing type gets a constructor node
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nodefunc::prelude::*;
//! use std::collections::HashMap;
//!
//! let runtime = Runtime::new(RuntimeConfig::default());
//! let registry = NodeRegistry::new(runtime);
//!
//! let invert = node_function!(
//!     invert_mask,
//!     Signature::new().input::<MaskTensor>("mask").returns::<MaskTensor>(),
//!     |args: &mut Args| {
//!         let mask: Tensor = args.get("mask")?;
//!         let data = mask.data().iter().map(|v| 1.0 - *v).collect();
//!         Ok(Value::Tensor(Tensor::new(mask.shape().to_vec(), data)?))
//!     }
//! );
//! let node = registry.define(invert).category("Masks").register()?;
//!
//! let mask = Tensor::filled(vec![1, 8, 8], 0.25);
//! let output = node.invoke(HashMap::from([("mask".to_string(), Value::Tensor(mask))]))?;
//! # Ok::<(), nodefunc::NodeError>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`prelude`]: Commonly used types and traits (import with `use nodefunc::prelude::*`)
//! - [`capture`]: Per-invocation diagnostic capture and the capturing logger
//! - [`preview`]: UI preview payloads
//! - [`validation`]: Tensor rules

// ============================================================================
// Core Module
// ============================================================================

mod core;

// ============================================================================
// Public Re-exports - Granular Imports
// ============================================================================

// Errors and configuration
pub use self::core::config::{
    DocstringMode, ExceptionHook, FailureReport, RegistrationMode, RuntimeConfig,
};
pub use self::core::error::{BoxError, NodeError};
pub use self::core::host::{HostEnvironment, LocalHost};
pub use self::core::runtime::Runtime;

// Values
pub use self::core::value::{
    Device, FromValue, Object, Properties, Property, PropertyInfo, Reflect, Tensor, Value,
};

// Schema
pub use self::core::schema::descriptor::{
    InputTypes, IsChangedHook, NodeColor, NodeDescriptor, ValidateInputsHook,
};
pub use self::core::schema::function::{MethodKind, NodeFn, NodeFunction, node_fn};
pub use self::core::schema::introspect::{InputMap, InputSpec, IntrospectedInputs, ReturnSlot};
pub use self::core::schema::signature::{
    Annotation, Choice, NumberInput, Param, ParamDefault, Signature, SourceLocation, StringInput,
};
pub use self::core::schema::types::{
    AnyType, HostTag, HostType, ImageTensor, MaskTensor, TypeKey, TypeOptions, TypeRegistry,
};

// Compilation and registration
pub use self::core::compiler::{NodeBuilder, NodeOptions, compile};
pub use self::core::registry::NodeRegistry;
pub use self::core::setter::create_setter;

// Execution
pub use self::core::async_impl::invoke_all;
pub use self::core::exec::{Args, CompiledNode, NodeOutput};
pub use self::core::reload::{FileModule, ReloadLedger, ReloadableModule};

pub use self::core::exec::{capture, preview, validation};

// ============================================================================
// Prelude Module - Convenient Bulk Imports
// ============================================================================

/// The main prelude: imports everything needed to define, register and
/// invoke nodes.
///
/// # Example
/// ```rust
/// use nodefunc::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        // Values
        Annotation,
        AnyType,
        Args,
        BoxError,
        Choice,
        // Execution
        CompiledNode,
        Device,
        FromValue,
        HostTag,
        ImageTensor,
        MaskTensor,
        MethodKind,
        NodeError,
        NodeFunction,
        NodeOutput,
        // Registration
        NodeRegistry,
        NumberInput,
        Properties,
        Property,
        Runtime,
        RuntimeConfig,
        // Schema
        Signature,
        StringInput,
        Tensor,
        TypeOptions,
        Value,
    };
    pub use crate::node_function;
}

// ============================================================================
// Re-export commonly used external types for convenience
// ============================================================================

pub use serde_json::Value as JsonValue;

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
