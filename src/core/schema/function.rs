//! Node functions: an implementation plus everything known about it.

use std::fmt;
use std::sync::Arc;

use crate::core::error::BoxError;
use crate::core::exec::Args;
use crate::core::reload::ReloadableModule;
use crate::core::schema::signature::{Signature, SourceLocation};
use crate::core::value::Value;

/// The callable behind a node.
pub trait NodeFn: Send + Sync + 'static {
    fn call(&self, args: &mut Args) -> Result<Value, BoxError>;
}

impl<F> NodeFn for F
where
    F: Fn(&mut Args) -> Result<Value, BoxError> + Send + Sync + 'static,
{
    fn call(&self, args: &mut Args) -> Result<Value, BoxError> {
        self(args)
    }
}

/// Box a closure as a shareable [`NodeFn`].
pub fn node_fn<F>(f: F) -> Arc<dyn NodeFn>
where
    F: Fn(&mut Args) -> Result<Value, BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// How a function relates to its owner, if it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MethodKind {
    /// A free function.
    #[default]
    Free,
    /// Associated function without a receiver.
    Static,
    /// Takes the owning type as its first parameter.
    Class,
    /// Takes an instance as its first parameter.
    Instance,
}

impl MethodKind {
    /// Whether the first declared parameter is an implicit receiver.
    pub fn has_receiver(&self) -> bool {
        matches!(self, MethodKind::Class | MethodKind::Instance)
    }
}

/// A function that can be compiled into a node.
#[derive(Clone)]
pub struct NodeFunction {
    name: String,
    qualname: String,
    owner: Option<String>,
    kind: MethodKind,
    location: SourceLocation,
    doc: Option<String>,
    signature: Signature,
    module: Option<Arc<dyn ReloadableModule>>,
    implementation: Arc<dyn NodeFn>,
}

impl NodeFunction {
    pub fn new<F>(name: impl Into<String>, signature: Signature, implementation: F) -> Self
    where
        F: Fn(&mut Args) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::from_fn(name, signature, Arc::new(implementation))
    }

    pub fn from_fn(name: impl Into<String>, signature: Signature, implementation: Arc<dyn NodeFn>) -> Self {
        let name = name.into();
        Self {
            qualname: name.clone(),
            name,
            owner: None,
            kind: MethodKind::Free,
            location: SourceLocation::default(),
            doc: None,
            signature,
            module: None,
            implementation,
        }
    }

    pub fn located(mut self, file: impl Into<String>, line: u32) -> Self {
        self.location = SourceLocation::new(file, line);
        self
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Mark this function as a method of `owner`. The qualified name becomes
    /// `Owner.name`.
    pub fn method_of(mut self, owner: impl Into<String>, kind: MethodKind) -> Self {
        let owner = owner.into();
        self.qualname = format!("{}.{}", owner, self.name);
        self.owner = Some(owner);
        self.kind = kind;
        self
    }

    /// Attach the module the implementation was loaded from, enabling hot reload.
    pub fn module(mut self, module: Arc<dyn ReloadableModule>) -> Self {
        self.module = Some(module);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn docstring(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn source_module(&self) -> Option<&Arc<dyn ReloadableModule>> {
        self.module.as_ref()
    }

    pub fn implementation(&self) -> &Arc<dyn NodeFn> {
        &self.implementation
    }
}

impl fmt::Debug for NodeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeFunction")
            .field("qualname", &self.qualname)
            .field("kind", &self.kind)
            .field("location", &self.location)
            .field("module", &self.module.as_ref().map(|m| m.name().to_string()))
            .finish_non_exhaustive()
    }
}

/// Build a [`NodeFunction`] that records where it was written.
///
/// ```ignore
/// let f = node_function!(invert, Signature::new().input::<ImageTensor>("image").returns::<ImageTensor>(),
///     |args: &mut Args| {
///         let image: Tensor = args.get("image")?;
///         Ok(Value::Tensor(image))
///     });
/// ```
#[macro_export]
macro_rules! node_function {
    ($name:ident, $signature:expr, $body:expr, doc = $doc:expr $(,)?) => {
        $crate::NodeFunction::new(stringify!($name), $signature, $body)
            .located(file!(), line!())
            .doc($doc)
    };
    ($name:ident, $signature:expr, $body:expr $(,)?) => {
        $crate::NodeFunction::new(stringify!($name), $signature, $body)
            .located(file!(), line!())
    };
}
