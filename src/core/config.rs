//! Runtime configuration.

use std::fmt;
use std::sync::Arc;

use crate::core::schema::function::NodeFunction;

/// How much of a docstring becomes the node description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocstringMode {
    #[default]
    Full,
    /// First line only.
    Brief,
    Hidden,
}

impl DocstringMode {
    pub fn apply(&self, doc: &str) -> String {
        let doc = doc.trim();
        match self {
            DocstringMode::Full => doc.to_string(),
            DocstringMode::Brief => doc.lines().next().unwrap_or_default().trim().to_string(),
            DocstringMode::Hidden => String::new(),
        }
    }
}

/// What happens when a node name is registered twice after initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationMode {
    /// Later registrations replace earlier ones.
    #[default]
    Lenient,
    /// Duplicates are always an error.
    Strict,
}

/// Everything the exception hook gets to see about a failed attempt.
#[derive(Debug)]
pub struct FailureReport<'a> {
    pub function: &'a NodeFunction,
    pub error: &'a (dyn std::error::Error + Send + Sync + 'static),
    /// One line per argument, in declaration order.
    pub inputs: &'a [String],
    /// Diagnostics captured during the attempt.
    pub log: &'a str,
    /// 1-based.
    pub attempt: u32,
}

/// Called after every failed attempt except the last.
pub type ExceptionHook = Arc<dyn Fn(&FailureReport<'_>) + Send + Sync>;

#[derive(Clone)]
pub struct RuntimeConfig {
    /// Re-resolve implementations from their source module when it changes.
    pub hot_reload: bool,
    /// Check tensor arguments and results against the registered rules.
    pub verify_tensors: bool,
    pub docstring_mode: DocstringMode,
    /// Attempts per invocation, at least 1.
    pub max_tries: u32,
    pub exception_hook: Option<ExceptionHook>,
    /// Category of nodes that don't name one.
    pub default_category: String,
    pub registration: RegistrationMode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            hot_reload: true,
            verify_tensors: true,
            docstring_mode: DocstringMode::Full,
            max_tries: 1,
            exception_hook: None,
            default_category: "NodeFunc".to_string(),
            registration: RegistrationMode::Lenient,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hot_reload(mut self, enabled: bool) -> Self {
        self.hot_reload = enabled;
        self
    }

    pub fn with_verify_tensors(mut self, enabled: bool) -> Self {
        self.verify_tensors = enabled;
        self
    }

    pub fn with_docstring_mode(mut self, mode: DocstringMode) -> Self {
        self.docstring_mode = mode;
        self
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries.max(1);
        self
    }

    pub fn with_exception_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FailureReport<'_>) + Send + Sync + 'static,
    {
        self.exception_hook = Some(Arc::new(hook));
        self
    }

    pub fn with_default_category(mut self, category: impl Into<String>) -> Self {
        self.default_category = category.into();
        self
    }

    pub fn with_registration(mut self, mode: RegistrationMode) -> Self {
        self.registration = mode;
        self
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("hot_reload", &self.hot_reload)
            .field("verify_tensors", &self.verify_tensors)
            .field("docstring_mode", &self.docstring_mode)
            .field("max_tries", &self.max_tries)
            .field("exception_hook", &self.exception_hook.is_some())
            .field("default_category", &self.default_category)
            .field("registration", &self.registration)
            .finish()
    }
}
