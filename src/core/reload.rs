//! Hot reload of node implementations.
//!
//! A function whose [`NodeFunction`] names a source module is re-resolved
//! from that module whenever the module's file is newer than its last
//! reload. The first call for a module always reloads it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use crate::core::error::{BoxError, NodeError};
use crate::core::schema::function::{NodeFn, NodeFunction};
use crate::core::schema::signature::{Signature, SourceLocation};

/// A unit of code that can be reloaded from its source file.
pub trait ReloadableModule: Send + Sync {
    fn name(&self) -> &str;

    fn source_path(&self) -> &Path;

    fn has_function(&self, name: &str) -> bool;

    /// Re-read the module from its source.
    fn reload(&self) -> Result<(), BoxError>;

    /// The current implementation of `name`.
    fn function(&self, name: &str) -> Option<Arc<dyn NodeFn>>;
}

/// Reload bookkeeping shared by every node of a runtime.
#[derive(Default)]
pub struct ReloadLedger {
    reload_times: Mutex<HashMap<String, SystemTime>>,
    latest: Mutex<HashMap<(String, String), Arc<dyn NodeFn>>>,
}

impl ReloadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The implementation to call for `function`, and whether it was
    /// reloaded just now.
    ///
    /// Without a module, or with reload disabled, this is always the
    /// function's initial implementation.
    pub fn resolve(
        &self,
        function: &NodeFunction,
        enabled: bool,
    ) -> Result<(bool, Arc<dyn NodeFn>), NodeError> {
        let initial = Arc::clone(function.implementation());
        let Some(module) = function.source_module().filter(|_| enabled) else {
            return Ok((false, initial));
        };
        let key = (module.name().to_string(), function.name().to_string());

        let modified = match fs::metadata(module.source_path()).and_then(|m| m.modified()) {
            Ok(time) => Some(time),
            Err(err) => {
                log::warn!(
                    "Cannot stat {} for module '{}': {}",
                    module.source_path().display(),
                    module.name(),
                    err
                );
                None
            }
        };

        if let Some(modified) = modified {
            let mut times = self.reload_times.lock().unwrap_or_else(PoisonError::into_inner);
            let stale = times.get(module.name()).is_none_or(|last| modified > *last);
            if stale && module.has_function(function.name()) {
                module.reload().map_err(|source| NodeError::Reload {
                    module: module.name().to_string(),
                    source,
                })?;
                log::info!("Reloaded module {}", module.name());
                times.insert(module.name().to_string(), modified);
                drop(times);

                if let Some(latest) = module.function(function.name()) {
                    self.latest
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(key, Arc::clone(&latest));
                    return Ok((true, latest));
                }
            }
        }

        let cached = self
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        Ok((false, cached.unwrap_or(initial)))
    }

    /// When `module` was last reloaded.
    pub fn last_reload(&self, module: &str) -> Option<SystemTime> {
        self.reload_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module)
            .copied()
    }
}

/// Builds a module's function table from its source file.
pub type Loader = dyn Fn(&Path) -> Result<HashMap<String, Arc<dyn NodeFn>>, BoxError> + Send + Sync;

/// A module backed by a file and a loader that turns it into functions.
pub struct FileModule {
    name: String,
    path: PathBuf,
    loader: Box<Loader>,
    functions: RwLock<HashMap<String, Arc<dyn NodeFn>>>,
}

impl FileModule {
    /// Load the module once.
    pub fn load<F>(name: impl Into<String>, path: impl Into<PathBuf>, loader: F) -> Result<Arc<Self>, NodeError>
    where
        F: Fn(&Path) -> Result<HashMap<String, Arc<dyn NodeFn>>, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        let path = path.into();
        let functions = loader(&path).map_err(|source| NodeError::Reload {
            module: name.clone(),
            source,
        })?;
        Ok(Arc::new(Self {
            name,
            path,
            loader: Box::new(loader),
            functions: RwLock::new(functions),
        }))
    }

    /// A [`NodeFunction`] for `name` that is re-resolved from this module on
    /// every call.
    pub fn bind(self: &Arc<Self>, name: &str, signature: Signature) -> Result<NodeFunction, NodeError> {
        let implementation = self.function(name).ok_or_else(|| NodeError::Reload {
            module: self.name.clone(),
            source: format!("no function '{name}'").into(),
        })?;
        Ok(NodeFunction::from_fn(name, signature, implementation)
            .at(SourceLocation::new(self.path.display().to_string(), 0))
            .module(Arc::clone(self) as Arc<dyn ReloadableModule>))
    }
}

impl ReloadableModule for FileModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_path(&self) -> &Path {
        &self.path
    }

    fn has_function(&self, name: &str) -> bool {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn reload(&self) -> Result<(), BoxError> {
        let functions = (self.loader)(&self.path)?;
        *self.functions.write().unwrap_or_else(PoisonError::into_inner) = functions;
        Ok(())
    }

    fn function(&self, name: &str) -> Option<Arc<dyn NodeFn>> {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}
