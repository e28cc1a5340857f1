//! Shared state behind every compiled node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::core::config::RuntimeConfig;
use crate::core::exec::validation::TensorRules;
use crate::core::host::{HostEnvironment, LocalHost};
use crate::core::reload::ReloadLedger;
use crate::core::schema::types::TypeRegistry;

/// Registries, configuration and host bindings for one node library.
///
/// Compiled nodes keep an `Arc<Runtime>`, so several independent runtimes
/// (tests, separate hosts) can coexist in one process.
pub struct Runtime {
    types: TypeRegistry,
    rules: TensorRules,
    reload: ReloadLedger,
    config: RwLock<RuntimeConfig>,
    host: Arc<dyn HostEnvironment>,
    initialized: AtomicBool,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Arc<Self> {
        Self::with_host(config, Arc::new(LocalHost::default()))
    }

    pub fn with_host(config: RuntimeConfig, host: Arc<dyn HostEnvironment>) -> Arc<Self> {
        Arc::new(Self {
            types: TypeRegistry::with_builtins(),
            rules: TensorRules::with_defaults(),
            reload: ReloadLedger::new(),
            config: RwLock::new(config),
            host,
            initialized: AtomicBool::new(false),
        })
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn rules(&self) -> &TensorRules {
        &self.rules
    }

    pub fn reload(&self) -> &ReloadLedger {
        &self.reload
    }

    pub fn host(&self) -> &Arc<dyn HostEnvironment> {
        &self.host
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> RuntimeConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn update_config(&self, update: impl FnOnce(&mut RuntimeConfig)) {
        update(&mut self.config.write().unwrap_or_else(PoisonError::into_inner));
    }

    /// Whether the registration window has closed, which happens on the
    /// first node invocation.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn mark_initialized(&self) {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            log::debug!("Registration window closed");
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            types: TypeRegistry::with_builtins(),
            rules: TensorRules::with_defaults(),
            reload: ReloadLedger::new(),
            config: RwLock::new(RuntimeConfig::default()),
            host: Arc::new(LocalHost::default()),
            initialized: AtomicBool::new(false),
        }
    }
}
