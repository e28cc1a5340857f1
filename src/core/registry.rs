//! Node registry: the set of nodes a host sees, by workflow name.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use crate::core::compiler::{self, NodeBuilder, NodeOptions};
use crate::core::config::RegistrationMode;
use crate::core::error::NodeError;
use crate::core::exec::CompiledNode;
use crate::core::runtime::Runtime;
use crate::core::schema::function::NodeFunction;

#[derive(Default)]
struct RegistryState {
    order: Vec<String>,
    nodes: HashMap<String, Arc<CompiledNode>>,
    web_directories: BTreeMap<String, PathBuf>,
}

impl RegistryState {
    fn display_name_taken(&self, display_name: &str, except: &str) -> bool {
        self.nodes
            .values()
            .any(|n| n.workflow_name() != except && n.display_name() == display_name)
    }

    fn owner_taken(&self, owner: &str, except: &str) -> bool {
        self.nodes
            .values()
            .any(|n| n.workflow_name() != except && n.descriptor().owner.as_deref() == Some(owner))
    }
}

/// Registered nodes and the mappings a host loads them from.
///
/// Until the runtime's first node invocation (the registration window)
/// every duplicate is an error. After it, [`RegistrationMode::Lenient`]
/// lets a node replace the one registered under the same workflow name,
/// which is what redefining a node at runtime needs.
pub struct NodeRegistry {
    runtime: Arc<Runtime>,
    state: RwLock<RegistryState>,
}

impl NodeRegistry {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Start a node definition.
    pub fn define(&self, function: NodeFunction) -> NodeBuilder<'_> {
        NodeBuilder::new(self, function)
    }

    pub fn compile(&self, function: NodeFunction, options: NodeOptions) -> Result<CompiledNode, NodeError> {
        compiler::compile(&self.runtime, function, options)
    }

    /// Add a compiled node.
    pub fn register(&self, node: CompiledNode) -> Result<Arc<CompiledNode>, NodeError> {
        let strict = !self.runtime.is_initialized()
            || self.runtime.config().registration == RegistrationMode::Strict;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let workflow_name = node.workflow_name().to_string();

        if strict {
            if let Some(existing) = state.nodes.get(&workflow_name) {
                return Err(NodeError::DuplicateWorkflowName {
                    workflow_name,
                    function: existing.function().qualname().to_string(),
                });
            }
        }
        if state.display_name_taken(node.display_name(), &workflow_name) {
            if strict {
                return Err(NodeError::DuplicateDisplayName(node.display_name().to_string()));
            }
            log::warn!("Display name '{}' is used by more than one node", node.display_name());
        }
        if let Some(owner) = node.descriptor().owner.as_deref() {
            if strict && state.owner_taken(owner, &workflow_name) {
                return Err(NodeError::DuplicateOwner(owner.to_string()));
            }
        }

        let node = Arc::new(node);
        if state.nodes.insert(workflow_name.clone(), Arc::clone(&node)).is_some() {
            log::info!("Replaced node '{}'", workflow_name);
        } else {
            log::debug!("Registered node '{}'", workflow_name);
            state.order.push(workflow_name);
        }
        Ok(node)
    }

    pub fn get(&self, workflow_name: &str) -> Option<Arc<CompiledNode>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .nodes
            .get(workflow_name)
            .cloned()
    }

    /// Workflow names in registration order.
    pub fn workflow_names(&self) -> Vec<String> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).order.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Workflow name to display name.
    pub fn display_name_mappings(&self) -> BTreeMap<String, String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .nodes
            .iter()
            .map(|(name, node)| (name.clone(), node.display_name().to_string()))
            .collect()
    }

    /// End the registration window without invoking a node.
    pub fn close_initialization(&self) {
        self.runtime.mark_initialized();
    }

    /// Serve `path` to the host's front end under `name`. Returns `false`
    /// if the name is already taken.
    pub fn register_web_directory(&self, name: impl Into<String>, path: impl Into<PathBuf>) -> bool {
        let name = name.into();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.web_directories.contains_key(&name) {
            log::warn!("Web directory '{}' already registered", name);
            return false;
        }
        let path = path.into();
        if !path.is_dir() {
            log::warn!("Web directory {} for '{}' does not exist", path.display(), name);
        }
        state.web_directories.insert(name, path);
        true
    }

    pub fn web_directories(&self) -> BTreeMap<String, PathBuf> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .web_directories
            .clone()
    }

    /// Every node's schema, keyed by workflow name, with its display name
    /// under `DISPLAY_NAME`.
    pub fn to_host_json(&self) -> Result<serde_json::Value, NodeError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut nodes = serde_json::Map::new();
        for name in &state.order {
            let Some(node) = state.nodes.get(name) else {
                continue;
            };
            let mut schema = node.descriptor().to_json()?;
            if let Some(obj) = schema.as_object_mut() {
                obj.insert("DISPLAY_NAME".into(), node.display_name().into());
            }
            nodes.insert(name.clone(), schema);
        }
        Ok(serde_json::Value::Object(nodes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RuntimeConfig;
    use crate::core::exec::Args;
    use crate::core::schema::function::MethodKind;
    use crate::core::schema::signature::Signature;
    use crate::core::value::Value;

    fn noop(name: &str) -> NodeFunction {
        NodeFunction::new(name, Signature::new().returns::<i64>(), |_: &mut Args| Ok(Value::Int(0)))
    }

    #[test]
    fn test_duplicates_rejected_during_window() {
        let registry = NodeRegistry::new(Runtime::new(RuntimeConfig::default()));
        registry.define(noop("make_thing")).register().unwrap();

        let err = registry.define(noop("make_thing")).register().unwrap_err();
        assert!(matches!(err, NodeError::DuplicateWorkflowName { .. }));
        assert!(err.is_schema_error());

        let err = registry
            .define(noop("other"))
            .display_name("Make Thing")
            .register()
            .unwrap_err();
        assert!(matches!(err, NodeError::DuplicateDisplayName(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_one_node_per_owner_during_window() {
        let registry = NodeRegistry::new(Runtime::new(RuntimeConfig::default()));
        registry
            .define(noop("a").method_of("Tool", MethodKind::Static))
            .register()
            .unwrap();
        let err = registry
            .define(noop("b").method_of("Tool", MethodKind::Static))
            .register()
            .unwrap_err();
        assert!(matches!(err, NodeError::DuplicateOwner(owner) if owner == "Tool"));
    }

    #[test]
    fn test_lenient_replacement_after_window() {
        let registry = NodeRegistry::new(Runtime::new(RuntimeConfig::default()));
        let first = registry.define(noop("make_thing")).register().unwrap();
        registry.close_initialization();

        let second = registry.define(noop("make_thing")).category("New").register().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("MakeThing").unwrap().descriptor().category, "New");
        assert_eq!(registry.workflow_names(), vec!["MakeThing".to_string()]);
    }

    #[test]
    fn test_strict_mode_after_window() {
        let runtime = Runtime::new(RuntimeConfig::default().with_registration(RegistrationMode::Strict));
        let registry = NodeRegistry::new(runtime);
        registry.define(noop("make_thing")).register().unwrap();
        registry.close_initialization();
        assert!(registry.define(noop("make_thing")).register().is_err());
    }

    #[test]
    fn test_mappings_and_host_json() {
        let registry = NodeRegistry::new(Runtime::new(RuntimeConfig::default()));
        registry.define(noop("make_thing")).register().unwrap();
        registry.define(noop("other_thing")).display_name("Other").register().unwrap();

        let names = registry.display_name_mappings();
        assert_eq!(names["MakeThing"], "Make Thing");
        assert_eq!(names["OtherThing"], "Other");

        let json = registry.to_host_json().unwrap();
        assert_eq!(json["OtherThing"]["DISPLAY_NAME"], "Other");
        assert_eq!(json["MakeThing"]["RETURN_TYPES"], serde_json::json!(["INT"]));
    }

    #[test]
    fn test_web_directories() {
        let registry = NodeRegistry::new(Runtime::new(RuntimeConfig::default()));
        assert!(registry.register_web_directory("widgets", "/srv/widgets"));
        assert!(!registry.register_web_directory("widgets", "/srv/other"));
        assert_eq!(registry.web_directories()["widgets"], PathBuf::from("/srv/widgets"));
    }
}
