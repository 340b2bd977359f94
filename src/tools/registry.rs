//! Tool registry
//!
//! Injected, instance-owned registry of tool definitions and resources.
//! Registration returns a handle; the registry lives as long as the
//! orchestrator that owns it.

use crate::errors::{OrchestratorError, Result};
use crate::tools::builtin;
use crate::tools::types::{ResourceProvider, Tool, ToolDefinition};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

/// Proof of a registration, required to unregister
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolHandle {
    name: String,
    id: Uuid,
}

impl ToolHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Definition and implementation of a registered tool
#[derive(Clone)]
pub struct ResolvedTool {
    pub definition: Arc<ToolDefinition>,
    pub tool: Arc<dyn Tool>,
}

struct RegisteredTool {
    id: Uuid,
    resolved: ResolvedTool,
}

/// Tool registry
#[derive(Default)]
pub struct ToolRegistry {
    /// Map of tool name to registration
    tools: RwLock<HashMap<String, RegisteredTool>>,

    /// Map of resource id to provider
    resources: RwLock<HashMap<String, Arc<dyn ResourceProvider>>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in tools
    pub fn with_builtins() -> Result<Self> {
        let registry = Self::new();
        builtin::register_all(&registry)?;
        Ok(registry)
    }

    fn read_tools(&self) -> RwLockReadGuard<'_, HashMap<String, RegisteredTool>> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tools(&self) -> RwLockWriteGuard<'_, HashMap<String, RegisteredTool>> {
        self.tools.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a tool under its definition's name
    pub fn register(&self, definition: ToolDefinition, tool: Arc<dyn Tool>) -> Result<ToolHandle> {
        let name = definition.name.trim().to_string();
        if name.is_empty() {
            return Err(OrchestratorError::Registration(
                "tool name must not be empty".to_string(),
            ));
        }
        if definition.after.iter().any(|dep| dep == &name) {
            return Err(OrchestratorError::Registration(format!(
                "tool {} cannot depend on itself",
                name
            )));
        }

        let mut tools = self.write_tools();
        if tools.contains_key(&name) {
            return Err(OrchestratorError::Registration(format!(
                "tool {} is already registered",
                name
            )));
        }

        let id = Uuid::new_v4();
        debug!(tool = %name, parallel_safe = definition.parallel_safe, "registering tool");
        tools.insert(
            name.clone(),
            RegisteredTool {
                id,
                resolved: ResolvedTool {
                    definition: Arc::new(ToolDefinition { name: name.clone(), ..definition }),
                    tool,
                },
            },
        );

        Ok(ToolHandle { name, id })
    }

    /// Remove a registration; stale handles are ignored
    pub fn unregister(&self, handle: &ToolHandle) -> bool {
        let mut tools = self.write_tools();
        match tools.get(&handle.name) {
            Some(registered) if registered.id == handle.id => {
                tools.remove(&handle.name);
                true
            }
            _ => false,
        }
    }

    /// Resolve a tool name to its definition and implementation
    pub fn resolve(&self, name: &str) -> Option<ResolvedTool> {
        self.read_tools()
            .get(name)
            .map(|registered| registered.resolved.clone())
    }

    /// Get tool definition by name
    pub fn get(&self, name: &str) -> Option<Arc<ToolDefinition>> {
        self.read_tools()
            .get(name)
            .map(|registered| registered.resolved.definition.clone())
    }

    /// Check if tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.read_tools().contains_key(name)
    }

    /// Get all tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_tools().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get all tool definitions, sorted by name
    pub fn definitions(&self) -> Vec<Arc<ToolDefinition>> {
        let mut definitions: Vec<_> = self
            .read_tools()
            .values()
            .map(|registered| registered.resolved.definition.clone())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Get names of tools safe for concurrent execution
    pub fn parallel_safe_tools(&self) -> Vec<String> {
        self.definitions()
            .into_iter()
            .filter(|def| def.parallel_safe)
            .map(|def| def.name.clone())
            .collect()
    }

    /// Get names of tools that must run alone
    pub fn barrier_tools(&self) -> Vec<String> {
        self.definitions()
            .into_iter()
            .filter(|def| !def.parallel_safe)
            .map(|def| def.name.clone())
            .collect()
    }

    /// Get total number of tools
    pub fn len(&self) -> usize {
        self.read_tools().len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.read_tools().is_empty()
    }

    /// Register a resource provider
    pub fn register_resource(
        &self,
        id: impl Into<String>,
        provider: Arc<dyn ResourceProvider>,
    ) -> Result<()> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(OrchestratorError::Registration(
                "resource id must not be empty".to_string(),
            ));
        }

        let mut resources = self.resources.write().unwrap_or_else(PoisonError::into_inner);
        if resources.contains_key(&id) {
            return Err(OrchestratorError::Registration(format!(
                "resource {} is already registered",
                id
            )));
        }
        resources.insert(id, provider);
        Ok(())
    }

    /// Get a resource provider by id
    pub fn get_resource(&self, id: &str) -> Option<Arc<dyn ResourceProvider>> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::types::{resource_fn, tool_fn};
    use serde_json::{json, Map, Value};

    fn noop() -> Arc<dyn Tool> {
        tool_fn(|_params: Map<String, Value>| async { Ok(Value::Null) })
    }

    #[test]
    fn test_registry_creation() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_builtins_registered() {
        let registry = ToolRegistry::with_builtins().unwrap();
        assert!(registry.contains("calculate"));
        assert!(registry.contains("echo"));
        assert_eq!(registry.tool_names(), vec!["calculate", "echo"]);
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = ToolRegistry::new();
        let handle = registry
            .register(ToolDefinition::new("a", "first"), noop())
            .unwrap();

        assert_eq!(handle.name(), "a");
        let resolved = registry.resolve("a").unwrap();
        assert_eq!(resolved.definition.description, "first");
        assert!(registry.resolve("b").is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = ToolRegistry::new();
        registry.register(ToolDefinition::new("a", ""), noop()).unwrap();
        let err = registry
            .register(ToolDefinition::new("a", ""), noop())
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_invalid_registrations() {
        let registry = ToolRegistry::new();
        assert!(registry.register(ToolDefinition::new("  ", ""), noop()).is_err());
        assert!(registry
            .register(ToolDefinition::new("loop", "").after("loop"), noop())
            .is_err());
    }

    #[test]
    fn test_unregister_with_stale_handle() {
        let registry = ToolRegistry::new();
        let first = registry.register(ToolDefinition::new("a", ""), noop()).unwrap();
        assert!(registry.unregister(&first));
        assert!(!registry.contains("a"));

        let second = registry.register(ToolDefinition::new("a", ""), noop()).unwrap();
        assert!(!registry.unregister(&first));
        assert!(registry.contains("a"));
        assert!(registry.unregister(&second));
    }

    #[test]
    fn test_tool_classification() {
        let registry = ToolRegistry::new();
        registry.register(ToolDefinition::new("read", ""), noop()).unwrap();
        registry
            .register(ToolDefinition::new("sensitive_tool", "").parallel_safe(false), noop())
            .unwrap();

        assert_eq!(registry.parallel_safe_tools(), vec!["read"]);
        assert_eq!(registry.barrier_tools(), vec!["sensitive_tool"]);
    }

    #[tokio::test]
    async fn test_resources() {
        let registry = ToolRegistry::new();
        registry
            .register_resource("motd", resource_fn(|| async { Ok(json!("hello")) }))
            .unwrap();

        assert!(registry
            .register_resource("motd", resource_fn(|| async { Ok(Value::Null) }))
            .is_err());

        let provider = registry.get_resource("motd").unwrap();
        assert_eq!(provider.read().await.unwrap(), json!("hello"));
        assert!(registry.get_resource("missing").is_none());
    }
}
