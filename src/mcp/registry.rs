//! Handler Registry
//!
//! Handlers declare the commands they serve as static [`CommandSpec`]s. The
//! registry builds a flat method table from them at startup and rejects any
//! method claimed twice.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::context::{CommandContext, ResourceFacts};
use crate::user::UserRole;

// ============================================================================
// Command Types
// ============================================================================

/// How the permission model is applied to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    /// Only the role list applies (session and liveness methods).
    Open,
    /// Acts on a collection: the role must be granted the action, row-level
    /// conditions are enforced by the handler narrowing its results.
    Collection,
    /// Acts on one resource: conditions are checked against the facts the
    /// handler reports for it.
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub method: &'static str,
    pub resource: &'static str,
    pub action: &'static str,
    pub roles: &'static [UserRole],
    pub scope: CommandScope,
    pub description: &'static str,
}

impl CommandSpec {
    pub const fn new(
        method: &'static str,
        resource: &'static str,
        action: &'static str,
        roles: &'static [UserRole],
        scope: CommandScope,
        description: &'static str,
    ) -> Self {
        Self {
            method,
            resource,
            action,
            roles,
            scope,
            description,
        }
    }

    pub fn allows_role(&self, role: UserRole) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_public(&self) -> bool {
        self.allows_role(UserRole::Guest)
    }
}

pub mod roles {
    use crate::user::UserRole::{self, *};

    pub const EVERYONE: &[UserRole] = &[Guest, Customer, Barber, Manager, Admin];
    pub const SIGNED_IN: &[UserRole] = &[Customer, Barber, Manager, Admin];
    pub const STAFF: &[UserRole] = &[Barber, Manager, Admin];
    pub const CUSTOMER_OR_MANAGEMENT: &[UserRole] = &[Customer, Manager, Admin];
    pub const MANAGEMENT: &[UserRole] = &[Manager, Admin];
    pub const ADMIN_ONLY: &[UserRole] = &[Admin];
}

// ============================================================================
// Handler Trait
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("{0} not found")]
    NotFound(String),
    /// A row-level check inside the handler refused the caller.
    #[error("forbidden: {reason}")]
    Forbidden {
        reason: String,
        allowed_roles: Vec<UserRole>,
    },
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type HandlerResult = Result<Value, HandlerError>;

/// Decodes request params into the typed shape a command expects.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, HandlerError> {
    serde_json::from_value(params).map_err(|e| HandlerError::InvalidParams(e.to_string()))
}

pub fn to_result<T: serde::Serialize>(value: &T) -> HandlerResult {
    serde_json::to_value(value).map_err(|e| HandlerError::Other(e.into()))
}

/// A business-domain command executor.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Short name used in logs and diagnostics.
    fn namespace(&self) -> &'static str;

    fn commands(&self) -> &'static [CommandSpec];

    fn validate(&self, method: &str) -> bool {
        self.commands().iter().any(|c| c.method == method)
    }

    /// Ownership, assignment and tenant facts about the resource a request
    /// targets. Only consulted for [`CommandScope::Instance`] commands.
    async fn resource_facts(&self, _method: &str, params: &Value) -> ResourceFacts {
        ResourceFacts::from_params(params)
    }

    async fn execute(&self, method: &str, params: Value, ctx: &CommandContext) -> HandlerResult;
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("method {method} is registered by both {existing} and {duplicate}")]
    DuplicateMethod {
        method: &'static str,
        existing: &'static str,
        duplicate: &'static str,
    },
    #[error("method {method} of {namespace} is reserved by the gateway")]
    ReservedMethod {
        method: &'static str,
        namespace: &'static str,
    },
    #[error("handler {0} declares no commands")]
    EmptyHandler(&'static str),
}

/// A method resolved to its handler and command definition.
#[derive(Clone)]
pub struct ResolvedCommand {
    pub handler: Arc<dyn Handler>,
    pub spec: &'static CommandSpec,
}

/// Registry for gateway command handlers
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn Handler>>,
    methods: HashMap<&'static str, ResolvedCommand>,
    reserved: Vec<&'static str>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            methods: HashMap::new(),
            reserved: Vec::new(),
        }
    }

    /// Registry whose method table refuses the given names.
    pub fn with_reserved(reserved: &[&'static str]) -> Self {
        Self {
            reserved: reserved.to_vec(),
            ..Self::new()
        }
    }

    /// Register a handler. Nothing is registered if any of its methods clashes.
    pub fn register(&mut self, handler: Arc<dyn Handler>) -> Result<(), RegistryError> {
        let namespace = handler.namespace();
        let commands = handler.commands();
        if commands.is_empty() {
            return Err(RegistryError::EmptyHandler(namespace));
        }

        for (i, spec) in commands.iter().enumerate() {
            if self.reserved.contains(&spec.method) {
                return Err(RegistryError::ReservedMethod {
                    method: spec.method,
                    namespace,
                });
            }
            if let Some(existing) = self.methods.get(spec.method) {
                return Err(RegistryError::DuplicateMethod {
                    method: spec.method,
                    existing: existing.handler.namespace(),
                    duplicate: namespace,
                });
            }
            if commands[..i].iter().any(|c| c.method == spec.method) {
                return Err(RegistryError::DuplicateMethod {
                    method: spec.method,
                    existing: namespace,
                    duplicate: namespace,
                });
            }
        }

        for spec in commands {
            self.methods.insert(
                spec.method,
                ResolvedCommand {
                    handler: handler.clone(),
                    spec,
                },
            );
        }
        self.handlers.push(handler);
        Ok(())
    }

    pub fn resolve(&self, method: &str) -> Option<ResolvedCommand> {
        self.methods
            .get(method)
            .filter(|resolved| resolved.handler.validate(method))
            .cloned()
    }

    /// Commands a role may invoke, grouped by handler namespace.
    pub fn available_commands(&self, role: UserRole) -> BTreeMap<&'static str, Vec<&'static str>> {
        let mut grouped: BTreeMap<&'static str, Vec<&'static str>> = BTreeMap::new();
        for resolved in self.methods.values() {
            if resolved.spec.allows_role(role) {
                grouped
                    .entry(resolved.handler.namespace())
                    .or_default()
                    .push(resolved.spec.method);
            }
        }
        for methods in grouped.values_mut() {
            methods.sort_unstable();
        }
        grouped
    }

    /// Get the number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Get the number of registered methods
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticHandler {
        namespace: &'static str,
        commands: &'static [CommandSpec],
    }

    #[async_trait]
    impl Handler for StaticHandler {
        fn namespace(&self) -> &'static str {
            self.namespace
        }

        fn commands(&self) -> &'static [CommandSpec] {
            self.commands
        }

        async fn execute(
            &self,
            method: &str,
            _params: Value,
            _ctx: &CommandContext,
        ) -> HandlerResult {
            Ok(json!({ "handled": method }))
        }
    }

    const fn spec(method: &'static str) -> CommandSpec {
        CommandSpec {
            method,
            resource: "services",
            action: "read",
            roles: roles::EVERYONE,
            scope: CommandScope::Collection,
            description: "test command",
        }
    }

    const ALPHA: &[CommandSpec] = &[spec("alpha_one"), spec("alpha_two")];
    const BETA: &[CommandSpec] = &[spec("beta_one")];
    const CLASHING: &[CommandSpec] = &[spec("beta_two"), spec("alpha_two")];
    const SELF_CLASHING: &[CommandSpec] = &[spec("gamma"), spec("gamma")];

    fn handler(namespace: &'static str, commands: &'static [CommandSpec]) -> Arc<dyn Handler> {
        Arc::new(StaticHandler {
            namespace,
            commands,
        })
    }

    #[test]
    fn registers_and_resolves_methods() {
        let mut registry = HandlerRegistry::new();
        registry.register(handler("alpha", ALPHA)).unwrap();
        registry.register(handler("beta", BETA)).unwrap();

        assert_eq!(registry.handler_count(), 2);
        assert_eq!(registry.method_count(), 3);

        let resolved = registry.resolve("beta_one").unwrap();
        assert_eq!(resolved.handler.namespace(), "beta");
        assert_eq!(resolved.spec.method, "beta_one");
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn duplicate_method_across_handlers_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.register(handler("alpha", ALPHA)).unwrap();
        let err = registry.register(handler("beta", CLASHING)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateMethod {
                method: "alpha_two",
                existing: "alpha",
                duplicate: "beta",
            }
        );
        // Nothing from the rejected handler leaks into the table
        assert!(registry.resolve("beta_two").is_none());
        assert_eq!(registry.handler_count(), 1);
    }

    #[test]
    fn duplicate_method_within_handler_is_rejected() {
        let mut registry = HandlerRegistry::new();
        let err = registry.register(handler("gamma", SELF_CLASHING)).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateMethod { method: "gamma", .. }));
    }

    #[test]
    fn reserved_methods_are_rejected() {
        let mut registry = HandlerRegistry::with_reserved(&["alpha_one"]);
        let err = registry.register(handler("alpha", ALPHA)).unwrap_err();
        assert!(matches!(err, RegistryError::ReservedMethod { .. }));
    }

    #[test]
    fn empty_handler_is_rejected() {
        let mut registry = HandlerRegistry::new();
        assert_eq!(
            registry.register(handler("empty", &[])).unwrap_err(),
            RegistryError::EmptyHandler("empty")
        );
    }

    #[test]
    fn available_commands_grouped_by_namespace() {
        let mut registry = HandlerRegistry::new();
        registry.register(handler("alpha", ALPHA)).unwrap();
        registry.register(handler("beta", BETA)).unwrap();
        let available = registry.available_commands(UserRole::Guest);
        assert_eq!(available["alpha"], vec!["alpha_one", "alpha_two"]);
        assert_eq!(available["beta"], vec!["beta_one"]);
    }

    #[test]
    fn parse_params_reports_invalid_shape() {
        #[derive(serde::Deserialize, Debug)]
        struct Params {
            #[allow(dead_code)]
            id: String,
        }
        let err = parse_params::<Params>(json!({"id": 5})).unwrap_err();
        assert!(matches!(err, HandlerError::InvalidParams(_)));
        assert!(parse_params::<Params>(json!({"id": "x"})).is_ok());
    }
}
