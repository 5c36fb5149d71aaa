//! Grant Engine
//!
//! Turns `(subject, target, capability)` requests into [`GrantEdge`]s.
//! Edges are keyed by identity, so re-issuing a request returns the stored
//! edge. Nothing is granted implicitly and nothing is ever revoked.

use super::capability::{statement_for, Capability, GrantScope, PermissionStatement, Principal};
use crate::error::GrantError;
use crate::types::{Resource, ResourceId, ResourceKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An access relationship from a principal to a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantEdge {
    pub subject: Principal,
    pub target: ResourceId,
    pub capability: Capability,
    pub scope: GrantScope,
    pub statement: PermissionStatement,
}

impl GrantEdge {
    /// Identity used for idempotence
    #[must_use]
    pub fn key(&self) -> GrantKey {
        GrantKey {
            subject: self.subject.clone(),
            target: self.target.clone(),
            capability: self.capability,
            scope: self.scope.clone(),
        }
    }

    /// Development-only loosenings (ingress open to any source)
    #[must_use]
    pub fn is_low_trust(&self) -> bool {
        self.subject.is_low_trust()
    }

    /// Whether this edge admits `reader` to a parameter owned by `owner`
    #[must_use]
    pub fn entitles(
        &self,
        reader: &ResourceId,
        owner: &ResourceId,
        key: &str,
        entitled_by: Capability,
    ) -> bool {
        self.subject.function() == Some(reader)
            && &self.target == owner
            && self.capability == entitled_by
            && match &self.scope {
                GrantScope::All => true,
                GrantScope::Parameter(scoped) => scoped == key,
                GrantScope::ManagedPolicy(_) | GrantScope::Port(_) => false,
            }
    }
}

/// Identity of a grant edge
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GrantKey {
    pub subject: Principal,
    pub target: ResourceId,
    pub capability: Capability,
    pub scope: GrantScope,
}

/// Additive, idempotent store of grant edges
#[derive(Debug, Clone, Default)]
pub struct GrantEngine {
    namespace: String,
    edges: IndexMap<GrantKey, GrantEdge>,
}

impl GrantEngine {
    /// Create an empty engine for parameters under `namespace`
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            edges: IndexMap::new(),
        }
    }

    /// Issue (or return the existing) edge from `subject` to `target`
    ///
    /// `subject` must be a compute function, `capability` must be legal for
    /// the target's kind and the target must be the subject itself or one of
    /// its dependencies. Scopes are normalized first: parameter capabilities
    /// on a `Parameter` resource narrow to its key and ingress without a port
    /// narrows to the store's port.
    pub fn grant(
        &mut self,
        subject: &Resource,
        target: &Resource,
        capability: Capability,
        scope: GrantScope,
    ) -> Result<GrantEdge, GrantError> {
        if subject.kind() != ResourceKind::ComputeFunction {
            return Err(GrantError::InvalidSubject {
                subject: subject.id().clone(),
                kind: subject.kind(),
            });
        }

        let principal = Principal::Function(subject.id().clone());
        if !capability.is_legal_for(target.kind()) {
            return Err(GrantError::IncompatibleCapability {
                subject: principal,
                target: target.id().clone(),
                kind: target.kind(),
                capability,
            });
        }

        match capability {
            Capability::ReadSecret if !target.exposes(crate::types::Attribute::SecretArn) => {
                return Err(GrantError::SecretNotConfigured {
                    subject: subject.id().clone(),
                    target: target.id().clone(),
                });
            }
            Capability::InvokeManagedPolicy if subject.id() != target.id() => {
                return Err(GrantError::ForeignRole {
                    subject: subject.id().clone(),
                    target: target.id().clone(),
                });
            }
            _ => {}
        }

        if subject.id() != target.id() && !subject.depends_on().contains(target.id()) {
            return Err(GrantError::UndeclaredDependency {
                subject: subject.id().clone(),
                target: target.id().clone(),
            });
        }

        let scope = normalize_scope(target, capability, scope)?;
        Ok(self.insert(principal, target, capability, scope))
    }

    /// Open `target` to any IPv4 source
    ///
    /// Recorded as a low-trust `NetworkIngress` edge so audits can tell it
    /// apart from function-level ingress.
    pub fn open_ingress(
        &mut self,
        target: &Resource,
        port: Option<u16>,
    ) -> Result<GrantEdge, GrantError> {
        let capability = Capability::NetworkIngress;
        if !capability.is_legal_for(target.kind()) {
            return Err(GrantError::IncompatibleCapability {
                subject: Principal::AnyIpv4,
                target: target.id().clone(),
                kind: target.kind(),
                capability,
            });
        }

        let scope = port.map_or(GrantScope::All, GrantScope::Port);
        let scope = normalize_scope(target, capability, scope)?;
        tracing::warn!(
            target_resource = %target.id(),
            ?scope,
            "network ingress opened to any IPv4 source"
        );
        Ok(self.insert(Principal::AnyIpv4, target, capability, scope))
    }

    fn insert(
        &mut self,
        subject: Principal,
        target: &Resource,
        capability: Capability,
        scope: GrantScope,
    ) -> GrantEdge {
        let key = GrantKey {
            subject,
            target: target.id().clone(),
            capability,
            scope,
        };

        if let Some(existing) = self.edges.get(&key) {
            tracing::trace!(
                subject = %key.subject,
                target_resource = %key.target,
                ?capability,
                "grant already present"
            );
            return existing.clone();
        }

        let statement = statement_for(capability, target, &key.scope, &self.namespace);
        let edge = GrantEdge {
            subject: key.subject.clone(),
            target: key.target.clone(),
            capability,
            scope: key.scope.clone(),
            statement,
        };
        tracing::debug!(
            subject = %edge.subject,
            target_resource = %edge.target,
            ?capability,
            "grant issued"
        );
        self.edges.insert(key, edge.clone());
        edge
    }

    /// All edges in issue order
    pub fn edges(&self) -> impl Iterator<Item = &GrantEdge> + Clone {
        self.edges.values()
    }

    /// Edges held by one function
    pub fn edges_for<'a>(
        &'a self,
        subject: &'a ResourceId,
    ) -> impl Iterator<Item = &'a GrantEdge> {
        self.edges
            .values()
            .filter(move |edge| edge.subject.function() == Some(subject))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub(crate) fn into_edges(self) -> Vec<GrantEdge> {
        self.edges.into_values().collect()
    }
}

fn normalize_scope(
    target: &Resource,
    capability: Capability,
    scope: GrantScope,
) -> Result<GrantScope, GrantError> {
    let invalid = |scope: GrantScope| GrantError::InvalidScope {
        target: target.id().clone(),
        capability,
        scope,
    };

    match (capability, scope) {
        (Capability::ReadParameter | Capability::WriteParameter, GrantScope::All) => {
            Ok(target
                .parameter_key()
                .map_or(GrantScope::All, |key| GrantScope::Parameter(key.to_string())))
        }
        (Capability::ReadParameter | Capability::WriteParameter, GrantScope::Parameter(key)) => {
            match target.parameter_key() {
                Some(own) if own != key => Err(invalid(GrantScope::Parameter(key))),
                _ => Ok(GrantScope::Parameter(key)),
            }
        }
        (Capability::InvokeManagedPolicy, GrantScope::ManagedPolicy(name)) if !name.is_empty() => {
            Ok(GrantScope::ManagedPolicy(name))
        }
        (Capability::NetworkIngress, GrantScope::All) => Ok(target
            .port()
            .map_or(GrantScope::All, GrantScope::Port)),
        (Capability::NetworkIngress, GrantScope::Port(port)) if target.port() == Some(port) => {
            Ok(GrantScope::Port(port))
        }
        (
            Capability::ReadSecret | Capability::ReadWriteTable | Capability::ReadWriteObjectStore,
            GrantScope::All,
        ) => Ok(GrantScope::All),
        (_, scope) => Err(invalid(scope)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ComputeFunctionConfig, DocumentTableConfig, ParameterConfig, ParameterValue,
        RelationalStoreConfig, RemovalPolicy, ResourceConfig,
    };
    use std::collections::BTreeSet;

    fn resource(id: &str, config: ResourceConfig, ordinal: usize) -> Resource {
        Resource {
            id: ResourceId::new(id),
            config,
            depends_on: BTreeSet::new(),
            removal_policy: RemovalPolicy::Destroy,
            ordinal,
        }
    }

    fn function(id: &str) -> Resource {
        let mut function = resource(
            id,
            ResourceConfig::ComputeFunction(ComputeFunctionConfig::python("fn")),
            9,
        );
        function.depends_on = ["AgentDB", "History", "Region"]
            .into_iter()
            .map(ResourceId::new)
            .collect();
        function
    }

    fn store() -> Resource {
        let config = RelationalStoreConfig::postgres("db");
        resource("AgentDB", ResourceConfig::RelationalStore(config), 0)
    }

    fn table() -> Resource {
        let config = DocumentTableConfig::keyed_by("SessionId");
        resource("History", ResourceConfig::DocumentTable(config), 1)
    }

    fn parameter(key: &str) -> Resource {
        resource(
            "Region",
            ResourceConfig::Parameter(ParameterConfig {
                key: key.to_string(),
                value: ParameterValue::Literal("us-east-1".to_string()),
                description: None,
            }),
            2,
        )
    }

    #[test]
    fn test_grant_is_idempotent() {
        let mut engine = GrantEngine::new("/ns");
        let subject = function("Fn");
        let target = store();

        let mut issue = || {
            engine
                .grant(&subject, &target, Capability::ReadSecret, GrantScope::All)
                .unwrap()
        };
        let first = issue();
        let second = issue();

        assert_eq!(first, second);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_read_secret_on_table_is_incompatible() {
        let mut engine = GrantEngine::new("/ns");
        let result =
            engine.grant(&function("Fn"), &table(), Capability::ReadSecret, GrantScope::All);

        assert!(matches!(
            result,
            Err(GrantError::IncompatibleCapability { kind: ResourceKind::DocumentTable, .. })
        ));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_only_functions_hold_grants() {
        let mut engine = GrantEngine::new("/ns");
        let result = engine.grant(&table(), &store(), Capability::ReadSecret, GrantScope::All);

        assert!(matches!(result, Err(GrantError::InvalidSubject { .. })));
    }

    #[test]
    fn test_parameter_read_narrows_to_key() {
        let mut engine = GrantEngine::new("/ns");
        let edge = engine
            .grant(
                &function("Fn"),
                &parameter("/ns/bedrock_region"),
                Capability::ReadParameter,
                GrantScope::All,
            )
            .unwrap();

        assert_eq!(edge.scope, GrantScope::Parameter("/ns/bedrock_region".to_string()));
        assert_eq!(
            edge.statement.resources,
            vec!["arn:aws:ssm:*:*:parameter/ns/bedrock_region".to_string()]
        );
    }

    #[test]
    fn test_parameter_scope_must_match_own_key() {
        let mut engine = GrantEngine::new("/ns");
        let result = engine.grant(
            &function("Fn"),
            &parameter("/ns/bedrock_region"),
            Capability::ReadParameter,
            GrantScope::Parameter("/ns/other".to_string()),
        );

        assert!(matches!(result, Err(GrantError::InvalidScope { .. })));
    }

    #[test]
    fn test_managed_policy_requires_own_role_and_name() {
        let mut engine = GrantEngine::new("/ns");
        let subject = function("Fn");

        let foreign = engine.grant(
            &subject,
            &function("Other"),
            Capability::InvokeManagedPolicy,
            GrantScope::ManagedPolicy("AmazonBedrockFullAccess".to_string()),
        );
        assert!(matches!(foreign, Err(GrantError::ForeignRole { .. })));

        let unnamed =
            engine.grant(&subject, &subject, Capability::InvokeManagedPolicy, GrantScope::All);
        assert!(matches!(unnamed, Err(GrantError::InvalidScope { .. })));

        let edge = engine
            .grant(
                &subject,
                &subject,
                Capability::InvokeManagedPolicy,
                GrantScope::ManagedPolicy("AmazonBedrockFullAccess".to_string()),
            )
            .unwrap();
        assert_eq!(
            edge.statement.resources,
            vec!["arn:aws:iam::aws:policy/AmazonBedrockFullAccess".to_string()]
        );
    }

    #[test]
    fn test_open_ingress_is_distinct_from_trusted_ingress() {
        let mut engine = GrantEngine::new("/ns");
        let target = store();

        let trusted = engine
            .grant(&function("Fn"), &target, Capability::NetworkIngress, GrantScope::All)
            .unwrap();
        let open = engine.open_ingress(&target, None).unwrap();

        assert_eq!(trusted.scope, GrantScope::Port(5432));
        assert_eq!(open.scope, GrantScope::Port(5432));
        assert!(!trusted.is_low_trust());
        assert!(open.is_low_trust());
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_target_must_be_a_dependency() {
        let mut engine = GrantEngine::new("/ns");
        let mut subject = function("Fn");
        subject.depends_on.clear();

        let result = engine.grant(&subject, &store(), Capability::ReadSecret, GrantScope::All);
        assert_eq!(
            result,
            Err(GrantError::UndeclaredDependency {
                subject: ResourceId::new("Fn"),
                target: ResourceId::new("AgentDB"),
            })
        );
        assert!(engine.is_empty());
    }

    #[test]
    fn test_ingress_port_must_match_store() {
        let mut engine = GrantEngine::new("/ns");
        let target = store();

        let wrong = engine.grant(
            &function("Fn"),
            &target,
            Capability::NetworkIngress,
            GrantScope::Port(3306),
        );
        assert!(matches!(wrong, Err(GrantError::InvalidScope { .. })));
        assert!(engine.open_ingress(&target, Some(22)).is_err());
        assert!(engine.is_empty());

        let open = engine.open_ingress(&target, Some(5432)).unwrap();
        assert_eq!(open.scope, GrantScope::Port(5432));
    }

    #[test]
    fn test_open_ingress_rejects_table() {
        let mut engine = GrantEngine::new("/ns");
        assert!(engine.open_ingress(&table(), Some(443)).is_err());
    }

    #[test]
    fn test_read_secret_requires_generated_secret() {
        let mut config = RelationalStoreConfig::postgres("db");
        config.generated_secret_user = None;
        let target = resource("Plain", ResourceConfig::RelationalStore(config), 0);

        let mut engine = GrantEngine::new("/ns");
        let result =
            engine.grant(&function("Fn"), &target, Capability::ReadSecret, GrantScope::All);
        assert!(matches!(result, Err(GrantError::SecretNotConfigured { .. })));
    }
}
