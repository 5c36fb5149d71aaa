//! Graph Builder
//!
//! The construction-phase interface. Resources are declared in dependency
//! order, publish their attributes into the registry, and receive grants.
//! `close()` validates everything and seals the result into a [`Graph`].

use crate::construction::validator::ConstructionValidator;
use crate::error::{GraphError, ValidationError};
use crate::grants::{Capability, GrantEdge, GrantEngine, GrantScope};
use crate::graph::{Graph, GraphConstructor};
use crate::registry::ParameterRegistry;
use crate::types::{
    Attribute, AttributeRef, ParameterRef, ParameterValue, RemovalPolicy, Resource,
    ResourceConfig, ResourceId, ResourceSpec,
};
use indexmap::IndexMap;

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "/AgenticLLMAssistantWorkshop";

/// Options fixed for one synthesis run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderOptions {
    /// Prefix of every parameter key
    pub namespace: String,
    /// Removal policy for resources without an explicit override
    pub removal_policy_default: RemovalPolicy,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            removal_policy_default: RemovalPolicy::Destroy,
        }
    }
}

/// Builder for one synthesis pass
///
/// Usage:
/// ```rust,ignore
/// let mut builder = GraphBuilder::new(BuilderOptions::default());
/// let db = builder.declare(ResourceSpec::new("AgentDB", store_config))?;
/// let func = builder.declare(ResourceSpec::new("Fn", fn_config).depends_on([db.clone()]))?;
/// builder.grant(&func, &db, Capability::ReadSecret)?;
/// let graph = builder.close()?;
/// ```
#[derive(Debug)]
pub struct GraphBuilder {
    options: BuilderOptions,
    resources: IndexMap<ResourceId, Resource>,
    registry: ParameterRegistry,
    grants: GrantEngine,
}

impl GraphBuilder {
    pub fn new(options: BuilderOptions) -> Self {
        Self {
            registry: ParameterRegistry::new(options.namespace.clone()),
            grants: GrantEngine::new(options.namespace.clone()),
            resources: IndexMap::new(),
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    /// Declare a resource
    ///
    /// Every dependency must already be declared; forward references are
    /// rejected. Resources named inside the config must also appear in
    /// `depends_on`. All checks run before anything is recorded, so a failed
    /// declaration leaves the builder unchanged.
    pub fn declare(&mut self, spec: ResourceSpec) -> Result<ResourceId, GraphError> {
        let ResourceSpec {
            id,
            config,
            depends_on,
            removal_policy,
        } = spec;

        if id.as_str().trim().is_empty() {
            return Err(GraphError::InvalidId);
        }
        if self.resources.contains_key(&id) {
            return Err(GraphError::DuplicateId { id });
        }

        for dependency in &depends_on {
            if !self.resources.contains_key(dependency) {
                return Err(GraphError::DependencyNotFound {
                    resource: id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        for (referenced, expected) in config.references() {
            let Some(resource) = self.resources.get(referenced) else {
                return Err(GraphError::DependencyNotFound {
                    resource: id.clone(),
                    dependency: referenced.clone(),
                });
            };
            if !depends_on.contains(referenced) {
                return Err(GraphError::UnlistedDependency {
                    resource: id.clone(),
                    dependency: referenced.clone(),
                });
            }
            if let Some(expected) = expected {
                if resource.kind() != expected {
                    return Err(GraphError::UnexpectedKind {
                        resource: referenced.clone(),
                        expected,
                        found: resource.kind(),
                    });
                }
            }
        }

        for reference in config.attribute_refs() {
            self.check_attribute(reference)?;
        }

        for parameter in config.parameter_refs() {
            self.registry.reference(parameter.key())?;
        }

        let resource = Resource {
            id: id.clone(),
            config,
            depends_on,
            removal_policy: removal_policy.unwrap_or(self.options.removal_policy_default),
            ordinal: self.resources.len(),
        };

        let publications = self.publications(&resource);
        for (key, _, _) in &publications {
            self.registry.check_publishable(key)?;
        }

        tracing::debug!(
            id = %resource.id,
            kind = %resource.kind(),
            dependencies = resource.depends_on.len(),
            removal_policy = ?resource.removal_policy,
            "resource declared"
        );
        self.resources.insert(id.clone(), resource);
        for (key, value, entitled_by) in publications {
            self.registry.publish(key, value, id.clone(), entitled_by)?;
        }

        Ok(id)
    }

    /// Values a resource publishes when declared
    ///
    /// A `Parameter` resource publishes its configured key; every other
    /// resource publishes each exposed attribute under a derived key.
    fn publications(&self, resource: &Resource) -> Vec<(String, ParameterValue, Capability)> {
        if let ResourceConfig::Parameter(parameter) = &resource.config {
            return vec![(
                parameter.key.clone(),
                parameter.value.clone(),
                Capability::ReadParameter,
            )];
        }

        resource
            .attributes()
            .map(|attribute| {
                let entitled_by = match attribute {
                    Attribute::SecretArn => Capability::ReadSecret,
                    _ => Capability::ReadParameter,
                };
                (
                    self.registry.key_for(&resource.id, attribute),
                    ParameterValue::Attribute(AttributeRef::new(resource.id.clone(), attribute)),
                    entitled_by,
                )
            })
            .collect()
    }

    fn check_attribute(&self, reference: &AttributeRef) -> Result<(), GraphError> {
        let resource = self.resource_or_err(&reference.resource)?;
        if resource.exposes(reference.attribute) {
            Ok(())
        } else {
            Err(GraphError::AttributeNotAvailable {
                resource: reference.resource.clone(),
                attribute: reference.attribute,
            })
        }
    }

    fn resource_or_err(&self, id: &ResourceId) -> Result<&Resource, GraphError> {
        lookup(&self.resources, id)
    }

    /// Grant `capability` on the whole of `target` to `subject`
    pub fn grant(
        &mut self,
        subject: &ResourceId,
        target: &ResourceId,
        capability: Capability,
    ) -> Result<GrantEdge, GraphError> {
        self.grant_scoped(subject, target, capability, GrantScope::All)
    }

    /// Grant `capability` on `target` to `subject`, narrowed by `scope`
    ///
    /// A parameter scope must name a key `target` publishes. Parameters the
    /// new edge entitles list `subject` as a reader afterwards; a
    /// `ReadSecret` grant on a store admits the function to the store's
    /// secret reference.
    pub fn grant_scoped(
        &mut self,
        subject: &ResourceId,
        target: &ResourceId,
        capability: Capability,
        scope: GrantScope,
    ) -> Result<GrantEdge, GraphError> {
        let subject = lookup(&self.resources, subject)?;
        let target = lookup(&self.resources, target)?;
        self.registry.check_scope(target.id(), capability, &scope)?;

        let edge = self.grants.grant(subject, target, capability, scope)?;
        self.registry.admit(&edge);
        Ok(edge)
    }

    /// Grant `subject` read access to the parameter under `key`
    pub fn grant_parameter_read(
        &mut self,
        key: &str,
        subject: &ResourceId,
    ) -> Result<GrantEdge, GraphError> {
        let subject = lookup(&self.resources, subject)?;
        self.registry
            .grant_read(key, subject, &self.resources, &mut self.grants)
    }

    /// Attach an AWS-managed policy to `function`'s own role
    pub fn attach_managed_policy(
        &mut self,
        function: &ResourceId,
        policy: &str,
    ) -> Result<GrantEdge, GraphError> {
        self.grant_scoped(
            function,
            function,
            Capability::InvokeManagedPolicy,
            GrantScope::ManagedPolicy(policy.to_string()),
        )
    }

    /// Trusted ingress from `function` to `store`; defaults to the store's port
    pub fn allow_ingress_from(
        &mut self,
        function: &ResourceId,
        store: &ResourceId,
        port: Option<u16>,
    ) -> Result<GrantEdge, GraphError> {
        let scope = port.map_or(GrantScope::All, GrantScope::Port);
        self.grant_scoped(function, store, Capability::NetworkIngress, scope)
    }

    /// Low-trust ingress from any IPv4 source to `store`
    pub fn allow_ingress_from_any_ipv4(
        &mut self,
        store: &ResourceId,
        port: Option<u16>,
    ) -> Result<GrantEdge, GraphError> {
        let target = lookup(&self.resources, store)?;
        Ok(self.grants.open_ingress(target, port)?)
    }

    /// Deferred handle on a published parameter
    pub fn reference(&self, key: &str) -> Result<ParameterRef, GraphError> {
        Ok(self.registry.reference(key)?)
    }

    /// Deferred handle on the auto-published parameter for `id.attribute`
    pub fn attribute_parameter(
        &self,
        id: &ResourceId,
        attribute: Attribute,
    ) -> Result<ParameterRef, GraphError> {
        self.attribute(id, attribute)?;
        self.reference(&self.registry.key_for(id, attribute))
    }

    /// Deferred handle on a resource attribute
    pub fn attribute(
        &self,
        id: &ResourceId,
        attribute: Attribute,
    ) -> Result<AttributeRef, GraphError> {
        self.resource_or_err(id)?
            .attribute(attribute)
            .ok_or_else(|| GraphError::AttributeNotAvailable {
                resource: id.clone(),
                attribute,
            })
    }

    /// Parameter key under the builder namespace
    #[must_use]
    pub fn key(&self, leaf: &str) -> String {
        format!("{}/{}", self.options.namespace, leaf)
    }

    #[must_use]
    pub fn resource(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    #[must_use]
    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    #[must_use]
    pub fn grants(&self) -> &GrantEngine {
        &self.grants
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Validate and seal the graph
    ///
    /// Consumes the builder, so no further declarations are possible.
    pub fn close(self) -> Result<Graph, ValidationError> {
        let report = ConstructionValidator::new().validate(
            &self.resources,
            &self.registry,
            self.grants.edges(),
        )?;

        tracing::info!(
            resources = report.resource_count,
            parameters = report.parameter_count,
            grants = report.grant_count,
            low_trust_grants = report.low_trust_grant_count,
            "graph closed"
        );

        Ok(GraphConstructor::construct(
            self.options,
            self.resources,
            self.registry,
            self.grants.into_edges(),
        ))
    }
}

fn lookup<'a>(
    resources: &'a IndexMap<ResourceId, Resource>,
    id: &ResourceId,
) -> Result<&'a Resource, GraphError> {
    resources
        .get(id)
        .ok_or_else(|| GraphError::ResourceNotFound { id: id.clone() })
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(BuilderOptions::default())
    }
}
