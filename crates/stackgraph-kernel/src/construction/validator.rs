//! Construction Validator
//!
//! Re-checks the whole graph before it is sealed. The builder enforces the
//! same rules call by call; this pass guarantees that a sealed [`Graph`]
//! is internally consistent no matter how it was assembled.
//!
//! [`Graph`]: crate::graph::Graph

use crate::error::ValidationError;
use crate::grants::{GrantEdge, GrantScope, Principal};
use crate::registry::ParameterRegistry;
use crate::types::{Resource, ResourceId, ResourceKind};
use indexmap::IndexMap;

/// Counts returned after successful validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub resource_count: usize,
    pub parameter_count: usize,
    pub grant_count: usize,
    pub low_trust_grant_count: usize,
}

/// Close-time consistency checks
#[derive(Debug, Default)]
pub struct ConstructionValidator;

impl ConstructionValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validate a complete graph
    ///
    /// 1. Topological validity (dependencies declared earlier)
    /// 2. Grant edges reference existing resources, stay within their
    ///    subject's dependencies and scope only to keys their target publishes
    /// 3. Every parameter reader holds an entitling edge
    /// 4. Function environments bind published keys
    pub fn validate<'a>(
        &self,
        resources: &IndexMap<ResourceId, Resource>,
        registry: &ParameterRegistry,
        edges: impl Iterator<Item = &'a GrantEdge> + Clone,
    ) -> Result<ValidationReport, ValidationError> {
        self.validate_order(resources)?;
        self.validate_edges(resources, registry, edges.clone())?;
        self.validate_readers(registry, edges.clone())?;
        self.validate_environment(resources, registry)?;

        let (grant_count, low_trust_grant_count) = edges.fold((0, 0), |(all, low), edge| {
            (all + 1, low + usize::from(edge.is_low_trust()))
        });

        Ok(ValidationReport {
            resource_count: resources.len(),
            parameter_count: registry.len(),
            grant_count,
            low_trust_grant_count,
        })
    }

    fn validate_order(
        &self,
        resources: &IndexMap<ResourceId, Resource>,
    ) -> Result<(), ValidationError> {
        for resource in resources.values() {
            for dependency in resource.depends_on() {
                let declared_before = resources
                    .get(dependency)
                    .is_some_and(|dep| dep.ordinal() < resource.ordinal());
                if !declared_before {
                    return Err(ValidationError::DependencyOrder {
                        resource: resource.id().clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_edges<'a>(
        &self,
        resources: &IndexMap<ResourceId, Resource>,
        registry: &ParameterRegistry,
        edges: impl Iterator<Item = &'a GrantEdge>,
    ) -> Result<(), ValidationError> {
        for edge in edges {
            if !resources.contains_key(&edge.target) {
                return Err(ValidationError::DanglingGrant {
                    subject: edge.subject.clone(),
                    missing: edge.target.clone(),
                });
            }

            if let Principal::Function(subject) = &edge.subject {
                let function = resources
                    .get(subject)
                    .filter(|resource| resource.kind() == ResourceKind::ComputeFunction)
                    .ok_or_else(|| ValidationError::DanglingGrant {
                        subject: edge.subject.clone(),
                        missing: subject.clone(),
                    })?;
                if subject != &edge.target && !function.depends_on().contains(&edge.target) {
                    return Err(ValidationError::UnorderedGrant {
                        subject: subject.clone(),
                        target: edge.target.clone(),
                    });
                }
            }

            if let GrantScope::Parameter(key) = &edge.scope {
                let owned = registry
                    .get(key)
                    .is_some_and(|parameter| parameter.owner == edge.target);
                if !owned {
                    return Err(ValidationError::ForeignParameterScope {
                        target: edge.target.clone(),
                        key: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_readers<'a>(
        &self,
        registry: &ParameterRegistry,
        edges: impl Iterator<Item = &'a GrantEdge> + Clone,
    ) -> Result<(), ValidationError> {
        for parameter in registry.iter() {
            for reader in &parameter.readers {
                let entitled = edges.clone().any(|edge| {
                    edge.entitles(reader, &parameter.owner, &parameter.key, parameter.entitled_by)
                });
                if !entitled {
                    return Err(ValidationError::UnentitledReader {
                        key: parameter.key.clone(),
                        reader: reader.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_environment(
        &self,
        resources: &IndexMap<ResourceId, Resource>,
        registry: &ParameterRegistry,
    ) -> Result<(), ValidationError> {
        for resource in resources.values() {
            let Some(environment) = resource.environment() else {
                continue;
            };
            for parameter in environment.values() {
                if !registry.contains(parameter.key()) {
                    return Err(ValidationError::UnknownEnvironmentKey {
                        function: resource.id().clone(),
                        key: parameter.key().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grants::{Capability, PermissionStatement};
    use crate::types::{
        ComputeFunctionConfig, ParameterValue, RelationalStoreConfig, RemovalPolicy,
        ResourceConfig,
    };
    use std::collections::BTreeSet;

    fn resource(id: &str, config: ResourceConfig, deps: &[&str], ordinal: usize) -> Resource {
        Resource {
            id: ResourceId::new(id),
            config,
            depends_on: deps
                .iter()
                .map(|dep| ResourceId::new(*dep))
                .collect::<BTreeSet<_>>(),
            removal_policy: RemovalPolicy::Destroy,
            ordinal,
        }
    }

    fn graph(entries: Vec<Resource>) -> IndexMap<ResourceId, Resource> {
        entries
            .into_iter()
            .map(|resource| (resource.id.clone(), resource))
            .collect()
    }

    fn store(ordinal: usize, deps: &[&str]) -> Resource {
        resource(
            "AgentDB",
            ResourceConfig::RelationalStore(RelationalStoreConfig::postgres("db")),
            deps,
            ordinal,
        )
    }

    fn function(ordinal: usize, deps: &[&str]) -> Resource {
        resource(
            "Fn",
            ResourceConfig::ComputeFunction(ComputeFunctionConfig::python("fn")),
            deps,
            ordinal,
        )
    }

    fn edge(subject: &str, target: &str, capability: Capability) -> GrantEdge {
        GrantEdge {
            subject: Principal::Function(ResourceId::new(subject)),
            target: ResourceId::new(target),
            capability,
            scope: GrantScope::All,
            statement: PermissionStatement {
                actions: Vec::new(),
                resources: Vec::new(),
            },
        }
    }

    #[test]
    fn test_valid_graph_passes() {
        let resources = graph(vec![store(0, &[]), function(1, &["AgentDB"])]);
        let registry = ParameterRegistry::new("/ns");
        let edges = [edge("Fn", "AgentDB", Capability::ReadSecret)];

        let report = ConstructionValidator::new()
            .validate(&resources, &registry, edges.iter())
            .unwrap();
        assert_eq!(report.resource_count, 2);
        assert_eq!(report.grant_count, 1);
        assert_eq!(report.low_trust_grant_count, 0);
    }

    #[test]
    fn test_dependency_declared_later_is_rejected() {
        let resources = graph(vec![function(0, &["AgentDB"]), store(1, &[])]);
        let registry = ParameterRegistry::new("/ns");

        let result = ConstructionValidator::new().validate(&resources, &registry, [].iter());
        assert!(matches!(result, Err(ValidationError::DependencyOrder { .. })));
    }

    #[test]
    fn test_dangling_grant_is_rejected() {
        let resources = graph(vec![function(0, &[])]);
        let registry = ParameterRegistry::new("/ns");
        let edges = [edge("Fn", "AgentDB", Capability::ReadSecret)];

        let result = ConstructionValidator::new().validate(&resources, &registry, edges.iter());
        assert!(matches!(
            result,
            Err(ValidationError::DanglingGrant { missing, .. }) if missing.as_str() == "AgentDB"
        ));
    }

    #[test]
    fn test_reader_without_edge_is_rejected() {
        let resources = graph(vec![store(0, &[]), function(1, &["AgentDB"])]);
        let mut registry = ParameterRegistry::new("/ns");
        registry
            .publish(
                "/ns/AgentDB/secret_arn",
                ParameterValue::Literal("arn".to_string()),
                ResourceId::new("AgentDB"),
                Capability::ReadSecret,
            )
            .unwrap();
        let granted = edge("Fn", "AgentDB", Capability::ReadSecret);
        registry.admit(&granted);

        let result = ConstructionValidator::new().validate(&resources, &registry, [].iter());
        assert!(matches!(result, Err(ValidationError::UnentitledReader { .. })));

        let edges = [granted];
        assert!(ConstructionValidator::new()
            .validate(&resources, &registry, edges.iter())
            .is_ok());
    }

    #[test]
    fn test_grant_outside_dependencies_is_rejected() {
        let resources = graph(vec![store(0, &[]), function(1, &[])]);
        let registry = ParameterRegistry::new("/ns");
        let edges = [edge("Fn", "AgentDB", Capability::ReadSecret)];

        let result = ConstructionValidator::new().validate(&resources, &registry, edges.iter());
        assert_eq!(
            result,
            Err(ValidationError::UnorderedGrant {
                subject: ResourceId::new("Fn"),
                target: ResourceId::new("AgentDB"),
            })
        );
    }

    #[test]
    fn test_parameter_scope_on_foreign_key_is_rejected() {
        let resources = graph(vec![store(0, &[]), function(1, &["AgentDB"])]);
        let mut registry = ParameterRegistry::new("/ns");
        registry
            .publish(
                "/ns/bedrock_region",
                ParameterValue::Literal("us-east-1".to_string()),
                ResourceId::new("Region"),
                Capability::ReadParameter,
            )
            .unwrap();
        let mut scoped = edge("Fn", "AgentDB", Capability::ReadParameter);
        scoped.scope = GrantScope::Parameter("/ns/bedrock_region".to_string());
        let edges = [scoped];

        let result = ConstructionValidator::new().validate(&resources, &registry, edges.iter());
        assert!(matches!(
            result,
            Err(ValidationError::ForeignParameterScope { key, .. }) if key == "/ns/bedrock_region"
        ));
    }
}
