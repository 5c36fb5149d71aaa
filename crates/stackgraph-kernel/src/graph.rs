//! Sealed Graph
//!
//! The only product of construction. A `Graph` has no public constructor and
//! no `declare`; it can only come out of [`GraphBuilder::close`], so every
//! graph handed to the deployment engine has passed validation.
//!
//! [`GraphBuilder::close`]: crate::construction::GraphBuilder::close

use crate::construction::BuilderOptions;
use crate::dag::DependencyDag;
use crate::error::OutputError;
use crate::grants::GrantEdge;
use crate::outputs::{Output, OutputPublisher};
use crate::registry::ParameterRegistry;
use crate::types::{Attribute, Resource, ResourceId};
use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Sealed constructor for [`Graph`]
///
/// Crate-private so that only `GraphBuilder::close` can produce a graph.
pub(crate) struct GraphConstructor;

impl GraphConstructor {
    /// Called by `GraphBuilder::close` once validation has passed
    pub(crate) fn construct(
        options: BuilderOptions,
        resources: IndexMap<ResourceId, Resource>,
        registry: ParameterRegistry,
        grants: Vec<GrantEdge>,
    ) -> Graph {
        let digest = compute_digest(&resources, &registry, &grants);
        Graph {
            options,
            digest,
            resources,
            registry,
            grants,
            outputs: OutputPublisher::new(),
        }
    }
}

/// A closed, validated deployment plan
#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    #[serde(skip)]
    options: BuilderOptions,
    digest: String,
    resources: IndexMap<ResourceId, Resource>,
    #[serde(rename = "parameters")]
    registry: ParameterRegistry,
    grants: Vec<GrantEdge>,
    outputs: OutputPublisher,
}

impl Graph {
    #[must_use]
    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.options.namespace
    }

    /// Hex SHA-256 of the sealed plan (outputs excluded)
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    #[must_use]
    pub fn resource(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Resources in declaration order
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    #[must_use]
    pub fn parameters(&self) -> &ParameterRegistry {
        &self.registry
    }

    /// Grant edges in issue order
    #[must_use]
    pub fn grants(&self) -> &[GrantEdge] {
        &self.grants
    }

    /// Edges held by one function
    pub fn grants_for<'a>(
        &'a self,
        subject: &'a ResourceId,
    ) -> impl Iterator<Item = &'a GrantEdge> {
        self.grants
            .iter()
            .filter(move |edge| edge.subject.function() == Some(subject))
    }

    /// Development loosenings an audit should surface
    pub fn low_trust_grants(&self) -> impl Iterator<Item = &GrantEdge> {
        self.grants.iter().filter(|edge| edge.is_low_trust())
    }

    #[must_use]
    pub fn outputs(&self) -> &OutputPublisher {
        &self.outputs
    }

    #[must_use]
    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.get(name)
    }

    /// Publish `id.attribute` as a named output
    pub fn publish_output(
        &mut self,
        name: &str,
        id: &ResourceId,
        attribute: Attribute,
    ) -> Result<&Output, OutputError> {
        self.outputs.publish(&self.resources, name, id, attribute, None)
    }

    /// Same as [`Graph::publish_output`] with a human-readable description
    pub fn publish_described_output(
        &mut self,
        name: &str,
        id: &ResourceId,
        attribute: Attribute,
        description: impl Into<String>,
    ) -> Result<&Output, OutputError> {
        self.outputs
            .publish(&self.resources, name, id, attribute, Some(description.into()))
    }

    #[must_use]
    pub fn dag(&self) -> DependencyDag<'_> {
        DependencyDag::new(&self.resources)
    }

    /// Creation order honouring every `depends_on` edge
    #[must_use]
    pub fn topological_order(&self) -> Vec<&ResourceId> {
        self.dag().topological_order()
    }

    /// Groups of resources that may be created in parallel
    #[must_use]
    pub fn deployment_waves(&self) -> Vec<Vec<&ResourceId>> {
        self.dag().deployment_waves()
    }

    /// Pretty JSON rendering of the plan for the deployment engine
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// SHA-256 over a canonical rendering of resources, parameters and grants
///
/// Resources hash in declaration order, parameters in key order and grants
/// in issue order, so the same construction sequence always yields the same
/// digest.
fn compute_digest(
    resources: &IndexMap<ResourceId, Resource>,
    registry: &ParameterRegistry,
    grants: &[GrantEdge],
) -> String {
    let mut hasher = Sha256::new();

    hasher.update(registry.namespace().as_bytes());

    for resource in resources.values() {
        hasher.update(b"resource\0");
        hasher.update(resource.id().as_str().as_bytes());
        hasher.update(resource.ordinal().to_le_bytes());
        hasher.update(format!("{:?}", resource.removal_policy()).as_bytes());
        for dependency in resource.depends_on() {
            hasher.update(dependency.as_str().as_bytes());
        }
        hasher.update(format!("{:?}", resource.config()).as_bytes());
    }

    for parameter in registry.iter() {
        hasher.update(b"parameter\0");
        hasher.update(parameter.key.as_bytes());
        hasher.update(parameter.value.render().as_bytes());
        hasher.update(parameter.owner.as_str().as_bytes());
        for reader in &parameter.readers {
            hasher.update(reader.as_str().as_bytes());
        }
    }

    for edge in grants {
        hasher.update(b"grant\0");
        hasher.update(edge.subject.to_string().as_bytes());
        hasher.update(edge.target.as_str().as_bytes());
        hasher.update(format!("{:?}/{:?}", edge.capability, edge.scope).as_bytes());
        for action in &edge.statement.actions {
            hasher.update(action.as_bytes());
        }
        for resource in &edge.statement.resources {
            hasher.update(resource.as_bytes());
        }
    }

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use crate::construction::{BuilderOptions, GraphBuilder};
    use crate::grants::Capability;
    use crate::types::{
        Attribute, ComputeFunctionConfig, RelationalStoreConfig, ResourceConfig, ResourceId,
        ResourceSpec,
    };

    fn build(extra_grant: bool) -> super::Graph {
        let mut builder = GraphBuilder::new(BuilderOptions::default());
        let db = builder
            .declare(ResourceSpec::new(
                "AgentDB",
                ResourceConfig::RelationalStore(RelationalStoreConfig::postgres("agents")),
            ))
            .unwrap();
        let func = builder
            .declare(
                ResourceSpec::new(
                    "Fn",
                    ResourceConfig::ComputeFunction(ComputeFunctionConfig::python("fn")),
                )
                .depends_on([db.clone()]),
            )
            .unwrap();
        builder.grant(&func, &db, Capability::ReadSecret).unwrap();
        if extra_grant {
            builder.allow_ingress_from_any_ipv4(&db, None).unwrap();
        }
        builder.close().unwrap()
    }

    #[test]
    fn test_digest_is_deterministic() {
        let first = build(false);
        let second = build(false);

        assert_eq!(first.digest(), second.digest());
        assert_eq!(first.digest().len(), 64);
        assert_ne!(first.digest(), build(true).digest());
    }

    #[test]
    fn test_outputs_do_not_change_digest() {
        let mut graph = build(false);
        let before = graph.digest().to_string();

        graph
            .publish_output("DbAddress", &ResourceId::new("AgentDB"), Attribute::EndpointAddress)
            .unwrap();
        assert_eq!(graph.digest(), before);
        assert_eq!(graph.outputs().len(), 1);
    }

    #[test]
    fn test_queries() {
        let graph = build(true);
        let func = ResourceId::new("Fn");

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.grants().len(), 2);
        assert_eq!(graph.grants_for(&func).count(), 1);
        assert_eq!(graph.low_trust_grants().count(), 1);
        assert_eq!(
            graph.topological_order(),
            vec![&ResourceId::new("AgentDB"), &func]
        );
    }

    #[test]
    fn test_json_rendering() {
        let graph = build(false);
        let json: serde_json::Value = serde_json::from_str(&graph.to_json().unwrap()).unwrap();

        assert_eq!(json["digest"], graph.digest());
        assert_eq!(json["resources"]["AgentDB"]["config"]["kind"], "RelationalStore");
        let key = "/AgenticLLMAssistantWorkshop/AgentDB/secret_arn";
        let secret = &json["parameters"]["entries"][key];
        assert!(secret["readers"]
            .as_array()
            .unwrap()
            .contains(&serde_json::Value::from("Fn")));
    }
}
