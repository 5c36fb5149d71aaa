//! Named outputs surfaced to operators after synthesis

use crate::error::OutputError;
use crate::types::{Attribute, AttributeRef, Resource, ResourceId};
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Output {
    pub name: String,
    pub value: AttributeRef,
    pub description: Option<String>,
}

/// Output map of a closed graph, in publication order
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct OutputPublisher {
    outputs: IndexMap<String, Output>,
}

impl OutputPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `id.attribute` under `name`
    ///
    /// Fails without recording anything if the name is taken, the resource
    /// is unknown or the attribute is not exposed by it.
    pub fn publish(
        &mut self,
        resources: &IndexMap<ResourceId, Resource>,
        name: &str,
        id: &ResourceId,
        attribute: Attribute,
        description: Option<String>,
    ) -> Result<&Output, OutputError> {
        if self.outputs.contains_key(name) {
            return Err(OutputError::DuplicateOutput {
                name: name.to_string(),
            });
        }

        let resource = resources.get(id).ok_or_else(|| OutputError::ResourceNotFound {
            name: name.to_string(),
            id: id.clone(),
        })?;
        let value = resource
            .attribute(attribute)
            .ok_or_else(|| OutputError::AttributeNotAvailable {
                name: name.to_string(),
                resource: id.clone(),
                attribute,
            })?;

        tracing::debug!(name, value = %value, "output published");
        let entry = self.outputs.entry(name.to_string()).or_insert(Output {
            name: name.to_string(),
            value,
            description,
        });
        Ok(entry)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Output> {
        self.outputs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Output> {
        self.outputs.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IdentityLayerConfig, RemovalPolicy, ResourceConfig};
    use std::collections::BTreeSet;

    fn resources() -> IndexMap<ResourceId, Resource> {
        let cognito = Resource {
            id: ResourceId::new("Cognito"),
            config: ResourceConfig::IdentityLayer(IdentityLayerConfig::default()),
            depends_on: BTreeSet::new(),
            removal_policy: RemovalPolicy::Destroy,
            ordinal: 0,
        };
        IndexMap::from([(cognito.id.clone(), cognito)])
    }

    #[test]
    fn test_publish_and_lookup() {
        let resources = resources();
        let mut outputs = OutputPublisher::new();

        let cognito = ResourceId::new("Cognito");
        let output = outputs
            .publish(&resources, "UserPoolId", &cognito, Attribute::UserPoolId, None)
            .unwrap();
        assert_eq!(output.value.token(), "${Cognito.user_pool_id}");
        assert_eq!(outputs.len(), 1);
    }

    #[test]
    fn test_failures_leave_outputs_unchanged() {
        let resources = resources();
        let mut outputs = OutputPublisher::new();
        let cognito = ResourceId::new("Cognito");
        outputs
            .publish(&resources, "UserPoolId", &cognito, Attribute::UserPoolId, None)
            .unwrap();

        let duplicate = outputs.publish(
            &resources,
            "UserPoolId",
            &ResourceId::new("Cognito"),
            Attribute::UserPoolClientId,
            None,
        );
        assert!(matches!(duplicate, Err(OutputError::DuplicateOutput { .. })));

        let api = ResourceId::new("AgentApi");
        let missing = outputs.publish(&resources, "ApiUrl", &api, Attribute::Url, None);
        assert!(matches!(missing, Err(OutputError::ResourceNotFound { .. })));

        let wrong = outputs.publish(&resources, "Url", &cognito, Attribute::Url, None);
        assert!(matches!(wrong, Err(OutputError::AttributeNotAvailable { .. })));

        assert_eq!(outputs.len(), 1);
        assert_eq!(
            outputs.get("UserPoolId").unwrap().value.attribute,
            Attribute::UserPoolId
        );
    }
}
