//! Parameter Registry
//!
//! Namespaced key/value store of configuration scalars. Resources publish
//! into it when declared; functions hold [`ParameterRef`]s into it and are
//! admitted as readers only through grant edges.

use crate::error::{GrantError, GraphError, RegistryError};
use crate::grants::{Capability, GrantEdge, GrantEngine, GrantScope};
use crate::types::{Attribute, ParameterRef, ParameterValue, Resource, ResourceId};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A published parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub key: String,
    pub value: ParameterValue,
    /// Resource that published the value
    pub owner: ResourceId,
    /// Capability whose grant on `owner` admits a reader
    pub entitled_by: Capability,
    pub readers: BTreeSet<ResourceId>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParameterRegistry {
    namespace: String,
    entries: BTreeMap<String, Parameter>,
}

impl ParameterRegistry {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Deterministic key for an auto-published attribute
    #[must_use]
    pub fn key_for(&self, id: &ResourceId, attribute: Attribute) -> String {
        format!("{}/{}/{}", self.namespace, id, attribute)
    }

    /// Check that `key` could be published without publishing it
    pub fn check_publishable(&self, key: &str) -> Result<(), RegistryError> {
        let prefix = format!("{}/", self.namespace);
        if !key.starts_with(&prefix) || key.len() == prefix.len() {
            return Err(RegistryError::OutsideNamespace {
                key: key.to_string(),
                namespace: self.namespace.clone(),
            });
        }
        if self.entries.contains_key(key) {
            return Err(RegistryError::DuplicateKey {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Publish `value` under `key`; a key is set exactly once
    pub fn publish(
        &mut self,
        key: impl Into<String>,
        value: ParameterValue,
        owner: ResourceId,
        entitled_by: Capability,
    ) -> Result<ParameterRef, RegistryError> {
        let key = key.into();
        self.check_publishable(&key)?;

        tracing::debug!(%key, %owner, "parameter published");
        self.entries.insert(
            key.clone(),
            Parameter {
                key: key.clone(),
                value,
                owner,
                entitled_by,
                readers: BTreeSet::new(),
            },
        );
        Ok(ParameterRef::new(key))
    }

    /// Deferred handle on an existing key
    pub fn reference(&self, key: &str) -> Result<ParameterRef, RegistryError> {
        if self.entries.contains_key(key) {
            Ok(ParameterRef::new(key))
        } else {
            Err(RegistryError::UnknownKey {
                key: key.to_string(),
            })
        }
    }

    /// Check that a parameter scope on `target` names one of its own keys
    ///
    /// The key must be published by `target`, and a read scope must name a
    /// key that `ReadParameter` entitles. Other scopes pass through.
    pub fn check_scope(
        &self,
        target: &ResourceId,
        capability: Capability,
        scope: &GrantScope,
    ) -> Result<(), GraphError> {
        let GrantScope::Parameter(key) = scope else {
            return Ok(());
        };
        let parameter = self
            .entries
            .get(key)
            .ok_or_else(|| RegistryError::UnknownKey { key: key.clone() })?;

        let foreign = &parameter.owner != target
            || (capability == Capability::ReadParameter
                && parameter.entitled_by != Capability::ReadParameter);
        if foreign {
            return Err(GrantError::ForeignParameter {
                target: target.clone(),
                key: key.clone(),
                owner: parameter.owner.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Grant `subject` read access to `key` and record it as a reader
    ///
    /// The grant goes through the engine against the parameter's owner with
    /// the parameter's entitling capability. If the engine refuses, the
    /// reader set is left untouched.
    pub fn grant_read(
        &mut self,
        key: &str,
        subject: &Resource,
        resources: &IndexMap<ResourceId, Resource>,
        engine: &mut GrantEngine,
    ) -> Result<GrantEdge, GraphError> {
        let parameter = self
            .entries
            .get(key)
            .ok_or_else(|| RegistryError::UnknownKey {
                key: key.to_string(),
            })?;
        let owner = resources
            .get(&parameter.owner)
            .ok_or_else(|| GraphError::ResourceNotFound {
                id: parameter.owner.clone(),
            })?;
        let scope = match parameter.entitled_by {
            Capability::ReadParameter => GrantScope::Parameter(key.to_string()),
            _ => GrantScope::All,
        };

        let edge = engine.grant(subject, owner, parameter.entitled_by, scope)?;
        self.admit(&edge);
        Ok(edge)
    }

    /// Record the edge's subject as reader of every parameter it entitles
    ///
    /// Returns how many parameters gained the reader.
    pub fn admit(&mut self, edge: &GrantEdge) -> usize {
        let Some(reader) = edge.subject.function() else {
            return 0;
        };

        let mut admitted = 0;
        for parameter in self.entries.values_mut() {
            if edge.entitles(reader, &parameter.owner, &parameter.key, parameter.entitled_by)
                && parameter.readers.insert(reader.clone())
            {
                admitted += 1;
            }
        }
        admitted
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Parameter> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn readers(&self, key: &str) -> Option<&BTreeSet<ResourceId>> {
        self.entries.get(key).map(|parameter| &parameter.readers)
    }

    /// Parameters in key order
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.entries.values()
    }

    /// Parameters published by one resource
    pub fn owned_by<'a>(
        &'a self,
        owner: &'a ResourceId,
    ) -> impl Iterator<Item = &'a Parameter> {
        self.entries
            .values()
            .filter(move |parameter| &parameter.owner == owner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
