//! Error types for the synthesis kernel
//!
//! Every error is raised at the call that violates an invariant and names
//! the offending resource, key or edge so the declarative input can be fixed.
//! None are retried; any of them aborts the synthesis.

use crate::grants::{Capability, GrantScope, Principal};
use crate::types::{Attribute, ResourceId, ResourceKind};

/// Parameter registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Key already published
    #[error("parameter key `{key}` is already published")]
    DuplicateKey { key: String },

    /// Key never published
    #[error("parameter key `{key}` is not published")]
    UnknownKey { key: String },

    /// Key outside the registry namespace
    #[error("parameter key `{key}` is outside namespace `{namespace}`")]
    OutsideNamespace { key: String, namespace: String },
}

/// Grant engine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrantError {
    /// Capability is not legal for the target's kind
    #[error("capability {capability:?} cannot target `{target}` ({kind}) for `{subject}`")]
    IncompatibleCapability {
        subject: Principal,
        target: ResourceId,
        kind: ResourceKind,
        capability: Capability,
    },

    /// Only compute functions hold grants
    #[error("`{subject}` is a {kind} and cannot hold grants")]
    InvalidSubject {
        subject: ResourceId,
        kind: ResourceKind,
    },

    /// Store has no generated credentials secret to read
    #[error("`{target}` has no generated secret for `{subject}` to read")]
    SecretNotConfigured {
        subject: ResourceId,
        target: ResourceId,
    },

    /// Managed policies attach to the subject's own role only
    #[error("`{subject}` cannot attach a managed policy to `{target}`")]
    ForeignRole {
        subject: ResourceId,
        target: ResourceId,
    },

    /// Scope does not fit the capability
    #[error("scope {scope:?} is not valid for capability {capability:?} on `{target}`")]
    InvalidScope {
        target: ResourceId,
        capability: Capability,
        scope: GrantScope,
    },

    /// Parameter scope names a key the target does not publish
    #[error("parameter `{key}` is published by `{owner}`, not `{target}`")]
    ForeignParameter {
        target: ResourceId,
        key: String,
        owner: ResourceId,
    },

    /// Grant target is neither the subject nor one of its dependencies
    #[error("`{subject}` holds a grant on `{target}` without depending on it")]
    UndeclaredDependency {
        subject: ResourceId,
        target: ResourceId,
    },
}

/// Errors raised while declaring resources and wiring grants
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Empty resource id
    #[error("resource id must not be empty")]
    InvalidId,

    /// Resource id already declared
    #[error("resource `{id}` is already declared")]
    DuplicateId { id: ResourceId },

    /// Dependency was not declared before the dependent
    #[error("resource `{resource}` depends on undeclared resource `{dependency}`")]
    DependencyNotFound {
        resource: ResourceId,
        dependency: ResourceId,
    },

    /// Config names a resource that is missing from `depends_on`
    #[error("resource `{resource}` references `{dependency}` without depending on it")]
    UnlistedDependency {
        resource: ResourceId,
        dependency: ResourceId,
    },

    /// Referenced resource has the wrong kind
    #[error("resource `{resource}` must be a {expected}, found {found}")]
    UnexpectedKind {
        resource: ResourceId,
        expected: ResourceKind,
        found: ResourceKind,
    },

    /// Resource not present in the graph
    #[error("resource `{id}` not found")]
    ResourceNotFound { id: ResourceId },

    /// Resource does not expose the attribute
    #[error("resource `{resource}` does not expose `{attribute}`")]
    AttributeNotAvailable {
        resource: ResourceId,
        attribute: Attribute,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Grant(#[from] GrantError),
}

/// Close-time consistency failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A dependency was declared after its dependent
    #[error("resource `{resource}` depends on later resource `{dependency}`")]
    DependencyOrder {
        resource: ResourceId,
        dependency: ResourceId,
    },

    /// Grant edge references a resource outside the graph
    #[error("grant from `{subject}` references missing resource `{missing}`")]
    DanglingGrant {
        subject: Principal,
        missing: ResourceId,
    },

    /// Reader listed without an entitling grant edge
    #[error("`{reader}` reads `{key}` without a grant")]
    UnentitledReader { key: String, reader: ResourceId },

    /// Function environment binds an unpublished key
    #[error("function `{function}` binds unpublished parameter `{key}`")]
    UnknownEnvironmentKey { function: ResourceId, key: String },

    /// Grant edge reaches a resource its subject does not depend on
    #[error("`{subject}` holds a grant on `{target}` without depending on it")]
    UnorderedGrant {
        subject: ResourceId,
        target: ResourceId,
    },

    /// Parameter-scoped edge names a key its target does not publish
    #[error("grant on `{target}` is scoped to parameter `{key}` it does not publish")]
    ForeignParameterScope { target: ResourceId, key: String },
}

/// Output publication errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutputError {
    #[error("output `{name}` references undeclared resource `{id}`")]
    ResourceNotFound { name: String, id: ResourceId },

    #[error("output `{name}`: resource `{resource}` does not expose `{attribute}`")]
    AttributeNotAvailable {
        name: String,
        resource: ResourceId,
        attribute: Attribute,
    },

    #[error("output `{name}` is already published")]
    DuplicateOutput { name: String },
}

/// Any failure that aborts a synthesis run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    #[error("graph construction failed: {0}")]
    Graph(#[from] GraphError),

    #[error("graph validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("output publication failed: {0}")]
    Output(#[from] OutputError),
}

impl From<RegistryError> for SynthesisError {
    fn from(value: RegistryError) -> Self {
        SynthesisError::Graph(GraphError::Registry(value))
    }
}

impl From<GrantError> for SynthesisError {
    fn from(value: GrantError) -> Self {
        SynthesisError::Graph(GraphError::Grant(value))
    }
}

impl SynthesisError {
    /// Id, key or edge the caller has to correct
    #[must_use]
    pub fn subject(&self) -> String {
        match self {
            SynthesisError::Graph(error) => error.subject(),
            SynthesisError::Validation(error) => match error {
                ValidationError::DependencyOrder { resource, .. } => resource.to_string(),
                ValidationError::DanglingGrant { missing, .. } => missing.to_string(),
                ValidationError::UnentitledReader { key, .. }
                | ValidationError::UnknownEnvironmentKey { key, .. }
                | ValidationError::ForeignParameterScope { key, .. } => key.clone(),
                ValidationError::UnorderedGrant { subject, target } => {
                    format!("{subject} -> {target}")
                }
            },
            SynthesisError::Output(error) => match error {
                OutputError::ResourceNotFound { id, .. } => id.to_string(),
                OutputError::AttributeNotAvailable {
                    resource,
                    attribute,
                    ..
                } => format!("{resource}.{attribute}"),
                OutputError::DuplicateOutput { name } => name.clone(),
            },
        }
    }
}

impl GraphError {
    /// Id, key or edge the caller has to correct
    #[must_use]
    pub fn subject(&self) -> String {
        match self {
            GraphError::InvalidId => String::new(),
            GraphError::DuplicateId { id } | GraphError::ResourceNotFound { id } => id.to_string(),
            GraphError::DependencyNotFound { dependency, .. }
            | GraphError::UnlistedDependency { dependency, .. } => dependency.to_string(),
            GraphError::UnexpectedKind { resource, .. } => resource.to_string(),
            GraphError::AttributeNotAvailable {
                resource,
                attribute,
            } => format!("{resource}.{attribute}"),
            GraphError::Registry(
                RegistryError::DuplicateKey { key }
                | RegistryError::UnknownKey { key }
                | RegistryError::OutsideNamespace { key, .. },
            ) => key.clone(),
            GraphError::Grant(error) => match error {
                GrantError::IncompatibleCapability {
                    subject,
                    target,
                    capability,
                    ..
                } => format!("{subject} -{capability:?}-> {target}"),
                GrantError::InvalidSubject { subject, .. } => subject.to_string(),
                GrantError::SecretNotConfigured { target, .. }
                | GrantError::ForeignRole { target, .. }
                | GrantError::InvalidScope { target, .. } => target.to_string(),
                GrantError::ForeignParameter { key, .. } => key.clone(),
                GrantError::UndeclaredDependency { subject, target } => {
                    format!("{subject} -> {target}")
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_names_offending_edge() {
        let error = SynthesisError::from(GrantError::IncompatibleCapability {
            subject: Principal::Function(ResourceId::new("Fn")),
            target: ResourceId::new("History"),
            kind: ResourceKind::DocumentTable,
            capability: Capability::ReadSecret,
        });

        assert_eq!(error.subject(), "Fn -ReadSecret-> History");
    }

    #[test]
    fn test_subject_names_missing_dependency() {
        let error = SynthesisError::from(GraphError::DependencyNotFound {
            resource: ResourceId::new("Fn"),
            dependency: ResourceId::new("AgentDB"),
        });

        assert_eq!(error.subject(), "AgentDB");
        assert!(error.to_string().contains("undeclared resource `AgentDB`"));
    }
}
