//! Capabilities, principals and the permission-statement template table

use crate::types::{Attribute, AttributeRef, Resource, ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access a compute function can request against a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    ReadSecret,
    ReadWriteTable,
    ReadWriteObjectStore,
    ReadParameter,
    WriteParameter,
    InvokeManagedPolicy,
    NetworkIngress,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::ReadSecret,
        Capability::ReadWriteTable,
        Capability::ReadWriteObjectStore,
        Capability::ReadParameter,
        Capability::WriteParameter,
        Capability::InvokeManagedPolicy,
        Capability::NetworkIngress,
    ];

    /// Whether this capability may target a resource of `kind`
    #[must_use]
    pub fn is_legal_for(self, kind: ResourceKind) -> bool {
        match self {
            Capability::ReadSecret | Capability::NetworkIngress => {
                kind == ResourceKind::RelationalStore
            }
            Capability::ReadWriteTable => kind == ResourceKind::DocumentTable,
            Capability::ReadWriteObjectStore => kind == ResourceKind::ObjectStore,
            Capability::ReadParameter => true,
            Capability::WriteParameter => kind == ResourceKind::Parameter,
            Capability::InvokeManagedPolicy => kind == ResourceKind::ComputeFunction,
        }
    }
}

/// Who holds a grant
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principal {
    /// A declared compute function
    Function(ResourceId),
    /// Any IPv4 source; a development-only loosening of network ingress
    AnyIpv4,
}

impl Principal {
    /// Broad, untrusted sources
    #[must_use]
    pub fn is_low_trust(&self) -> bool {
        matches!(self, Principal::AnyIpv4)
    }

    #[must_use]
    pub fn function(&self) -> Option<&ResourceId> {
        match self {
            Principal::Function(id) => Some(id),
            Principal::AnyIpv4 => None,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Function(id) => write!(f, "{id}"),
            Principal::AnyIpv4 => f.write_str("0.0.0.0/0"),
        }
    }
}

/// Narrows a grant below the whole target
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantScope {
    All,
    Parameter(String),
    ManagedPolicy(String),
    Port(u16),
}

/// Concrete permission rendered from a capability template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionStatement {
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

const SECRET_READ_ACTIONS: &[&str] = &[
    "secretsmanager:GetSecretValue",
    "secretsmanager:DescribeSecret",
];

const TABLE_READ_WRITE_ACTIONS: &[&str] = &[
    "dynamodb:BatchGetItem",
    "dynamodb:GetRecords",
    "dynamodb:GetShardIterator",
    "dynamodb:Query",
    "dynamodb:GetItem",
    "dynamodb:Scan",
    "dynamodb:ConditionCheckItem",
    "dynamodb:BatchWriteItem",
    "dynamodb:PutItem",
    "dynamodb:UpdateItem",
    "dynamodb:DeleteItem",
    "dynamodb:DescribeTable",
];

const BUCKET_READ_WRITE_ACTIONS: &[&str] = &[
    "s3:GetObject*",
    "s3:GetBucket*",
    "s3:List*",
    "s3:DeleteObject*",
    "s3:PutObject",
    "s3:PutObjectLegalHold",
    "s3:PutObjectRetention",
    "s3:PutObjectTagging",
    "s3:PutObjectVersionTagging",
    "s3:Abort*",
];

const PARAMETER_READ_ACTIONS: &[&str] = &[
    "ssm:DescribeParameters",
    "ssm:GetParameters",
    "ssm:GetParameter",
    "ssm:GetParameterHistory",
];

const PARAMETER_WRITE_ACTIONS: &[&str] = &["ssm:PutParameter"];

fn owned(actions: &[&str]) -> Vec<String> {
    actions.iter().map(|action| (*action).to_string()).collect()
}

fn parameter_arn(key: &str) -> String {
    format!("arn:aws:ssm:*:*:parameter{key}")
}

fn token(target: &Resource, attribute: Attribute) -> String {
    AttributeRef::new(target.id().clone(), attribute).token()
}

/// Look up the statement template for `capability` against `target`
///
/// Callers check legality first; `namespace` locates the target's
/// auto-published parameters for unscoped parameter reads.
pub(crate) fn statement_for(
    capability: Capability,
    target: &Resource,
    scope: &GrantScope,
    namespace: &str,
) -> PermissionStatement {
    match (capability, scope) {
        (Capability::ReadSecret, _) => PermissionStatement {
            actions: owned(SECRET_READ_ACTIONS),
            resources: vec![token(target, Attribute::SecretArn)],
        },
        (Capability::ReadWriteTable, _) => {
            let arn = token(target, Attribute::TableArn);
            PermissionStatement {
                actions: owned(TABLE_READ_WRITE_ACTIONS),
                resources: vec![format!("{arn}/index/*"), arn],
            }
        }
        (Capability::ReadWriteObjectStore, _) => {
            let arn = token(target, Attribute::BucketArn);
            PermissionStatement {
                actions: owned(BUCKET_READ_WRITE_ACTIONS),
                resources: vec![format!("{arn}/*"), arn],
            }
        }
        (Capability::ReadParameter, GrantScope::Parameter(key)) => PermissionStatement {
            actions: owned(PARAMETER_READ_ACTIONS),
            resources: vec![parameter_arn(key)],
        },
        (Capability::ReadParameter, _) => PermissionStatement {
            actions: owned(PARAMETER_READ_ACTIONS),
            resources: vec![parameter_arn(&format!("{namespace}/{}/*", target.id()))],
        },
        (Capability::WriteParameter, GrantScope::Parameter(key)) => PermissionStatement {
            actions: owned(PARAMETER_WRITE_ACTIONS),
            resources: vec![parameter_arn(key)],
        },
        (Capability::WriteParameter, _) => PermissionStatement {
            actions: owned(PARAMETER_WRITE_ACTIONS),
            resources: vec![token(target, Attribute::ParameterName)],
        },
        (Capability::InvokeManagedPolicy, GrantScope::ManagedPolicy(name)) => {
            PermissionStatement {
                actions: vec!["iam:AttachRolePolicy".to_string()],
                resources: vec![format!("arn:aws:iam::aws:policy/{name}")],
            }
        }
        (Capability::InvokeManagedPolicy, _) => PermissionStatement {
            actions: vec!["iam:AttachRolePolicy".to_string()],
            resources: vec![token(target, Attribute::RoleArn)],
        },
        (Capability::NetworkIngress, GrantScope::Port(port)) => PermissionStatement {
            actions: vec![format!("ec2:ingress:tcp/{port}")],
            resources: vec![token(target, Attribute::EndpointAddress)],
        },
        (Capability::NetworkIngress, _) => PermissionStatement {
            actions: vec!["ec2:ingress:tcp".to_string()],
            resources: vec![token(target, Attribute::EndpointAddress)],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_capability_rejects_store() {
        assert!(!Capability::ReadWriteTable.is_legal_for(ResourceKind::RelationalStore));
        assert!(Capability::ReadWriteTable.is_legal_for(ResourceKind::DocumentTable));
    }

    #[test]
    fn test_read_secret_only_on_store() {
        for kind in [
            ResourceKind::Network,
            ResourceKind::DocumentTable,
            ResourceKind::ObjectStore,
            ResourceKind::ComputeFunction,
            ResourceKind::IdentityLayer,
            ResourceKind::ApiLayer,
            ResourceKind::Parameter,
        ] {
            assert!(!Capability::ReadSecret.is_legal_for(kind), "{kind}");
        }
        assert!(Capability::ReadSecret.is_legal_for(ResourceKind::RelationalStore));
    }

    #[test]
    fn test_principal_trust() {
        assert!(Principal::AnyIpv4.is_low_trust());
        assert!(!Principal::Function(ResourceId::new("Fn")).is_low_trust());
        assert_eq!(Principal::AnyIpv4.to_string(), "0.0.0.0/0");
    }

    #[test]
    fn test_parameter_arn_keeps_leading_slash() {
        assert_eq!(
            parameter_arn("/ns/bedrock_region"),
            "arn:aws:ssm:*:*:parameter/ns/bedrock_region"
        );
    }
}
