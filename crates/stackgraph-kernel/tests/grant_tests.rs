use proptest::prelude::*;
use stackgraph_kernel::construction::GraphBuilder;
use stackgraph_kernel::error::{GrantError, GraphError};
use stackgraph_kernel::grants::{Capability, GrantKey, GrantScope};
use stackgraph_kernel::types::{ResourceId, ResourceKind};
use stackgraph_test_utils::{key, populated_builder};
use std::collections::{BTreeMap, BTreeSet};

/// Grant requests a function may legitimately make in the populated fixture
fn requests() -> Vec<(&'static str, Capability)> {
    vec![
        ("AgentDB", Capability::ReadSecret),
        ("AgentDB", Capability::NetworkIngress),
        ("AgentDB", Capability::ReadParameter),
        ("History", Capability::ReadWriteTable),
        ("Bucket", Capability::ReadWriteObjectStore),
        ("Region", Capability::ReadParameter),
        ("Region", Capability::WriteParameter),
    ]
}

fn target_kind(id: &str) -> ResourceKind {
    match id {
        "AgentDB" => ResourceKind::RelationalStore,
        "History" => ResourceKind::DocumentTable,
        "Bucket" => ResourceKind::ObjectStore,
        "Region" => ResourceKind::Parameter,
        _ => ResourceKind::ComputeFunction,
    }
}

proptest! {
    #[test]
    fn prop_grants_are_idempotent_and_order_independent(
        order in Just([requests(), requests()].concat()).prop_shuffle()
    ) {
        let (mut builder, func) = populated_builder();
        for (target, capability) in &order {
            builder.grant(&func, &ResourceId::new(*target), *capability).unwrap();
        }

        let (mut reference, _) = populated_builder();
        for (target, capability) in requests() {
            reference.grant(&func, &ResourceId::new(target), capability).unwrap();
        }

        let keys = |b: &GraphBuilder| -> BTreeSet<GrantKey> {
            b.grants().edges().map(|edge| edge.key()).collect()
        };
        prop_assert_eq!(keys(&builder), keys(&reference));
        prop_assert_eq!(builder.grants().len(), requests().len());

        let readers = |b: &GraphBuilder| -> BTreeMap<String, BTreeSet<ResourceId>> {
            b.registry().iter().map(|p| (p.key.clone(), p.readers.clone())).collect()
        };
        prop_assert_eq!(readers(&builder), readers(&reference));
    }

    #[test]
    fn prop_capability_compatibility(
        target in prop::sample::select(vec!["AgentDB", "History", "Bucket", "Region"]),
        capability in prop::sample::select(Capability::ALL.to_vec())
    ) {
        let (mut builder, func) = populated_builder();
        let result = builder.grant(&func, &ResourceId::new(target), capability);
        let legal = capability.is_legal_for(target_kind(target));

        match result {
            Ok(edge) => {
                prop_assert!(legal);
                prop_assert_eq!(edge.capability, capability);
                prop_assert_eq!(builder.grants().len(), 1);
            }
            Err(GraphError::Grant(GrantError::IncompatibleCapability { kind, .. })) => {
                prop_assert!(!legal);
                prop_assert_eq!(kind, target_kind(target));
                prop_assert!(builder.grants().is_empty());
            }
            // managed policies only attach with a named scope
            Err(GraphError::Grant(GrantError::InvalidScope { .. })) => {
                prop_assert_eq!(capability, Capability::InvokeManagedPolicy);
            }
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }
}

#[test]
fn test_function_without_grants_holds_nothing() {
    let (builder, func) = populated_builder();

    assert_eq!(builder.grants().edges_for(&func).count(), 0);
    assert!(builder.registry().iter().all(|parameter| parameter.readers.is_empty()));

    let graph = builder.close().unwrap();
    assert_eq!(graph.grants_for(&func).count(), 0);
}

#[test]
fn test_parameter_read_is_scoped_to_one_key() {
    let (mut builder, func) = populated_builder();
    let edge = builder
        .grant_parameter_read(&key("AgentDB/endpoint_address"), &func)
        .unwrap();

    assert_eq!(edge.scope, GrantScope::Parameter(key("AgentDB/endpoint_address")));
    let registry = builder.registry();
    assert!(registry.readers(&key("AgentDB/endpoint_address")).unwrap().contains(&func));
    assert!(registry.readers(&key("AgentDB/endpoint_port")).unwrap().is_empty());
    assert!(registry.readers(&key("AgentDB/secret_arn")).unwrap().is_empty());
}

#[test]
fn test_unscoped_parameter_read_covers_plain_attributes_only() {
    let (mut builder, func) = populated_builder();
    builder
        .grant(&func, &ResourceId::new("AgentDB"), Capability::ReadParameter)
        .unwrap();

    let registry = builder.registry();
    assert!(registry.readers(&key("AgentDB/endpoint_port")).unwrap().contains(&func));
    assert!(registry.readers(&key("AgentDB/database_name")).unwrap().contains(&func));
    assert!(registry.readers(&key("AgentDB/secret_arn")).unwrap().is_empty());
}

#[test]
fn test_secret_parameter_read_goes_through_read_secret() {
    let (mut builder, func) = populated_builder();
    let edge = builder
        .grant_parameter_read(&key("AgentDB/secret_arn"), &func)
        .unwrap();

    assert_eq!(edge.capability, Capability::ReadSecret);
    assert_eq!(edge.scope, GrantScope::All);
    assert!(edge
        .statement
        .actions
        .contains(&"secretsmanager:GetSecretValue".to_string()));
}

#[test]
fn test_managed_policy_attaches_to_own_role() {
    let (mut builder, func) = populated_builder();
    let edge = builder
        .attach_managed_policy(&func, "AmazonBedrockFullAccess")
        .unwrap();

    assert_eq!(edge.target, func);
    assert_eq!(
        edge.scope,
        GrantScope::ManagedPolicy("AmazonBedrockFullAccess".to_string())
    );
}

#[test]
fn test_open_ingress_is_flagged_low_trust() {
    let (mut builder, func) = populated_builder();
    let db = ResourceId::new("AgentDB");
    builder.allow_ingress_from(&func, &db, None).unwrap();
    builder.allow_ingress_from_any_ipv4(&db, None).unwrap();

    let graph = builder.close().unwrap();
    let low_trust: Vec<_> = graph.low_trust_grants().collect();
    assert_eq!(low_trust.len(), 1);
    assert_eq!(low_trust[0].scope, GrantScope::Port(5432));
    assert_eq!(low_trust[0].subject.to_string(), "0.0.0.0/0");
}
