//! Testing utilities for stackgraph workspace
//!
//! Shared fixtures for building small resource graphs.

#![allow(missing_docs)]

use stackgraph_kernel::construction::{BuilderOptions, GraphBuilder};
use stackgraph_kernel::types::{
    Attribute, AttributeRef, ComputeFunctionConfig, DocumentTableConfig, ObjectStoreConfig,
    ParameterConfig, ParameterValue, RelationalStoreConfig, RemovalPolicy, ResourceConfig,
    ResourceId, ResourceSpec,
};

pub const TEST_NAMESPACE: &str = "/test";

pub fn test_options() -> BuilderOptions {
    BuilderOptions {
        namespace: TEST_NAMESPACE.to_string(),
        removal_policy_default: RemovalPolicy::Destroy,
    }
}

pub fn test_builder() -> GraphBuilder {
    GraphBuilder::new(test_options())
}

pub fn key(leaf: &str) -> String {
    format!("{TEST_NAMESPACE}/{leaf}")
}

pub fn store_spec(id: &str) -> ResourceSpec {
    ResourceSpec::new(
        id,
        ResourceConfig::RelationalStore(RelationalStoreConfig::postgres("testdb")),
    )
}

pub fn table_spec(id: &str) -> ResourceSpec {
    ResourceSpec::new(
        id,
        ResourceConfig::DocumentTable(DocumentTableConfig::keyed_by("SessionId")),
    )
}

pub fn bucket_spec(id: &str) -> ResourceSpec {
    ResourceSpec::new(id, ResourceConfig::ObjectStore(ObjectStoreConfig::default()))
}

pub fn function_spec(id: &str) -> ResourceSpec {
    ResourceSpec::new(
        id,
        ResourceConfig::ComputeFunction(ComputeFunctionConfig::python(id.to_lowercase())),
    )
}

pub fn literal_parameter_spec(id: &str, leaf: &str, value: &str) -> ResourceSpec {
    ResourceSpec::new(
        id,
        ResourceConfig::Parameter(ParameterConfig {
            key: key(leaf),
            value: ParameterValue::Literal(value.to_string()),
            description: None,
        }),
    )
}

/// Parameter holding `source.attribute`; `source` is listed as a dependency
pub fn attribute_parameter_spec(
    id: &str,
    leaf: &str,
    source: &str,
    attribute: Attribute,
) -> ResourceSpec {
    ResourceSpec::new(
        id,
        ResourceConfig::Parameter(ParameterConfig {
            key: key(leaf),
            value: ParameterValue::Attribute(AttributeRef::new(source, attribute)),
            description: None,
        }),
    )
    .depends_on([source])
}

/// Builder with `AgentDB`, `History`, `Bucket`, a `Region` parameter and a
/// function `Fn` depending on all of them; no grants issued
pub fn populated_builder() -> (GraphBuilder, ResourceId) {
    let mut builder = test_builder();
    let db = builder.declare(store_spec("AgentDB")).unwrap();
    let table = builder.declare(table_spec("History")).unwrap();
    let bucket = builder.declare(bucket_spec("Bucket")).unwrap();
    let region = builder
        .declare(literal_parameter_spec("Region", "bedrock_region", "us-east-1"))
        .unwrap();
    let func = builder
        .declare(function_spec("Fn").depends_on([db, table, bucket, region]))
        .unwrap();
    (builder, func)
}
