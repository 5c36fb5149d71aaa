//! The serverless LLM assistant topology
//!
//! One pass, in dependency order: network, configuration parameters, the
//! agent database and chat history table, the data bucket, three functions
//! and their grants, the identity and API layers, then outputs.

use crate::config::{IngressMode, SynthesisConfig};
use crate::error::AssistantError;
use stackgraph_kernel::construction::GraphBuilder;
use stackgraph_kernel::error::SynthesisError;
use stackgraph_kernel::grants::Capability;
use stackgraph_kernel::graph::Graph;
use stackgraph_kernel::types::{
    ApiLayerConfig, ApiRoute, Attribute, AttributeRef, ComputeFunctionConfig, DocumentTableConfig,
    HttpMethod, IdentityLayerConfig, NetworkConfig, ObjectStoreConfig, ParameterConfig,
    ParameterValue, RelationalStoreConfig, ResourceConfig, ResourceId, ResourceSpec, SubnetKind,
};

pub const AGENT_DB_NAME: &str = "AgentSQLDBandVectorStore";
pub const AGENT_DB_ADMIN: &str = "AgentDBAdmin";
pub const BEDROCK_POLICY: &str = "AmazonBedrockFullAccess";

/// Resource ids of the assistant topology
pub mod ids {
    pub const VPC: &str = "Vpc";
    pub const BEDROCK_REGION: &str = "BedrockRegionParameter";
    pub const LLM_MODEL_ID: &str = "LlmModelIdParameter";
    pub const AGENT_DB: &str = "AgentDB";
    pub const CHAT_HISTORY_TABLE: &str = "ChatHistoryTable";
    pub const DB_SECRET_ARN: &str = "DBSecretARNParameter";
    pub const AGENT_DATA_BUCKET: &str = "AgentDataBucket";
    pub const AGENT_DATA_BUCKET_PARAMETER: &str = "AgentDataBucketParameter";
    pub const AGENT_EXECUTOR: &str = "LambdaAgentHandler";
    pub const AGENT_API_FUNCTION: &str = "LambdaAgentAPI";
    pub const AGENT_GET_FUNCTION: &str = "LambdaAgentGetAPI";
    pub const AGENT_EXECUTOR_NAME_PARAMETER: &str = "AgentExecutorLambdaNameParameter";
    pub const COGNITO: &str = "Cognito";
    pub const AGENT_API: &str = "AgentApi";
    pub const COGNITO_USER_POOL_ID: &str = "CognitoUserPoolIdParameter";
    pub const COGNITO_USER_POOL_CLIENT_ID: &str = "CognitoUserPoolClientIdParameter";
    pub const AGENT_API_PARAMETER: &str = "AgentApiParameter";
}

/// Function declared by the topology
struct FunctionSpec {
    id: &'static str,
    code_asset: &'static str,
    description: &'static str,
    memory_mb: u32,
}

const FUNCTIONS: [FunctionSpec; 3] = [
    FunctionSpec {
        id: ids::AGENT_EXECUTOR,
        code_asset: "agent-executor-single",
        description: "Lambda function with Bedrock access created via CDK",
        memory_mb: 1024,
    },
    FunctionSpec {
        id: ids::AGENT_API_FUNCTION,
        code_asset: "agent-executor-api",
        description: "Lambda function for update data",
        memory_mb: 512,
    },
    FunctionSpec {
        id: ids::AGENT_GET_FUNCTION,
        code_asset: "agent-executor-get",
        description: "Lambda function for get data from database API",
        memory_mb: 512,
    },
];

/// Build and close the assistant graph, then publish its outputs
///
/// The configuration is validated first. Any error aborts the whole run; no
/// partial graph is returned.
pub fn synthesize(config: &SynthesisConfig) -> Result<Graph, AssistantError> {
    config.validate()?;
    Ok(compose(config)?)
}

fn compose(config: &SynthesisConfig) -> Result<Graph, SynthesisError> {
    tracing::info!(
        stack = %config.stack_name,
        region = %config.region,
        model = %config.model_identifier,
        ingress = ?config.network_ingress_mode,
        "synthesizing assistant topology"
    );

    let mut builder = GraphBuilder::new(config.builder_options());

    let vpc = builder.declare(ResourceSpec::new(
        ids::VPC,
        ResourceConfig::Network(NetworkConfig::default()),
    ))?;

    let region = declare_parameter(
        &mut builder,
        ids::BEDROCK_REGION,
        "bedrock_region",
        ParameterValue::Literal(config.region.clone()),
        "Region used to set up the Bedrock client",
    )?;
    let model = declare_parameter(
        &mut builder,
        ids::LLM_MODEL_ID,
        "llm_model_id",
        ParameterValue::Literal(config.model_identifier.clone()),
        "Model identifier the agent invokes",
    )?;

    let db = declare_agent_db(&mut builder, &vpc)?;
    let table = builder.declare(ResourceSpec::new(
        ids::CHAT_HISTORY_TABLE,
        ResourceConfig::DocumentTable(DocumentTableConfig::keyed_by("SessionId")),
    ))?;

    let db_secret = declare_parameter(
        &mut builder,
        ids::DB_SECRET_ARN,
        "DBSecretARN",
        ParameterValue::Attribute(AttributeRef::new(db.clone(), Attribute::SecretArn)),
        "Secret ARN of the agent database",
    )?;

    let bucket = builder.declare(ResourceSpec::new(
        ids::AGENT_DATA_BUCKET,
        ResourceConfig::ObjectStore(ObjectStoreConfig {
            auto_delete_objects: true,
            versioned: false,
        }),
    ))?;
    let bucket_parameter = declare_parameter(
        &mut builder,
        ids::AGENT_DATA_BUCKET_PARAMETER,
        "AgentDataBucketParameter",
        ParameterValue::Attribute(AttributeRef::new(bucket.clone(), Attribute::BucketName)),
        "Bucket for intermediate data staging",
    )?;

    let mut functions = Vec::with_capacity(FUNCTIONS.len());
    for spec in &FUNCTIONS {
        let dependencies = [
            &region,
            &model,
            &db,
            &table,
            &db_secret,
            &bucket,
            &bucket_parameter,
        ];
        let function = declare_function(&mut builder, config, spec, &dependencies)?;

        builder.grant(&function, &db, Capability::ReadSecret)?;
        for parameter in [&region, &model, &db_secret] {
            builder.grant(&function, parameter, Capability::ReadParameter)?;
        }
        builder.grant(&function, &table, Capability::ReadWriteTable)?;
        builder.attach_managed_policy(&function, BEDROCK_POLICY)?;
        builder.grant(&function, &bucket_parameter, Capability::ReadParameter)?;

        functions.push(function);
    }
    let executor = ResourceId::new(ids::AGENT_EXECUTOR);
    let api_function = ResourceId::new(ids::AGENT_API_FUNCTION);
    let get_function = ResourceId::new(ids::AGENT_GET_FUNCTION);

    builder.grant(&executor, &bucket_parameter, Capability::WriteParameter)?;
    builder.grant(&api_function, &bucket, Capability::ReadWriteObjectStore)?;

    match config.network_ingress_mode {
        IngressMode::OpenForDevelopment => {
            builder.allow_ingress_from_any_ipv4(&db, None)?;
        }
        IngressMode::Restricted => {
            for function in &functions {
                builder.allow_ingress_from(function, &db, None)?;
            }
        }
    }

    declare_parameter(
        &mut builder,
        ids::AGENT_EXECUTOR_NAME_PARAMETER,
        "AgentExecutorLambdaNameParameter",
        ParameterValue::Attribute(AttributeRef::new(executor.clone(), Attribute::FunctionName)),
        "Agent executor function name",
    )?;

    let cognito = builder.declare(ResourceSpec::new(
        ids::COGNITO,
        ResourceConfig::IdentityLayer(IdentityLayerConfig::default()),
    ))?;
    let api = builder.declare(
        ResourceSpec::new(
            ids::AGENT_API,
            ResourceConfig::ApiLayer(ApiLayerConfig {
                stage_name: "prod".to_string(),
                routes: vec![
                    route(HttpMethod::Post, "/", &executor),
                    route(HttpMethod::Post, "/api", &api_function),
                    route(HttpMethod::Get, "/get", &get_function),
                ],
                authorizer: Some(cognito.clone()),
            }),
        )
        .depends_on(functions.iter().cloned().chain([cognito.clone()])),
    )?;

    declare_parameter(
        &mut builder,
        ids::COGNITO_USER_POOL_ID,
        "cognito_user_pool_id",
        ParameterValue::Attribute(AttributeRef::new(cognito.clone(), Attribute::UserPoolId)),
        "User pool id for the chat frontend",
    )?;
    declare_parameter(
        &mut builder,
        ids::COGNITO_USER_POOL_CLIENT_ID,
        "cognito_user_pool_client_id",
        ParameterValue::Attribute(AttributeRef::new(cognito.clone(), Attribute::UserPoolClientId)),
        "User pool client id for the chat frontend",
    )?;
    declare_parameter(
        &mut builder,
        ids::AGENT_API_PARAMETER,
        "agent_api",
        ParameterValue::Attribute(AttributeRef::new(api.clone(), Attribute::Url)),
        "Endpoint of the agent API",
    )?;

    let mut graph = builder.close()?;

    graph.publish_described_output("AgentApiUrl", &api, Attribute::Url, "Agent API endpoint")?;
    graph.publish_described_output(
        "UserPoolId",
        &cognito,
        Attribute::UserPoolId,
        "Cognito user pool id",
    )?;
    graph.publish_described_output(
        "UserPoolClientId",
        &cognito,
        Attribute::UserPoolClientId,
        "Cognito user pool client id",
    )?;

    tracing::info!(
        digest = %graph.digest(),
        resources = graph.len(),
        outputs = graph.outputs().len(),
        "assistant topology synthesized"
    );
    Ok(graph)
}

fn declare_agent_db(
    builder: &mut GraphBuilder,
    vpc: &ResourceId,
) -> Result<ResourceId, SynthesisError> {
    let mut store = RelationalStoreConfig::postgres(AGENT_DB_NAME);
    store.generated_secret_user = Some(AGENT_DB_ADMIN.to_string());
    store.subnet = SubnetKind::Public;
    store.publicly_accessible = true;

    Ok(builder.declare(
        ResourceSpec::new(ids::AGENT_DB, ResourceConfig::RelationalStore(store))
            .depends_on([vpc.clone()]),
    )?)
}

/// Declare a standalone parameter under `<namespace>/<leaf>`
///
/// Attribute values list their source resource as a dependency.
fn declare_parameter(
    builder: &mut GraphBuilder,
    id: &str,
    leaf: &str,
    value: ParameterValue,
    description: &str,
) -> Result<ResourceId, SynthesisError> {
    let source = match &value {
        ParameterValue::Attribute(reference) => Some(reference.resource.clone()),
        ParameterValue::Literal(_) => None,
    };
    let spec = ResourceSpec::new(
        id,
        ResourceConfig::Parameter(ParameterConfig {
            key: builder.key(leaf),
            value,
            description: Some(description.to_string()),
        }),
    )
    .depends_on(source);

    Ok(builder.declare(spec)?)
}

fn declare_function(
    builder: &mut GraphBuilder,
    config: &SynthesisConfig,
    spec: &FunctionSpec,
    dependencies: &[&ResourceId],
) -> Result<ResourceId, SynthesisError> {
    let region = builder.reference(&builder.key("bedrock_region"))?;
    let model = builder.reference(&builder.key("llm_model_id"))?;
    let table = ResourceId::new(ids::CHAT_HISTORY_TABLE);
    let table_name = builder.attribute_parameter(&table, Attribute::TableName)?;
    let db = ResourceId::new(ids::AGENT_DB);
    let secret = builder.attribute_parameter(&db, Attribute::SecretArn)?;

    let mut function = ComputeFunctionConfig::python(spec.code_asset)
        .with_env("BEDROCK_REGION_PARAMETER", region)
        .with_env("LLM_MODEL_ID_PARAMETER", model)
        .with_env("CHAT_MESSAGE_HISTORY_TABLE", table_name)
        .with_env("AGENT_DB_SECRET_ID", secret);
    function.description = spec.description.to_string();
    function.memory_mb = spec.memory_mb;
    function.layers.extend(config.layer_arn.iter().cloned());

    Ok(builder.declare(
        ResourceSpec::new(spec.id, ResourceConfig::ComputeFunction(function))
            .depends_on(dependencies.iter().map(|id| (*id).clone())),
    )?)
}

fn route(method: HttpMethod, path: &str, function: &ResourceId) -> ApiRoute {
    ApiRoute {
        method,
        path: path.to_string(),
        function: function.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_table_matches_routes() {
        let declared: Vec<&str> = FUNCTIONS.iter().map(|spec| spec.id).collect();
        assert_eq!(
            declared,
            vec![ids::AGENT_EXECUTOR, ids::AGENT_API_FUNCTION, ids::AGENT_GET_FUNCTION]
        );
        assert_eq!(FUNCTIONS[0].memory_mb, 1024);
    }

    #[test]
    fn test_parameter_lists_attribute_source() {
        let mut builder = GraphBuilder::default();
        let table = builder
            .declare(ResourceSpec::new(
                ids::CHAT_HISTORY_TABLE,
                ResourceConfig::DocumentTable(DocumentTableConfig::keyed_by("SessionId")),
            ))
            .unwrap();

        let id = declare_parameter(
            &mut builder,
            "TableNameParameter",
            "table",
            ParameterValue::Attribute(AttributeRef::new(table.clone(), Attribute::TableName)),
            "table",
        )
        .unwrap();
        assert!(builder.resource(&id).unwrap().depends_on().contains(&table));
    }
}
