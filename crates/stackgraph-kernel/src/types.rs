//! Resource model
//!
//! A [`Resource`] is a declared infrastructure entity. Its kind is the tag of
//! its [`ResourceConfig`] variant, so type-specific validation is a `match`
//! on the config rather than a class hierarchy.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Caller-chosen resource identifier (e.g. `AgentDB`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Create an id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Resource kinds known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Network,
    RelationalStore,
    DocumentTable,
    ObjectStore,
    ComputeFunction,
    IdentityLayer,
    ApiLayer,
    Parameter,
}

impl ResourceKind {
    /// Every attribute a resource of this kind can expose
    #[must_use]
    pub fn attributes(self) -> &'static [Attribute] {
        use Attribute::*;
        match self {
            ResourceKind::Network => &[VpcId],
            ResourceKind::RelationalStore => {
                &[EndpointAddress, EndpointPort, DatabaseName, SecretArn]
            }
            ResourceKind::DocumentTable => &[TableName, TableArn],
            ResourceKind::ObjectStore => &[BucketName, BucketArn],
            ResourceKind::ComputeFunction => &[FunctionName, FunctionArn, RoleArn],
            ResourceKind::IdentityLayer => &[UserPoolId, UserPoolClientId],
            ResourceKind::ApiLayer => &[Url, RestApiId],
            ResourceKind::Parameter => &[ParameterName, Value],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Identifying attributes a resource exposes once provisioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    VpcId,
    EndpointAddress,
    EndpointPort,
    DatabaseName,
    SecretArn,
    TableName,
    TableArn,
    BucketName,
    BucketArn,
    FunctionName,
    FunctionArn,
    RoleArn,
    UserPoolId,
    UserPoolClientId,
    Url,
    RestApiId,
    ParameterName,
    Value,
}

impl Attribute {
    /// Snake-case name used in parameter keys and tokens
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Attribute::VpcId => "vpc_id",
            Attribute::EndpointAddress => "endpoint_address",
            Attribute::EndpointPort => "endpoint_port",
            Attribute::DatabaseName => "database_name",
            Attribute::SecretArn => "secret_arn",
            Attribute::TableName => "table_name",
            Attribute::TableArn => "table_arn",
            Attribute::BucketName => "bucket_name",
            Attribute::BucketArn => "bucket_arn",
            Attribute::FunctionName => "function_name",
            Attribute::FunctionArn => "function_arn",
            Attribute::RoleArn => "role_arn",
            Attribute::UserPoolId => "user_pool_id",
            Attribute::UserPoolClientId => "user_pool_client_id",
            Attribute::Url => "url",
            Attribute::RestApiId => "rest_api_id",
            Attribute::ParameterName => "parameter_name",
            Attribute::Value => "value",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deferred reference to a resource attribute
///
/// The value is unknown at synthesis time; the deployment engine substitutes
/// it when it materializes the plan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeRef {
    pub resource: ResourceId,
    pub attribute: Attribute,
}

impl AttributeRef {
    /// Create a reference to `resource.attribute`
    pub fn new(resource: impl Into<ResourceId>, attribute: Attribute) -> Self {
        Self {
            resource: resource.into(),
            attribute,
        }
    }

    /// Placeholder token rendered into the plan, e.g. `${AgentDB.secret_arn}`
    #[must_use]
    pub fn token(&self) -> String {
        format!("${{{}.{}}}", self.resource, self.attribute)
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// Deferred handle on a registry parameter
///
/// Holds only the key; resolution happens at provisioning time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterRef {
    key: String,
}

impl ParameterRef {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Parameter key this handle points at
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Value stored under a parameter key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterValue {
    Literal(String),
    Attribute(AttributeRef),
}

impl ParameterValue {
    /// Literal text or the attribute's placeholder token
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            ParameterValue::Literal(value) => value.clone(),
            ParameterValue::Attribute(reference) => reference.token(),
        }
    }
}

/// What the deployment engine does with a resource on tear-down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RemovalPolicy {
    #[default]
    Destroy,
    Retain,
}

/// Subnet placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubnetKind {
    Public,
    PrivateWithEgress,
    PrivateIsolated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub max_availability_zones: u8,
    pub nat_gateways: u8,
    pub subnets: Vec<SubnetKind>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_availability_zones: 2,
            nat_gateways: 1,
            subnets: vec![
                SubnetKind::Public,
                SubnetKind::PrivateWithEgress,
                SubnetKind::PrivateIsolated,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationalStoreConfig {
    pub engine: String,
    pub engine_version: String,
    pub database_name: String,
    pub instance_class: String,
    pub allocated_storage_gb: u32,
    pub storage_encrypted: bool,
    pub publicly_accessible: bool,
    pub multi_az: bool,
    pub deletion_protection: bool,
    pub auto_minor_version_upgrade: bool,
    pub subnet: SubnetKind,
    /// Admin user for a generated credentials secret; `None` means no secret
    pub generated_secret_user: Option<String>,
    pub port: u16,
}

impl RelationalStoreConfig {
    /// Single-instance PostgreSQL with a generated admin secret
    pub fn postgres(database_name: impl Into<String>) -> Self {
        Self {
            engine: "postgres".to_string(),
            engine_version: "16.3".to_string(),
            database_name: database_name.into(),
            instance_class: "t3.micro".to_string(),
            allocated_storage_gb: 20,
            storage_encrypted: true,
            publicly_accessible: false,
            multi_az: false,
            deletion_protection: false,
            auto_minor_version_upgrade: false,
            subnet: SubnetKind::PrivateIsolated,
            generated_secret_user: Some("admin".to_string()),
            port: 5432,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    String,
    Number,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    pub key_type: KeyType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingMode {
    PayPerRequest,
    Provisioned { read_capacity: u32, write_capacity: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableClass {
    Standard,
    StandardInfrequentAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableEncryption {
    Default,
    AwsManaged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTableConfig {
    pub partition_key: KeyAttribute,
    pub billing_mode: BillingMode,
    pub table_class: TableClass,
    pub encryption: TableEncryption,
}

impl DocumentTableConfig {
    /// On-demand table keyed by a single string partition key
    pub fn keyed_by(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: KeyAttribute {
                name: partition_key.into(),
                key_type: KeyType::String,
            },
            billing_mode: BillingMode::PayPerRequest,
            table_class: TableClass::Standard,
            encryption: TableEncryption::AwsManaged,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub auto_delete_objects: bool,
    pub versioned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeFunctionConfig {
    pub runtime: String,
    pub handler: String,
    pub code_asset: String,
    pub layers: Vec<String>,
    pub description: String,
    pub timeout_secs: u32,
    pub memory_mb: u32,
    /// Environment bindings; values are parameter references, never literals
    pub environment: BTreeMap<String, ParameterRef>,
}

impl ComputeFunctionConfig {
    /// Python 3.12 function with the conventional `handler.lambda_handler` entry point
    pub fn python(code_asset: impl Into<String>) -> Self {
        Self {
            runtime: "python3.12".to_string(),
            handler: "handler.lambda_handler".to_string(),
            code_asset: code_asset.into(),
            layers: Vec::new(),
            description: String::new(),
            timeout_secs: 120,
            memory_mb: 512,
            environment: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, parameter: ParameterRef) -> Self {
        self.environment.insert(name.into(), parameter);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLayerConfig {
    pub self_sign_up: bool,
    pub sign_in_aliases: Vec<String>,
}

impl Default for IdentityLayerConfig {
    fn default() -> Self {
        Self {
            self_sign_up: false,
            sign_in_aliases: vec!["email".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRoute {
    pub method: HttpMethod,
    pub path: String,
    pub function: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiLayerConfig {
    pub stage_name: String,
    pub routes: Vec<ApiRoute>,
    pub authorizer: Option<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterConfig {
    pub key: String,
    pub value: ParameterValue,
    pub description: Option<String>,
}

/// Kind-specific configuration; the variant is the resource's kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "config")]
pub enum ResourceConfig {
    Network(NetworkConfig),
    RelationalStore(RelationalStoreConfig),
    DocumentTable(DocumentTableConfig),
    ObjectStore(ObjectStoreConfig),
    ComputeFunction(ComputeFunctionConfig),
    IdentityLayer(IdentityLayerConfig),
    ApiLayer(ApiLayerConfig),
    Parameter(ParameterConfig),
}

impl ResourceConfig {
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceConfig::Network(_) => ResourceKind::Network,
            ResourceConfig::RelationalStore(_) => ResourceKind::RelationalStore,
            ResourceConfig::DocumentTable(_) => ResourceKind::DocumentTable,
            ResourceConfig::ObjectStore(_) => ResourceKind::ObjectStore,
            ResourceConfig::ComputeFunction(_) => ResourceKind::ComputeFunction,
            ResourceConfig::IdentityLayer(_) => ResourceKind::IdentityLayer,
            ResourceConfig::ApiLayer(_) => ResourceKind::ApiLayer,
            ResourceConfig::Parameter(_) => ResourceKind::Parameter,
        }
    }

    /// Resources this config names directly, with the kind each must have
    pub(crate) fn references(&self) -> Vec<(&ResourceId, Option<ResourceKind>)> {
        match self {
            ResourceConfig::ApiLayer(api) => api
                .routes
                .iter()
                .map(|route| (&route.function, Some(ResourceKind::ComputeFunction)))
                .chain(
                    api.authorizer
                        .iter()
                        .map(|id| (id, Some(ResourceKind::IdentityLayer))),
                )
                .collect(),
            ResourceConfig::Parameter(ParameterConfig {
                value: ParameterValue::Attribute(reference),
                ..
            }) => vec![(&reference.resource, None)],
            _ => Vec::new(),
        }
    }

    /// Attribute references embedded in the config
    pub(crate) fn attribute_refs(&self) -> Vec<&AttributeRef> {
        match self {
            ResourceConfig::Parameter(ParameterConfig {
                value: ParameterValue::Attribute(reference),
                ..
            }) => vec![reference],
            _ => Vec::new(),
        }
    }

    /// Parameter references embedded in the config
    pub(crate) fn parameter_refs(&self) -> impl Iterator<Item = &ParameterRef> {
        let environment = match self {
            ResourceConfig::ComputeFunction(function) => Some(function.environment.values()),
            _ => None,
        };
        environment.into_iter().flatten()
    }
}

/// Declaration request handed to [`crate::construction::GraphBuilder::declare`]
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    pub id: ResourceId,
    pub config: ResourceConfig,
    pub depends_on: BTreeSet<ResourceId>,
    /// `None` takes the builder default
    pub removal_policy: Option<RemovalPolicy>,
}

impl ResourceSpec {
    pub fn new(id: impl Into<ResourceId>, config: ResourceConfig) -> Self {
        Self {
            id: id.into(),
            config,
            depends_on: BTreeSet::new(),
            removal_policy: None,
        }
    }

    #[must_use]
    pub fn depends_on<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ResourceId>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = Some(policy);
        self
    }
}

/// A declared resource; immutable once the builder accepts it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub(crate) id: ResourceId,
    pub(crate) config: ResourceConfig,
    pub(crate) depends_on: BTreeSet<ResourceId>,
    pub(crate) removal_policy: RemovalPolicy,
    pub(crate) ordinal: usize,
}

impl Resource {
    #[must_use]
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.config.kind()
    }

    #[must_use]
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    #[must_use]
    pub fn depends_on(&self) -> &BTreeSet<ResourceId> {
        &self.depends_on
    }

    #[must_use]
    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal_policy
    }

    /// Position in declaration order
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Whether this resource exposes `attribute`
    ///
    /// A relational store only exposes `secret_arn` when it generates a secret.
    #[must_use]
    pub fn exposes(&self, attribute: Attribute) -> bool {
        if !self.kind().attributes().contains(&attribute) {
            return false;
        }
        match (&self.config, attribute) {
            (ResourceConfig::RelationalStore(store), Attribute::SecretArn) => {
                store.generated_secret_user.is_some()
            }
            _ => true,
        }
    }

    /// Attributes this resource actually exposes
    pub fn attributes(&self) -> impl Iterator<Item = Attribute> + '_ {
        self.kind()
            .attributes()
            .iter()
            .copied()
            .filter(|attribute| self.exposes(*attribute))
    }

    /// Deferred handle on one of this resource's attributes, if exposed
    #[must_use]
    pub fn attribute(&self, attribute: Attribute) -> Option<AttributeRef> {
        self.exposes(attribute)
            .then(|| AttributeRef::new(self.id.clone(), attribute))
    }

    /// Parameter key a `Parameter` resource publishes under
    #[must_use]
    pub fn parameter_key(&self) -> Option<&str> {
        match &self.config {
            ResourceConfig::Parameter(parameter) => Some(&parameter.key),
            _ => None,
        }
    }

    /// Listening port of a relational store
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        match &self.config {
            ResourceConfig::RelationalStore(store) => Some(store.port),
            _ => None,
        }
    }

    /// Environment bindings of a compute function
    #[must_use]
    pub fn environment(&self) -> Option<&BTreeMap<String, ParameterRef>> {
        match &self.config {
            ResourceConfig::ComputeFunction(function) => Some(&function.environment),
            _ => None,
        }
    }
}
