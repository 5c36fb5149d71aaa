//! stackgraph kernel
//!
//! Synthesizes a serverless backend as a typed resource graph with explicit,
//! least-privilege grant edges:
//! 1. **Construction**: declare resources, publish parameters, issue grants
//! 2. **Closed graph**: publish outputs, render the plan
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use stackgraph_kernel::prelude::*;
//!
//! let mut builder = GraphBuilder::new(BuilderOptions::default());
//! let db = builder.declare(ResourceSpec::new("AgentDB", store_config))?;
//! let func = builder.declare(ResourceSpec::new("Fn", fn_config).depends_on([db.clone()]))?;
//! builder.grant(&func, &db, Capability::ReadSecret)?;
//!
//! let mut graph = builder.close()?;
//! graph.publish_output("DbAddress", &db, Attribute::EndpointAddress)?;
//! println!("{}", graph.to_json()?);
//! ```

pub mod construction;
pub mod dag;
pub mod error;
pub mod grants;
pub mod graph;
pub mod outputs;
pub mod registry;
pub mod types;

pub use error::*;
pub use types::*;

pub mod prelude {
    pub use crate::construction::{
        BuilderOptions, ConstructionValidator, GraphBuilder, ValidationReport, DEFAULT_NAMESPACE,
    };
    pub use crate::error::{
        GrantError, GraphError, OutputError, RegistryError, SynthesisError, ValidationError,
    };
    pub use crate::grants::{Capability, GrantEdge, GrantScope, PermissionStatement, Principal};
    pub use crate::graph::Graph;
    pub use crate::outputs::Output;
    pub use crate::registry::{Parameter, ParameterRegistry};
    pub use crate::types::{
        ApiLayerConfig, ApiRoute, Attribute, AttributeRef, ComputeFunctionConfig,
        DocumentTableConfig, HttpMethod, IdentityLayerConfig, NetworkConfig, ObjectStoreConfig,
        ParameterConfig, ParameterRef, ParameterValue, RelationalStoreConfig, RemovalPolicy,
        Resource, ResourceConfig, ResourceId, ResourceKind, ResourceSpec,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
