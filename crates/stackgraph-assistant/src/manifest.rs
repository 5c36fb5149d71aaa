//! Plan document handed to the deployment engine

use crate::config::SynthesisConfig;
use serde::Serialize;
use stackgraph_kernel::graph::Graph;
use stackgraph_kernel::types::ResourceId;

#[derive(Debug, Serialize)]
pub struct StackManifest<'a> {
    pub stack_name: &'a str,
    pub description: &'a str,
    pub region: &'a str,
    pub account: Option<&'a str>,
    pub deployment_waves: Vec<Vec<&'a ResourceId>>,
    pub plan: &'a Graph,
}

impl<'a> StackManifest<'a> {
    #[must_use]
    pub fn new(config: &'a SynthesisConfig, graph: &'a Graph) -> Self {
        Self {
            stack_name: &config.stack_name,
            description: &config.description,
            region: &config.region,
            account: config.account.as_deref(),
            deployment_waves: graph.deployment_waves(),
            plan: graph,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
