//! Synthesis configuration
//!
//! Loaded from TOML; every field has a default so an empty file (or no file)
//! yields the stock assistant deployment.

use serde::{Deserialize, Serialize};
use stackgraph_kernel::construction::{BuilderOptions, DEFAULT_NAMESPACE};
use stackgraph_kernel::types::RemovalPolicy;
use std::path::Path;

/// Errors raised while loading or validating a [`SynthesisConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// How the relational store accepts connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressMode {
    /// Any IPv4 source on the database port; recorded as a low-trust edge
    #[default]
    OpenForDevelopment,
    /// Only the declared compute functions
    Restricted,
}

/// Settings for one synthesis run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Region the model endpoint is invoked in
    pub region: String,
    /// Model identifier published for the functions
    pub model_identifier: String,
    /// Applied to resources without an explicit override
    pub removal_policy_default: RemovalPolicy,
    pub network_ingress_mode: IngressMode,
    /// Parameter key prefix
    pub namespace: String,
    pub stack_name: String,
    /// Target account; `None` keeps the plan environment-agnostic
    pub account: Option<String>,
    pub description: String,
    /// Shared dependency layer attached to every function
    pub layer_arn: Option<String>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            model_identifier: "anthropic.claude-3-haiku-20240307-v1:0".to_string(),
            removal_policy_default: RemovalPolicy::Destroy,
            network_ingress_mode: IngressMode::OpenForDevelopment,
            namespace: DEFAULT_NAMESPACE.to_string(),
            stack_name: "ServerlessLlmAssistantStack".to_string(),
            account: None,
            description: "AWS Agentic documents assistant".to_string(),
            layer_arn: None,
        }
    }
}

impl SynthesisConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config loaded");
        Self::from_toml_str(&source)
    }

    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    #[must_use]
    pub fn with_model_identifier(mut self, model: impl Into<String>) -> Self {
        self.model_identifier = model.into();
        self
    }

    #[must_use]
    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy_default = policy;
        self
    }

    #[must_use]
    pub fn with_ingress_mode(mut self, mode: IngressMode) -> Self {
        self.network_ingress_mode = mode;
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_layer_arn(mut self, layer_arn: impl Into<String>) -> Self {
        self.layer_arn = Some(layer_arn.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.namespace.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "namespace",
                reason: format!("`{}` must start with `/`", self.namespace),
            });
        }
        if self.namespace.ends_with('/') {
            return Err(ConfigError::Invalid {
                field: "namespace",
                reason: format!("`{}` must not end with `/`", self.namespace),
            });
        }
        if self.region.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "region",
                reason: "must not be empty".to_string(),
            });
        }
        if self.model_identifier.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "model_identifier",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Options handed to the graph builder
    #[must_use]
    pub fn builder_options(&self) -> BuilderOptions {
        BuilderOptions {
            namespace: self.namespace.clone(),
            removal_policy_default: self.removal_policy_default,
        }
    }
}
