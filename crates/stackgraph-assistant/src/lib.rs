//! Serverless LLM assistant on top of the stackgraph kernel
//!
//! [`synthesize`] composes the assistant's backend (database, chat history,
//! data bucket, three functions, identity and API layers) from a
//! [`SynthesisConfig`] and returns the closed graph.

pub mod config;
pub mod error;
pub mod manifest;
pub mod topology;

pub use config::{ConfigError, IngressMode, SynthesisConfig};
pub use error::AssistantError;
pub use manifest::StackManifest;
pub use topology::synthesize;
