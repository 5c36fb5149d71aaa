//! Errors surfaced by [`synthesize`](crate::synthesize)

use crate::config::ConfigError;
use stackgraph_kernel::error::SynthesisError;

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Configuration rejected before any resource was declared
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}
