//! Construction Phase
//!
//! Everything that can fail happens here. Resources are declared, parameters
//! published and grants issued against a mutable [`GraphBuilder`]; `close()`
//! re-validates the whole graph and seals it.
//!
//! # Two-Phase Architecture
//!
//! 1. **Construction Phase** (this module):
//!    - Declare resources in dependency order
//!    - Auto-publish attributes into the parameter registry
//!    - Issue least-privilege grant edges
//!    - Produce a sealed `Graph`
//!
//! 2. **Post-close** (`graph` module):
//!    - Publish named outputs
//!    - Render the plan for the deployment engine
//!    - No further declarations

pub mod builder;
pub mod validator;

pub use builder::{BuilderOptions, GraphBuilder, DEFAULT_NAMESPACE};
pub use validator::{ConstructionValidator, ValidationReport};
