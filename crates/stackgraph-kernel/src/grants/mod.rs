//! Least-privilege grants
//!
//! Every access a compute function has is an explicit [`GrantEdge`] it
//! requested. The capability table decides which kinds a capability may
//! target; the template table renders the underlying permission statement.

mod capability;
mod engine;

pub use capability::{Capability, GrantScope, PermissionStatement, Principal};
pub use engine::{GrantEdge, GrantEngine, GrantKey};
