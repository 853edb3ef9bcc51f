//! Docker Machine CRD Definitions
//!
//! Kubernetes Custom Resource Definition for the machine controller, plus the
//! pure pieces of its state machine: the condition ledger, the phase deriver
//! and the annotation-backed provisioning progress record.

pub mod conditions;
pub mod machine;
pub mod phase;
pub mod progress;

pub use conditions::*;
pub use machine::*;
pub use phase::*;
pub use progress::*;
