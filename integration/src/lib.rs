//! Test harness for the SimpleStorage workspace: an in-process fake node and
//! config builders shared by the integration tests.

pub mod fake_node;
pub mod harness;
