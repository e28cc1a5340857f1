//! Everything that describes a node before it runs.

pub mod descriptor;
pub mod function;
pub mod introspect;
pub mod signature;
pub mod types;
