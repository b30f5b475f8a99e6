//! CLI command implementations.

pub mod edit;
pub mod nuke;
pub mod show;
