//! Artifact tasks, TOML pipeline definitions and renderers built on
//! `artiflow-core`.

pub mod artifact;
pub mod definition;
pub mod executor;
pub mod factory;
pub mod tasks;

pub use artifact::{Artifact, ArtifactBundle};
pub use definition::PipelineDefinition;
