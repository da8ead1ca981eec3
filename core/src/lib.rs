//! Orchestration engine for multi-stage artifact pipelines.
//!
//! - [`retry`]: bounded retry with backoff around a single task call.
//! - [`state`]: the progress store external clients poll.
//! - [`executor`]: runs one stage, single task or fan-out/fan-in.
//! - [`orchestrator`]: drives the ordered stages of a session.

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod retry;
pub mod state;
