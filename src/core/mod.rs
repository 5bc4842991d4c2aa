//! Core domain models
//!
//! This module defines the data structures that represent pipelines,
//! their triggers, jobs and steps, and the configuration they are loaded from.

pub mod config;
pub mod context;
pub mod job;
pub mod pipeline;
pub mod state;
pub mod step;
pub mod trigger;

pub use context::*;
pub use job::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
pub use trigger::*;
