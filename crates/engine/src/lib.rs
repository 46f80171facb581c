//! Pathwise progression engine.
//!
//! Ties the graph rules in `pathwise-progress` to a storage backend and
//! serializes writes per learner instance.

#![warn(missing_docs)]

mod config;
mod error;
mod generator;
mod locks;
mod service;

pub use config::ServiceConfig;
pub use error::{ProgressError, Result};
pub use generator::{parse_generated_graph, GenerateRequest, GeneratorError, GraphGenerator};
pub use locks::InstanceLocks;
pub use service::{
    AdvanceRequest, BasicProgressionService, Customization, ListQuery, Page, ProgressionService,
};
