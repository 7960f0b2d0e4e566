// SPDX-License-Identifier: MIT

//! Graph execution engine
//!
//! Flow definitions are validated into an execution plan, driven node by
//! node by the orchestrator and suspended behind wait descriptors until an
//! external signal resumes them.

pub mod condition;
pub mod correlation;
pub mod engine;
pub mod graph;
pub mod loader;
pub mod orchestrator;
pub mod registry;
pub mod state;
pub mod substrate;
pub mod types;

pub use engine::Engine;
