// SPDX-License-Identifier: MIT

//! Flow graph validation and ordering
//!
//! `scheduler` computes the topological order; `plan` binds each node to
//! its executor and checks branch labels so a run never starts on a
//! malformed graph.

mod plan;
pub mod scheduler;

pub use plan::{CompiledNode, ExecutionPlan};
pub use scheduler::{order, valid_edges};
