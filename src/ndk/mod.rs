// SPDX-License-Identifier: MIT

//! Node development kit
//!
//! The contracts a node author codes against:
//! - [executor] - the `NodeExecutor` trait and the `RunContext` it receives
//! - [result] - node results and orchestrator directives (goto, waits, variables)
//! - [expression] - `{{ path }}` template resolution
//! - [error] - the engine error taxonomy

pub mod error;
pub mod executor;
pub mod expression;
pub mod result;
pub mod value;

pub use error::{EngineError, GraphError, ResolveError};
pub use executor::{NodeExecutor, NodeKind, RunContext};
pub use result::{NodeResult, NodeStatus, ReducerType, VariableUpdate, WaitCondition, GOTO_KEY};
