// SPDX-License-Identifier: MIT

//! Run state management
//!
//! This module provides:
//! - `RunStatus` - the run lifecycle state machine
//! - `RunState` - steps, variables and cursor of one run, with reducer support
//! - `RunStore` - the persistence seam for run records

mod run;
mod store;

pub use run::{RunFailure, RunState, RunStatus};
pub use store::{InMemoryRunStore, RunRecord, RunStore};
