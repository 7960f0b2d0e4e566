// SPDX-License-Identifier: MIT

//! External-event correlation
//!
//! A paused node leaves a `WaitDescriptor` in the `WaitIndex`. Direct waits
//! are resumed by id; event waits are resumed when an `InboundEvent` with the
//! same name carries every criterion of the wait in its data.

mod descriptor;
mod index;

pub use descriptor::{InboundEvent, WaitDescriptor, WaitStatus};
pub use index::WaitIndex;
