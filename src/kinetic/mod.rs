// SPDX-License-Identifier: MIT

pub mod config;
pub mod nodes;
pub mod server;
pub mod workflow;
