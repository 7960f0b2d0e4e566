// SPDX-License-Identifier: MIT

//! Expression resolution for node configuration
//!
//! Templates are plain strings with zero or more `{{ path }}` markers:
//! - `{{ steps.fetch.output.body }}` - output of an executed node
//! - `{{ input.items[0] }}` - the node's raw input
//! - `{{ variables.total }}` - run variables
//! - `{{ config.url }}` - the node's own configuration

mod path;
mod template;

pub use path::{parse_path, traverse, Segment};
pub use template::{referenced_paths, resolve, resolve_map, resolve_value, Scope};
