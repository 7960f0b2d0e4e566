// SPDX-License-Identifier: MIT

//! `{{ path }}` template resolution against run state

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::path::{parse_path, traverse, Segment};
use crate::ndk::error::ResolveError;
use crate::ndk::result::NodeResult;
use crate::ndk::value::value_to_text;

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("marker pattern is valid")
});

/// Keys of a step entry. After `steps.<id>` they are read from the entry
/// only when the node's output has no key of the same name.
const STEP_FIELDS: [&str; 3] = ["status", "output", "error"];

/// Read-only view of run state that templates resolve against
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub steps: &'a HashMap<String, NodeResult>,
    pub input: &'a Value,
    pub config: &'a Map<String, Value>,
    pub variables: &'a Map<String, Value>,
}

impl<'a> Scope<'a> {
    /// Look up a dot path rooted at `steps`, `input`, `config` or `variables`
    pub fn lookup(&self, path: &str) -> Result<Value, ResolveError> {
        let segments = parse_path(path)?;
        let not_found = || ResolveError::PathNotFound {
            path: path.to_string(),
        };

        let (root, rest) = match segments.split_first() {
            Some((Segment::Key(root), rest)) => (root.as_str(), rest),
            _ => return Err(not_found()),
        };

        match root {
            "input" => traverse(self.input, rest, path).cloned(),
            "config" => lookup_in_map(self.config, rest, path),
            "variables" => lookup_in_map(self.variables, rest, path),
            "steps" => {
                let (node_id, rest) = match rest.split_first() {
                    Some((Segment::Key(id), rest)) => (id, rest),
                    _ => return Err(not_found()),
                };
                let result = self.steps.get(node_id).ok_or_else(not_found)?;
                let entry = result.to_value();
                match rest.first() {
                    Some(Segment::Key(key))
                        if result.output.contains_key(key)
                            || !STEP_FIELDS.contains(&key.as_str()) =>
                    {
                        traverse(&entry["output"], rest, path).cloned()
                    }
                    _ => traverse(&entry, rest, path).cloned(),
                }
            }
            _ => Err(not_found()),
        }
    }
}

fn lookup_in_map(
    map: &Map<String, Value>,
    segments: &[Segment],
    path: &str,
) -> Result<Value, ResolveError> {
    match segments.split_first() {
        None => Ok(Value::Object(map.clone())),
        Some((Segment::Key(key), rest)) => {
            let value = map.get(key).ok_or_else(|| ResolveError::PathNotFound {
                path: path.to_string(),
            })?;
            traverse(value, rest, path).cloned()
        }
        Some((Segment::Index(_), _)) => Err(ResolveError::PathNotFound {
            path: path.to_string(),
        }),
    }
}

/// Resolve every `{{ path }}` marker in `template`.
///
/// A template that is exactly one marker yields the referenced value with
/// its type intact; otherwise markers are interpolated as text.
pub fn resolve(template: &str, scope: &Scope<'_>) -> Result<Value, ResolveError> {
    if !template.contains("{{") {
        return Ok(Value::String(template.to_string()));
    }

    let trimmed = template.trim();
    if let Some(caps) = MARKER.captures(trimmed) {
        if caps.get(0).is_some_and(|m| m.as_str().len() == trimmed.len()) {
            return scope.lookup(&caps[1]);
        }
    }

    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for caps in MARKER.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(&value_to_text(&scope.lookup(&caps[1])?));
        last = whole.end();
    }
    rendered.push_str(&template[last..]);

    Ok(Value::String(rendered))
}

/// Resolve templates inside any value, recursing through arrays and objects
pub fn resolve_value(value: &Value, scope: &Scope<'_>) -> Result<Value, ResolveError> {
    match value {
        Value::String(s) if s.contains("{{") => resolve(s, scope),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => resolve_map(map, scope).map(Value::Object),
        other => Ok(other.clone()),
    }
}

/// Resolve a node config mapping
pub fn resolve_map(
    map: &Map<String, Value>,
    scope: &Scope<'_>,
) -> Result<Map<String, Value>, ResolveError> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), resolve_value(v, scope)?)))
        .collect()
}

/// Paths referenced by a template, in order of appearance
pub fn referenced_paths(template: &str) -> Vec<String> {
    if !template.contains("{{") {
        return Vec::new();
    }
    MARKER
        .captures_iter(template)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}
