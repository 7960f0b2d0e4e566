// SPDX-License-Identifier: MIT

//! Dot paths with optional `name[index]` sequence indexing

use serde_json::Value;

use crate::ndk::error::ResolveError;

/// One step of a parsed path
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Parse `a.b[0].c` into segments
pub fn parse_path(path: &str) -> Result<Vec<Segment>, ResolveError> {
    let invalid = || ResolveError::InvalidPath {
        path: path.to_string(),
    };

    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let mut segments = Vec::new();
    for part in trimmed.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if key.is_empty() {
            return Err(invalid());
        }
        segments.push(Segment::Key(key.to_string()));

        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(invalid)?;
            if !rest.starts_with('[') {
                return Err(invalid());
            }
            let index = rest[1..close].trim().parse::<usize>().map_err(|_| invalid())?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
        }
    }

    Ok(segments)
}

/// Walk `segments` from `root`; `path` is only used for error messages
pub fn traverse<'v>(
    root: &'v Value,
    segments: &[Segment],
    path: &str,
) -> Result<&'v Value, ResolveError> {
    let mut current = root;
    for segment in segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => {
                map.get(key).ok_or_else(|| ResolveError::PathNotFound {
                    path: path.to_string(),
                })?
            }
            (Segment::Index(index), Value::Array(items)) => {
                items
                    .get(*index)
                    .ok_or_else(|| ResolveError::IndexOutOfRange {
                        path: path.to_string(),
                        index: *index,
                        len: items.len(),
                    })?
            }
            _ => {
                return Err(ResolveError::PathNotFound {
                    path: path.to_string(),
                })
            }
        };
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_keys() {
        assert_eq!(
            parse_path("steps.http.output").unwrap(),
            vec![
                Segment::Key("steps".to_string()),
                Segment::Key("http".to_string()),
                Segment::Key("output".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_indexes() {
        assert_eq!(
            parse_path("input.items[2].tags[0]").unwrap(),
            vec![
                Segment::Key("input".to_string()),
                Segment::Key("items".to_string()),
                Segment::Index(2),
                Segment::Key("tags".to_string()),
                Segment::Index(0),
            ]
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_path("").is_err());
        assert!(parse_path("a..b").is_err());
        assert!(parse_path("a[x]").is_err());
        assert!(parse_path("a[1").is_err());
        assert!(parse_path("[0]").is_err());
    }

    #[test]
    fn test_traverse() {
        let root = json!({"items": [{"name": "first"}, {"name": "second"}]});
        let segments = parse_path("items[1].name").unwrap();
        assert_eq!(
            traverse(&root, &segments, "items[1].name").unwrap(),
            &json!("second")
        );
    }

    #[test]
    fn test_traverse_missing_key() {
        let root = json!({"a": {"b": 1}});
        let segments = parse_path("a.c").unwrap();
        assert_eq!(
            traverse(&root, &segments, "a.c"),
            Err(ResolveError::PathNotFound {
                path: "a.c".to_string()
            })
        );
    }

    #[test]
    fn test_traverse_through_scalar_fails() {
        let root = json!({"a": 5});
        let segments = parse_path("a.b").unwrap();
        assert!(matches!(
            traverse(&root, &segments, "a.b"),
            Err(ResolveError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_traverse_index_out_of_range() {
        let root = json!({"items": [1, 2]});
        let segments = parse_path("items[5]").unwrap();
        assert_eq!(
            traverse(&root, &segments, "items[5]"),
            Err(ResolveError::IndexOutOfRange {
                path: "items[5]".to_string(),
                index: 5,
                len: 2,
            })
        );
    }
}
