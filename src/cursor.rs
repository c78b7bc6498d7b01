//! Cursor / Path: dotted or indexed addressing into a [`Value`] tree
//! (spec.md §4.1).

use std::fmt;

use crate::value::{ScalarKey, Value};

/// A single step in a [`Cursor`]. Segments are always stored as their raw
/// textual form; whether a segment behaves as a sequence index or a
/// mapping key is decided at resolution time against the node it is
/// applied to, because the same textual segment (e.g. `"0"`) can mean
/// either depending on context (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment(pub String);

/// An ordered sequence of path segments (spec.md §3 `Cursor`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Cursor {
    pub segments: Vec<Segment>,
}

impl Cursor {
    pub fn root() -> Self {
        Cursor { segments: Vec::new() }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn push(&self, segment: impl Into<String>) -> Cursor {
        let mut segments = self.segments.clone();
        segments.push(Segment(segment.into()));
        Cursor { segments }
    }

    /// Parse a dotted/bracketed path string into a `Cursor`.
    ///
    /// `name[i]` expands to the two segments `name`, `i`; a leading `$.`
    /// or bare `$` denotes the root and is stripped.
    pub fn parse(path: &str) -> Cursor {
        let mut path = path.trim();
        if path == "$" {
            return Cursor::root();
        }
        if let Some(rest) = path.strip_prefix("$.") {
            path = rest;
        }
        if path.is_empty() {
            return Cursor::root();
        }

        let mut segments = Vec::new();
        for raw in path.split('.') {
            expand_bracketed(raw, &mut segments);
        }
        Cursor { segments }
    }

    /// Resolve this cursor against `root`, returning the addressed value.
    pub fn resolve<'a>(&self, root: &'a Value) -> Result<&'a Value, ResolveError> {
        let mut node = root;
        let mut resolved = Vec::new();
        for seg in &self.segments {
            node = step(node, seg, &resolved)?;
            resolved.push(seg.0.clone());
        }
        Ok(node)
    }

    pub fn resolve_mut<'a>(&self, root: &'a mut Value) -> Result<&'a mut Value, ResolveError> {
        let mut node = root;
        let mut resolved = Vec::new();
        for seg in &self.segments {
            node = step_mut(node, seg, &resolved)?;
            resolved.push(seg.0.clone());
        }
        Ok(node)
    }

    /// Replace the value addressed by this cursor. The parent of the
    /// target must already exist (spec.md §4.2); the sole exception is
    /// the root cursor itself, which may replace the whole tree.
    pub fn replace(&self, root: &mut Value, value: Value) -> Result<(), ResolveError> {
        if self.is_root() {
            *root = value;
            return Ok(());
        }
        let (parent_segs, last) = self.segments.split_at(self.segments.len() - 1);
        let parent_cursor = Cursor { segments: parent_segs.to_vec() };
        let parent = parent_cursor.resolve_mut(root)?;
        set_child(parent, &last[0], value)
    }

    pub fn delete(&self, root: &mut Value) -> Result<(), ResolveError> {
        if self.is_root() {
            *root = Value::Null;
            return Ok(());
        }
        let (parent_segs, last) = self.segments.split_at(self.segments.len() - 1);
        let parent_cursor = Cursor { segments: parent_segs.to_vec() };
        let parent = parent_cursor.resolve_mut(root)?;
        delete_child(parent, &last[0])
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "$");
        }
        let rendered: Vec<&str> = self.segments.iter().map(|s| s.0.as_str()).collect();
        write!(f, "{}", rendered.join("."))
    }
}

impl From<&str> for Cursor {
    fn from(s: &str) -> Self {
        Cursor::parse(s)
    }
}

impl std::str::FromStr for Cursor {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Cursor::parse(s))
    }
}

fn expand_bracketed(raw: &str, out: &mut Vec<Segment>) {
    // "name[i]" -> "name", "i". Brackets may repeat: "a[0][1]".
    let mut rest = raw;
    if let Some(open) = rest.find('[') {
        let (name, tail) = rest.split_at(open);
        if !name.is_empty() {
            out.push(Segment(name.to_string()));
        }
        rest = tail;
        while let Some(stripped) = rest.strip_prefix('[') {
            if let Some(close) = stripped.find(']') {
                out.push(Segment(stripped[..close].to_string()));
                rest = &stripped[close + 1..];
            } else {
                out.push(Segment(stripped.to_string()));
                rest = "";
                break;
            }
        }
    } else if !raw.is_empty() {
        out.push(Segment(raw.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    NotFound { path: String, deepest_resolved: String },
    TypeMismatch { path: String, expected: String, actual: String },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NotFound { path, deepest_resolved } => write!(
                f,
                "`{}` could not be found in the datastructure (deepest resolved: `{}`)",
                path, deepest_resolved
            ),
            ResolveError::TypeMismatch { path, expected, actual } => write!(
                f,
                "`{}` has type {} but {} was expected",
                path, actual, expected
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

fn full_path(resolved: &[String], seg: &Segment) -> String {
    let mut parts = resolved.to_vec();
    parts.push(seg.0.clone());
    parts.join(".")
}

fn is_index(s: &str) -> Option<usize> {
    if s.is_empty() {
        return None;
    }
    s.parse::<usize>().ok()
}

fn step<'a>(node: &'a Value, seg: &Segment, resolved: &[String]) -> Result<&'a Value, ResolveError> {
    match node {
        Value::Mapping(m) => {
            let key = lookup_key(seg);
            m.get(&key)
                .or_else(|| m.get(&ScalarKey::String(seg.0.clone())))
                .ok_or_else(|| ResolveError::NotFound {
                    path: full_path(resolved, seg),
                    deepest_resolved: resolved.join("."),
                })
        }
        Value::Sequence(seq) => {
            if let Some(idx) = is_index(&seg.0) {
                seq.get(idx).ok_or_else(|| ResolveError::NotFound {
                    path: full_path(resolved, seg),
                    deepest_resolved: resolved.join("."),
                })
            } else {
                find_by_name(seq, &seg.0, "name").ok_or_else(|| ResolveError::NotFound {
                    path: full_path(resolved, seg),
                    deepest_resolved: resolved.join("."),
                })
            }
        }
        _ => Err(ResolveError::TypeMismatch {
            path: resolved.join("."),
            expected: "mapping or sequence".into(),
            actual: node.type_name().into(),
        }),
    }
}

fn step_mut<'a>(
    node: &'a mut Value,
    seg: &Segment,
    resolved: &[String],
) -> Result<&'a mut Value, ResolveError> {
    match node {
        Value::Mapping(m) => {
            let key = lookup_key(seg);
            let key = if m.contains_key(&key) {
                key
            } else {
                ScalarKey::String(seg.0.clone())
            };
            m.get_mut(&key).ok_or_else(|| ResolveError::NotFound {
                path: full_path(resolved, seg),
                deepest_resolved: resolved.join("."),
            })
        }
        Value::Sequence(seq) => {
            if let Some(idx) = is_index(&seg.0) {
                seq.get_mut(idx).ok_or_else(|| ResolveError::NotFound {
                    path: full_path(resolved, seg),
                    deepest_resolved: resolved.join("."),
                })
            } else {
                find_by_name_mut(seq, &seg.0, "name").ok_or_else(|| ResolveError::NotFound {
                    path: full_path(resolved, seg),
                    deepest_resolved: resolved.join("."),
                })
            }
        }
        _ => Err(ResolveError::TypeMismatch {
            path: resolved.join("."),
            expected: "mapping or sequence".into(),
            actual: node.type_name().into(),
        }),
    }
}

fn lookup_key(seg: &Segment) -> ScalarKey {
    if let Ok(i) = seg.0.parse::<i64>() {
        // Mappings may legitimately be keyed by integers; prefer an exact
        // integer key match, callers fall back to string lookup failing
        // naturally since IndexMap key equality is exact.
        return ScalarKey::Int(i);
    }
    ScalarKey::String(seg.0.clone())
}

/// Name-resolution: search a sequence for a mapping element whose
/// identifier field (default `"name"`, overridable per call-site) equals
/// `name` (spec.md §3, §4.7).
pub fn find_by_name<'a>(seq: &'a [Value], name: &str, id_field: &str) -> Option<&'a Value> {
    seq.iter().find(|item| {
        item.as_mapping()
            .and_then(|m| m.get(&ScalarKey::String(id_field.to_string())))
            .and_then(|v| v.as_str())
            .map(|s| s == name)
            .unwrap_or(false)
    })
}

pub fn find_by_name_mut<'a>(
    seq: &'a mut [Value],
    name: &str,
    id_field: &str,
) -> Option<&'a mut Value> {
    seq.iter_mut().find(|item| {
        item.as_mapping()
            .and_then(|m| m.get(&ScalarKey::String(id_field.to_string())))
            .and_then(|v| v.as_str())
            .map(|s| s == name)
            .unwrap_or(false)
    })
}

fn set_child(parent: &mut Value, seg: &Segment, value: Value) -> Result<(), ResolveError> {
    match parent {
        Value::Mapping(m) => {
            let key = lookup_key(seg);
            // A mapping key that was addressed as an int but doesn't
            // exist might still be present under its string spelling
            // (e.g. originally parsed as a quoted key); try both.
            if m.contains_key(&key) {
                m.insert(key, value);
            } else {
                let string_key = ScalarKey::String(seg.0.clone());
                m.insert(string_key, value);
            }
            Ok(())
        }
        Value::Sequence(seq) => {
            if let Some(idx) = is_index(&seg.0) {
                if idx >= seq.len() {
                    return Err(ResolveError::NotFound {
                        path: seg.0.clone(),
                        deepest_resolved: String::new(),
                    });
                }
                seq[idx] = value;
                Ok(())
            } else if let Some(item) = find_by_name_mut(seq, &seg.0, "name") {
                *item = value;
                Ok(())
            } else {
                Err(ResolveError::NotFound {
                    path: seg.0.clone(),
                    deepest_resolved: String::new(),
                })
            }
        }
        _ => Err(ResolveError::TypeMismatch {
            path: seg.0.clone(),
            expected: "mapping or sequence".into(),
            actual: parent.type_name().into(),
        }),
    }
}

fn delete_child(parent: &mut Value, seg: &Segment) -> Result<(), ResolveError> {
    match parent {
        Value::Mapping(m) => {
            let key = lookup_key(seg);
            if m.shift_remove(&key).is_some() {
                Ok(())
            } else if m.shift_remove(&ScalarKey::String(seg.0.clone())).is_some() {
                Ok(())
            } else {
                Err(ResolveError::NotFound {
                    path: seg.0.clone(),
                    deepest_resolved: String::new(),
                })
            }
        }
        Value::Sequence(seq) => {
            if let Some(idx) = is_index(&seg.0) {
                if idx >= seq.len() {
                    return Err(ResolveError::NotFound {
                        path: seg.0.clone(),
                        deepest_resolved: String::new(),
                    });
                }
                seq.remove(idx);
                Ok(())
            } else {
                let pos = seq.iter().position(|item| {
                    item.as_mapping()
                        .and_then(|m| m.get(&ScalarKey::String("name".into())))
                        .and_then(|v| v.as_str())
                        .map(|s| s == seg.0)
                        .unwrap_or(false)
                });
                match pos {
                    Some(i) => {
                        seq.remove(i);
                        Ok(())
                    }
                    None => Err(ResolveError::NotFound {
                        path: seg.0.clone(),
                        deepest_resolved: String::new(),
                    }),
                }
            }
        }
        _ => Err(ResolveError::TypeMismatch {
            path: seg.0.clone(),
            expected: "mapping or sequence".into(),
            actual: parent.type_name().into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::from_serde_yaml;

    #[test]
    fn parse_dotted_and_bracketed_paths_are_equivalent() {
        assert_eq!(Cursor::parse("jobs.0.name"), Cursor::parse("jobs[0].name"));
    }

    #[test]
    fn leading_dollar_is_root() {
        assert_eq!(Cursor::parse("$"), Cursor::root());
        assert_eq!(Cursor::parse("$.a.b"), Cursor::parse("a.b"));
    }

    #[test]
    fn resolve_name_lookup_in_sequence() {
        let yaml = "jobs:\n  - name: web\n    props:\n      foo: bar\n";
        let v = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let c = Cursor::parse("jobs.web.props.foo");
        let resolved = c.resolve(&v).unwrap();
        assert_eq!(resolved.as_str(), Some("bar"));
    }

    #[test]
    fn not_found_reports_deepest_prefix() {
        let yaml = "meta:\n  env: prod\n";
        let v = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let c = Cursor::parse("meta.domain");
        let err = c.resolve(&v).unwrap_err();
        match err {
            ResolveError::NotFound { deepest_resolved, .. } => assert_eq!(deepest_resolved, "meta"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
