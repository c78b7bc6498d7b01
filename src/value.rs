//! The universal document node.
//!
//! A [`Value`] is the single dynamically-typed representation every parsed
//! YAML or JSON document is converted into before merging and evaluation.
//! Mapping order is significant throughout this crate (stable diffs and
//! array-by-key semantics both depend on it), so [`Mapping`] is backed by
//! [`indexmap::IndexMap`] rather than a hashed, order-losing map.

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;

/// A scalar usable as a mapping key: string, integer, or boolean.
///
/// Key equality uses the scalar's natural equality (spec.md §3); `Ord` is
/// only used by the `keys` operator to produce a sorted union of keys and
/// has no bearing on map lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarKey {
    String(String),
    Int(i64),
    Bool(bool),
}

impl ScalarKey {
    pub fn as_value(&self) -> Value {
        match self {
            ScalarKey::String(s) => Value::String(s.clone()),
            ScalarKey::Int(i) => Value::Int(*i),
            ScalarKey::Bool(b) => Value::Bool(*b),
        }
    }

    /// Render the way a path segment referring to this key would look.
    pub fn as_path_segment(&self) -> String {
        match self {
            ScalarKey::String(s) => s.clone(),
            ScalarKey::Int(i) => i.to_string(),
            ScalarKey::Bool(b) => b.to_string(),
        }
    }
}

impl fmt::Display for ScalarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_path_segment())
    }
}

// Ordering used only for `keys`' sorted union: strings < ints < bools,
// each group ordered naturally. This matches the requirement that the
// union be "sorted" without pretending cross-type scalars have one true
// ordering.
impl PartialOrd for ScalarKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScalarKey {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(k: &ScalarKey) -> u8 {
            match k {
                ScalarKey::String(_) => 0,
                ScalarKey::Int(_) => 1,
                ScalarKey::Bool(_) => 2,
            }
        }
        match (self, other) {
            (ScalarKey::String(a), ScalarKey::String(b)) => a.cmp(b),
            (ScalarKey::Int(a), ScalarKey::Int(b)) => a.cmp(b),
            (ScalarKey::Bool(a), ScalarKey::Bool(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

pub type Mapping = IndexMap<ScalarKey, Value>;

/// The universal document node (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(Mapping),
}

impl Value {
    pub fn new_mapping() -> Value {
        Value::Mapping(Mapping::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_scalar_key(&self) -> Option<ScalarKey> {
        match self {
            Value::String(s) => Some(ScalarKey::String(s.clone())),
            Value::Int(i) => Some(ScalarKey::Int(*i)),
            Value::Bool(b) => Some(ScalarKey::Bool(*b)),
            _ => None,
        }
    }

    /// Render the value as a string the way `concat`/`join` stringify
    /// their arguments: scalars print their natural textual form, `Null`
    /// is empty, and structured values use their YAML-ish flow rendering.
    pub fn stringify(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Sequence(_) | Value::Mapping(_) => {
                serde_yaml::to_string(&to_serde_yaml(self).unwrap_or(serde_yaml::Value::Null))
                    .unwrap_or_default()
                    .trim_end()
                    .to_string()
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stringify())
    }
}

/// Heuristic YAML-1.1-flavored bool/null keyword resolution, applied to
/// plain (unquoted) scalars. `serde_yaml` only resolves the YAML-1.2 core
/// schema (`true`/`false`/`null`/`~`); spec.md §6 additionally requires the
/// YAML-1.1 `yes`/`no`/`on`/`off` keywords. We cannot recover quoting
/// information once a node has become a `serde_yaml::Value`, so a quoted
/// `"yes"` is indistinguishable from a plain `yes` here: both resolve to a
/// bool. This is a known, narrow divergence from strict 1.2 quoting rules,
/// traded for implementation simplicity.
fn resolve_yaml11_keyword(s: &str) -> Option<Value> {
    match s {
        "yes" | "Yes" | "YES" | "on" | "On" | "ON" => Some(Value::Bool(true)),
        "no" | "No" | "NO" | "off" | "Off" | "OFF" => Some(Value::Bool(false)),
        _ => None,
    }
}

pub fn from_serde_yaml(v: serde_yaml::Value) -> Value {
    match v {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_yaml::Value::String(s) => resolve_yaml11_keyword(&s).unwrap_or(Value::String(s)),
        serde_yaml::Value::Sequence(seq) => {
            Value::Sequence(seq.into_iter().map(from_serde_yaml).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = Mapping::new();
            for (k, v) in map {
                let key = scalar_key_from_serde_yaml(k);
                out.insert(key, from_serde_yaml(v));
            }
            Value::Mapping(out)
        }
        serde_yaml::Value::Tagged(t) => from_serde_yaml(t.value),
    }
}

fn scalar_key_from_serde_yaml(v: serde_yaml::Value) -> ScalarKey {
    match from_serde_yaml(v) {
        Value::String(s) => ScalarKey::String(s),
        Value::Int(i) => ScalarKey::Int(i),
        Value::Bool(b) => ScalarKey::Bool(b),
        other => ScalarKey::String(other.stringify()),
    }
}

pub fn to_serde_yaml(v: &Value) -> Result<serde_yaml::Value, serde_yaml::Error> {
    Ok(match v {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Int(i) => serde_yaml::Value::Number((*i).into()),
        Value::Float(f) => serde_yaml::Value::Number((*f).into()),
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for item in seq {
                out.push(to_serde_yaml(item)?);
            }
            serde_yaml::Value::Sequence(out)
        }
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::new();
            for (k, v) in map {
                out.insert(to_serde_yaml(&k.as_value())?, to_serde_yaml(v)?);
            }
            serde_yaml::Value::Mapping(out)
        }
    })
}

pub fn from_serde_json(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(a) => Value::Sequence(a.into_iter().map(from_serde_json).collect()),
        serde_json::Value::Object(o) => {
            let mut out = Mapping::new();
            for (k, v) in o {
                out.insert(ScalarKey::String(k), from_serde_json(v));
            }
            Value::Mapping(out)
        }
    }
}

pub fn to_serde_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(seq) => serde_json::Value::Array(seq.iter().map(to_serde_json).collect()),
        Value::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.as_path_segment(), to_serde_json(v));
            }
            serde_json::Value::Object(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stringify_scalars() {
        assert_eq!(Value::Int(42).stringify(), "42");
        assert_eq!(Value::Null.stringify(), "");
        assert_eq!(Value::Bool(true).stringify(), "true");
    }

    #[test]
    fn yaml11_bool_keywords_resolve() {
        let v: Value = from_serde_yaml(serde_yaml::from_str("yes").unwrap());
        assert_eq!(v, Value::Bool(true));
        let v: Value = from_serde_yaml(serde_yaml::from_str("off").unwrap());
        assert_eq!(v, Value::Bool(false));
    }

    #[test]
    fn mapping_preserves_insertion_order() {
        let yaml = "b: 1\na: 2\nc: 3\n";
        let v = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let m = v.as_mapping().unwrap();
        let keys: Vec<_> = m.keys().map(|k| k.as_path_segment()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn keys_sort_strings_before_ints() {
        let mut keys = vec![
            ScalarKey::Int(1),
            ScalarKey::String("a".into()),
            ScalarKey::Bool(true),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                ScalarKey::String("a".into()),
                ScalarKey::Int(1),
                ScalarKey::Bool(true)
            ]
        );
    }
}
