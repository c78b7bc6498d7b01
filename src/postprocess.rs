//! The post-processing layer (spec.md §4.10): go-patch rejection, prune,
//! sort, and cherry-pick, applied in that order to the fully-evaluated
//! tree.

use crate::cursor::{Cursor, Segment};
use crate::error::PostProcessError;
use crate::merge::MergeMetadata;
use crate::value::{Mapping, ScalarKey, Value};

/// Caller-supplied post-processing directives (spec.md §6 CLI surface),
/// layered on top of whatever the merge/eval phases recorded into
/// [`MergeMetadata`].
#[derive(Debug, Clone, Default)]
pub struct PostProcessOptions {
    pub prune_paths: Vec<String>,
    pub cherry_pick_paths: Vec<String>,
    /// Presence of a go-patch document is itself the unsupported case
    /// (spec.md §4.10 step 1) — the value is never consulted.
    pub go_patch: Option<Value>,
}

pub fn apply(tree: Value, metadata: &MergeMetadata, options: &PostProcessOptions) -> Result<Value, PostProcessError> {
    if options.go_patch.is_some() {
        log::debug!("go-patch document supplied; rejecting (unsupported)");
        return Err(PostProcessError::GoPatchUnsupported);
    }

    let mut tree = tree;
    log::debug!(
        "post-process: pruning {} user path(s) + {} recorded path(s)",
        options.prune_paths.len(),
        metadata.prune_paths().len()
    );
    prune(&mut tree, &options.prune_paths, metadata.prune_paths());

    log::debug!("post-process: applying {} sort path(s)", metadata.sort_paths().len());
    apply_sort(&mut tree, metadata.sort_paths())?;

    if options.cherry_pick_paths.is_empty() {
        Ok(tree)
    } else {
        log::debug!("post-process: cherry-picking {} path(s)", options.cherry_pick_paths.len());
        cherry_pick(&tree, &options.cherry_pick_paths)
    }
}

/// Union the caller's prune paths with the merger's recorded `(( prune ))`
/// sites and delete each from the tree. Paths targeting the same sequence
/// are deleted in descending index order so that an earlier removal never
/// shifts a still-pending target out from under it (spec.md §4.10 step 2).
fn prune(tree: &mut Value, user_paths: &[String], metadata_paths: &[String]) {
    let mut all: Vec<String> = Vec::new();
    for p in metadata_paths.iter().chain(user_paths.iter()) {
        if !all.contains(p) {
            all.push(p.clone());
        }
    }

    let mut cursors: Vec<Cursor> = all.iter().map(|p| Cursor::parse(p)).collect();
    cursors.sort_by(|a, b| {
        let ai = a.segments.last().and_then(|s| s.0.parse::<i64>().ok());
        let bi = b.segments.last().and_then(|s| s.0.parse::<i64>().ok());
        match (ai, bi) {
            (Some(x), Some(y)) => y.cmp(&x),
            _ => std::cmp::Ordering::Equal,
        }
    });

    for cursor in cursors {
        if cursor.is_root() {
            *tree = Value::Null;
            continue;
        }
        // A path already consumed by an ancestor's deletion no longer
        // resolves; that's not an error, it's just already gone.
        let _ = cursor.delete(tree);
    }
}

fn apply_sort(tree: &mut Value, sort_paths: &indexmap::IndexMap<String, String>) -> Result<(), PostProcessError> {
    for (path, key) in sort_paths {
        let cursor = Cursor::parse(path);
        let node = cursor
            .resolve_mut(tree)
            .map_err(|e| PostProcessError::Sort { path: path.clone(), message: e.to_string() })?;
        let type_name = node.type_name();
        let seq = node.as_sequence_mut().ok_or_else(|| PostProcessError::Sort {
            path: path.clone(),
            message: format!("sort target is a {}, not a sequence", type_name),
        })?;
        sort_sequence(seq, key).map_err(|message| PostProcessError::Sort { path: path.clone(), message })?;
    }
    Ok(())
}

/// Empty `key`: natural ordering over a homogeneous scalar sequence
/// (Integer, Float, or String — never mixed). Non-empty `key`: every
/// element must be a mapping containing `key` with a scalar value, sorted
/// by that value (spec.md §4.10 step 3).
fn sort_sequence(seq: &mut [Value], key: &str) -> Result<(), String> {
    if seq.is_empty() {
        return Ok(());
    }

    if key.is_empty() {
        if seq.iter().all(|v| matches!(v, Value::Int(_))) {
            seq.sort_by_key(|v| match v {
                Value::Int(i) => *i,
                _ => unreachable!(),
            });
        } else if seq.iter().all(|v| matches!(v, Value::String(_))) {
            seq.sort_by(|a, b| a.as_str().unwrap().cmp(b.as_str().unwrap()));
        } else if seq.iter().all(|v| matches!(v, Value::Float(_) | Value::Int(_))) {
            seq.sort_by(|a, b| as_f64(a).partial_cmp(&as_f64(b)).unwrap_or(std::cmp::Ordering::Equal));
        } else {
            return Err(
                "natural sort requires a homogeneous sequence of integers, floats, or strings".into(),
            );
        }
        return Ok(());
    }

    let field = ScalarKey::String(key.to_string());
    for v in seq.iter() {
        let m = v
            .as_mapping()
            .ok_or_else(|| "every element of a keyed sort must be a mapping".to_string())?;
        let value = m.get(&field).ok_or_else(|| format!("element is missing sort key {:?}", key))?;
        if value.as_scalar_key().is_none() {
            return Err(format!("sort key {:?} does not hold a scalar value", key));
        }
    }
    seq.sort_by(|a, b| {
        let ka = a.as_mapping().unwrap().get(&field).unwrap();
        let kb = b.as_mapping().unwrap().get(&field).unwrap();
        compare_scalars(ka, kb)
    });
    Ok(())
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Float(f) => *f,
        Value::Int(i) => *i as f64,
        _ => unreachable!(),
    }
}

fn compare_scalars(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Float(_), _) | (_, Value::Float(_)) => {
            as_f64(a).partial_cmp(&as_f64(b)).unwrap_or(std::cmp::Ordering::Equal)
        }
        _ => a.stringify().cmp(&b.stringify()),
    }
}

/// Build a new tree containing only the requested paths, reconstructing
/// intermediate mappings as needed. A path through a sequence element
/// (`items.1` or `items.NAME`) preserves a single-element sequence at the
/// parent path rather than the whole source sequence; picks landing in
/// the same parent sequence accumulate in reverse discovery order
/// (spec.md §4.10 step 4).
fn cherry_pick(tree: &Value, paths: &[String]) -> Result<Value, PostProcessError> {
    let mut out = Value::new_mapping();
    for path in paths {
        let cursor = Cursor::parse(path);
        let leaf = cursor
            .resolve(tree)
            .map_err(|e| PostProcessError::CherryPick { path: path.clone(), message: e.to_string() })?
            .clone();
        graft(&mut out, tree, &cursor.segments, leaf)
            .map_err(|message| PostProcessError::CherryPick { path: path.clone(), message })?;
    }
    Ok(out)
}

fn default_for(v: &Value) -> Value {
    match v {
        Value::Mapping(_) => Value::new_mapping(),
        Value::Sequence(_) => Value::Sequence(Vec::new()),
        other => other.clone(),
    }
}

fn resolve_key(seg: &Segment, m: &Mapping) -> ScalarKey {
    if let Ok(i) = seg.0.parse::<i64>() {
        let k = ScalarKey::Int(i);
        if m.contains_key(&k) {
            return k;
        }
    }
    ScalarKey::String(seg.0.clone())
}

fn resolve_seq_index(seg: &Segment, seq: &[Value]) -> Option<usize> {
    if let Ok(i) = seg.0.parse::<usize>() {
        if i < seq.len() {
            return Some(i);
        }
    }
    seq.iter().position(|item| {
        item.as_mapping()
            .and_then(|m| m.get(&ScalarKey::String("name".into())))
            .and_then(|v| v.as_str())
            .map(|s| s == seg.0)
            .unwrap_or(false)
    })
}

fn graft(out: &mut Value, original: &Value, segments: &[Segment], leaf: Value) -> Result<(), String> {
    if segments.is_empty() {
        *out = leaf;
        return Ok(());
    }
    let seg = &segments[0];
    match original {
        Value::Mapping(om) => {
            let key = resolve_key(seg, om);
            let child_original = om.get(&key).ok_or_else(|| format!("`{}` is no longer present in the tree", seg.0))?;
            if out.as_mapping().is_none() {
                *out = Value::new_mapping();
            }
            let placeholder = default_for(child_original);
            let m = out.as_mapping_mut().unwrap();
            let entry = m.entry(key).or_insert(placeholder);
            graft(entry, child_original, &segments[1..], leaf)
        }
        Value::Sequence(os) => {
            let idx = resolve_seq_index(seg, os).ok_or_else(|| format!("`{}` was not found in the sequence", seg.0))?;
            let child_original = &os[idx];
            if out.as_sequence().is_none() {
                *out = Value::Sequence(Vec::new());
            }
            let mut child_out = default_for(child_original);
            graft(&mut child_out, child_original, &segments[1..], leaf)?;
            out.as_sequence_mut().unwrap().insert(0, child_out);
            Ok(())
        }
        _ => Err(format!("cannot descend into a {} at `{}`", original.type_name(), seg.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::from_serde_yaml;

    fn parse(yaml: &str) -> Value {
        from_serde_yaml(serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn prune_removes_user_and_metadata_paths() {
        let mut tree = parse("a: 1\nb: 2\nc: 3\n");
        prune(&mut tree, &["a".to_string()], &["c".to_string()]);
        let m = tree.as_mapping().unwrap();
        assert!(!m.contains_key(&ScalarKey::String("a".into())));
        assert!(!m.contains_key(&ScalarKey::String("c".into())));
        assert!(m.contains_key(&ScalarKey::String("b".into())));
    }

    #[test]
    fn prune_descending_index_avoids_shift() {
        let mut tree = parse("items:\n  - 0\n  - 1\n  - 2\n  - 3\n");
        prune(&mut tree, &["items.1".to_string(), "items.3".to_string()], &[]);
        let items = tree.as_mapping().unwrap().get(&ScalarKey::String("items".into())).unwrap();
        let remaining: Vec<i64> = items
            .as_sequence()
            .unwrap()
            .iter()
            .map(|v| if let Value::Int(i) = v { *i } else { unreachable!() })
            .collect();
        assert_eq!(remaining, vec![0, 2]);
    }

    #[test]
    fn sort_natural_orders_integers() {
        let mut tree = parse("nums:\n  - 3\n  - 1\n  - 2\n");
        let mut sort_paths = indexmap::IndexMap::new();
        sort_paths.insert("nums".to_string(), String::new());
        apply_sort(&mut tree, &sort_paths).unwrap();
        let nums = tree.as_mapping().unwrap().get(&ScalarKey::String("nums".into())).unwrap();
        let vals: Vec<i64> = nums
            .as_sequence()
            .unwrap()
            .iter()
            .map(|v| if let Value::Int(i) = v { *i } else { unreachable!() })
            .collect();
        assert_eq!(vals, vec![1, 2, 3]);
    }

    #[test]
    fn sort_by_key_orders_mappings() {
        let mut tree = parse("jobs:\n  - name: b\n  - name: a\n");
        let mut sort_paths = indexmap::IndexMap::new();
        sort_paths.insert("jobs".to_string(), "name".to_string());
        apply_sort(&mut tree, &sort_paths).unwrap();
        let jobs = tree.as_mapping().unwrap().get(&ScalarKey::String("jobs".into())).unwrap();
        let names: Vec<&str> = jobs.as_sequence().unwrap().iter().map(|v| {
            v.as_mapping().unwrap().get(&ScalarKey::String("name".into())).unwrap().as_str().unwrap()
        }).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn sort_rejects_heterogeneous_natural_sequence() {
        let mut tree = parse("mixed:\n  - 1\n  - \"two\"\n");
        let mut sort_paths = indexmap::IndexMap::new();
        sort_paths.insert("mixed".to_string(), String::new());
        assert!(apply_sort(&mut tree, &sort_paths).is_err());
    }

    #[test]
    fn sort_on_empty_sequence_is_not_an_error() {
        let mut tree = parse("empty: []\n");
        let mut sort_paths = indexmap::IndexMap::new();
        sort_paths.insert("empty".to_string(), String::new());
        assert!(apply_sort(&mut tree, &sort_paths).is_ok());
    }

    #[test]
    fn cherry_pick_reconstructs_intermediate_mappings() {
        let tree = parse("meta:\n  name: x\n  env: prod\nother: 1\n");
        let picked = cherry_pick(&tree, &["meta.env".to_string()]).unwrap();
        let m = picked.as_mapping().unwrap();
        assert!(!m.contains_key(&ScalarKey::String("other".into())));
        let meta = m.get(&ScalarKey::String("meta".into())).unwrap().as_mapping().unwrap();
        assert!(!meta.contains_key(&ScalarKey::String("name".into())));
        assert_eq!(meta.get(&ScalarKey::String("env".into())).unwrap().as_str(), Some("prod"));
    }

    #[test]
    fn cherry_pick_array_element_yields_single_element_sequence() {
        let tree = parse("jobs:\n  - name: web\n    port: 80\n  - name: api\n    port: 81\n");
        let picked = cherry_pick(&tree, &["jobs.web.port".to_string()]).unwrap();
        let jobs = picked.as_mapping().unwrap().get(&ScalarKey::String("jobs".into())).unwrap();
        let seq = jobs.as_sequence().unwrap();
        assert_eq!(seq.len(), 1);
        let port = seq[0].as_mapping().unwrap().get(&ScalarKey::String("port".into())).unwrap();
        assert_eq!(port, &Value::Int(80));
    }

    #[test]
    fn go_patch_is_rejected() {
        let tree = parse("a: 1\n");
        let options = PostProcessOptions { go_patch: Some(Value::Null), ..Default::default() };
        let err = apply(tree, &MergeMetadata::new(), &options).unwrap_err();
        assert!(matches!(err, PostProcessError::GoPatchUnsupported));
    }
}
