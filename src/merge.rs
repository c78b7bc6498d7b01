//! The Merger: deterministic structural combination of nested maps and
//! arrays, including the array modification directive grammar (spec.md
//! §4.7).

use indexmap::IndexMap;

use crate::cursor::Cursor;
use crate::error::MergeError;
use crate::eval::EngineOptions;
use crate::tokenizer::{expression_body, is_expression};
use crate::value::{Mapping, ScalarKey, Value};

/// Prune and sort paths discovered while merging (spec.md §3
/// `MergeMetadata`), consumed later by the post-processor.
#[derive(Debug, Clone, Default)]
pub struct MergeMetadata {
    prune_paths: Vec<String>,
    sort_paths: IndexMap<String, String>,
}

impl MergeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_prune(&mut self, path: String) {
        if !self.prune_paths.contains(&path) {
            self.prune_paths.push(path);
        }
    }

    pub fn add_sort(&mut self, path: String, key: String) {
        self.sort_paths.insert(path, key);
    }

    pub fn prune_paths(&self) -> &[String] {
        &self.prune_paths
    }

    pub fn sort_paths(&self) -> &IndexMap<String, String> {
        &self.sort_paths
    }
}

struct MergeCtx<'a> {
    options: &'a EngineOptions,
    metadata: &'a mut MergeMetadata,
    warnings: &'a mut Vec<String>,
}

/// Merge `overlay` into `base` in place, returning discovered metadata
/// and non-fatal warnings alongside any structural errors.
pub fn merge_documents(
    mut docs: impl Iterator<Item = Value>,
    options: &EngineOptions,
) -> Result<(Value, MergeMetadata, Vec<String>), MergeError> {
    let mut base = docs.next().unwrap_or_else(Value::new_mapping);
    let mut metadata = MergeMetadata::new();
    let mut warnings = Vec::new();
    let mut doc_index = 0usize;

    for doc in docs {
        doc_index += 1;
        log::debug!("merging document #{} into the accumulated tree", doc_index);
        let mut ctx = MergeCtx { options, metadata: &mut metadata, warnings: &mut warnings };
        match (&mut base, doc) {
            (Value::Mapping(b), Value::Mapping(o)) => {
                merge_mapping(b, o, &Cursor::root(), &mut ctx)?;
            }
            _ => {
                return Err(MergeError::Structural {
                    path: "$".into(),
                    message: "root of document is not a mapping".into(),
                })
            }
        }
    }

    log::debug!(
        "merge complete: {} prune path(s), {} sort path(s) recorded",
        metadata.prune_paths().len(),
        metadata.sort_paths().len()
    );
    Ok((base, metadata, warnings))
}

/// Merge a single base/overlay pair outside the top-level multi-document
/// flow. Used by the `inject` operator to splice already-evaluated
/// content back into the tree (spec.md §4.6); any prune/sort sentinels
/// this encounters are still recorded, though by `EvalPhase` none are
/// expected to remain.
pub fn merge_values(base: Value, overlay: Value, path: &Cursor, options: &EngineOptions) -> Result<Value, MergeError> {
    let mut metadata = MergeMetadata::new();
    let mut warnings = Vec::new();
    let mut ctx = MergeCtx { options, metadata: &mut metadata, warnings: &mut warnings };
    let mut base = base;
    merge_value(&mut base, overlay, path, &mut ctx)?;
    Ok(base)
}

fn merge_mapping(
    base: &mut Mapping,
    overlay: Mapping,
    path: &Cursor,
    ctx: &mut MergeCtx,
) -> Result<(), MergeError> {
    for (k, v) in overlay {
        let child_path = path.push(k.as_path_segment());
        match base.get_mut(&k) {
            Some(existing) => merge_value(existing, v, &child_path, ctx)?,
            None => {
                base.insert(k, v);
            }
        }
    }
    Ok(())
}

fn merge_value(base: &mut Value, overlay: Value, path: &Cursor, ctx: &mut MergeCtx) -> Result<(), MergeError> {
    if let Value::String(s) = &overlay {
        if is_prune_sentinel(s) && matches!(base, Value::Mapping(_) | Value::Sequence(_)) {
            // Preserve the existing subtree so later `grab`s still see
            // it; record the path for the post-processor to delete
            // after evaluation (spec.md §4.7, Open Question #1).
            ctx.metadata.add_prune(path.to_string());
            return Ok(());
        }
        if let Some(key) = sort_sentinel_key(s) {
            if matches!(base, Value::Sequence(_)) {
                // Preserve the existing sequence, same as the prune
                // sentinel above: the post-processor reorders it in
                // place once evaluation has resolved any element
                // opcalls (spec.md §4.7).
                ctx.metadata.add_sort(path.to_string(), key);
                return Ok(());
            }
        }
    }

    match overlay {
        Value::Mapping(o) => {
            if let Value::Mapping(b) = base {
                merge_mapping(b, o, path, ctx)?;
            } else {
                *base = Value::Mapping(o);
            }
        }
        Value::Sequence(o) => merge_array(base, o, path, ctx)?,
        other => *base = other,
    }
    Ok(())
}

fn is_prune_sentinel(s: &str) -> bool {
    is_expression(s) && expression_body(s) == "prune"
}

fn sort_sentinel_key(s: &str) -> Option<String> {
    if !is_expression(s) {
        return None;
    }
    let tokens = shell_split(expression_body(s));
    if tokens.first().map(|t| t.as_str()) != Some("sort") {
        return None;
    }
    if tokens.len() >= 3 && tokens[1] == "by" {
        Some(unquote(&tokens[2]))
    } else {
        Some(String::new())
    }
}

/// A whitespace-respecting-quotes tokenizer for the small array-directive
/// grammar (`(( merge on KEY ))`, `(( insert before "NAME" ))`, ...),
/// which is not the general expression grammar.
fn shell_split(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    for c in s.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                cur.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    out.push(std::mem::take(&mut cur));
                }
            }
            _ => cur.push(c),
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

fn unquote(s: &str) -> String {
    s.trim_matches('"').to_string()
}

#[derive(Debug, Clone)]
enum Directive {
    Merge { key: Option<String> },
    Inline,
    Replace,
    Append,
    Prepend,
    InsertIndex { before: bool, index: usize },
    InsertNamed { before: bool, key: String, name: String },
    DeleteIndex(usize),
    DeleteNamed { key: String, name: String },
}

fn parse_directive(s: &str) -> Option<Directive> {
    if !is_expression(s) {
        return None;
    }
    let tokens = shell_split(expression_body(s));
    let head = tokens.first()?.as_str();
    match head {
        "merge" => {
            if tokens.len() >= 3 && tokens[1] == "on" {
                Some(Directive::Merge { key: Some(unquote(&tokens[2])) })
            } else {
                Some(Directive::Merge { key: None })
            }
        }
        "inline" => Some(Directive::Inline),
        "replace" => Some(Directive::Replace),
        "append" => Some(Directive::Append),
        "prepend" => Some(Directive::Prepend),
        "insert" => {
            let mut idx = 1;
            let before = match tokens.get(idx).map(|s| s.as_str()) {
                Some("before") => {
                    idx += 1;
                    true
                }
                Some("after") => {
                    idx += 1;
                    false
                }
                _ => false,
            };
            let tok = tokens.get(idx)?;
            if let Ok(n) = tok.parse::<usize>() {
                Some(Directive::InsertIndex { before, index: n })
            } else if tokens.len() > idx + 1 {
                Some(Directive::InsertNamed { before, key: unquote(tok), name: unquote(&tokens[idx + 1]) })
            } else {
                Some(Directive::InsertNamed { before, key: "name".to_string(), name: unquote(tok) })
            }
        }
        "delete" => {
            let tok = tokens.get(1)?;
            if let Ok(n) = tok.parse::<usize>() {
                Some(Directive::DeleteIndex(n))
            } else if tokens.len() > 2 {
                Some(Directive::DeleteNamed { key: unquote(tok), name: unquote(&tokens[2]) })
            } else {
                Some(Directive::DeleteNamed { key: "name".to_string(), name: unquote(tok) })
            }
        }
        _ => None,
    }
}

fn default_directive(base: &[Value], overlay: &[Value], options: &EngineOptions) -> Directive {
    let key = ScalarKey::String(options.array_merge_key.clone());
    let all_keyed = |arr: &[Value]| {
        !arr.is_empty() && arr.iter().all(|v| v.as_mapping().map(|m| m.contains_key(&key)).unwrap_or(false))
    };
    if all_keyed(base) && all_keyed(overlay) {
        Directive::Merge { key: Some(options.array_merge_key.clone()) }
    } else if options.append_by_default {
        Directive::Append
    } else {
        Directive::Inline
    }
}

fn find_index_by_key(seq: &[Value], key: &str, name: &str) -> Option<usize> {
    seq.iter().position(|v| {
        v.as_mapping()
            .and_then(|m| m.get(&ScalarKey::String(key.to_string())))
            .and_then(|v| v.as_str())
            .map(|s| s == name)
            .unwrap_or(false)
    })
}

fn merge_array(base: &mut Value, overlay: Vec<Value>, path: &Cursor, ctx: &mut MergeCtx) -> Result<(), MergeError> {
    let base_seq = match base {
        Value::Sequence(s) => s,
        _ => {
            *base = Value::Sequence(overlay);
            return Ok(());
        }
    };

    let (directive, rest) = match overlay.first() {
        Some(Value::String(s)) if parse_directive(s).is_some() => {
            (parse_directive(s).unwrap(), overlay[1..].to_vec())
        }
        _ => (default_directive(base_seq, &overlay, ctx.options), overlay),
    };

    match directive {
        Directive::Replace => *base = Value::Sequence(rest),
        Directive::Append => {
            let base_seq = base.as_sequence_mut().unwrap();
            base_seq.extend(rest);
        }
        Directive::Prepend => {
            let base_seq = base.as_sequence_mut().unwrap();
            let mut merged = rest;
            merged.append(base_seq);
            *base_seq = merged;
        }
        Directive::Inline => merge_inline(base.as_sequence_mut().unwrap(), rest, path, ctx)?,
        Directive::Merge { key } => {
            let key = key.unwrap_or_else(|| ctx.options.array_merge_key.clone());
            merge_by_key(base.as_sequence_mut().unwrap(), rest, &key, path, ctx)?;
        }
        Directive::InsertIndex { before, index } => {
            let base_seq = base.as_sequence_mut().unwrap();
            let at = if before { index } else { index + 1 };
            if at > base_seq.len() {
                return Err(MergeError::IndexOutOfBounds { path: path.to_string(), index, len: base_seq.len() });
            }
            for (offset, item) in rest.into_iter().enumerate() {
                base_seq.insert(at + offset, item);
            }
        }
        Directive::InsertNamed { before, key, name } => {
            let base_seq = base.as_sequence_mut().unwrap();
            let pos = find_index_by_key(base_seq, &key, &name).ok_or_else(|| MergeError::Structural {
                path: path.to_string(),
                message: format!("no element with {}={:?} to insert relative to", key, name),
            })?;
            let at = if before { pos } else { pos + 1 };
            for (offset, item) in rest.into_iter().enumerate() {
                base_seq.insert(at + offset, item);
            }
        }
        Directive::DeleteIndex(idx) => {
            let base_seq = base.as_sequence_mut().unwrap();
            if idx >= base_seq.len() {
                return Err(MergeError::IndexOutOfBounds { path: path.to_string(), index: idx, len: base_seq.len() });
            }
            base_seq.remove(idx);
        }
        Directive::DeleteNamed { key, name } => {
            let base_seq = base.as_sequence_mut().unwrap();
            let pos = find_index_by_key(base_seq, &key, &name).ok_or_else(|| MergeError::Structural {
                path: path.to_string(),
                message: format!("no element with {}={:?} to delete", key, name),
            })?;
            base_seq.remove(pos);
        }
    }
    Ok(())
}

fn merge_inline(base_seq: &mut Vec<Value>, overlay: Vec<Value>, path: &Cursor, ctx: &mut MergeCtx) -> Result<(), MergeError> {
    for (i, item) in overlay.into_iter().enumerate() {
        if i < base_seq.len() {
            merge_value(&mut base_seq[i], item, &path.push(i.to_string()), ctx)?;
        } else {
            base_seq.push(item);
        }
    }
    Ok(())
}

fn merge_by_key(
    base_seq: &mut Vec<Value>,
    overlay: Vec<Value>,
    key: &str,
    path: &Cursor,
    ctx: &mut MergeCtx,
) -> Result<(), MergeError> {
    let key_scalar = ScalarKey::String(key.to_string());
    for v in base_seq.iter().chain(overlay.iter()) {
        match v.as_mapping() {
            Some(m) => {
                if let Some(val) = m.get(&key_scalar) {
                    if val.as_scalar_key().is_none() {
                        // Open Question #2: non-scalar identifier key
                        // falls back to inline merge with a warning,
                        // preserving the reference implementation's
                        // compatibility behavior.
                        ctx.warnings.push(format!(
                            "at {}: merge key {:?} is not a scalar; falling back to inline merge",
                            path, key
                        ));
                        return merge_inline(base_seq, overlay, path, ctx);
                    }
                }
            }
            None => {
                return Err(MergeError::Structural {
                    path: path.to_string(),
                    message: format!("(( merge on {} )) requires every element to be a mapping", key),
                })
            }
        }
    }

    for item in overlay {
        let item_key = item.as_mapping().and_then(|m| m.get(&key_scalar)).and_then(|v| v.as_scalar_key());
        let item_key = match item_key {
            Some(k) => k,
            None => {
                return Err(MergeError::NonScalarKey { path: path.to_string(), key: key.to_string() })
            }
        };
        let existing = base_seq.iter_mut().find(|b| {
            b.as_mapping().and_then(|m| m.get(&key_scalar)).and_then(|v| v.as_scalar_key()) == Some(item_key.clone())
        });
        match existing {
            Some(existing) => merge_value(existing, item, &path.push(item_key.as_path_segment()), ctx)?,
            None => base_seq.push(item),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::from_serde_yaml;

    fn parse(yaml: &str) -> Value {
        from_serde_yaml(serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn merge_by_key_default() {
        let a = parse("jobs:\n  - name: web\n    props:\n      foo: bar\n");
        let b = parse("jobs:\n  - name: web\n    props:\n      bar: baz\n");
        let (merged, _, _) = merge_documents(vec![a, b].into_iter(), &EngineOptions::default()).unwrap();
        let jobs = merged.as_mapping().unwrap().get(&ScalarKey::String("jobs".into())).unwrap();
        let job0 = &jobs.as_sequence().unwrap()[0];
        let props = job0.as_mapping().unwrap().get(&ScalarKey::String("props".into())).unwrap();
        assert_eq!(props.as_mapping().unwrap().len(), 2);
    }

    #[test]
    fn idempotent_merge_of_empty_base() {
        let doc = parse("a: 1\nb:\n  c: 2\n");
        let (merged, _, _) = merge_documents(vec![Value::new_mapping(), doc.clone()].into_iter(), &EngineOptions::default()).unwrap();
        assert_eq!(merged, doc);
    }

    #[test]
    fn prune_preserves_base_subtree() {
        let a = parse("meta:\n  secret:\n    inner: hi\n");
        let b = parse("meta:\n  secret: (( prune ))\n");
        let (merged, meta, _) = merge_documents(vec![a, b].into_iter(), &EngineOptions::default()).unwrap();
        assert_eq!(meta.prune_paths(), &["meta.secret".to_string()]);
        let secret = merged.as_mapping().unwrap().get(&ScalarKey::String("meta".into())).unwrap();
        assert!(secret.as_mapping().unwrap().contains_key(&ScalarKey::String("secret".into())));
    }

    #[test]
    fn sort_sentinel_preserves_base_sequence() {
        let a = parse("jobs:\n  - 3\n  - 1\n  - 2\n");
        let b = parse("jobs: (( sort ))\n");
        let (merged, meta, _) = merge_documents(vec![a, b].into_iter(), &EngineOptions::default()).unwrap();
        assert_eq!(meta.sort_paths().get("jobs").map(String::as_str), Some(""));
        let jobs = merged.as_mapping().unwrap().get(&ScalarKey::String("jobs".into())).unwrap();
        assert_eq!(jobs.as_sequence().unwrap().len(), 3);
    }
}
