//! `Document`/`Engine`: the façade that sequences parse, merge, evaluate,
//! and post-process into the single call most callers want (spec.md §2,
//! §4 overview). A lazily, incrementally built top-level handle: construct
//! it, feed it documents, and pull results out on demand rather than
//! threading every intermediate stage by hand.

use crate::cursor::Cursor;
use crate::error::{ParseError, ValidationError, WeaveError};
use crate::eval::{EngineOptions, Evaluator};
use crate::merge::{self, MergeMetadata};
use crate::postprocess::{self, PostProcessOptions};
use crate::registry::{builtin_registry, Registry};
use crate::value::{from_serde_json, from_serde_yaml, to_serde_json, to_serde_yaml, Value};

/// A single parsed YAML or JSON document, guaranteed to have a mapping
/// root (spec.md §6 input format requirement).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Value,
}

impl Document {
    pub fn from_value(root: Value) -> Result<Self, ParseError> {
        if !matches!(root, Value::Mapping(_)) {
            return Err(ParseError::RootNotMapping);
        }
        Ok(Document { root })
    }

    pub fn parse_yaml(text: &str) -> Result<Self, ParseError> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)?;
        Document::from_value(from_serde_yaml(raw))
    }

    pub fn parse_json(text: &str) -> Result<Self, ParseError> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        Document::from_value(from_serde_json(raw))
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    pub fn to_yaml_string(&self) -> Result<String, ParseError> {
        Ok(serde_yaml::to_string(&to_serde_yaml(&self.root)?)?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&to_serde_json(&self.root))
    }
}

/// The outcome of a full weave: the resulting document plus any
/// non-fatal warnings accumulated along the way (spec.md §4.7 Open
/// Question #2, §4.9).
#[derive(Debug, Clone)]
pub struct WeaveOutcome {
    pub document: Document,
    pub warnings: Vec<String>,
}

/// Drives the full pipeline: merge -> evaluate -> post-process, over a
/// fixed [`Registry`] and set of [`EngineOptions`]/[`PostProcessOptions`].
/// Reusable across multiple weaves (e.g. a long-lived CLI or service
/// process that merges many independent document sets against the same
/// operator registry).
pub struct Engine {
    registry: Registry,
    options: EngineOptions,
    postprocess: PostProcessOptions,
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            registry: builtin_registry(),
            options: EngineOptions::default(),
            postprocess: PostProcessOptions::default(),
        }
    }

    pub fn with_registry(registry: Registry) -> Self {
        Engine { registry, options: EngineOptions::default(), postprocess: PostProcessOptions::default() }
    }

    pub fn options_mut(&mut self) -> &mut EngineOptions {
        &mut self.options
    }

    pub fn postprocess_mut(&mut self) -> &mut PostProcessOptions {
        &mut self.postprocess
    }

    /// Merge `documents` in order, run the three evaluation phases, then
    /// post-process (spec.md §4 overview: Merger -> Evaluator ->
    /// Post-processing Layer).
    pub fn weave(&self, documents: impl IntoIterator<Item = Document>) -> Result<WeaveOutcome, WeaveError> {
        let values = documents.into_iter().map(Document::into_value);
        let (merged, metadata, mut warnings) = merge::merge_documents(values, &self.options)?;

        let mut ev = Evaluator::new(merged, self.registry.clone(), self.options.clone(), metadata);
        ev.evaluate_all()?;
        warnings.extend(ev.warnings().iter().cloned());
        let metadata = ev.metadata().clone();
        let tree = ev.into_tree();

        let tree = postprocess::apply(tree, &metadata, &self.postprocess)?;
        let document = Document::from_value(tree)?;
        Ok(WeaveOutcome { document, warnings })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a dotted/bracketed path string against a document without
/// running a full weave — used by callers that already have a merged
/// tree and just want a one-off read (mirrors the `grab` operator's own
/// resolution, exposed here as a library convenience). A bad path here
/// is caller error against the public API, not a document defect, so it
/// reports as [`ValidationError`] rather than a merge/evaluation error
/// (spec.md §7).
pub fn resolve<'a>(document: &'a Document, path: &str) -> Result<&'a Value, ValidationError> {
    Cursor::parse(path)
        .resolve(document.as_value())
        .map_err(|e| ValidationError::BadPath(path.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_mapping_root() {
        let err = Document::parse_yaml("- 1\n- 2\n").unwrap_err();
        assert!(matches!(err, ParseError::RootNotMapping));
    }

    #[test]
    fn end_to_end_weave_resolves_fallback() {
        let base = Document::parse_yaml("meta:\n  env: prod\ndomain: (( grab meta.domain || \"default-domain\" ))\n").unwrap();
        let engine = Engine::new();
        let outcome = engine.weave(vec![base]).unwrap();
        let domain = resolve(&outcome.document, "domain").unwrap();
        assert_eq!(domain.as_str(), Some("default-domain"));
    }

    #[test]
    fn weave_merges_multiple_documents_before_evaluating() {
        let a = Document::parse_yaml("meta:\n  name: base\njobs:\n  - name: web\n    instances: 1\n").unwrap();
        let b = Document::parse_yaml("jobs:\n  - name: web\n    instances: 2\nout: (( grab jobs.web.instances ))\n").unwrap();
        let engine = Engine::new();
        let outcome = engine.weave(vec![a, b]).unwrap();
        let out = resolve(&outcome.document, "out").unwrap();
        assert_eq!(out, &Value::Int(2));
    }

    #[test]
    fn weave_applies_post_processing_prune() {
        let doc = Document::parse_yaml("meta:\n  secret: shh\n  public: ok\n").unwrap();
        let mut engine = Engine::new();
        engine.postprocess_mut().prune_paths.push("meta.secret".to_string());
        let outcome = engine.weave(vec![doc]).unwrap();
        assert!(resolve(&outcome.document, "meta.secret").is_err());
        assert!(resolve(&outcome.document, "meta.public").is_ok());
    }
}
