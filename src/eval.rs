//! The Evaluator: phase scheduling, expression evaluation, and response
//! application (spec.md §4.9).

use fnv::FnvHashMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::cursor::Cursor;
use crate::deps;
use crate::error::{EvaluationError, MultiError, OperatorError, WeaveError};
use crate::merge::{self, MergeMetadata};
use crate::operator::{Opcall, Phase, Response};
use crate::parser::{split_operator_target, Expr};
use crate::registry::Registry;
use crate::value::{from_serde_yaml, Value};

lazy_static! {
    /// The operator-call shape spec.md §3's Invariants section names
    /// directly: after evaluation, no unquoted `Literal(string)` should
    /// still match this. We cannot tell a literally-quoted `"(( ... ))"`
    /// apart from an unresolved one once both are plain `Value::String`s,
    /// so a post-`EvalPhase` match is reported as a warning (spec.md §7's
    /// non-fatal channel), not a hard error.
    static ref OPERATOR_CALL_RE: Regex = Regex::new(r"\(\(\s*\w+.*\)\)").unwrap();
}

fn find_residual_expressions(value: &Value, path: &Cursor, out: &mut Vec<String>) {
    match value {
        Value::String(s) if OPERATOR_CALL_RE.is_match(s) => out.push(path.to_string()),
        Value::Mapping(m) => {
            for (k, v) in m {
                find_residual_expressions(v, &path.push(k.as_path_segment()), out);
            }
        }
        Value::Sequence(seq) => {
            for (i, v) in seq.iter().enumerate() {
                find_residual_expressions(v, &path.push(i.to_string()), out);
            }
        }
        _ => {}
    }
}

/// Tunables that change how merging and evaluation behave, gathered from
/// the CLI/caller rather than hardcoded (spec.md §4.7, §6).
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Identifier field used to decide array-element identity for the
    /// default (directive-less) array merge. Overridable by the
    /// `DEFAULT_ARRAY_MERGE_KEY` environment variable.
    pub array_merge_key: String,
    /// When no merge directive is present and the arrays aren't uniformly
    /// keyed, fall back to `append` instead of `inline`.
    pub append_by_default: bool,
    /// Skip `EvalPhase` entirely, leaving unresolved opcalls as literal
    /// text (useful for inspecting a merge-only result).
    pub skip_eval: bool,
    /// Keep going into `EvalPhase` even if `ParamPhase` reported missing
    /// parameters, instead of aborting the whole run.
    pub continue_after_param_errors: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            array_merge_key: std::env::var("DEFAULT_ARRAY_MERGE_KEY").unwrap_or_else(|_| "name".to_string()),
            append_by_default: false,
            skip_eval: false,
            continue_after_param_errors: false,
        }
    }
}

/// Drives phase scheduling and expression evaluation over a merged tree.
pub struct Evaluator {
    tree: Value,
    registry: Registry,
    options: EngineOptions,
    metadata: MergeMetadata,
    warnings: Vec<String>,
    where_stack: Vec<Cursor>,
    static_ip_allocations: FnvHashMap<String, Vec<i64>>,
}

impl Evaluator {
    pub fn new(tree: Value, registry: Registry, options: EngineOptions, metadata: MergeMetadata) -> Self {
        Evaluator {
            tree,
            registry,
            options,
            metadata,
            warnings: Vec::new(),
            where_stack: Vec::new(),
            static_ip_allocations: FnvHashMap::default(),
        }
    }

    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Value {
        &mut self.tree
    }

    pub fn into_tree(self) -> Value {
        self.tree
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn metadata(&self) -> &MergeMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut MergeMetadata {
        &mut self.metadata
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The tree location of the opcall currently running. Nested
    /// sub-expressions (an operator's own arguments) share their parent
    /// call's location, since they have no call site of their own.
    pub fn where_(&self) -> Cursor {
        self.where_stack.last().cloned().unwrap_or_else(Cursor::root)
    }

    /// Reserve `offset` within `range_key` for `static_ips`, reporting a
    /// collision if two call sites claim the same offset in the same
    /// range (spec.md §4.6).
    pub fn reserve_static_ip(&mut self, range_key: &str, offset: i64) -> Result<(), OperatorError> {
        let seen = self.static_ip_allocations.entry(range_key.to_string()).or_default();
        if seen.contains(&offset) {
            return Err(OperatorError::StaticIpAllocation(format!(
                "offset {} in range {:?} is already allocated",
                offset, range_key
            )));
        }
        seen.push(offset);
        Ok(())
    }

    /// Evaluate an expression node to a concrete value. Operators call
    /// this on their own arguments; it is also how the `EvalPhase`
    /// scheduler resolves a bare reference with no operator wrapped
    /// around it.
    pub fn evaluate_expr(&mut self, expr: &Expr) -> Result<Value, EvaluationError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::EnvVar(name) => match std::env::var(name) {
                Ok(raw) => Ok(reparse_env_value(&raw)),
                // spec.md §4.5: unset resolves to the empty string, not
                // an error — fallback chains must not treat this as a
                // failure to recover from.
                Err(_) => Ok(reparse_env_value("")),
            },
            Expr::Reference(cursor) => cursor.resolve(&self.tree).map(Clone::clone).map_err(|e| EvaluationError::Reference {
                path: cursor.to_string(),
                message: e.to_string(),
            }),
            Expr::OperatorCall(name, args) => {
                let (base, _target) = split_operator_target(name);
                let op = self.registry.get(base).ok_or_else(|| EvaluationError::Operator {
                    path: self.where_().to_string(),
                    message: format!("unknown operator {:?}", base),
                })?;
                let response = op.run(self, args).map_err(|e| EvaluationError::Operator {
                    path: self.where_().to_string(),
                    message: e.to_string(),
                })?;
                Ok(match response {
                    Response::Replace(v) | Response::Inject(v) => v,
                })
            }
            Expr::LogicalOr(l, r) => match self.evaluate_expr(l) {
                Ok(v) => Ok(v),
                Err(_) => self.evaluate_expr(r),
            },
        }
    }

    /// Run a single call-site opcall and apply its response to the tree.
    fn run_opcall(&mut self, oc: &Opcall) -> Result<(), WeaveError> {
        let op = self
            .registry
            .get(&oc.operator)
            .ok_or_else(|| OperatorError::Unknown(oc.operator.clone()))?;
        self.where_stack.push(oc.where_.clone());
        let result = op.run(self, &oc.args);
        self.where_stack.pop();
        let response = result?;
        match response {
            Response::Replace(v) => {
                oc.where_.replace(&mut self.tree, v).map_err(|e| {
                    WeaveError::Evaluation(EvaluationError::Operator {
                        path: oc.where_.to_string(),
                        message: e.to_string(),
                    })
                })?;
            }
            Response::Inject(injected) => self.apply_inject(oc, injected)?,
        }
        Ok(())
    }

    fn apply_inject(&mut self, oc: &Opcall, injected: Value) -> Result<(), WeaveError> {
        if oc.where_.is_root() {
            let existing = std::mem::replace(&mut self.tree, Value::Null);
            self.tree = merge::merge_values(injected, existing, &oc.where_, &self.options)?;
            return Ok(());
        }

        let (parent_segs, last) = oc.where_.segments.split_at(oc.where_.segments.len() - 1);
        let parent_cursor = Cursor { segments: parent_segs.to_vec() };
        let parent = parent_cursor.resolve_mut(&mut self.tree).map_err(|e| {
            WeaveError::Evaluation(EvaluationError::Operator { path: parent_cursor.to_string(), message: e.to_string() })
        })?;
        let parent_map = parent.as_mapping_mut().ok_or_else(|| {
            WeaveError::Evaluation(EvaluationError::Operator {
                path: oc.where_.to_string(),
                message: "inject call site's parent is not a mapping".into(),
            })
        })?;

        let seg = &last[0];
        let key = crate::value::ScalarKey::String(seg.0.clone());
        if parent_map.shift_remove(&key).is_none() {
            if let Ok(i) = seg.0.parse::<i64>() {
                parent_map.shift_remove(&crate::value::ScalarKey::Int(i));
            }
        }
        let siblings = std::mem::take(parent_map);
        let merged = merge::merge_values(injected, Value::Mapping(siblings), &parent_cursor, &self.options)?;
        let merged_map = merged.as_mapping().cloned().ok_or_else(|| {
            WeaveError::Evaluation(EvaluationError::Operator {
                path: oc.where_.to_string(),
                message: "inject did not produce a mapping".into(),
            })
        })?;
        *parent_map = merged_map;
        Ok(())
    }

    /// Run every opcall eligible for `phase`, in dataflow order,
    /// aggregating failures into a single `MultiError` (spec.md §4.9).
    pub fn evaluate_phase(&mut self, phase: Phase) -> Result<(), WeaveError> {
        let plan = deps::analyze(&self.tree, &self.registry, phase)?;
        log::debug!("{:?}: {} opcall(s) to run", phase, plan.opcalls.len());
        let mut errors = MultiError::new();
        for oc in &plan.opcalls {
            log::trace!("{:?}: running `{}` at {}", phase, oc.operator, oc.where_);
            if let Err(e) = self.run_opcall(oc) {
                errors.push(format!("at {}: {}", oc.where_, e));
            }
        }
        errors.into_result().map_err(WeaveError::Multi)
    }

    /// MergePhase -> ParamPhase -> EvalPhase, per spec.md §4.9. A
    /// `ParamPhase` failure normally aborts the run; with
    /// `continue_after_param_errors` set it is downgraded to a warning
    /// and `EvalPhase` still runs.
    pub fn evaluate_all(&mut self) -> Result<(), WeaveError> {
        self.evaluate_phase(Phase::MergePhase)?;

        if let Err(e) = self.evaluate_phase(Phase::ParamPhase) {
            if !self.options.continue_after_param_errors {
                return Err(e);
            }
            log::debug!("continuing to EvalPhase despite ParamPhase errors: {}", e);
            self.warnings.push(e.to_string());
        }

        if self.options.skip_eval {
            log::debug!("skip_eval set: not running EvalPhase");
            return Ok(());
        }
        self.evaluate_phase(Phase::EvalPhase)?;

        let mut residual = Vec::new();
        find_residual_expressions(&self.tree, &Cursor::root(), &mut residual);
        for path in residual {
            self.warn(format!(
                "at {}: an operator-call-shaped string remains unresolved after evaluation",
                path
            ));
        }
        Ok(())
    }
}

/// Environment variable values are plain strings. spec.md §3/§4.5 pins a
/// narrow heuristic for when to re-parse one as YAML instead of keeping
/// it verbatim: only when its first non-space character is `{`, `[`, or
/// `-`, or the whole trimmed value is exactly `true`/`false`/`null` — a
/// bare `"42"` or `"v1.2.3"` is left as a string rather than silently
/// becoming a number. Even then, the parsed result is only used when it
/// isn't itself a plain string (a quoted scalar like `"- a"` re-parsing
/// back to a string gains nothing).
fn reparse_env_value(raw: &str) -> Value {
    let trimmed = raw.trim_start();
    let triggers = matches!(trimmed.chars().next(), Some('{') | Some('[') | Some('-'))
        || matches!(raw.trim(), "true" | "false" | "null");
    if !triggers {
        return Value::String(raw.to_string());
    }
    match serde_yaml::from_str::<serde_yaml::Value>(raw) {
        Ok(v) => match from_serde_yaml(v) {
            Value::String(_) => Value::String(raw.to_string()),
            parsed => parsed,
        },
        Err(_) => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod envvar_tests {
    use super::*;
    use crate::merge::MergeMetadata;
    use crate::registry::builtin_registry;
    use crate::value::from_serde_yaml;

    #[test]
    fn plain_scalar_stays_a_string() {
        assert_eq!(reparse_env_value("42"), Value::String("42".into()));
        assert_eq!(reparse_env_value("v1.2.3"), Value::String("v1.2.3".into()));
    }

    #[test]
    fn bracketed_and_keyword_preludes_reparse() {
        assert_eq!(reparse_env_value("[1, 2]"), Value::Sequence(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(reparse_env_value("{a: 1}"), {
            let mut m = crate::value::Mapping::new();
            m.insert(crate::value::ScalarKey::String("a".into()), Value::Int(1));
            Value::Mapping(m)
        });
        assert_eq!(reparse_env_value("true"), Value::Bool(true));
        assert_eq!(reparse_env_value("-3"), Value::Int(-3));
    }

    #[test]
    fn unset_env_var_resolves_to_empty_string_not_an_error() {
        // spec.md §4.5: "empty string if unset" — LogicalOr must treat
        // this as a concrete value and short-circuit, not fall through.
        std::env::remove_var("WEAVE_TEST_UNSET_VAR_XYZ");
        let yaml = "out: (( grab $WEAVE_TEST_UNSET_VAR_XYZ || \"fallback\" ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let mut ev = Evaluator::new(tree, builtin_registry(), EngineOptions::default(), MergeMetadata::new());
        ev.evaluate_all().unwrap();
        let out = ev.tree().as_mapping().unwrap().get(&crate::value::ScalarKey::String("out".into())).unwrap();
        assert_eq!(out.as_str(), Some(""));
    }
}

#[cfg(test)]
mod invariant_tests {
    use super::*;
    use crate::registry::builtin_registry;
    use crate::value::from_serde_yaml;

    #[test]
    fn fully_evaluated_tree_has_no_residual_expressions() {
        let yaml = "meta:\n  foo: hi\nbar: (( grab meta.foo ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let mut ev = Evaluator::new(tree, builtin_registry(), EngineOptions::default(), MergeMetadata::new());
        ev.evaluate_all().unwrap();
        assert!(ev.warnings().is_empty());
    }

    #[test]
    fn param_phase_continuation_leaves_a_residual_warning() {
        let yaml = "domain: (( param \"you must specify this\" ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let mut options = EngineOptions::default();
        options.continue_after_param_errors = true;
        let mut ev = Evaluator::new(tree, builtin_registry(), options, MergeMetadata::new());
        ev.evaluate_all().unwrap();
        assert!(ev.warnings().iter().any(|w| w.contains("unresolved")));
    }
}
