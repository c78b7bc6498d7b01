use crate::error::OperatorError;
use crate::eval::Evaluator;
use crate::operator::{Operator, Phase, Response};
use crate::parser::Expr;
use crate::value::Value;

/// `prune` sentinel (spec.md §4.6). Most `(( prune ))` occurrences are
/// already intercepted during merge (`merge.rs`'s call-site-preserving
/// special case); this operator exists for the remaining case where a
/// `(( prune ))` string reaches `MergePhase` untouched — a single
/// document with no overlay ever replacing it. It records the call
/// site and leaves the existing value in place.
pub struct Prune;

impl Operator for Prune {
    fn phase(&self) -> Phase {
        Phase::MergePhase
    }

    fn run(&self, ev: &mut Evaluator, _args: &[Expr]) -> Result<Response, OperatorError> {
        let where_ = ev.where_();
        ev.metadata_mut().add_prune(where_.to_string());
        let existing = where_.resolve(ev.tree()).map(|v| v.clone()).unwrap_or(Value::Null);
        Ok(Response::Replace(existing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::EngineOptions;
    use crate::merge::MergeMetadata;
    use crate::registry::builtin_registry;
    use crate::value::from_serde_yaml;

    #[test]
    fn lone_prune_is_recorded_during_merge_phase() {
        let yaml = "meta:\n  secret: (( prune ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let mut ev = Evaluator::new(tree, builtin_registry(), EngineOptions::default(), MergeMetadata::new());
        ev.evaluate_phase(Phase::MergePhase).unwrap();
        assert_eq!(ev.metadata().prune_paths(), &["meta.secret".to_string()]);
    }
}
