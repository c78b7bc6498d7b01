use crate::error::OperatorError;
use crate::eval::Evaluator;
use crate::operator::{Operator, Phase, Response};
use crate::parser::Expr;

/// `inject PATH` — splices the mapping at `PATH` into the call site's
/// parent mapping, call-site keys winning on conflict (spec.md §4.6,
/// applied by [`crate::eval::Evaluator::evaluate_phase`]'s
/// `Response::Inject` handling).
pub struct Inject;

impl Operator for Inject {
    fn phase(&self) -> Phase {
        Phase::MergePhase
    }

    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, OperatorError> {
        let arg = args
            .first()
            .ok_or_else(|| OperatorError::BadArgs { operator: "inject".into(), message: "expects a path".into() })?;
        let value = ev
            .evaluate_expr(arg)
            .map_err(|e| OperatorError::BadArgs { operator: "inject".into(), message: e.to_string() })?;
        if value.as_mapping().is_none() {
            return Err(OperatorError::BadArgs {
                operator: "inject".into(),
                message: format!("expected a mapping at the injection source, found {}", value.type_name()),
            });
        }
        Ok(Response::Inject(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::EngineOptions;
    use crate::merge::MergeMetadata;
    use crate::registry::builtin_registry;
    use crate::value::{from_serde_yaml, ScalarKey};

    #[test]
    fn inject_splices_with_call_site_precedence() {
        let yaml = "base:\n  a: 1\n  b: 2\njob:\n  defaults: (( inject base ))\n  b: 99\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let mut ev = Evaluator::new(tree, builtin_registry(), EngineOptions::default(), MergeMetadata::new());
        ev.evaluate_all().unwrap();
        let job = ev.tree().as_mapping().unwrap().get(&ScalarKey::String("job".into())).unwrap();
        let job = job.as_mapping().unwrap();
        assert!(!job.contains_key(&ScalarKey::String("defaults".into())));
        assert_eq!(job.get(&ScalarKey::String("a".into())).unwrap(), &crate::value::Value::Int(1));
        assert_eq!(job.get(&ScalarKey::String("b".into())).unwrap(), &crate::value::Value::Int(99));
    }
}
