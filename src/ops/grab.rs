use crate::error::OperatorError;
use crate::eval::Evaluator;
use crate::operator::{Operator, Phase, Response};
use crate::parser::Expr;
use crate::value::Value;

/// `grab PATH [|| ...]` (spec.md §4.6). With one argument, replaces the
/// call site with the resolved value; with more than one, replaces it
/// with a sequence of the resolved values, in argument order.
pub struct Grab;

impl Operator for Grab {
    fn phase(&self) -> Phase {
        Phase::EvalPhase
    }

    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, OperatorError> {
        if args.is_empty() {
            return Err(OperatorError::BadArgs { operator: "grab".into(), message: "expects at least one path".into() });
        }
        let mut values = Vec::with_capacity(args.len());
        for a in args {
            let v = ev
                .evaluate_expr(a)
                .map_err(|e| OperatorError::BadArgs { operator: "grab".into(), message: e.to_string() })?;
            values.push(v);
        }
        if values.len() == 1 {
            Ok(Response::Replace(values.into_iter().next().unwrap()))
        } else {
            Ok(Response::Replace(Value::Sequence(values)))
        }
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
    fn grab_resolves_a_path() {
        let yaml = "meta:\n  foo: bar\n  copy: (( grab meta.foo ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let mut ev = Evaluator::new(tree, builtin_registry(), EngineOptions::default(), MergeMetadata::new());
        ev.evaluate_all().unwrap();
        let meta = ev.tree().as_mapping().unwrap().get(&crate::value::ScalarKey::String("meta".into())).unwrap();
        let copy = meta.as_mapping().unwrap().get(&crate::value::ScalarKey::String("copy".into())).unwrap();
        assert_eq!(copy.as_str(), Some("bar"));
    }

    #[test]
    fn grab_falls_back_on_missing_path() {
        let yaml = "meta:\n  domain: (( grab meta.missing || \"default-domain\" ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let mut ev = Evaluator::new(tree, builtin_registry(), EngineOptions::default(), MergeMetadata::new());
        ev.evaluate_all().unwrap();
        let meta = ev.tree().as_mapping().unwrap().get(&crate::value::ScalarKey::String("meta".into())).unwrap();
        let domain = meta.as_mapping().unwrap().get(&crate::value::ScalarKey::String("domain".into())).unwrap();
        assert_eq!(domain.as_str(), Some("default-domain"));
    }
}
