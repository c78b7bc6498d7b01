use itertools::Itertools;

use crate::error::OperatorError;
use crate::eval::Evaluator;
use crate::operator::{Operator, Phase, Response};
use crate::parser::Expr;
use crate::value::Value;

/// `join SEP LIST` — join the stringified elements of `LIST` with
/// `SEP` (spec.md §4.6).
pub struct Join;

impl Operator for Join {
    fn phase(&self) -> Phase {
        Phase::EvalPhase
    }

    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, OperatorError> {
        if args.len() != 2 {
            return Err(OperatorError::BadArgs {
                operator: "join".into(),
                message: "expects exactly two arguments: a separator and a list".into(),
            });
        }
        let sep = ev
            .evaluate_expr(&args[0])
            .map_err(|e| OperatorError::BadArgs { operator: "join".into(), message: e.to_string() })?
            .stringify();
        let list = ev
            .evaluate_expr(&args[1])
            .map_err(|e| OperatorError::BadArgs { operator: "join".into(), message: e.to_string() })?;
        let items = list.as_sequence().ok_or_else(|| OperatorError::BadArgs {
            operator: "join".into(),
            message: format!("expected a list, found {}", list.type_name()),
        })?;
        let joined = items.iter().map(|v| v.stringify()).join(&sep);
        Ok(Response::Replace(Value::String(joined)))
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
    fn join_joins_stringified_elements() {
        let yaml = "items:\n  - a\n  - b\n  - c\nout: (( join \"-\" items ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let mut ev = Evaluator::new(tree, builtin_registry(), EngineOptions::default(), MergeMetadata::new());
        ev.evaluate_all().unwrap();
        let out = ev.tree().as_mapping().unwrap().get(&crate::value::ScalarKey::String("out".into())).unwrap();
        assert_eq!(out.as_str(), Some("a-b-c"));
    }
}
