use crate::error::OperatorError;
use crate::eval::Evaluator;
use crate::operator::{Operator, Phase, Response};
use crate::parser::Expr;
use crate::value::Value;

/// `concat ARG ARG ...` — string-concatenates the stringified form of
/// every argument (spec.md §4.6).
pub struct Concat;

impl Operator for Concat {
    fn phase(&self) -> Phase {
        Phase::EvalPhase
    }

    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, OperatorError> {
        let mut out = String::new();
        for a in args {
            let v = ev
                .evaluate_expr(a)
                .map_err(|e| OperatorError::BadArgs { operator: "concat".into(), message: e.to_string() })?;
            out.push_str(&v.stringify());
        }
        Ok(Response::Replace(Value::String(out)))
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
    fn concat_joins_stringified_args() {
        let yaml = "test: \"a\"\nnl: (( concat test \"-b\" ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let mut ev = Evaluator::new(tree, builtin_registry(), EngineOptions::default(), MergeMetadata::new());
        ev.evaluate_all().unwrap();
        let nl = ev.tree().as_mapping().unwrap().get(&crate::value::ScalarKey::String("nl".into())).unwrap();
        assert_eq!(nl.as_str(), Some("a-b"));
    }
}
