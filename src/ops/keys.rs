use crate::error::OperatorError;
use crate::eval::Evaluator;
use crate::operator::{Operator, Phase, Response};
use crate::parser::Expr;
use crate::value::ScalarKey;

/// `keys MAP [MAP ...]` — sorted union of keys across the given
/// mappings (spec.md §4.6).
pub struct Keys;

impl Operator for Keys {
    fn phase(&self) -> Phase {
        Phase::EvalPhase
    }

    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, OperatorError> {
        if args.is_empty() {
            return Err(OperatorError::BadArgs { operator: "keys".into(), message: "expects at least one mapping".into() });
        }
        let mut union: Vec<ScalarKey> = Vec::new();
        for a in args {
            let v = ev
                .evaluate_expr(a)
                .map_err(|e| OperatorError::BadArgs { operator: "keys".into(), message: e.to_string() })?;
            let m = v.as_mapping().ok_or_else(|| OperatorError::BadArgs {
                operator: "keys".into(),
                message: format!("expected a mapping, found {}", v.type_name()),
            })?;
            for k in m.keys() {
                if !union.contains(k) {
                    union.push(k.clone());
                }
            }
        }
        union.sort();
        Ok(Response::Replace(crate::value::Value::Sequence(union.into_iter().map(|k| k.as_value()).collect())))
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
    fn keys_union_is_sorted_and_deduped() {
        let yaml = "a:\n  z: 1\n  a: 2\nb:\n  a: 3\n  m: 4\nu: (( keys a b ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let mut ev = Evaluator::new(tree, builtin_registry(), EngineOptions::default(), MergeMetadata::new());
        ev.evaluate_all().unwrap();
        let u = ev.tree().as_mapping().unwrap().get(&ScalarKey::String("u".into())).unwrap();
        let names: Vec<&str> = u.as_sequence().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "m", "z"]);
    }
}
