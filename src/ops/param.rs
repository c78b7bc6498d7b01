use crate::error::OperatorError;
use crate::eval::Evaluator;
use crate::operator::{Operator, Phase, Response};
use crate::parser::Expr;
use crate::value::Value;

/// `param "msg"` — always fails in `ParamPhase`, marking a required
/// override that hasn't been supplied; the message is preserved
/// verbatim (spec.md §4.6, §4.9 step 4).
pub struct Param;

impl Operator for Param {
    fn phase(&self) -> Phase {
        Phase::ParamPhase
    }

    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, OperatorError> {
        let message = match args.first() {
            Some(Expr::Literal(Value::String(s))) => s.clone(),
            Some(other) => ev.evaluate_expr(other).map(|v| v.stringify()).unwrap_or_else(|e| e.to_string()),
            None => "this value must be specified".to_string(),
        };
        Err(OperatorError::BadArgs { operator: "param".into(), message })
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
    fn param_fails_with_message_preserved() {
        let yaml = "meta:\n  domain: (( param \"you must specify this\" ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let mut ev = Evaluator::new(tree, builtin_registry(), EngineOptions::default(), MergeMetadata::new());
        let err = ev.evaluate_all().unwrap_err();
        assert!(err.to_string().contains("you must specify this"));
    }
}
