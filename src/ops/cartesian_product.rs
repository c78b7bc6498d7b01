use itertools::Itertools;

use crate::error::OperatorError;
use crate::eval::Evaluator;
use crate::operator::{Operator, Phase, Response};
use crate::parser::Expr;
use crate::value::Value;

/// `cartesian-product A [SEP] B [SEP] ...` — all combinations of
/// elements drawn from each list argument, joined in sequence with any
/// interleaved string separators; an empty list input yields an empty
/// result (spec.md §4.6).
pub struct CartesianProduct;

enum Part {
    List(Vec<Value>),
    Sep(String),
}

impl Operator for CartesianProduct {
    fn phase(&self) -> Phase {
        Phase::EvalPhase
    }

    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, OperatorError> {
        let mut parts = Vec::with_capacity(args.len());
        for a in args {
            let v = ev
                .evaluate_expr(a)
                .map_err(|e| OperatorError::BadArgs { operator: "cartesian-product".into(), message: e.to_string() })?;
            match v {
                Value::Sequence(items) => parts.push(Part::List(items)),
                Value::String(s) => parts.push(Part::Sep(s)),
                other => {
                    return Err(OperatorError::BadArgs {
                        operator: "cartesian-product".into(),
                        message: format!("expected a list or a string separator, found {}", other.type_name()),
                    })
                }
            }
        }

        if parts.iter().any(|p| matches!(p, Part::List(l) if l.is_empty())) {
            return Ok(Response::Replace(Value::Sequence(Vec::new())));
        }

        let lists: Vec<&Vec<Value>> = parts.iter().filter_map(|p| match p {
            Part::List(l) => Some(l),
            Part::Sep(_) => None,
        }).collect();

        let out = if lists.is_empty() {
            Vec::new()
        } else {
            lists
                .into_iter()
                .map(|l| l.iter())
                .multi_cartesian_product()
                .map(|combo| Value::String(render(&parts, combo)))
                .collect()
        };
        Ok(Response::Replace(Value::Sequence(out)))
    }
}

/// Re-assemble one cartesian-product combination, threading its drawn
/// list elements back through the original positions of any interleaved
/// separator arguments.
fn render<'a>(parts: &[Part], combo: Vec<&'a Value>) -> String {
    let mut values = combo.into_iter();
    let mut out = String::new();
    for part in parts {
        match part {
            Part::Sep(s) => out.push_str(s),
            Part::List(_) => out.push_str(&values.next().expect("one value per list part").stringify()),
        }
    }
    out
}
