use crate::error::OperatorError;
use crate::eval::Evaluator;
use crate::operator::{Operator, Phase, Response};
use crate::parser::Expr;
use crate::value::Value;

/// `sort [by KEY]` sentinel (spec.md §4.6). As with [`super::prune`],
/// the common path through `merge.rs` already records the path and key
/// when a sort marker replaces prior content; this operator covers a
/// bare `(( sort ))`/`(( sort by KEY ))` that survives to `MergePhase`
/// untouched.
pub struct Sort;

impl Operator for Sort {
    fn phase(&self) -> Phase {
        Phase::MergePhase
    }

    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, OperatorError> {
        let key = extract_key(args)?;
        let where_ = ev.where_();
        ev.metadata_mut().add_sort(where_.to_string(), key);
        let existing = where_.resolve(ev.tree()).map(|v| v.clone()).unwrap_or(Value::Null);
        Ok(Response::Replace(existing))
    }
}

/// `sort`'s arguments come from the general whitespace-arglist parser
/// (`by` and `KEY` each become bare `Reference`/`Literal` nodes, since
/// neither is a registered operator) rather than a dedicated grammar,
/// so the shape is matched directly instead of evaluated as paths.
fn extract_key(args: &[Expr]) -> Result<String, OperatorError> {
    match args {
        [] => Ok(String::new()),
        [Expr::Reference(by), Expr::Reference(key)] if by.to_string() == "by" => Ok(key.to_string()),
        [Expr::Reference(by), Expr::Literal(Value::String(key))] if by.to_string() == "by" => Ok(key.clone()),
        _ => Err(OperatorError::BadArgs { operator: "sort".into(), message: "expected `sort` or `sort by KEY`".into() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_key_handles_bare_and_by_form() {
        assert_eq!(extract_key(&[]).unwrap(), "");
    }
}
