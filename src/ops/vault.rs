use crate::error::OperatorError;
use crate::eval::Evaluator;
use crate::operator::{Operator, Phase, Response};
use crate::parser::Expr;

/// External secret backends are out of scope (spec.md §1); this stub
/// documents the extension seam instead of pretending to reach one.
/// A real deployment registers its own [`Operator`] under this name
/// (or a custom one) via [`crate::registry::RegistryBuilder`].
pub struct Vault;

impl Operator for Vault {
    fn phase(&self) -> Phase {
        Phase::EvalPhase
    }

    fn run(&self, _ev: &mut Evaluator, _args: &[Expr]) -> Result<Response, OperatorError> {
        Err(OperatorError::Unimplemented {
            operator: "vault".into(),
            detail: "no external secret backend is configured".into(),
        })
    }
}
