//! The operator ABI every operator implementation satisfies (spec.md §3,
//! §4.6).

use crate::cursor::Cursor;
use crate::error::OperatorError;
use crate::eval::Evaluator;
use crate::parser::Expr;
use crate::value::Value;

/// Phases call [`Operator::dependencies`] with the merged tree as it
/// stood before this phase began, not a live `Evaluator` — the analyzer
/// runs once, up front, to compute an execution order, before any
/// opcall in the phase has actually run.

/// The phase an operator call is eligible to run in (spec.md §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    MergePhase,
    ParamPhase,
    EvalPhase,
}

/// What an operator's [`Operator::run`] produced, and how it should be
/// applied back into the tree (spec.md §3, §4.9 step 2).
#[derive(Debug, Clone)]
pub enum Response {
    /// Overwrite the call-site value outright.
    Replace(Value),
    /// Splice a mapping into the call-site's parent mapping, call-site
    /// keys winning on conflict (used by `inject`).
    Inject(Value),
}

/// The polymorphic unit every operator implements.
pub trait Operator: Send + Sync {
    /// Optional one-time initialization; most operators need none.
    fn setup(&self) {}

    fn phase(&self) -> Phase;

    /// Tree locations whose prior resolution this call depends on.
    /// `auto_locs` is pre-populated by the analyzer with references
    /// explicitly present in `args`; an operator may augment it (e.g.
    /// `static_ips` adds the enclosing job's `networks.*.name` path).
    fn dependencies(
        &self,
        _tree: &Value,
        _args: &[Expr],
        _where_: &Cursor,
        auto_locs: Vec<Cursor>,
    ) -> Vec<Cursor> {
        auto_locs
    }

    /// Run the operator. The call site is available via `ev.where_()`
    /// for operators (like `static_ips`) that need to know their own
    /// tree position rather than just their evaluated arguments.
    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, OperatorError>;
}

/// A parsed operator invocation bound to its call site (spec.md §3
/// `Opcall`).
#[derive(Debug, Clone)]
pub struct Opcall {
    /// Base operator name, with any `@target`/`:target` suffix split off.
    pub operator: String,
    pub target: Option<String>,
    pub args: Vec<Expr>,
    pub where_: Cursor,
    pub source: String,
}

impl Opcall {
    pub fn new(operator: String, target: Option<String>, args: Vec<Expr>, where_: Cursor, source: String) -> Self {
        Opcall { operator, target, args, where_, source }
    }
}
