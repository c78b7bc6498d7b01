//! Dependency Analyzer: builds the per-phase dataflow graph over operator
//! call sites and topologically orders them (spec.md §4.8).

use fnv::{FnvHashMap, FnvHashSet};

use crate::cursor::Cursor;
use crate::error::CycleError;
use crate::operator::{Opcall, Phase};
use crate::parser::{parse_expression, split_operator_target, Expr};
use crate::registry::Registry;
use crate::tokenizer::{expression_body, is_expression};
use crate::value::Value;

/// Walk `root`, collect every string leaf that looks like an expression,
/// and return it paired with the cursor that addresses it.
fn walk_strings(value: &Value, path: &Cursor, out: &mut Vec<(Cursor, String)>) {
    match value {
        Value::String(s) if is_expression(s) => out.push((path.clone(), s.clone())),
        Value::Mapping(m) => {
            for (k, v) in m {
                walk_strings(v, &path.push(k.as_path_segment()), out);
            }
        }
        Value::Sequence(seq) => {
            for (i, v) in seq.iter().enumerate() {
                walk_strings(v, &path.push(i.to_string()), out);
            }
        }
        _ => {}
    }
}

fn always_succeeds(e: &Expr) -> bool {
    matches!(e, Expr::Literal(_) | Expr::EnvVar(_))
}

/// Collect every path `Reference` appearing in `expr`, honoring the
/// short-circuit rule: once a `LogicalOr` operand is guaranteed to
/// terminate the fallback chain (a literal or env-var), later operands'
/// references are not included (spec.md §4.8).
pub fn collect_refs(expr: &Expr, out: &mut Vec<Cursor>) {
    match expr {
        Expr::Reference(c) => out.push(c.clone()),
        Expr::Literal(_) | Expr::EnvVar(_) => {}
        Expr::OperatorCall(_, args) => {
            for a in args {
                collect_refs(a, out);
            }
        }
        Expr::LogicalOr(l, r) => {
            collect_refs(l, out);
            if !always_succeeds(l) {
                collect_refs(r, out);
            }
        }
    }
}

fn is_within(ancestor: &Cursor, descendant: &Cursor) -> bool {
    ancestor.segments.len() <= descendant.segments.len()
        && ancestor.segments[..] == descendant.segments[..ancestor.segments.len()]
}

/// Parse the opcall (if any) located at `path` whose source text is `s`,
/// keeping only calls whose operator's phase matches `target_phase`.
/// Per spec.md §4.4, a phase mismatch is not an error: the parser simply
/// reports there is no opcall here for this pass. A bare reference or
/// fallback chain with no operator call is treated as belonging to
/// `Phase::EvalPhase`, the natural default for "just resolve this".
pub fn parse_opcall_for_phase(
    path: &Cursor,
    s: &str,
    registry: &Registry,
    target_phase: Phase,
) -> Option<Result<Opcall, crate::error::ParseError>> {
    let body = expression_body(s);
    let is_operator = |name: &str| registry.is_operator(name);
    let expr = match parse_expression(body, &is_operator) {
        Ok(e) => e,
        Err(e) => return Some(Err(e)),
    };
    let phase = match &expr {
        Expr::OperatorCall(name, _) => {
            let (base, _) = split_operator_target(name);
            match registry.get(base) {
                Some(op) => op.phase(),
                None => {
                    return Some(Err(crate::error::ParseError::Syntax(format!(
                        "unknown operator {:?} at `{}`",
                        base, path
                    ))))
                }
            }
        }
        _ => Phase::EvalPhase,
    };
    if phase != target_phase {
        return None;
    }
    let (operator, target, args) = match expr {
        Expr::OperatorCall(name, args) => {
            let (base, target) = split_operator_target(&name);
            (base.to_string(), target.map(|t| t.to_string()), args)
        }
        other => ("grab".to_string(), None, vec![other]),
    };
    Some(Ok(Opcall::new(operator, target, args, path.clone(), s.to_string())))
}

/// Full dataflow ordering for a single phase.
pub struct Plan {
    pub opcalls: Vec<Opcall>,
}

/// Compute the dataflow-ordered list of opcalls for `phase` over `tree`.
pub fn analyze(
    tree: &Value,
    registry: &Registry,
    phase: Phase,
) -> Result<Plan, crate::error::WeaveError> {
    let mut found = Vec::new();
    walk_strings(tree, &Cursor::root(), &mut found);

    let mut opcalls = Vec::new();
    for (path, s) in found {
        match parse_opcall_for_phase(&path, &s, registry, phase) {
            None => {}
            Some(Ok(oc)) => opcalls.push(oc),
            Some(Err(e)) => return Err(e.into()),
        }
    }

    let order = topo_sort(&opcalls, tree, registry)?;
    let ordered = order.into_iter().map(|i| opcalls[i].clone()).collect();
    Ok(Plan { opcalls: ordered })
}

/// Kahn's algorithm, tie-broken by insertion order, with full-cycle
/// reporting on failure (spec.md §4.8 steps 3-5).
fn topo_sort(opcalls: &[Opcall], tree: &Value, registry: &Registry) -> Result<Vec<usize>, CycleError> {
    let n = opcalls.len();
    // edges[i] = set of indices that must run before i (i depends on them)
    let mut depends_on: Vec<FnvHashSet<usize>> = vec![FnvHashSet::default(); n];

    for (i, oc) in opcalls.iter().enumerate() {
        let mut refs = Vec::new();
        for a in &oc.args {
            collect_refs(a, &mut refs);
        }
        // Let the operator augment its dependency set with locations it
        // reads but doesn't take as an explicit argument (e.g.
        // `static_ips` reading the enclosing job's network names).
        if let Some(op) = registry.get(&oc.operator) {
            refs = op.dependencies(tree, &oc.args, &oc.where_, refs);
        }
        for (j, other) in opcalls.iter().enumerate() {
            if i == j {
                continue;
            }
            // An edge fires whether `other` writes at an ancestor of a
            // read path (`other.where_` within `d`) or at a descendant
            // of one (`d` within `other.where_`, e.g. a read of `meta`
            // when `other` writes `meta.color`) — either way `other`
            // must resolve before `i` can safely read through it
            // (spec.md §4.8 step 3).
            if refs.iter().any(|d| is_within(&other.where_, d) || is_within(d, &other.where_)) {
                depends_on[i].insert(j);
            }
        }
    }

    // out_edges[j] = { i : j must run before i }
    let mut out_edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];
    for (i, deps) in depends_on.iter().enumerate() {
        indegree[i] = deps.len();
        for &j in deps {
            out_edges[j].push(i);
        }
    }

    let mut ready: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    let mut remaining_indegree = indegree.clone();

    while !ready.is_empty() {
        ready.sort_unstable();
        let next = ready.remove(0);
        order.push(next);
        for &succ in &out_edges[next] {
            remaining_indegree[succ] -= 1;
            if remaining_indegree[succ] == 0 {
                ready.push(succ);
            }
        }
    }

    if order.len() != n {
        let in_cycle: Vec<usize> = (0..n).filter(|i| !order.contains(i)).collect();
        let cycle = find_cycle(&in_cycle, &depends_on);
        let path = cycle
            .iter()
            .map(|&i| opcalls[i].where_.to_string())
            .collect();
        return Err(CycleError { path });
    }

    Ok(order)
}

fn find_cycle(candidates: &[usize], depends_on: &[FnvHashSet<usize>]) -> Vec<usize> {
    let set: FnvHashSet<usize> = candidates.iter().copied().collect();
    let mut visited = FnvHashMap::default();
    let start = candidates[0];
    // Simple DFS cycle extraction restricted to the candidate set.
    fn dfs(
        node: usize,
        set: &FnvHashSet<usize>,
        depends_on: &[FnvHashSet<usize>],
        visiting: &mut Vec<usize>,
        visited: &mut FnvHashMap<usize, bool>,
    ) -> Option<Vec<usize>> {
        if let Some(pos) = visiting.iter().position(|&n| n == node) {
            return Some(visiting[pos..].to_vec());
        }
        if visited.get(&node).copied().unwrap_or(false) {
            return None;
        }
        visiting.push(node);
        for &dep in &depends_on[node] {
            if set.contains(&dep) {
                if let Some(cycle) = dfs(dep, set, depends_on, visiting, visited) {
                    return Some(cycle);
                }
            }
        }
        visiting.pop();
        visited.insert(node, true);
        None
    }
    let mut visiting = Vec::new();
    dfs(start, &set, depends_on, &mut visiting, &mut visited).unwrap_or_else(|| vec![start])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::builtin_registry;
    use crate::value::from_serde_yaml;

    #[test]
    fn simple_dependency_order() {
        let yaml = "meta:\n  foo: hi\n  bar: (( grab meta.foo ))\n  boz: (( grab meta.foo ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let reg = builtin_registry();
        let plan = analyze(&tree, &reg, Phase::EvalPhase).unwrap();
        let paths: Vec<String> = plan.opcalls.iter().map(|o| o.where_.to_string()).collect();
        assert_eq!(paths, vec!["meta.bar", "meta.boz"]);
    }

    #[test]
    fn ordering_respects_reads_of_an_ancestor_of_a_writer() {
        // `theme` reads the whole `meta` mapping, which contains an
        // unresolved opcall at `meta.color`; `meta.color` must run
        // first even though it is textually *below* `theme` and its
        // own write path is a descendant, not an ancestor, of the read
        // path `theme` depends on (spec.md §4.8 step 3).
        let yaml = "params:\n  color: blue\nmeta:\n  color: (( grab params.color ))\ntheme: (( grab meta ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let reg = builtin_registry();
        let plan = analyze(&tree, &reg, Phase::EvalPhase).unwrap();
        let paths: Vec<String> = plan.opcalls.iter().map(|o| o.where_.to_string()).collect();
        assert_eq!(paths, vec!["meta.color", "theme"]);
    }

    #[test]
    fn cycle_is_detected() {
        let yaml = "a: (( grab b ))\nb: (( grab c ))\nc: (( grab a ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let reg = builtin_registry();
        let err = analyze(&tree, &reg, Phase::EvalPhase).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("a"));
        assert!(msg.contains("b"));
        assert!(msg.contains("c"));
    }
}
