use crate::cursor::Cursor;
use crate::error::OperatorError;
use crate::eval::Evaluator;
use crate::operator::{Operator, Phase, Response};
use crate::parser::Expr;
use crate::value::{ScalarKey, Value};

/// `static_ips i j k ...` — one of the three exemplar operators named
/// in spec.md §4.6 as essential to showing how [`Operator::dependencies`]
/// augments the analyzer's automatic reference collection: the
/// enclosing job's network `name` is read but never appears in the
/// call's own arguments.
///
/// The offsets select entries from the named network's address pool;
/// since no subnet/CIDR model is specified, pool entries are rendered
/// as `"{network}.{offset}"` placeholders rather than real IPv4
/// addresses — a deliberately narrow stand-in for the unspecified
/// addressing scheme.
pub struct StaticIps;

impl Operator for StaticIps {
    fn phase(&self) -> Phase {
        Phase::EvalPhase
    }

    fn dependencies(&self, tree: &Value, _args: &[Expr], where_: &Cursor, mut auto_locs: Vec<Cursor>) -> Vec<Cursor> {
        if let Some(ctx) = locate(tree, where_) {
            auto_locs.push(ctx.name_path);
        }
        auto_locs
    }

    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, OperatorError> {
        let where_ = ev.where_();
        let ctx = locate(ev.tree(), &where_).ok_or_else(|| {
            OperatorError::StaticIpAllocation(
                "static_ips must be used on a job network with a `name`, under a job with `instances`".into(),
            )
        })?;

        let mut offsets = Vec::with_capacity(args.len());
        for a in args {
            let v = ev
                .evaluate_expr(a)
                .map_err(|e| OperatorError::BadArgs { operator: "static_ips".into(), message: e.to_string() })?;
            match v {
                Value::Int(i) => offsets.push(i),
                other => {
                    return Err(OperatorError::BadArgs {
                        operator: "static_ips".into(),
                        message: format!("expected an integer offset, found {}", other.type_name()),
                    })
                }
            }
        }

        if (offsets.len() as i64) < ctx.instances {
            return Err(OperatorError::StaticIpAllocation(format!(
                "{} offset(s) given but the job requires {} instance(s)",
                offsets.len(),
                ctx.instances
            )));
        }

        let mut ips = Vec::with_capacity(ctx.instances as usize);
        for &offset in offsets.iter().take(ctx.instances as usize) {
            ev.reserve_static_ip(&ctx.network_name, offset)?;
            ips.push(Value::String(format!("{}.{}", ctx.network_name, offset)));
        }
        Ok(Response::Replace(Value::Sequence(ips)))
    }
}

struct JobNetworkContext {
    instances: i64,
    network_name: String,
    name_path: Cursor,
}

/// Walk upward from `where_`, collecting the nearest `name` field (the
/// enclosing network) and the nearest `instances` field (the enclosing
/// job) found along the way.
fn locate(tree: &Value, where_: &Cursor) -> Option<JobNetworkContext> {
    let mut network_name = None;
    let mut name_path = None;
    let mut instances = None;

    for depth in (0..where_.segments.len()).rev() {
        let prefix = Cursor { segments: where_.segments[..depth].to_vec() };
        let node = prefix.resolve(tree).ok()?;
        let m = match node.as_mapping() {
            Some(m) => m,
            None => continue,
        };
        if network_name.is_none() {
            if let Some(n) = m.get(&ScalarKey::String("name".into())).and_then(|v| v.as_str()) {
                network_name = Some(n.to_string());
                name_path = Some(prefix.push("name"));
            }
        }
        if let Some(Value::Int(i)) = m.get(&ScalarKey::String("instances".into())) {
            instances = Some(*i);
            break;
        }
    }

    Some(JobNetworkContext { instances: instances?, network_name: network_name?, name_path: name_path? })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::EngineOptions;
    use crate::merge::MergeMetadata;
    use crate::registry::builtin_registry;
    use crate::value::from_serde_yaml;

    #[test]
    fn static_ips_assigns_one_per_instance() {
        let yaml = "jobs:\n  - name: web\n    instances: 2\n    networks:\n      - name: net1\n        static_ips: (( static_ips 4 5 6 ))\n";
        let tree = from_serde_yaml(serde_yaml::from_str(yaml).unwrap());
        let mut ev = Evaluator::new(tree, builtin_registry(), EngineOptions::default(), MergeMetadata::new());
        ev.evaluate_all().unwrap();
        let jobs = ev.tree().as_mapping().unwrap().get(&ScalarKey::String("jobs".into())).unwrap();
        let job0 = &jobs.as_sequence().unwrap()[0];
        let networks = job0.as_mapping().unwrap().get(&ScalarKey::String("networks".into())).unwrap();
        let net0 = &networks.as_sequence().unwrap()[0];
        let ips = net0.as_mapping().unwrap().get(&ScalarKey::String("static_ips".into())).unwrap();
        let ips: Vec<&str> = ips.as_sequence().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(ips, vec!["net1.4", "net1.5"]);
    }
}
