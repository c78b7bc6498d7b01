//! Operator Registry: name -> [`Operator`] mapping, frozen at process
//! initialization (spec.md §4.6, §5).

use std::sync::Arc;

use fnv::FnvHashMap;
use lazy_static::lazy_static;

use crate::operator::Operator;
use crate::ops;

/// A read-only, process-wide operator table. Cheap to clone (an `Arc`
/// around the underlying map), matching spec.md §5's "read-mostly map,
/// one-shot registration... frozen" requirement; post-freeze mutation is
/// intentionally impossible to express (there is no `insert` on
/// `Registry`, only on [`RegistryBuilder`]).
#[derive(Clone)]
pub struct Registry {
    operators: Arc<FnvHashMap<String, Arc<dyn Operator>>>,
}

impl Registry {
    pub fn get(&self, name: &str) -> Option<Arc<dyn Operator>> {
        self.operators.get(name).cloned()
    }

    pub fn is_operator(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }
}

pub struct RegistryBuilder {
    operators: FnvHashMap<String, Arc<dyn Operator>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        RegistryBuilder { operators: FnvHashMap::default() }
    }

    pub fn register(mut self, name: &str, op: Arc<dyn Operator>) -> Self {
        op.setup();
        self.operators.insert(name.to_string(), op);
        self
    }

    pub fn freeze(self) -> Registry {
        Registry { operators: Arc::new(self.operators) }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the registry of core operators every implementation must
/// provide (spec.md §4.6).
pub fn builtin_registry() -> Registry {
    RegistryBuilder::new()
        .register("grab", Arc::new(ops::grab::Grab))
        .register("concat", Arc::new(ops::concat::Concat))
        .register("keys", Arc::new(ops::keys::Keys))
        .register("param", Arc::new(ops::param::Param))
        .register("prune", Arc::new(ops::prune::Prune))
        .register("sort", Arc::new(ops::sort::Sort))
        .register("inject", Arc::new(ops::inject::Inject))
        .register("cartesian-product", Arc::new(ops::cartesian_product::CartesianProduct))
        .register("join", Arc::new(ops::join::Join))
        .register("static_ips", Arc::new(ops::static_ips::StaticIps))
        .register("vault", Arc::new(ops::vault::Vault))
        .freeze()
}

lazy_static! {
    /// The process-wide default registry. `Document`/`Engine` use this
    /// unless constructed with a custom [`Registry`] (the documented
    /// extension seam for operators this crate does not itself ship,
    /// e.g. a real external-secret backend).
    pub static ref DEFAULT_REGISTRY: Registry = builtin_registry();
}
