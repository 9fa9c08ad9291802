//! Policy hooks: the per-domain configuration surface.
//!
//! Rather than subclassing, a domain tailors the bin by handing it a
//! [`Policy`] — a record of optional closures plus the one required hook,
//! the factory catalog provider. Everything not supplied falls back to
//! the core behavior: routes are allowed, chains run the default
//! validator composition, and every step costs 1.
//!
//! ```rust
//! use autoroute::policy::Policy;
//!
//! let policy = Policy::with_factories(|| Vec::new())
//!     .with_step_cost(|_step| 2)
//!     .with_route_validator(|route| !route.sink_caps.is_empty());
//! # let _ = policy;
//! ```

use crate::caps::Caps;
use crate::element::ElementFactory;
use crate::error::{Error, Result};
use crate::routing::index::FactoryEntry;
use crate::routing::proposal::TransformationStep;
use crate::routing::validate;
use std::fmt;
use std::sync::Arc;

/// A transformation route under consideration: the caps offered on the
/// sink side and the caps the destination endpoint accepts.
pub struct TransformRoute<'a> {
    /// Caps flowing into the route.
    pub sink_caps: &'a Caps,
    /// Caps the destination accepts.
    pub src_caps: &'a Caps,
}

type CatalogFn = Box<dyn Fn() -> Vec<Arc<dyn ElementFactory>> + Send + Sync>;
type RouteFn = Box<dyn Fn(&TransformRoute<'_>) -> bool + Send + Sync>;
type ChainFn = Box<dyn Fn(&Caps, &Caps, &[&FactoryEntry]) -> Option<usize> + Send + Sync>;
type CostFn = Box<dyn Fn(&TransformationStep) -> u32 + Send + Sync>;
type BuildFn = Box<dyn FnMut() + Send>;

/// The policy record handed to the bin at construction.
#[derive(Default)]
pub struct Policy {
    catalog: Option<CatalogFn>,
    route_validator: Option<RouteFn>,
    chain_validator: Option<ChainFn>,
    step_cost: Option<CostFn>,
    build_hook: Option<BuildFn>,
}

impl Policy {
    /// Create a policy with the required catalog provider.
    pub fn with_factories<F>(catalog: F) -> Self
    where
        F: Fn() -> Vec<Arc<dyn ElementFactory>> + Send + Sync + 'static,
    {
        Self {
            catalog: Some(Box::new(catalog)),
            ..Default::default()
        }
    }

    /// Replace the route validator (default: every route is allowed).
    pub fn with_route_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&TransformRoute<'_>) -> bool + Send + Sync + 'static,
    {
        self.route_validator = Some(Box::new(validator));
        self
    }

    /// Replace the chain validator composition (default:
    /// [`validate::default_validate`]).
    pub fn with_chain_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Caps, &Caps, &[&FactoryEntry]) -> Option<usize> + Send + Sync + 'static,
    {
        self.chain_validator = Some(Box::new(validator));
        self
    }

    /// Replace the per-step cost function (default: 1 per step).
    pub fn with_step_cost<F>(mut self, cost: F) -> Self
    where
        F: Fn(&TransformationStep) -> u32 + Send + Sync + 'static,
    {
        self.step_cost = Some(Box::new(cost));
        self
    }

    /// Install a hook invoked when a caps-complete planning pass begins,
    /// before any proposal is generated. Derived policies use it to
    /// snapshot pre-planning state.
    pub fn with_build_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.build_hook = Some(Box::new(hook));
        self
    }

    /// Fetch the factory catalog.
    ///
    /// Fails with [`Error::PolicyMissing`] when no provider was
    /// configured — the one policy hook that is not optional.
    pub fn factories(&self) -> Result<Vec<Arc<dyn ElementFactory>>> {
        match &self.catalog {
            Some(catalog) => Ok(catalog()),
            None => Err(Error::PolicyMissing),
        }
    }

    /// Whether a transformation route may be considered at all.
    pub fn validate_route(&self, route: &TransformRoute<'_>) -> bool {
        match &self.route_validator {
            Some(validator) => validator(route),
            None => true,
        }
    }

    /// Run the chain validator composition.
    pub fn validate_chain(
        &self,
        sink_caps: &Caps,
        src_caps: &Caps,
        chain: &[&FactoryEntry],
    ) -> Option<usize> {
        match &self.chain_validator {
            Some(validator) => validator(sink_caps, src_caps, chain),
            None => validate::default_validate(sink_caps, src_caps, chain),
        }
    }

    /// Cost of one transformation step.
    pub fn cost_step(&self, step: &TransformationStep) -> u32 {
        match &self.step_cost {
            Some(cost) => cost(step),
            None => 1,
        }
    }

    /// Invoke the pre-planning hook, if any.
    pub fn begin_building_graph(&mut self) {
        if let Some(hook) = &mut self.build_hook {
            hook();
        }
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("catalog", &self.catalog.is_some())
            .field("route_validator", &self.route_validator.is_some())
            .field("chain_validator", &self.chain_validator.is_some())
            .field("step_cost", &self.step_cost.is_some())
            .field("build_hook", &self.build_hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_catalog_is_fatal() {
        let policy = Policy::default();
        assert!(matches!(policy.factories(), Err(Error::PolicyMissing)));
    }

    #[test]
    fn test_defaults() {
        let policy = Policy::with_factories(Vec::new);
        assert!(policy.factories().unwrap().is_empty());

        let caps = Caps::new_empty();
        assert!(policy.validate_route(&TransformRoute {
            sink_caps: &caps,
            src_caps: &caps,
        }));
    }

    #[test]
    fn test_build_hook_runs() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let mut policy =
            Policy::with_factories(Vec::new).with_build_hook(move || {
                seen.fetch_add(1, Ordering::Relaxed);
            });

        policy.begin_building_graph();
        policy.begin_building_graph();
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
