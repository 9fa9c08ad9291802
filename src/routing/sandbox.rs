//! Chain tester: instantiates candidates in a sandbox and costs them.
//!
//! A candidate chain that survives validation is still only plausible —
//! its template caps intersect pairwise, but nothing guarantees the
//! elements can settle on concrete caps end to end. The tester acquires
//! real element instances from a per-planning-pass cache, drives the
//! negotiation protocol through the whole chain against a synthetic
//! downstream endpoint, and reads the fixated per-step caps back out. A
//! chain that negotiates becomes a costed [`Proposal`]; one that does not
//! is dropped without a trace.
//!
//! Instances are parented to the planning pass, never to the live graph:
//! the cache hands out idle instances, marks them in use for the duration
//! of one test, and takes them back reset on every exit path.

use super::index::FactoryEntry;
use super::proposal::{Proposal, ProposalParent, TransformationStep};
use crate::caps::Caps;
use crate::element::{Element, ElementFactory};
use crate::endpoint::OutputId;
use crate::policy::Policy;
use std::collections::HashMap;
use std::sync::Arc;

/// One cached sandbox instance.
struct CacheSlot {
    /// Taken out while leased; restored on release.
    element: Option<Box<dyn Element>>,
    in_use: bool,
}

/// A leased element together with its cache coordinates.
struct Lease {
    factory: Arc<dyn ElementFactory>,
    slot: usize,
    element: Box<dyn Element>,
}

/// Cache of idle sandbox elements, keyed by factory name.
///
/// Chains frequently share factories, and a chain may even contain the
/// same factory twice (non-adjacently), so the cache keeps a vector of
/// instances per factory and an explicit in-use flag per instance.
#[derive(Default)]
pub struct ElementCache {
    slots: HashMap<String, Vec<CacheSlot>>,
}

impl ElementCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of cached instances, in use or idle.
    pub fn instance_count(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }

    fn acquire(&mut self, factory: &Arc<dyn ElementFactory>) -> Lease {
        let slots = self.slots.entry(factory.name().to_string()).or_default();

        let slot = match slots.iter().position(|s| !s.in_use) {
            Some(slot) => slot,
            None => {
                slots.push(CacheSlot {
                    element: Some(factory.create()),
                    in_use: false,
                });
                slots.len() - 1
            }
        };

        slots[slot].in_use = true;
        let element = slots[slot]
            .element
            .take()
            .unwrap_or_else(|| factory.create());

        Lease {
            factory: Arc::clone(factory),
            slot,
            element,
        }
    }

    fn release(&mut self, mut lease: Lease) {
        lease.element.reset();
        if let Some(slots) = self.slots.get_mut(lease.factory.name()) {
            if let Some(slot) = slots.get_mut(lease.slot) {
                slot.element = Some(lease.element);
                slot.in_use = false;
            }
        }
    }
}

/// Tests candidate chains and turns survivors into costed proposals.
pub struct ChainTester<'a> {
    policy: &'a Policy,
    cache: ElementCache,
}

impl<'a> ChainTester<'a> {
    /// Create a tester for one planning pass.
    pub fn new(policy: &'a Policy) -> Self {
        Self {
            policy,
            cache: ElementCache::new(),
        }
    }

    /// Expose the cache for instrumentation.
    pub fn cache(&self) -> &ElementCache {
        &self.cache
    }

    /// Check whether a zero-step proposal is viable: the offered caps
    /// must intersect what the destination endpoint accepts.
    pub fn try_passthrough(
        parent: ProposalParent,
        sink_caps: &Caps,
        accepted: &Caps,
        output: OutputId,
    ) -> Option<Proposal> {
        sink_caps.intersects(accepted).then(|| Proposal {
            parent,
            output,
            steps: Vec::new(),
            cost: 0,
        })
    }

    /// Instantiate `chain` in the sandbox and cost it.
    ///
    /// `chain` comes from the enumerator in src-first order; `sink_caps`
    /// is the concrete caps offered on the chain's sink end and
    /// `accepted` is what the destination endpoint takes. Returns `None`
    /// on any negotiation failure.
    pub fn try_chain(
        &mut self,
        chain: &[&FactoryEntry],
        sink_caps: &Caps,
        accepted: &Caps,
        parent: ProposalParent,
        output: OutputId,
    ) -> Option<Proposal> {
        // Acquire instances in sink-first order: leases[0] is the chain
        // head that receives the route's sink caps.
        let mut leases: Vec<Lease> = chain
            .iter()
            .rev()
            .map(|entry| self.cache.acquire(entry.factory()))
            .collect();

        let steps = drive_negotiation(&mut leases, chain, sink_caps, accepted);

        for lease in leases {
            self.cache.release(lease);
        }

        let steps = steps?;
        let cost = steps
            .iter()
            .map(|step| u64::from(self.policy.cost_step(step)))
            .sum();

        Some(Proposal {
            parent,
            output,
            steps,
            cost,
        })
    }
}

/// Link the leased elements head-to-tail, check the head accepts the
/// offered caps, drive negotiation downstream, and read back the fixated
/// per-step caps.
fn drive_negotiation(
    leases: &mut [Lease],
    chain: &[&FactoryEntry],
    sink_caps: &Caps,
    accepted: &Caps,
) -> Option<Vec<TransformationStep>> {
    let len = leases.len();
    debug_assert!(len > 0);

    // What each element's downstream peer accepts, computed from the
    // synthetic endpoint backwards. accepted_by[i] is the downstream
    // constraint seen by the element at sink-first position i.
    let mut accepted_by: Vec<Caps> = vec![Caps::new_empty(); len + 1];
    accepted_by[len] = accepted.clone();
    for i in (0..len).rev() {
        accepted_by[i] = leases[i].element.query_sink_caps(&accepted_by[i + 1]);
        if accepted_by[i].is_empty() {
            return None;
        }
    }

    // The head must accept what the route offers.
    if !accepted_by[0].intersects(sink_caps) {
        return None;
    }

    // Inject the sink caps at the head and negotiate downstream.
    let mut current = sink_caps.clone();
    for i in 0..len {
        let element = &mut leases[i].element;
        if !element.negotiate(&current, &accepted_by[i + 1]) {
            return None;
        }
        current = element.src_caps()?.clone();
    }

    // Every step must have fixated caps on both sides.
    let mut steps = Vec::with_capacity(len);
    for (i, lease) in leases.iter().enumerate() {
        let step_sink = lease.element.sink_caps()?;
        let step_src = lease.element.src_caps()?;
        if !step_sink.is_fixed() || !step_src.is_fixed() {
            return None;
        }

        // chain is src-first; leases are sink-first.
        let entry = chain[len - 1 - i];
        steps.push(TransformationStep {
            factory: Arc::clone(entry.factory()),
            sink_caps: step_sink.clone(),
            src_caps: step_src.clone(),
        });
    }

    Some(steps)
}
