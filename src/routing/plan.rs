//! Proposal generator: breadth-first layering of candidate routes.
//!
//! Layer 0 holds direct input→output proposals. Each later layer branches
//! off the intermediate steps of the previous layer's proposals, so shared
//! prefixes are discovered before the selector ever runs. Generation
//! stops when a layer yields nothing.
//!
//! Per route — a (parent attachment point, output endpoint) pair — at
//! most one proposal is kept: passthrough when viable, otherwise the
//! first costed proposal yielded at the shortest viable chain length.
//! This keeps planning deterministic and replans stable for unchanged
//! configurations.

use super::generate::ChainGenerator;
use super::index::FactoryIndex;
use super::proposal::{ProposalArena, ProposalId, ProposalParent};
use super::sandbox::ChainTester;
use super::MAX_CHAIN_LENGTH;
use crate::caps::Caps;
use crate::endpoint::{InputId, OutputId};
use crate::policy::{Policy, TransformRoute};

/// Generates the proposal arena for one planning pass.
pub struct Planner<'a> {
    index: &'a FactoryIndex,
    policy: &'a Policy,
    inputs: &'a [(InputId, Caps)],
    outputs: &'a [(OutputId, Caps)],
}

impl<'a> Planner<'a> {
    /// Create a planner over concrete input caps and output accepted
    /// caps.
    pub fn new(
        index: &'a FactoryIndex,
        policy: &'a Policy,
        inputs: &'a [(InputId, Caps)],
        outputs: &'a [(OutputId, Caps)],
    ) -> Self {
        Self {
            index,
            policy,
            inputs,
            outputs,
        }
    }

    /// Run the layered generation and return every proposal produced.
    pub fn generate(&self) -> ProposalArena {
        let mut arena = ProposalArena::new();
        let mut tester = ChainTester::new(self.policy);

        // Layer 0: direct proposals for every (output, input) pair.
        let mut layer: Vec<ProposalId> = Vec::new();
        for (output, accepted) in self.outputs {
            for (input, sink_caps) in self.inputs {
                if let Some(id) = self.propose(
                    &mut arena,
                    &mut tester,
                    ProposalParent::Input(*input),
                    sink_caps,
                    *output,
                    accepted,
                ) {
                    layer.push(id);
                }
            }
        }

        // Later layers: branches off every step of the previous layer.
        while !layer.is_empty() {
            let previous = std::mem::take(&mut layer);
            tracing::trace!(proposals = previous.len(), "branching off previous layer");

            for (output, accepted) in self.outputs {
                for &parent_id in &previous {
                    if arena.output_on_ancestor_chain(parent_id, *output) {
                        continue;
                    }

                    for step in 0..arena.get(parent_id).steps.len() {
                        let sink_caps = arena.get(parent_id).steps[step].src_caps.clone();
                        if let Some(id) = self.propose(
                            &mut arena,
                            &mut tester,
                            ProposalParent::Branch {
                                proposal: parent_id,
                                step,
                            },
                            &sink_caps,
                            *output,
                            accepted,
                        ) {
                            layer.push(id);
                        }
                    }
                }
            }
        }

        tracing::debug!(proposals = arena.len(), "proposal generation finished");
        arena
    }

    /// Produce at most one proposal for a single route.
    ///
    /// Passthrough is tried first; failing that, chain lengths are tried
    /// in increasing order and the first chain that negotiates wins.
    fn propose(
        &self,
        arena: &mut ProposalArena,
        tester: &mut ChainTester<'_>,
        parent: ProposalParent,
        sink_caps: &Caps,
        output: OutputId,
        accepted: &Caps,
    ) -> Option<ProposalId> {
        let route = TransformRoute {
            sink_caps,
            src_caps: accepted,
        };
        if !self.policy.validate_route(&route) {
            return None;
        }

        if let Some(proposal) =
            ChainTester::try_passthrough(parent, sink_caps, accepted, output)
        {
            return Some(arena.push(proposal));
        }

        for length in 1..=MAX_CHAIN_LENGTH {
            let mut generator = ChainGenerator::new(length);
            while let Some(chain) = generator.next_valid(self.index, |candidate| {
                self.policy.validate_chain(sink_caps, accepted, candidate)
            }) {
                if let Some(proposal) =
                    tester.try_chain(&chain, sink_caps, accepted, parent, output)
                {
                    return Some(arena.push(proposal));
                }
            }
        }

        None
    }
}
