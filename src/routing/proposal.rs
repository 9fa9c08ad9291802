//! Costed proposals and the arena that owns them.
//!
//! A proposal is one candidate answer for one output endpoint: a chain of
//! transformation steps rooted either directly on an input endpoint or on
//! an intermediate step of another proposal (a branch). Proposals form a
//! forest; parent links are arena handles rather than pointers, so the
//! whole planning pass shares one allocation and tear-down is trivial.

use crate::caps::Caps;
use crate::element::ElementFactory;
use crate::endpoint::{InputId, OutputId};
use std::fmt;
use std::sync::Arc;

/// Handle to a proposal inside a [`ProposalArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProposalId(u32);

impl ProposalId {
    /// The underlying index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a proposal's chain hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalParent {
    /// Rooted directly on an input endpoint.
    Input(InputId),
    /// Branched off step `step` of another proposal.
    Branch {
        /// The parent proposal.
        proposal: ProposalId,
        /// Index of the parent step whose output feeds this branch.
        step: usize,
    },
}

/// One concrete position of an instantiated chain.
///
/// Steps are ordered from the sink end: `steps[0]` receives the parent's
/// stream. Caps on both sides are fixated — they were read back from a
/// successfully negotiated sandbox element.
pub struct TransformationStep {
    /// Factory that creates this step's element.
    pub factory: Arc<dyn ElementFactory>,
    /// Fixated caps accepted on the sink side.
    pub sink_caps: Caps,
    /// Fixated caps produced on the src side.
    pub src_caps: Caps,
}

impl fmt::Debug for TransformationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformationStep")
            .field("factory", &self.factory.name())
            .field("sink_caps", &format_args!("{}", self.sink_caps))
            .field("src_caps", &format_args!("{}", self.src_caps))
            .finish()
    }
}

/// A costed candidate route for one output endpoint.
///
/// Zero steps means passthrough: the parent's stream connects directly to
/// the output. The cost covers this proposal's own steps only; selection
/// sums costs along the ancestor chain.
#[derive(Debug)]
pub struct Proposal {
    /// Where the chain's input comes from.
    pub parent: ProposalParent,
    /// The output endpoint this proposal feeds.
    pub output: OutputId,
    /// Transformation steps, sink end first.
    pub steps: Vec<TransformationStep>,
    /// Cost of this proposal's own steps.
    pub cost: u64,
}

/// Arena owning every proposal of one planning pass.
#[derive(Default)]
pub struct ProposalArena {
    nodes: Vec<Proposal>,
}

impl ProposalArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a proposal, returning its handle.
    pub fn push(&mut self, proposal: Proposal) -> ProposalId {
        let id = ProposalId(self.nodes.len() as u32);
        self.nodes.push(proposal);
        id
    }

    /// Look up a proposal.
    pub fn get(&self, id: ProposalId) -> &Proposal {
        &self.nodes[id.index()]
    }

    /// Number of proposals.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Handles of every proposal, in generation order.
    pub fn ids(&self) -> impl Iterator<Item = ProposalId> + '_ {
        (0..self.nodes.len() as u32).map(ProposalId)
    }

    /// Walk from `id` to the root, yielding each proposal on the way
    /// (including `id` itself).
    pub fn ancestors(&self, id: ProposalId) -> Ancestors<'_> {
        Ancestors {
            arena: self,
            next: Some(id),
        }
    }

    /// The input endpoint at the root of `id`'s ancestor chain.
    pub fn root_input(&self, id: ProposalId) -> InputId {
        let mut current = id;
        loop {
            match self.get(current).parent {
                ProposalParent::Input(input) => return input,
                ProposalParent::Branch { proposal, .. } => current = proposal,
            }
        }
    }

    /// Whether `output` is already fed by a proposal on `id`'s ancestor
    /// chain (including `id` itself).
    ///
    /// Branch generation uses this to keep ancestor chains acyclic over
    /// output endpoints.
    pub fn output_on_ancestor_chain(&self, id: ProposalId, output: OutputId) -> bool {
        self.ancestors(id).any(|(_, p)| p.output == output)
    }
}

/// Iterator over a proposal's ancestor chain.
pub struct Ancestors<'a> {
    arena: &'a ProposalArena,
    next: Option<ProposalId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = (ProposalId, &'a Proposal);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let proposal = self.arena.get(id);
        self.next = match proposal.parent {
            ProposalParent::Input(_) => None,
            ProposalParent::Branch { proposal, .. } => Some(proposal),
        };
        Some((id, proposal))
    }
}
