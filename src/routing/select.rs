//! Proposal selection: minimum-cost exact cover of the output endpoints.
//!
//! Every candidate proposal, taken together with its ancestors, covers a
//! set of output endpoints at a summed cost. Selection assigns each
//! output a bit and runs a subset-split dynamic program: `best[s]` is the
//! cheapest way to cover exactly the outputs in `s`, refined by trying
//! every split of `s` into two nonempty halves. Infinity is absorbing, so
//! uncoverable sets stay uncoverable.
//!
//! Two covers for disjoint output sets can never share an ancestor
//! proposal — an ancestor's own output is on every descendant's set — so
//! concatenating their proposal lists never duplicates work.

use super::proposal::{ProposalArena, ProposalId};
use crate::endpoint::OutputId;
use std::collections::HashMap;

const INFINITE: u64 = u64::MAX;

/// Pick the minimum-cost set of proposals covering every output.
///
/// Returns the selected proposals (each listed with its ancestors,
/// root-first) or an empty list when no combination covers all outputs —
/// the caller then leaves the outputs unconnected.
pub fn select_proposals(arena: &ProposalArena, outputs: &[OutputId]) -> Vec<ProposalId> {
    if outputs.is_empty() {
        return Vec::new();
    }
    debug_assert!(outputs.len() < usize::BITS as usize);
    if outputs.len() > 16 {
        tracing::warn!(
            outputs = outputs.len(),
            "selection is exponential in the output count"
        );
    }

    let bit_of: HashMap<OutputId, usize> = outputs
        .iter()
        .enumerate()
        .map(|(bit, id)| (*id, bit))
        .collect();

    let full = (1usize << outputs.len()) - 1;
    let mut best: Vec<u64> = vec![INFINITE; full + 1];
    let mut selected: Vec<Vec<ProposalId>> = vec![Vec::new(); full + 1];

    // Seed with every candidate's ancestor-chain coverage. Strict
    // comparison keeps the first (earliest-generated) candidate on ties.
    for id in arena.ids() {
        let mut covered = 0usize;
        let mut cost = 0u64;
        let mut chain = Vec::new();
        for (ancestor_id, ancestor) in arena.ancestors(id) {
            if let Some(bit) = bit_of.get(&ancestor.output) {
                covered |= 1 << bit;
            }
            cost = cost.saturating_add(ancestor.cost);
            chain.push(ancestor_id);
        }
        chain.reverse();

        if cost < best[covered] {
            best[covered] = cost;
            selected[covered] = chain;
        }
    }

    // Split every set into two halves in every possible way; keep the
    // cheaper combination.
    for set in 1..=full {
        let mut subset = set;
        while subset != 0 {
            let other = set ^ subset;
            if best[subset] != INFINITE && best[other] != INFINITE {
                let combined = best[subset].saturating_add(best[other]);
                if combined < best[set] {
                    let mut chain = selected[subset].clone();
                    chain.extend_from_slice(&selected[other]);
                    best[set] = combined;
                    selected[set] = chain;
                }
            }
            subset = (subset - 1) & set;
        }
    }

    if best[full] == INFINITE {
        tracing::warn!("no proposal set covers every output");
        return Vec::new();
    }

    tracing::debug!(
        cost = best[full],
        proposals = selected[full].len(),
        "selected proposal cover"
    );
    selected[full].clone()
}
