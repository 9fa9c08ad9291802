//! Live graph: the materialized form of a selected proposal set.
//!
//! The instantiator turns selected proposals into a DAG of negotiated
//! elements. Fan-out is explicit: a splitter node sits on every input
//! endpoint that feeds more than one proposal and after every chain step
//! that parents a branch. Inputs nothing consumes terminate in a null
//! sink so upstream producers keep flowing.
//!
//! Buffers entering an input endpoint walk the DAG edge by edge, cloned
//! at fan-out points; events walk the same topology without touching the
//! elements. The graph does no scheduling of its own — delivery happens
//! on the caller's thread, which is all the drain protocol needs.

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{Element, NullSink, Splitter};
use crate::endpoint::{InputId, OutputId};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::routing::proposal::{ProposalArena, ProposalId, ProposalParent};
use daggy::{Dag, NodeIndex, Walker};
use std::collections::{HashMap, HashSet};

enum GraphNode {
    Element {
        label: String,
        element: Box<dyn Element>,
    },
    Output(OutputId),
}

impl GraphNode {
    fn label(&self) -> String {
        match self {
            GraphNode::Element { label, .. } => label.clone(),
            GraphNode::Output(output) => format!("output:{}", output.index()),
        }
    }
}

/// The materialized conversion graph.
pub struct LiveGraph {
    dag: Dag<GraphNode, ()>,
    entries: HashMap<InputId, NodeIndex>,
    element_seq: u32,
}

impl LiveGraph {
    fn new() -> Self {
        Self {
            dag: Dag::new(),
            entries: HashMap::new(),
            element_seq: 0,
        }
    }

    fn add_element(&mut self, name: &str, element: Box<dyn Element>) -> NodeIndex {
        let label = format!("{name}:{}", self.element_seq);
        self.element_seq += 1;
        self.dag.add_node(GraphNode::Element { label, element })
    }

    fn link(&mut self, from: NodeIndex, to: NodeIndex) -> Result<()> {
        self.dag
            .add_edge(from, to, ())
            .map(|_| ())
            .map_err(|_| Error::Instantiation("graph link would create a cycle".into()))
    }

    fn children(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.dag.children(node).iter(&self.dag).map(|(_, n)| n).collect()
    }

    /// Number of nodes, outputs included.
    pub fn node_count(&self) -> usize {
        self.dag.node_count()
    }

    /// Outputs reachable from some input, i.e. those that will see the
    /// drain marker.
    pub fn connected_outputs(&self) -> Vec<OutputId> {
        let mut outputs = Vec::new();
        for index in 0..self.dag.node_count() {
            let node = NodeIndex::new(index);
            if let Some(GraphNode::Output(output)) = self.dag.node_weight(node) {
                if self.dag.parents(node).iter(&self.dag).next().is_some() {
                    outputs.push(*output);
                }
            }
        }
        outputs.sort();
        outputs
    }

    /// Push a buffer in at `input`, returning what reached which output.
    pub fn push_buffer(
        &mut self,
        input: InputId,
        buffer: Buffer,
    ) -> Result<Vec<(OutputId, Buffer)>> {
        let mut delivered = Vec::new();
        let Some(&entry) = self.entries.get(&input) else {
            return Ok(delivered);
        };

        let mut work = vec![(entry, buffer)];
        while let Some((node, buffer)) = work.pop() {
            let forwarded = match self.dag.node_weight_mut(node) {
                Some(GraphNode::Element { element, label }) => element
                    .process(buffer)
                    .map_err(|e| Error::Processing(format!("{label}: {e}")))?,
                Some(GraphNode::Output(output)) => {
                    delivered.push((*output, buffer));
                    None
                }
                None => None,
            };

            if let Some(buffer) = forwarded {
                for child in self.children(node) {
                    work.push((child, buffer.clone()));
                }
            }
        }

        Ok(delivered)
    }

    /// Push an event in at `input`, returning the outputs it reached.
    ///
    /// Events travel the topology without being processed by elements.
    pub fn push_event(&self, input: InputId, _event: &Event) -> Vec<OutputId> {
        let mut reached = Vec::new();
        let Some(&entry) = self.entries.get(&input) else {
            return reached;
        };

        let mut work = vec![entry];
        let mut seen = HashSet::new();
        while let Some(node) = work.pop() {
            if !seen.insert(node) {
                continue;
            }
            match self.dag.node_weight(node) {
                Some(GraphNode::Output(output)) => reached.push(*output),
                Some(GraphNode::Element { .. }) => work.extend(self.children(node)),
                None => {}
            }
        }

        reached.sort();
        reached
    }

    /// A stable textual description of the topology, one edge per line.
    ///
    /// Two graphs built from identical plans describe identically, which
    /// is how tests assert replans are structurally stable.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();

        let mut inputs: Vec<(&InputId, &NodeIndex)> = self.entries.iter().collect();
        inputs.sort_by_key(|(input, _)| **input);
        for (input, node) in inputs {
            if let Some(weight) = self.dag.node_weight(*node) {
                lines.push(format!("input:{} -> {}", input.index(), weight.label()));
            }
        }

        for edge in self.dag.graph().raw_edges() {
            let from = self.dag.node_weight(edge.source());
            let to = self.dag.node_weight(edge.target());
            if let (Some(from), Some(to)) = (from, to) {
                lines.push(format!("{} -> {}", from.label(), to.label()));
            }
        }

        lines
    }
}

impl std::fmt::Debug for LiveGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveGraph")
            .field("nodes", &self.dag.node_count())
            .field("edges", &self.dag.edge_count())
            .finish()
    }
}

/// Materialize the selected proposals into a live graph.
///
/// `inputs` carries every input endpoint with its concrete caps. Fails
/// only on instantiation errors, which are fatal for the planning pass.
pub fn build_graph(
    arena: &ProposalArena,
    selected: &[ProposalId],
    inputs: &[(InputId, Caps)],
) -> Result<LiveGraph> {
    let mut graph = LiveGraph::new();

    // Who consumes each input, and which steps fan out into branches.
    let mut consumers: HashMap<InputId, u32> = HashMap::new();
    let mut branch_points: HashSet<(ProposalId, usize)> = HashSet::new();
    for &id in selected {
        match arena.get(id).parent {
            ProposalParent::Input(input) => *consumers.entry(input).or_insert(0) += 1,
            ProposalParent::Branch { proposal, step } => {
                branch_points.insert((proposal, step));
            }
        }
    }

    // Fan-out on an input endpoint gets a splitter; a single consumer
    // connects directly.
    let mut input_splitter: HashMap<InputId, NodeIndex> = HashMap::new();
    for (input, caps) in inputs {
        if consumers.get(input).copied().unwrap_or(0) > 1 {
            let mut splitter = Splitter::new();
            splitter.negotiate(caps, caps);
            let node = graph.add_element("splitter", Box::new(splitter));
            input_splitter.insert(*input, node);
            graph.entries.insert(*input, node);
        }
    }

    // Materialize every chain. Parents precede their branches in
    // generation order, so the splitter a branch hangs off always exists
    // by the time the branch is built.
    let mut ordered: Vec<ProposalId> = selected.to_vec();
    ordered.sort_by_key(|id| id.index());

    let mut splitter_at: HashMap<(ProposalId, usize), NodeIndex> = HashMap::new();
    let mut output_node: HashMap<OutputId, NodeIndex> = HashMap::new();

    for id in ordered {
        let proposal = arena.get(id);

        let mut upstream: Option<NodeIndex> = match proposal.parent {
            ProposalParent::Input(input) => input_splitter.get(&input).copied(),
            ProposalParent::Branch { proposal, step } => {
                Some(*splitter_at.get(&(proposal, step)).ok_or_else(|| {
                    Error::Instantiation("branch parent has no splitter".into())
                })?)
            }
        };
        let mut first_node = None;

        for (step_index, step) in proposal.steps.iter().enumerate() {
            let mut element = step.factory.create();
            if !element.negotiate(&step.sink_caps, &step.src_caps) {
                return Err(Error::Instantiation(format!(
                    "element '{}' rejected its planned caps",
                    step.factory.name()
                )));
            }

            let node = graph.add_element(step.factory.name(), element);
            match upstream {
                Some(from) => graph.link(from, node)?,
                None => first_node = Some(node),
            }
            upstream = Some(node);

            if branch_points.contains(&(id, step_index)) {
                let mut splitter = Splitter::new();
                splitter.negotiate(&step.src_caps, &step.src_caps);
                let splitter_node = graph.add_element("splitter", Box::new(splitter));
                graph.link(node, splitter_node)?;
                splitter_at.insert((id, step_index), splitter_node);
                upstream = Some(splitter_node);
            }
        }

        let out_node = *output_node
            .entry(proposal.output)
            .or_insert_with(|| graph.dag.add_node(GraphNode::Output(proposal.output)));

        match upstream {
            Some(from) => graph.link(from, out_node)?,
            // Lone passthrough: the input endpoint connects straight to
            // the output.
            None => first_node = Some(out_node),
        }

        if let ProposalParent::Input(input) = proposal.parent {
            if !input_splitter.contains_key(&input) {
                let entry = first_node
                    .ok_or_else(|| Error::Instantiation("chain head missing".into()))?;
                graph.entries.insert(input, entry);
            }
        }
    }

    // Terminate inputs nothing consumes.
    for (input, caps) in inputs {
        if !graph.entries.contains_key(input) {
            let mut sink = NullSink::new();
            sink.negotiate(caps, caps);
            let node = graph.add_element("nullsink", Box::new(sink));
            graph.entries.insert(*input, node);
        }
    }

    tracing::debug!(
        nodes = graph.dag.node_count(),
        edges = graph.dag.edge_count(),
        "live graph built"
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::CapsStructure;
    use crate::element::{ElementFactory, TransformFactory};
    use crate::routing::proposal::{Proposal, TransformationStep};
    use std::sync::Arc;

    fn caps(format: &str) -> Caps {
        Caps::from(CapsStructure::new("video/raw").with_field("format", format))
    }

    fn step(name: &str, sink: &str, src: &str) -> TransformationStep {
        let factory: Arc<dyn ElementFactory> = Arc::new(TransformFactory::new(
            name,
            "Converter",
            caps(sink),
            caps(src),
        ));
        TransformationStep {
            factory,
            sink_caps: caps(sink),
            src_caps: caps(src),
        }
    }

    fn inputs() -> Vec<(InputId, Caps)> {
        vec![(InputId(0), caps("rgb"))]
    }

    #[test]
    fn test_lone_passthrough_has_no_splitter() {
        let mut arena = ProposalArena::new();
        arena.push(Proposal {
            parent: ProposalParent::Input(InputId(0)),
            output: OutputId(0),
            steps: Vec::new(),
            cost: 0,
        });
        let selected: Vec<ProposalId> = arena.ids().collect();

        let mut graph = build_graph(&arena, &selected, &inputs()).unwrap();

        let description = graph.describe();
        assert_eq!(description, vec!["input:0 -> output:0".to_string()]);

        let delivered = graph.push_buffer(InputId(0), Buffer::from_sequence(1)).unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, OutputId(0));
    }

    #[test]
    fn test_single_chain_direct_link() {
        let mut arena = ProposalArena::new();
        arena.push(Proposal {
            parent: ProposalParent::Input(InputId(0)),
            output: OutputId(0),
            steps: vec![step("rgb2yuv", "rgb", "yuv")],
            cost: 1,
        });
        let selected: Vec<ProposalId> = arena.ids().collect();

        let mut graph = build_graph(&arena, &selected, &inputs()).unwrap();
        let description = graph.describe();
        assert!(description.contains(&"input:0 -> rgb2yuv:0".to_string()));
        assert!(description.contains(&"rgb2yuv:0 -> output:0".to_string()));

        let delivered = graph.push_buffer(InputId(0), Buffer::from_sequence(9)).unwrap();
        assert_eq!(delivered[0].1.sequence(), 9);
    }

    #[test]
    fn test_branch_point_gets_splitter() {
        let mut arena = ProposalArena::new();
        let root = arena.push(Proposal {
            parent: ProposalParent::Input(InputId(0)),
            output: OutputId(1),
            steps: vec![step("rgb2yuv", "rgb", "yuv"), step("yuv2h264", "yuv", "h264")],
            cost: 2,
        });
        arena.push(Proposal {
            parent: ProposalParent::Branch {
                proposal: root,
                step: 0,
            },
            output: OutputId(0),
            steps: Vec::new(),
            cost: 0,
        });
        let selected: Vec<ProposalId> = arena.ids().collect();

        let mut graph = build_graph(&arena, &selected, &inputs()).unwrap();
        let description = graph.describe();
        assert!(description.contains(&"rgb2yuv:0 -> splitter:1".to_string()));
        assert!(description.contains(&"splitter:1 -> yuv2h264:2".to_string()));
        assert!(description.contains(&"splitter:1 -> output:0".to_string()));

        // One buffer in, one copy per output.
        let delivered = graph.push_buffer(InputId(0), Buffer::from_sequence(0)).unwrap();
        assert_eq!(delivered.len(), 2);
    }

    #[test]
    fn test_unconsumed_input_gets_nullsink() {
        let arena = ProposalArena::new();
        let mut graph = build_graph(&arena, &[], &inputs()).unwrap();

        assert_eq!(graph.describe(), vec!["input:0 -> nullsink:0".to_string()]);
        let delivered = graph.push_buffer(InputId(0), Buffer::from_sequence(0)).unwrap();
        assert!(delivered.is_empty());
        assert!(graph.connected_outputs().is_empty());
    }

    #[test]
    fn test_shared_input_gets_splitter() {
        let mut arena = ProposalArena::new();
        arena.push(Proposal {
            parent: ProposalParent::Input(InputId(0)),
            output: OutputId(0),
            steps: Vec::new(),
            cost: 0,
        });
        arena.push(Proposal {
            parent: ProposalParent::Input(InputId(0)),
            output: OutputId(1),
            steps: vec![step("rgb2yuv", "rgb", "yuv")],
            cost: 1,
        });
        let selected: Vec<ProposalId> = arena.ids().collect();

        let graph = build_graph(&arena, &selected, &inputs()).unwrap();
        let description = graph.describe();
        assert!(description.contains(&"input:0 -> splitter:0".to_string()));
        assert!(description.contains(&"splitter:0 -> output:0".to_string()));
        assert!(description.contains(&"splitter:0 -> rgb2yuv:1".to_string()));
        assert_eq!(graph.connected_outputs(), vec![OutputId(0), OutputId(1)]);
    }

    #[test]
    fn test_event_reaches_connected_outputs() {
        let mut arena = ProposalArena::new();
        arena.push(Proposal {
            parent: ProposalParent::Input(InputId(0)),
            output: OutputId(0),
            steps: vec![step("rgb2yuv", "rgb", "yuv")],
            cost: 1,
        });
        let selected: Vec<ProposalId> = arena.ids().collect();
        let graph = build_graph(&arena, &selected, &inputs()).unwrap();

        assert_eq!(graph.push_event(InputId(0), &Event::Eos), vec![OutputId(0)]);
    }
}
