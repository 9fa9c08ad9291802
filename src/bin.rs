//! The auto-routing bin: endpoints, planning triggers and the rebuild
//! protocol.
//!
//! The bin owns the outward-facing endpoints, the factory index and the
//! live graph. One bin-scoped mutex serializes every structural
//! operation; a condition variable parks input-side operations while a
//! graph swap is in flight. Dispatch into the live graph happens outside
//! the structural lock.
//!
//! # Lifecycle
//!
//! ```text
//! inputs configured -> caps arrive on every input -> plan + build
//!                                                        |
//!            IDLE <------ REBUILDING <------ DRAINING <--+-- needs_reconfigure
//! ```
//!
//! The first planning pass runs as soon as every input has declared
//! concrete caps. Later passes are triggered by a needs-reconfigure
//! latch on any output: the next buffer drains the old graph (an
//! end-of-stream marker is injected into every input and awaited on
//! every connected output), the graph is rebuilt from current caps, and
//! blocked input operations resume.

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::endpoint::{InputEndpoint, InputId, OutputEndpoint, OutputId};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::graph::{build_graph, LiveGraph};
use crate::policy::Policy;
use crate::routing::index::FactoryIndex;
use crate::routing::plan::Planner;
use crate::routing::select::select_proposals;
use std::collections::HashSet;
use std::sync::{Condvar, Mutex};

/// Build state of the bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinState {
    Idle,
    Draining,
    Rebuilding,
}

struct BinCore {
    policy: Policy,
    index: FactoryIndex,
    inputs: Vec<InputEndpoint>,
    outputs: Vec<OutputEndpoint>,
    state: BinState,
    pending_drain: HashSet<OutputId>,
    planned: bool,
    plan_generation: u64,
}

impl BinCore {
    fn enter_state(&mut self, from: BinState, to: BinState) {
        if self.state != from {
            tracing::warn!(?from, ?to, actual = ?self.state, "unexpected build state transition");
        }
        self.state = to;
    }

    fn input(&self, id: InputId) -> Result<&InputEndpoint> {
        self.inputs
            .get(id.index())
            .ok_or_else(|| Error::UnknownEndpoint(format!("input {}", id.index())))
    }

    fn input_mut(&mut self, id: InputId) -> Result<&mut InputEndpoint> {
        self.inputs
            .get_mut(id.index())
            .ok_or_else(|| Error::UnknownEndpoint(format!("input {}", id.index())))
    }

    fn output_mut(&mut self, id: OutputId) -> Result<&mut OutputEndpoint> {
        self.outputs
            .get_mut(id.index())
            .ok_or_else(|| Error::UnknownEndpoint(format!("output {}", id.index())))
    }

    fn all_inputs_described(&self) -> bool {
        !self.inputs.is_empty() && self.inputs.iter().all(|i| i.current_caps.is_some())
    }

    /// Run one full planning pass and materialize the result.
    ///
    /// Replays sticky events into the new graph and clears every
    /// needs-reconfigure latch on success.
    fn plan_and_build(&mut self) -> Result<LiveGraph> {
        let inputs: Vec<(InputId, Caps)> = self
            .inputs
            .iter()
            .enumerate()
            .filter_map(|(i, ep)| {
                ep.current_caps
                    .clone()
                    .map(|caps| (InputId(i as u32), caps))
            })
            .collect();
        let outputs: Vec<(OutputId, Caps)> = self
            .outputs
            .iter()
            .enumerate()
            .map(|(i, ep)| (OutputId(i as u32), ep.accepted.clone()))
            .collect();

        let arena = Planner::new(&self.index, &self.policy, &inputs, &outputs).generate();
        let output_ids: Vec<OutputId> = outputs.iter().map(|(id, _)| *id).collect();
        let selected = select_proposals(&arena, &output_ids);
        let graph = build_graph(&arena, &selected, &inputs)?;

        // Replay sticky events so the new subgraph observes the same
        // preroll sequence the old one saw. The drain marker is never
        // sticky, so it cannot leak into the fresh graph.
        for (i, endpoint) in self.inputs.iter().enumerate() {
            let id = InputId(i as u32);
            for event in &endpoint.sticky {
                for output in graph.push_event(id, event) {
                    self.outputs[output.index()].events.push(event.clone());
                }
            }
        }

        for output in &mut self.outputs {
            output.needs_reconfigure = false;
        }
        self.plan_generation += 1;

        tracing::debug!(
            generation = self.plan_generation,
            proposals = arena.len(),
            selected = selected.len(),
            "planning pass complete"
        );
        Ok(graph)
    }
}

/// A bin that auto-routes typed input streams to typed output demands.
///
/// Thread safe: all methods take `&self` and may be called from any
/// thread. Input-side operations block while a rebuild is in flight.
pub struct AutoRouteBin {
    core: Mutex<BinCore>,
    cond: Condvar,
    graph: Mutex<Option<LiveGraph>>,
}

impl AutoRouteBin {
    /// Create a bin and index the policy's factory catalog.
    ///
    /// Fails with [`Error::PolicyMissing`] when the policy carries no
    /// catalog provider.
    pub fn new(policy: Policy) -> Result<Self> {
        let catalog = policy.factories()?;
        let index = FactoryIndex::build(&catalog);

        Ok(Self {
            core: Mutex::new(BinCore {
                policy,
                index,
                inputs: Vec::new(),
                outputs: Vec::new(),
                state: BinState::Idle,
                pending_drain: HashSet::new(),
                planned: false,
                plan_generation: 0,
            }),
            cond: Condvar::new(),
            graph: Mutex::new(None),
        })
    }

    /// Re-run the catalog provider and rebuild the factory index.
    ///
    /// The index is otherwise immutable; this is the explicit
    /// invalidation point for hosts whose catalog changed.
    pub fn rebuild_factory_index(&self) -> Result<()> {
        let mut core = self.core.lock().unwrap();
        let catalog = core.policy.factories()?;
        core.index = FactoryIndex::build(&catalog);
        Ok(())
    }

    /// Add an input endpoint.
    pub fn add_input(&self, name: impl Into<String>) -> InputId {
        let mut core = self.core.lock().unwrap();
        let id = InputId(core.inputs.len() as u32);
        core.inputs.push(InputEndpoint::new(name.into()));
        id
    }

    /// Add an output endpoint whose downstream consumer accepts
    /// `accepted`.
    pub fn add_output(&self, name: impl Into<String>, accepted: Caps) -> OutputId {
        let mut core = self.core.lock().unwrap();
        let id = OutputId(core.outputs.len() as u32);
        core.outputs.push(OutputEndpoint::new(name.into(), accepted));
        id
    }

    /// Number of input endpoints.
    pub fn input_count(&self) -> usize {
        self.core.lock().unwrap().inputs.len()
    }

    /// Number of output endpoints.
    pub fn output_count(&self) -> usize {
        self.core.lock().unwrap().outputs.len()
    }

    /// Name of an input endpoint.
    pub fn input_name(&self, input: InputId) -> Result<String> {
        let core = self.core.lock().unwrap();
        Ok(core.input(input)?.name.clone())
    }

    /// Name of an output endpoint.
    pub fn output_name(&self, output: OutputId) -> Result<String> {
        let core = self.core.lock().unwrap();
        core.outputs
            .get(output.index())
            .map(|o| o.name.clone())
            .ok_or_else(|| Error::UnknownEndpoint(format!("output {}", output.index())))
    }

    /// How many planning passes have completed.
    pub fn plan_generation(&self) -> u64 {
        self.core.lock().unwrap().plan_generation
    }

    /// Stable description of the live graph topology, empty when no
    /// graph is built.
    pub fn graph_topology(&self) -> Vec<String> {
        self.graph
            .lock()
            .unwrap()
            .as_ref()
            .map(LiveGraph::describe)
            .unwrap_or_default()
    }

    /// Query the caps an input endpoint can accept: the union of every
    /// output peer's advertised caps and the catalog's sink-side caps,
    /// filtered and normalized.
    pub fn query_input_caps(&self, input: InputId, filter: Option<&Caps>) -> Result<Caps> {
        self.check_block();
        let core = self.core.lock().unwrap();
        core.input(input)?;

        let mut caps = Caps::new_empty();
        for output in &core.outputs {
            caps.merge(&output.accepted.intersect_with_filter(filter));
        }
        caps.merge(&core.index.all_sink_caps().intersect_with_filter(filter));
        Ok(caps.normalize())
    }

    /// Query the caps an output endpoint can produce: the union of every
    /// input's declared caps and the catalog's src-side caps, filtered
    /// and normalized.
    pub fn query_output_caps(&self, output: OutputId, filter: Option<&Caps>) -> Result<Caps> {
        let core = self.core.lock().unwrap();
        core.outputs
            .get(output.index())
            .ok_or_else(|| Error::UnknownEndpoint(format!("output {}", output.index())))?;

        let mut caps = Caps::new_empty();
        for input in &core.inputs {
            if let Some(current) = &input.current_caps {
                caps.merge(&current.intersect_with_filter(filter));
            }
        }
        caps.merge(&core.index.all_src_caps().intersect_with_filter(filter));
        Ok(caps.normalize())
    }

    /// Deliver an event into an input endpoint.
    ///
    /// Caps events are intercepted: the declaration is stored, and once
    /// every input carries concrete caps the first planning pass runs.
    /// Sticky events are retained for replay into rebuilt graphs.
    pub fn push_event(&self, input: InputId, event: Event) -> Result<()> {
        self.check_block();

        let just_built = {
            let mut core = self.core.lock().unwrap();
            let endpoint = core.input_mut(input)?;

            if event.is_sticky() {
                endpoint.store_sticky(event.clone());
            }

            if let Event::Caps(caps) = &event {
                core.input_mut(input)?.current_caps = Some(caps.clone());

                if !core.planned && core.all_inputs_described() {
                    core.policy.begin_building_graph();
                    let graph = core.plan_and_build()?;
                    core.planned = true;
                    *self.graph.lock().unwrap() = Some(graph);
                    true
                } else {
                    false
                }
            } else {
                false
            }
        };

        // The build replayed every sticky event, this one included.
        if just_built {
            return Ok(());
        }

        self.dispatch_event(input, &event)
    }

    /// Deliver a buffer into an input endpoint.
    ///
    /// Blocks while a rebuild is in flight. A latched needs-reconfigure
    /// flag on any output triggers the drain-and-rebuild cycle before
    /// the buffer is dispatched.
    pub fn push_buffer(&self, input: InputId, buffer: Buffer) -> Result<()> {
        loop {
            self.check_block();
            let needs = {
                let core = self.core.lock().unwrap();
                core.input(input)?;
                core.outputs.iter().any(|o| o.needs_reconfigure)
            };
            if !needs {
                break;
            }
            self.begin_rebuild()?;
        }

        let delivered = {
            let mut graph = self.graph.lock().unwrap();
            match graph.as_mut() {
                Some(graph) => graph.push_buffer(input, buffer)?,
                None => Vec::new(),
            }
        };

        if !delivered.is_empty() {
            let mut core = self.core.lock().unwrap();
            for (output, buffer) in delivered {
                core.outputs[output.index()].buffers.push(buffer);
            }
        }

        Ok(())
    }

    /// Latch a reconfiguration request on an output endpoint.
    ///
    /// Requests coalesce: however many outputs latch, the next buffer
    /// triggers exactly one rebuild.
    pub fn set_output_needs_reconfigure(&self, output: OutputId) -> Result<()> {
        let mut core = self.core.lock().unwrap();
        core.output_mut(output)?.needs_reconfigure = true;
        Ok(())
    }

    /// Whether an output currently has a reconfiguration latched.
    pub fn output_needs_reconfigure(&self, output: OutputId) -> Result<bool> {
        let mut core = self.core.lock().unwrap();
        Ok(core.output_mut(output)?.needs_reconfigure)
    }

    /// Take the buffers delivered to an output since the last call.
    pub fn take_output_buffers(&self, output: OutputId) -> Result<Vec<Buffer>> {
        let mut core = self.core.lock().unwrap();
        Ok(std::mem::take(&mut core.output_mut(output)?.buffers))
    }

    /// Take the events delivered to an output since the last call.
    pub fn take_output_events(&self, output: OutputId) -> Result<Vec<Event>> {
        let mut core = self.core.lock().unwrap();
        Ok(std::mem::take(&mut core.output_mut(output)?.events))
    }

    /// Park until the bin is idle.
    fn check_block(&self) {
        let mut core = self.core.lock().unwrap();
        while core.state != BinState::Idle {
            core = self.cond.wait(core).unwrap();
        }
    }

    /// Dispatch an event into the live graph and handle what comes out
    /// the far end.
    ///
    /// While draining, end-of-stream markers arriving at awaited outputs
    /// are acknowledgments: they are swallowed rather than forwarded and
    /// checked off the awaiting set.
    fn dispatch_event(&self, input: InputId, event: &Event) -> Result<()> {
        let reached = {
            let graph = self.graph.lock().unwrap();
            match graph.as_ref() {
                Some(graph) => graph.push_event(input, event),
                None => Vec::new(),
            }
        };
        if reached.is_empty() {
            return Ok(());
        }

        let mut core = self.core.lock().unwrap();
        if core.state == BinState::Draining && matches!(event, Event::Eos) {
            for output in reached {
                core.pending_drain.remove(&output);
            }
        } else {
            for output in reached {
                core.outputs[output.index()].events.push(event.clone());
            }
        }

        Ok(())
    }

    /// Start the drain-and-rebuild cycle.
    ///
    /// Records the connected outputs as awaiting drain and injects the
    /// end-of-stream marker into every input of the live graph. With
    /// nothing to drain the machine rebuilds immediately.
    fn begin_rebuild(&self) -> Result<()> {
        let input_ids: Vec<InputId> = {
            let mut core = self.core.lock().unwrap();
            if core.state != BinState::Idle {
                // Another thread is already rebuilding; our caller will
                // park on the condition variable instead.
                return Ok(());
            }
            core.enter_state(BinState::Idle, BinState::Draining);

            let pending: Vec<OutputId> = {
                let graph = self.graph.lock().unwrap();
                graph
                    .as_ref()
                    .map(LiveGraph::connected_outputs)
                    .unwrap_or_default()
            };

            if pending.is_empty() {
                return self.complete_rebuild(&mut core);
            }

            tracing::debug!(awaiting = pending.len(), "draining live graph");
            core.pending_drain = pending.into_iter().collect();
            (0..core.inputs.len() as u32).map(InputId).collect()
        };

        for input in input_ids {
            self.dispatch_event(input, &Event::Eos)?;
        }

        let mut core = self.core.lock().unwrap();
        if !core.pending_drain.is_empty() {
            tracing::warn!(
                awaiting = core.pending_drain.len(),
                "drain markers injected but not every output acknowledged"
            );
            core.pending_drain.clear();
        }
        self.complete_rebuild(&mut core)
    }

    /// Tear down the prior graph, build the new one and wake blocked
    /// input operations.
    fn complete_rebuild(&self, core: &mut BinCore) -> Result<()> {
        core.enter_state(BinState::Draining, BinState::Rebuilding);
        core.pending_drain.clear();

        // Hold the dispatch lock across the whole swap: a buffer racing
        // in on another thread either lands in the old graph before this
        // point or waits here and enters the new one.
        let mut slot = self.graph.lock().unwrap();
        *slot = None;

        let result = match core.plan_and_build() {
            Ok(graph) => {
                *slot = Some(graph);
                Ok(())
            }
            Err(error) => Err(error),
        };
        drop(slot);

        core.enter_state(BinState::Rebuilding, BinState::Idle);
        self.cond.notify_all();
        result
    }
}

impl std::fmt::Debug for AutoRouteBin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.lock().unwrap();
        f.debug_struct("AutoRouteBin")
            .field("inputs", &core.inputs.len())
            .field("outputs", &core.outputs.len())
            .field("state", &core.state)
            .field("plan_generation", &core.plan_generation)
            .finish()
    }
}
